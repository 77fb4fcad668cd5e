//! Clinical prompt assembly.
//!
//! The system prompt embeds an emergency-triage scoring rubric (ERC 2021 /
//! SFAR 2024 style) with an adult and a pediatric variant, and instructs the
//! model to answer as a single JSON object in the canonical result shape.

use triage_core::types::PatientContext;

/// Age below which the pediatric rubric applies.
const PEDIATRIC_AGE_CUTOFF: u32 = 18;

/// Clinical scoring rubric for the system prompt.
pub fn scoring_guidelines(patient_age: Option<u32>) -> String {
    let age_group = match patient_age {
        Some(age) if age < PEDIATRIC_AGE_CUTOFF => "PEDIATRIC",
        _ => "ADULT",
    };

    format!(
        r#"CLINICAL SCORING SYSTEM ({age_group})
Based on ERC 2021, SFAR 2024, and emergency department triage algorithms.

PER-SYSTEM EVALUATION (score 0-100 per sign):

1. CARDIOVASCULAR:
   - Cardiac arrest: 100 (immediate CPR)
   - Cardiogenic shock: 95 (systolic BP < 60-70 mmHg, mottling, oliguria)
   - Extreme tachycardia: 90 (>220/min infant, >180/min adult)
   - Severe bradycardia: 85 (<60/min with low-output signs)
   - Acute pulmonary edema: 85
   - Central cyanosis: 80 (SaO2 < 85%)
   - Thready pulse: 75 (compensated shock)
   - Chest pain with dyspnea: 70 (suspected ischemia)
   - Severe hypertension: 65 (BP > 99th percentile with neurological signs)

2. RESPIRATORY:
   - Apnea: 95 (pause > 20 s)
   - Severe respiratory distress: 90 (Silverman > 8, SaO2 < 90%)
   - Intercostal/subcostal retractions: 85
   - Cyanosis: 80
   - Hemoptysis: 80
   - Inspiratory stridor: 75 (possible epiglottitis)
   - Diffuse wheezing: 65 (severe asthma)
   - Elevated respiratory rate: 60 (>70/min infant, >30/min adult)

3. NEUROLOGICAL:
   - Coma (Glasgow < 8): 100
   - Prolonged seizures (> 5 min): 95
   - Neck stiffness: 90 (possible meningitis)
   - Sudden motor deficit: 85 (stroke, trauma)
   - Headache with projectile vomiting: 80 (intracranial hypertension)
   - Altered consciousness: 75

4. DIGESTIVE:
   - Upper gastrointestinal bleeding: 90
   - Bowel obstruction: 85
   - Peritonitis: 80
   - Severe dehydration: 75
   - Bloody diarrhea: 70

5. GENERAL SIGNS:
   - Refusal to drink or feed: 90 (especially in infants)
   - Signs of shock: 90
   - Mottling: 85
   - High fever with other signs: 80 (> 39 C)
   - Oliguria: 80

TRIAGE ALGORITHM:
- Score >= 90: life-threatening emergency -> immediate resuscitation, critical care call
- Score 70-89: major emergency -> admission to a continuous-care unit
- Score 50-69: relative emergency -> emergency consultation (< 2h)
- Score 30-49: semi-urgent -> deferred consultation
- Score < 30: non-urgent -> scheduled consultation or discharge home

SCORE CATEGORIZATION (0-100):
- 90-100 -> Critical / Immediate
- 70-89  -> High / Urgent
- 50-69  -> Moderate / Moderate
- 30-49  -> Low / Low
- 0-29   -> Minimal / Non-urgent

INSTRUCTIONS:
1. Identify ALL clinical signs present.
2. Assign each sign a 0-100 score from the tables above.
3. Take the MAXIMUM sign score (not the mean) as the severity score.
4. Keep the reasoning brief and structured, one line per sign."#
    )
}

/// Full system prompt for triage chat calls.
pub fn system_prompt(patient: &PatientContext) -> String {
    let mut prompt = String::from(
        "You are an emergency department triage assistant. \
         Assess the patient and answer with a single JSON object containing \
         exactly these fields: severity_score (integer 0-100), \
         triage_assessment (string), recommended_service (string), \
         reasoning (string). No text outside the JSON object.\n\n",
    );
    prompt.push_str(&scoring_guidelines(patient.age));
    prompt
}

/// User prompt interleaving the complaint, an optional transcript, and the
/// structured patient context. Absent fields are omitted.
pub fn user_prompt(
    complaint: Option<&str>,
    transcript: Option<&str>,
    patient: &PatientContext,
) -> String {
    let mut lines = Vec::new();

    if let Some(text) = complaint.map(str::trim).filter(|t| !t.is_empty()) {
        lines.push(format!("Patient complaint: {}", text));
    }
    if let Some(text) = transcript.map(str::trim).filter(|t| !t.is_empty()) {
        lines.push(format!("Transcribed patient recording: {}", text));
    }
    if let Some(age) = patient.age {
        lines.push(format!("Age: {}", age));
    }
    if let Some(gender) = non_empty(&patient.gender) {
        lines.push(format!("Gender: {}", gender));
    }
    if let Some(vitals) = non_empty(&patient.vital_signs) {
        lines.push(format!("Vital signs: {}", vitals));
    }
    if let Some(history) = non_empty(&patient.medical_history) {
        lines.push(format!("Medical history: {}", history));
    }
    if let Some(medications) = non_empty(&patient.current_medications) {
        lines.push(format!("Current medications: {}", medications));
    }
    if let Some(allergies) = non_empty(&patient.allergies) {
        lines.push(format!("Allergies: {}", allergies));
    }

    if lines.is_empty() {
        lines.push("No complaint text was provided; assess the attached media.".to_string());
    }

    lines.join("\n")
}

/// Prompt line for media-only requests, shown alongside the attachment.
pub fn media_instruction(complaint: Option<&str>) -> &'static str {
    match complaint {
        Some(_) => "Assess the attached recording together with the complaint above.",
        None => "Assess the patient from the attached recording.",
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
