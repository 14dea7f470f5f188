//! Instruction texts for each audience branch.
//!
//! The instruction follows the user's question in the composed prompt and
//! sets tone, length and vocabulary for the answer.

use crate::types::AgeGroup;

/// Young children: simplest vocabulary, very short answers.
pub const CHILD_INSTRUCTION: &str = "Answer like you're talking to a curious young child. \
Use short sentences and everyday words a primary school student knows. \
Be warm and encouraging, and keep the answer to 2 sentences. \
If the topic is not suitable for children, gently suggest asking a parent or teacher instead.";

/// Teenage students: casual, short, relatable.
pub const TEEN_STUDENT_INSTRUCTION: &str = "Answer like you're explaining to a curious teenager. \
Use simple, clear language that an 8th grader can understand. \
Make it engaging and relatable to their world - school, friends, social media, games. \
Keep it educational but fun. Use 2-3 sentences maximum. \
Avoid baby talk but keep it age-appropriate.";

/// Teachers: long-form and pedagogical.
pub const TEACHER_INSTRUCTION: &str = "Provide a comprehensive educational response with teaching strategies, \
curriculum connections, and pedagogical insights. \
Include how to explain this concept to different grade levels, classroom activities, \
and educational best practices. Be professional and detailed.";

/// Healthcare patients: reassuring, jargon-free, refers out.
pub const HEALTHCARE_PATIENT_INSTRUCTION: &str = "Explain in simple, reassuring terms that a worried patient can understand. \
Avoid complex medical jargon. \
Focus on general health information and encourage consulting healthcare providers for specific medical advice. \
Be empathetic and clear.";

/// Healthcare providers: clinical terminology, evidence-based.
pub const HEALTHCARE_PROVIDER_INSTRUCTION: &str = "Provide detailed clinical information with appropriate medical terminology, \
evidence-based recommendations, and professional insights. \
Include relevant medical guidelines, diagnostic considerations, and treatment protocols \
as appropriate for healthcare professionals.";

/// Everyone else: professional adult tone.
pub const DEFAULT_INSTRUCTION: &str = "Provide a clear, informative response appropriate for an adult audience. \
Be accurate, helpful, and comprehensive.";

/// Appended when a guardian has enabled parental controls.
pub const PARENTAL_CONTROLS_MODIFIER: &str = "Parental controls are enabled: keep every part of the answer family-friendly.";

/// Appended for mobile and kiosk devices.
pub const COMPACT_DEVICE_MODIFIER: &str = "The reader is on a small screen: use short paragraphs and avoid tables.";

/// Upper bound on answer length for an age group, applied over the branch budget.
pub fn age_token_ceiling(age_group: AgeGroup) -> u32 {
    match age_group {
        AgeGroup::Child => 200,
        AgeGroup::Teen => 300,
        AgeGroup::Adult | AgeGroup::Senior => 1000,
    }
}
