//! Prompt Composer
//!
//! Picks one audience branch per request from an ordered table and renders
//! the prompt text plus a `max_tokens` bound. Specific branches are mutually
//! exclusive; the final default branch catches everything else.

use serde::Serialize;
use std::fmt;

use super::templates::{
    age_token_ceiling, CHILD_INSTRUCTION, COMPACT_DEVICE_MODIFIER, DEFAULT_INSTRUCTION,
    HEALTHCARE_PATIENT_INSTRUCTION, HEALTHCARE_PROVIDER_INSTRUCTION, PARENTAL_CONTROLS_MODIFIER,
    TEACHER_INSTRUCTION, TEEN_STUDENT_INSTRUCTION,
};
use crate::context::ConversationWindow;
use crate::types::{AgeGroup, ClassifiedContext, ConversationTurn, Role};

/// Audience branch of the prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptBranch {
    Child,
    TeenStudent,
    Teacher,
    HealthcarePatient,
    HealthcareProvider,
    Default,
}

impl PromptBranch {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptBranch::Child => "child",
            PromptBranch::TeenStudent => "teen_student",
            PromptBranch::Teacher => "teacher",
            PromptBranch::HealthcarePatient => "healthcare_patient",
            PromptBranch::HealthcareProvider => "healthcare_provider",
            PromptBranch::Default => "default",
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            PromptBranch::Child => CHILD_INSTRUCTION,
            PromptBranch::TeenStudent => TEEN_STUDENT_INSTRUCTION,
            PromptBranch::Teacher => TEACHER_INSTRUCTION,
            PromptBranch::HealthcarePatient => HEALTHCARE_PATIENT_INSTRUCTION,
            PromptBranch::HealthcareProvider => HEALTHCARE_PROVIDER_INSTRUCTION,
            PromptBranch::Default => DEFAULT_INSTRUCTION,
        }
    }

    /// Answer budget before the age ceiling is applied.
    pub fn token_budget(&self) -> u32 {
        match self {
            PromptBranch::Child => 200,
            PromptBranch::TeenStudent => 250,
            PromptBranch::Teacher => 800,
            PromptBranch::HealthcarePatient => 500,
            PromptBranch::HealthcareProvider => 800,
            PromptBranch::Default => 500,
        }
    }

    /// Opening phrase naming who is asking.
    pub fn audience_line(&self, context: &ClassifiedContext) -> String {
        match self {
            PromptBranch::Child => "A young child is asking:".to_string(),
            PromptBranch::TeenStudent => match non_blank(&context.attributes.grade_level) {
                Some(grade) => format!("A teenage student in grade {} is asking:", grade),
                None => "A teenage student is asking:".to_string(),
            },
            PromptBranch::Teacher => "An experienced teacher is asking:".to_string(),
            PromptBranch::HealthcarePatient => "A healthcare patient is asking:".to_string(),
            PromptBranch::HealthcareProvider => "A healthcare provider is asking:".to_string(),
            PromptBranch::Default => match non_blank(&context.attributes.department) {
                Some(department) => format!(
                    "Answer this question professionally for a member of the {} department:",
                    department
                ),
                None => "Answer this question professionally:".to_string(),
            },
        }
    }
}

impl fmt::Display for PromptBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// One row of the branch table.
pub struct BranchRule {
    pub branch: PromptBranch,
    predicate: fn(&ClassifiedContext) -> bool,
}

impl BranchRule {
    pub fn matches(&self, context: &ClassifiedContext) -> bool {
        (self.predicate)(context)
    }
}

impl fmt::Debug for BranchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BranchRule").field("branch", &self.branch).finish()
    }
}

/// Branch table in evaluation order. All rows but the last are disjoint.
pub static PROMPT_BRANCHES: [BranchRule; 6] = [
    BranchRule {
        branch: PromptBranch::Child,
        predicate: |ctx| ctx.age_group == AgeGroup::Child,
    },
    BranchRule {
        branch: PromptBranch::TeenStudent,
        predicate: |ctx| ctx.age_group == AgeGroup::Teen && ctx.role == Role::Student,
    },
    BranchRule {
        branch: PromptBranch::Teacher,
        predicate: |ctx| {
            ctx.role == Role::Teacher && matches!(ctx.age_group, AgeGroup::Adult | AgeGroup::Senior)
        },
    },
    BranchRule {
        branch: PromptBranch::HealthcarePatient,
        predicate: |ctx| {
            ctx.is_healthcare() && ctx.role == Role::Patient && ctx.age_group != AgeGroup::Child
        },
    },
    BranchRule {
        branch: PromptBranch::HealthcareProvider,
        predicate: |ctx| {
            ctx.is_healthcare() && ctx.role == Role::Provider && ctx.age_group != AgeGroup::Child
        },
    },
    BranchRule {
        branch: PromptBranch::Default,
        predicate: |_| true,
    },
];

/// Branch for a context.
pub fn select_branch(context: &ClassifiedContext) -> PromptBranch {
    PROMPT_BRANCHES
        .iter()
        .find(|rule| rule.matches(context))
        .map(|rule| rule.branch)
        .unwrap_or(PromptBranch::Default)
}

/// A composed prompt, ready for inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptRequest {
    pub branch: PromptBranch,
    /// Rendered conversation history, empty for a first question
    pub history_preamble: String,
    pub audience: String,
    pub user_query: String,
    /// Branch instruction followed by any attribute modifiers
    pub system_prompt: String,
    pub max_tokens: u32,
}

impl PromptRequest {
    /// The single prompt string sent to the model.
    pub fn render(&self) -> String {
        format!(
            "{}{} {}\n\n{}",
            self.history_preamble, self.audience, self.user_query, self.system_prompt
        )
    }
}

/// The Prompt Composer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptComposer {
    window: ConversationWindow,
}

impl PromptComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: ConversationWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &ConversationWindow {
        &self.window
    }

    /// Compose the prompt for a normalized query.
    pub fn compose(
        &self,
        query: &str,
        context: &ClassifiedContext,
        history: &[ConversationTurn],
    ) -> PromptRequest {
        let branch = select_branch(context);

        let mut system_prompt = branch.instruction().to_string();
        if context.attributes.parental_controls {
            system_prompt.push(' ');
            system_prompt.push_str(PARENTAL_CONTROLS_MODIFIER);
        }
        if context.device.is_compact() {
            system_prompt.push(' ');
            system_prompt.push_str(COMPACT_DEVICE_MODIFIER);
        }

        let max_tokens = branch
            .token_budget()
            .min(age_token_ceiling(context.age_group));

        let history_preamble = self.window.preamble(history);

        tracing::debug!(
            branch = %branch,
            max_tokens,
            history_turns = self.window.select(history).len(),
            "Composed prompt"
        );

        PromptRequest {
            branch,
            history_preamble,
            audience: branch.audience_line(context),
            user_query: query.to_string(),
            system_prompt,
            max_tokens,
        }
    }
}
