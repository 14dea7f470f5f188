//! Audience-tailored prompt composition.

mod composer;
pub mod templates;

pub use composer::{
    select_branch, BranchRule, PromptBranch, PromptComposer, PromptRequest, PROMPT_BRANCHES,
};
