//! Explicit prompt composition (spec SS9 redesign flag): replaces "prompt
//! template concatenation as an ambient ability" with a pure, testable
//! function the worker calls at SS4.F step 5.

use crate::domain::entities::{PromptTemplate, ReferenceType};

pub struct PromptComposer;

impl PromptComposer {
    /// Effective prompt = `template.prompt + "\n\nUser Request: " +
    /// userPrompt` when `template` is present and active, otherwise
    /// `userPrompt` verbatim; then, for reference-bearing operations, the
    /// reference type's instruction is appended on its own line.
    pub fn compose(
        template: Option<&PromptTemplate>,
        user_prompt: &str,
        reference_type: Option<ReferenceType>,
    ) -> String {
        let mut effective = match template {
            Some(t) if t.is_active => format!("{}\n\nUser Request: {}", t.prompt, user_prompt),
            _ => user_prompt.to_string(),
        };

        if let Some(reference_type) = reference_type {
            effective.push('\n');
            effective.push_str(reference_type.prompt_instruction());
        }

        effective
    }
}
