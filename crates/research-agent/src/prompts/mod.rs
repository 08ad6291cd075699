//! Prompt templates for the LLM-backed stages
//!
//! Templates are MiniJinja strings rendered with a fresh environment per
//! call. They are organized into:
//! - `system`: system prompts for each task
//! - `user`: user message templates and their typed render functions

mod system;
mod user;

pub use system::*;
pub use user::*;

use minijinja::Environment;
use research_core::{Error, Result};
use serde::Serialize;

/// Render a template string with the given context
pub fn render<C: Serialize>(name: &str, template: &str, context: C) -> Result<String> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);

    env.render_str(template, context)
        .map_err(|e| Error::Other(format!("Failed to render prompt '{name}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn test_render_with_loop() {
        let out = render(
            "test",
            "{% for item in items %}\n- {{ item }}\n{% endfor %}",
            context! { items => vec!["a", "b"] },
        )
        .unwrap();
        assert_eq!(out, "- a\n- b\n");
    }

    #[test]
    fn test_render_error_names_template() {
        let err = render("broken", "{% if %}", context! {}).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
