//! Prompt template rendering.
//!
//! Minimal `{variable}` substitution for prompt templates. `{{` and `}}`
//! render literal braces. Undefined variables are a hard error rather than
//! a silent empty substitution, so a typo in a template never produces a
//! quietly degraded prompt.

use std::collections::HashMap;
use thiserror::Error;

/// Error type for template rendering failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A variable was referenced but not provided.
    #[error("undefined variable '{name}' in template")]
    UndefinedVariable {
        /// Name of the missing variable.
        name: String,
    },

    /// A `{` was opened but never closed.
    #[error("unclosed '{{' at byte {position} in template")]
    UnclosedBrace {
        /// Byte offset of the opening brace.
        position: usize,
    },
}

/// Render a template by substituting `{variable}` placeholders.
pub fn render_template(
    template: &str,
    variables: &HashMap<String, String>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        if ch == '{' {
            if chars.next_if(|&(_, c)| c == '{').is_some() {
                out.push('{');
                continue;
            }
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some((_, '}')) => break,
                    Some((_, c)) => name.push(c),
                    None => return Err(TemplateError::UnclosedBrace { position: pos }),
                }
            }
            let name = name.trim();
            match variables.get(name) {
                Some(value) => out.push_str(value),
                None => {
                    return Err(TemplateError::UndefinedVariable {
                        name: name.to_string(),
                    });
                }
            }
        } else if ch == '}' {
            // `}}` collapses to one brace; a lone `}` passes through.
            chars.next_if(|&(_, c)| c == '}');
            out.push('}');
        } else {
            out.push(ch);
        }
    }

    Ok(out)
}

/// Build a variables map from key-value pairs.
pub fn template_vars<I, K, V>(pairs: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
