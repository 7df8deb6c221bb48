//! Single-field substitution in a YAML values file.
//!
//! The rewrite is line-based so comments, key order and indentation survive
//! the commit diff. `serde_yaml` is only used to confirm the document parses
//! and that the field exists as a scalar before the text is touched.

use crate::error::{DeployError, Result};
use crate::types::ManifestMutation;

#[derive(Debug, Clone)]
pub struct ManifestMutator {
    field_path: Vec<String>,
}

impl ManifestMutator {
    /// `field_path` is dotted, e.g. `image.tag`.
    pub fn new(field_path: &str) -> Self {
        Self {
            field_path: field_path.split('.').map(str::to_string).collect(),
        }
    }

    pub fn field_path(&self) -> String {
        self.field_path.join(".")
    }

    /// Replace the scalar at the configured path with `new_tag`.
    pub fn apply(&self, file: &str, document: &str, new_tag: &str) -> Result<ManifestMutation> {
        let missing = || DeployError::MutationFieldMissing {
            field: self.field_path(),
            file: file.to_string(),
        };

        let parsed: serde_yaml::Value =
            serde_yaml::from_str(document).map_err(|e| DeployError::ManifestInvalid {
                file: file.to_string(),
                reason: e.to_string(),
            })?;
        let mut node = &parsed;
        for key in &self.field_path {
            node = node.get(key.as_str()).ok_or_else(missing)?;
        }
        if node.is_mapping() || node.is_sequence() {
            return Err(missing());
        }

        let (mutated, old) = self.rewrite(document, new_tag).ok_or_else(missing)?;
        let message = format!(
            "_Updated `{}` in `{file}` from `{old}` to `{new_tag}`_",
            self.field_path()
        );
        Ok(ManifestMutation {
            original: document.to_string(),
            mutated,
            message,
        })
    }

    /// Walk block-style mappings by indentation and swap the first line whose
    /// key path matches. Returns the new document and the replaced value.
    fn rewrite(&self, document: &str, new_tag: &str) -> Option<(String, String)> {
        let mut parents: Vec<(usize, String)> = Vec::new();
        let mut out = String::with_capacity(document.len() + new_tag.len());
        let mut replaced: Option<String> = None;

        for raw in document.split_inclusive('\n') {
            if replaced.is_some() {
                out.push_str(raw);
                continue;
            }
            let (line, ending) = split_line_ending(raw);
            let indent = line.len() - line.trim_start_matches(' ').len();
            let body = &line[indent..];

            let Some((key, rest)) = split_key(body) else {
                out.push_str(raw);
                continue;
            };

            while parents.last().is_some_and(|(i, _)| *i >= indent) {
                parents.pop();
            }

            let (value, comment) = split_comment(rest);
            let on_path = parents.len() + 1 == self.field_path.len()
                && parents
                    .iter()
                    .map(|(_, k)| k.as_str())
                    .chain(std::iter::once(key))
                    .eq(self.field_path.iter().map(String::as_str));

            if on_path && !value.trim().is_empty() {
                let old = value.trim();
                let quote = old.chars().next().filter(|c| *c == '"' || *c == '\'');
                let new_value = match quote {
                    Some(q) => format!("{q}{new_tag}{q}"),
                    None => new_tag.to_string(),
                };
                let key_end = line.len() - rest.len();
                out.push_str(&line[..key_end]);
                out.push(' ');
                out.push_str(&new_value);
                out.push_str(comment);
                out.push_str(ending);
                replaced = Some(old.trim_matches(|c| c == '"' || c == '\'').to_string());
                continue;
            }

            if value.trim().is_empty() {
                parents.push((indent, key.to_string()));
            }
            out.push_str(raw);
        }

        replaced.map(|old| (out, old))
    }
}

fn split_line_ending(raw: &str) -> (&str, &str) {
    if let Some(line) = raw.strip_suffix("\r\n") {
        (line, "\r\n")
    } else if let Some(line) = raw.strip_suffix('\n') {
        (line, "\n")
    } else {
        (raw, "")
    }
}

/// `key: rest` for a block mapping entry. Comments, list items and document
/// markers yield `None`.
fn split_key(body: &str) -> Option<(&str, &str)> {
    if body.is_empty() || body.starts_with('#') || body.starts_with('-') {
        return None;
    }
    let colon = body
        .char_indices()
        .find(|&(i, c)| c == ':' && matches!(body[i + 1..].chars().next(), None | Some(' ')))
        .map(|(i, _)| i)?;
    let key = body[..colon].trim().trim_matches(|c| c == '"' || c == '\'');
    Some((key, &body[colon + 1..]))
}

/// Separate a value from a trailing ` # comment`, keeping the comment's
/// leading whitespace.
fn split_comment(rest: &str) -> (&str, &str) {
    let mut in_quote: Option<char> = None;
    let mut prev_space = true;
    for (i, c) in rest.char_indices() {
        match (c, in_quote) {
            ('"' | '\'', None) => in_quote = Some(c),
            (c, Some(q)) if c == q => in_quote = None,
            ('#', None) if prev_space => {
                let value = &rest[..i];
                let trimmed = value.trim_end();
                return (trimmed, &rest[trimmed.len()..]);
            }
            _ => {}
        }
        prev_space = c == ' ';
    }
    (rest.trim_end(), &rest[rest.trim_end().len()..])
}
