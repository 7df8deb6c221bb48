//! Turn the text of a chat mention into a [`DeploymentRequest`].

use crate::error::{DeployError, Result};
use crate::types::{is_valid_application, DeploymentRequest};
use regex::Regex;
use std::sync::OnceLock;

pub const USAGE: &str = "Usage: `@deploybot <app> <pull-request-number|main>`";

fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<@[A-Z0-9]+(\|[^>]*)?>").expect("static pattern"))
}

/// Strip user mentions and expect exactly `<app> <ref>`.
///
/// The reference is not interpreted here; the pipeline rejects references
/// that are neither a pull request number nor `main`.
pub fn parse_mention(text: &str) -> Result<DeploymentRequest> {
    let stripped = mention_pattern().replace_all(text, " ");
    let args: Vec<&str> = stripped.split_whitespace().collect();

    let [app, reference] = args.as_slice() else {
        return Err(DeployError::InvalidRequest(format!(
            "Expected an app and a reference, got {} argument(s). {USAGE}",
            args.len()
        )));
    };

    if !is_valid_application(app) {
        return Err(DeployError::InvalidRequest(format!(
            "`{app}` is not a valid app name. {USAGE}"
        )));
    }

    Ok(DeploymentRequest::new(*app, *reference))
}
