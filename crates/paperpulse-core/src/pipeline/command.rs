//! Incoming chat messages and the commands they carry.

use crate::config::DigestConfig;
use crate::error::{PulseError, Result};
use crate::identifier::find_raw_identifier;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TOP_COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^{}(\s.+)?$", DigestConfig::TOP_COMMAND))
        .expect("top command regex must compile")
});

/// Characters allowed in a category filter.
static FILTER_ARGUMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[\s\w":.]+$"#).expect("filter regex must compile"));

/// A chat message event as delivered by the events endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub text: String,
    /// Message timestamp; replies are threaded under it.
    #[serde(default)]
    pub ts: String,
}

impl MessageEvent {
    /// Posted by a person, not a bot.
    pub fn is_from_user(&self) -> bool {
        self.user.is_some() && self.bot_id.is_none()
    }
}

/// What a message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ranked digest of the most linked papers, optionally restricted by a filter query.
    TopPapers { filter: Option<String> },
    /// Digest of one linked paper; `raw_id` may carry a version suffix.
    LookupPaper { raw_id: String },
}

impl Command {
    /// Parse a message; `None` if it carries no command.
    pub fn parse(text: &str) -> Option<Command> {
        if let Some(captures) = TOP_COMMAND.captures(text) {
            let filter = captures
                .get(1)
                .map(|m| normalize_quotes(m.as_str()).trim().to_string())
                .filter(|f| !f.is_empty());
            return Some(Command::TopPapers { filter });
        }

        find_raw_identifier(text).map(|raw_id| Command::LookupPaper {
            raw_id: raw_id.to_string(),
        })
    }

    /// Immediate acknowledgment text.
    pub fn ack_text(&self) -> &'static str {
        match self {
            Command::TopPapers { .. } => "Processing top5 message.",
            Command::LookupPaper { .. } => "arXiv URL Found.",
        }
    }
}

fn normalize_quotes(text: &str) -> String {
    text.replace(['\u{201C}', '\u{201D}'], "\"")
}

/// Reject filter queries with characters outside the allowed set.
pub fn validate_filter(filter: &str) -> Result<()> {
    if FILTER_ARGUMENT.is_match(filter) {
        Ok(())
    } else {
        Err(PulseError::validation(
            "filter",
            format!("unsupported characters in '{}'", filter),
        ))
    }
}
