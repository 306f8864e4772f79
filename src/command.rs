//! Logical commands as handed to the engine by callers.
//!
//! A command is either one opaque shell line or an ordered list of parts
//! that the originator has already quoted independently. The engine never
//! mutates a command; normalization derives a new line from it.

use std::fmt;

use crate::error::OrbError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalCommand {
    /// A single shell line, interpreted as-is by the target shell.
    Line(String),
    /// Independently quoted parts, joined with single spaces.
    Parts(Vec<String>),
}

impl LogicalCommand {
    pub fn line(text: impl Into<String>) -> Self {
        Self::Line(text.into())
    }

    /// Build a multi-part command. Rejects sequences with no non-blank part.
    pub fn parts<I, S>(parts: I) -> Result<Self, OrbError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        if parts.iter().all(|p| p.trim().is_empty()) {
            return Err(OrbError::Validation {
                message: "command must have at least one non-empty part".into(),
            });
        }
        Ok(Self::Parts(parts))
    }

    /// Build a multi-part command from raw argv words, quoting each one.
    pub fn from_argv<I, S>(words: I) -> Result<Self, OrbError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::parts(words.into_iter().map(|w| shell_quote(w.as_ref())))
    }

    /// Parts that carry content; blank parts are ignored when deciding
    /// whether a command is a single unit.
    pub fn meaningful_parts(&self) -> Vec<&str> {
        match self {
            Self::Line(text) => vec![text.as_str()],
            Self::Parts(parts) => parts
                .iter()
                .map(String::as_str)
                .filter(|p| !p.trim().is_empty())
                .collect(),
        }
    }

    /// True for a line, or for a parts list with exactly one meaningful part.
    pub fn is_single_unit(&self) -> bool {
        match self {
            Self::Line(_) => true,
            Self::Parts(_) => self.meaningful_parts().len() == 1,
        }
    }

    /// The command text as the target shell will see it, without any wrapping.
    pub fn joined(&self) -> String {
        match self {
            Self::Line(text) => text.clone(),
            Self::Parts(_) => self.meaningful_parts().join(" "),
        }
    }
}

impl fmt::Display for LogicalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

/// POSIX shell quoting: safe words pass through, everything else is wrapped
/// in single quotes with embedded single quotes escaped.
pub fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-')
        });
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}
