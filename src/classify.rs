//! Decides whether a failed attempt is worth retrying.
//!
//! Matching is a case-insensitive substring search over stderr. The
//! vocabulary can be replaced from `[classifier] transient` in the config.

/// Replaceable classification policy for non-timeout failures.
pub trait ErrorClassifier: Send + Sync {
    /// `true` if a failure with this stderr may succeed on retry.
    fn is_retryable(&self, stderr: &str) -> bool;
}

pub const DEFAULT_TRANSIENT_WORDS: &[&str] = &[
    "timeout",
    "connection",
    "network",
    "tls",
    "handshake",
    "download",
    "cdn",
    "http",
    "https",
    "tcp",
    "dns",
    "missing ip address",
    "didn't start",
    "setup",
    "machine",
];

/// Case-insensitive substring match against a word list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientVocabulary {
    words: Vec<String>,
}

impl Default for TransientVocabulary {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSIENT_WORDS.iter().copied())
    }
}

impl TransientVocabulary {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }
}

impl ErrorClassifier for TransientVocabulary {
    fn is_retryable(&self, stderr: &str) -> bool {
        let lower = stderr.to_lowercase();
        self.words.iter().any(|w| lower.contains(w.as_str()))
    }
}

/// The wrapped CLI's signature for a creation that collided with an
/// existing resource.
pub fn is_already_exists(stderr: &str) -> bool {
    stderr.to_lowercase().contains("already exists")
}
