//! Maps an operation label to how long a single attempt may run.

use std::time::Duration;

/// Substring rule: any label containing one of `needles` gets `timeout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutRule {
    pub needles: Vec<String>,
    pub timeout: Duration,
}

impl TimeoutRule {
    pub fn new<I, S>(needles: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            needles: needles
                .into_iter()
                .map(|n| n.into().to_lowercase())
                .collect(),
            timeout,
        }
    }

    fn matches(&self, label_lower: &str) -> bool {
        self.needles.iter().any(|n| label_lower.contains(n.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutPolicy {
    /// Checked in order; the first match wins.
    rules: Vec<TimeoutRule>,
    default: Duration,
}

pub const LONG_TIMEOUT: Duration = Duration::from_secs(180);
pub const MEDIUM_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::tiered(LONG_TIMEOUT, MEDIUM_TIMEOUT, DEFAULT_TIMEOUT)
    }
}

impl TimeoutPolicy {
    /// Three-tier policy: provisioning verbs get `long`, deletion `medium`,
    /// everything else `default`.
    ///
    /// Needles are verb stems (`creat`, `delet`) so every inflection of the
    /// verb matches: "create", "creating", "creation".
    pub fn tiered(long: Duration, medium: Duration, default: Duration) -> Self {
        Self {
            rules: vec![
                TimeoutRule::new(["creat", "clone", "import"], long),
                TimeoutRule::new(["delet"], medium),
            ],
            default,
        }
    }

    pub fn new(rules: Vec<TimeoutRule>, default: Duration) -> Self {
        Self { rules, default }
    }

    /// Resolve the timeout for `label`. An explicit override always wins.
    pub fn resolve(&self, label: &str, override_timeout: Option<Duration>) -> Duration {
        if let Some(t) = override_timeout {
            return t;
        }
        let lower = label.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.matches(&lower))
            .map_or(self.default, |r| r.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn creation_gets_long_budget() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.resolve("VM creation (demo)", None), LONG_TIMEOUT);
        assert_eq!(policy.resolve("create vm", None), LONG_TIMEOUT);
        assert_eq!(policy.resolve("Creating machine", None), LONG_TIMEOUT);
    }

    #[test]
    fn clone_and_import_get_long_budget() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.resolve("VM clone (a -> b)", None), LONG_TIMEOUT);
        assert_eq!(policy.resolve("VM import (demo)", None), LONG_TIMEOUT);
    }

    #[test]
    fn deletion_gets_medium_budget() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.resolve("VM deletion (demo)", None), MEDIUM_TIMEOUT);
        assert_eq!(policy.resolve("delete demo", None), MEDIUM_TIMEOUT);
    }

    #[test]
    fn everything_else_gets_default() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.resolve("VM start (demo)", None), DEFAULT_TIMEOUT);
        assert_eq!(policy.resolve("shell command", None), DEFAULT_TIMEOUT);
        assert_eq!(policy.resolve("", None), DEFAULT_TIMEOUT);
    }

    #[test]
    fn override_wins() {
        let policy = TimeoutPolicy::default();
        let t = Duration::from_secs(5);
        assert_eq!(policy.resolve("VM creation (demo)", Some(t)), t);
    }

    #[test]
    fn custom_rules_in_order() {
        let policy = TimeoutPolicy::new(
            vec![
                TimeoutRule::new(["export"], Duration::from_secs(600)),
                TimeoutRule::new(["ex"], Duration::from_secs(1)),
            ],
            Duration::from_secs(10),
        );
        assert_eq!(policy.resolve("VM export (demo)", None), Duration::from_secs(600));
        assert_eq!(policy.resolve("exec", None), Duration::from_secs(1));
    }

    proptest! {
        #[test]
        fn any_label_with_provisioning_stem_is_long(
            prefix in "[a-zA-Z ()]{0,12}",
            stem in prop_oneof![Just("creat"), Just("clone"), Just("import"), Just("CREATION")],
            suffix in "[a-zA-Z ()]{0,12}",
        ) {
            let label = format!("{prefix}{stem}{suffix}");
            prop_assert_eq!(TimeoutPolicy::default().resolve(&label, None), LONG_TIMEOUT);
        }
    }
}
