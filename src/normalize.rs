//! Turns a logical command plus control options into one shell line.
//!
//! Rules, in order:
//! - no elevation: a line passes through, parts are space-joined
//! - elevation of a single unit: one `bash +H -c '<body>'` wrapper after
//!   the elevation prefix, so `!` and shell operators reach an explicit
//!   non-interactive shell
//! - elevation of a multi-part command: prefix only, no extra wrapper
//!
//! Identity selection (`-u <user>`) always sits between the elevation
//! prefix and the body.

use std::fmt;

use crate::command::{LogicalCommand, shell_quote};
use crate::options::ExecutionControlOptions;

/// How elevation is spelled on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevationConfig {
    /// Elevation tool, e.g. `sudo`.
    pub command: String,
    /// Flags that always follow the tool.
    pub args: Vec<String>,
    /// Shell used for the single wrapper; invoked with history expansion off.
    pub shell: String,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            command: "sudo".into(),
            args: vec!["-H".into(), "-n".into()],
            shell: "bash".into(),
        }
    }
}

/// The single line handed to the target's run verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedInvocation(String);

impl NormalizedInvocation {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandNormalizer {
    elevation: ElevationConfig,
}

impl CommandNormalizer {
    pub fn new(elevation: ElevationConfig) -> Self {
        Self { elevation }
    }

    pub fn normalize(
        &self,
        command: &LogicalCommand,
        opts: &ExecutionControlOptions,
    ) -> NormalizedInvocation {
        let body = command.joined();
        if !opts.elevate {
            return NormalizedInvocation(body);
        }

        let mut words = self.elevation_prefix(opts.elevate_user.as_deref());
        if command.is_single_unit() {
            words.push(self.elevation.shell.clone());
            words.push("+H".into());
            words.push("-c".into());
            words.push(shell_quote(&body));
        } else {
            words.push(body);
        }
        NormalizedInvocation(words.join(" "))
    }

    fn elevation_prefix(&self, user: Option<&str>) -> Vec<String> {
        let mut words = vec![self.elevation.command.clone()];
        words.extend(self.elevation.args.iter().cloned());
        if let Some(user) = user {
            words.push("-u".into());
            words.push(shell_quote(user));
        }
        words
    }
}
