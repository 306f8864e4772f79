//! Boundary with the host automation framework.
//!
//! A request carries a target, an action and a flat argument map. Control
//! options are split off the map before anything else looks at it, so verb
//! builders only ever see their own arguments.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;

use crate::command::LogicalCommand;
use crate::error::OrbError;
use crate::executor::{ProcessExecutor, Target};
use crate::options::split_control_options;
use crate::retry::{Outcome, RetryEngine};
use crate::verbs::VmVerb;
use crate::verify;

pub const SHELL_LABEL: &str = "shell command";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestAction {
    /// Run a command on the request's target.
    Shell(LogicalCommand),
    /// Run a lifecycle verb by name (`create`, `stop`, ...).
    Verb(String),
    /// Make sure the target machine exists and is running.
    Connect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRequest {
    pub target: Target,
    pub action: RequestAction,
    pub arguments: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: Stream,
    pub text: String,
}

/// Result shape the host framework consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub lines: Vec<OutputLine>,
}

impl CommandOutput {
    pub fn from_outcome(outcome: &Outcome) -> Self {
        let result = &outcome.result;
        let lines = result
            .stdout
            .lines()
            .map(|text| OutputLine {
                stream: Stream::Stdout,
                text: text.to_string(),
            })
            .chain(result.stderr.lines().map(|text| OutputLine {
                stream: Stream::Stderr,
                text: text.to_string(),
            }))
            .collect();
        Self {
            success: outcome.is_success(),
            exit_code: result.exit_code,
            lines,
        }
    }

    pub fn stdout(&self) -> Vec<&str> {
        self.stream(Stream::Stdout)
    }

    pub fn stderr(&self) -> Vec<&str> {
        self.stream(Stream::Stderr)
    }

    fn stream(&self, stream: Stream) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| l.stream == stream)
            .map(|l| l.text.as_str())
            .collect()
    }
}

/// Serve one host request.
pub async fn handle<E: ProcessExecutor>(
    engine: &RetryEngine<E>,
    request: HostRequest,
    cancel: &CancellationToken,
) -> Result<CommandOutput, OrbError> {
    let (opts, arguments) = split_control_options(request.arguments)?;

    match request.action {
        RequestAction::Shell(command) => {
            let outcome = engine
                .run(&request.target, &command, &opts, SHELL_LABEL, None, cancel)
                .await?;
            Ok(CommandOutput::from_outcome(&outcome))
        }
        RequestAction::Verb(name) => {
            let verb = VmVerb::from_arguments(&name, &arguments)?;
            let outcome = engine.run_verb(&verb, &opts, cancel).await?;
            Ok(CommandOutput::from_outcome(&outcome))
        }
        RequestAction::Connect => {
            let Target::Machine(name) = &request.target else {
                return Ok(CommandOutput {
                    success: true,
                    exit_code: Some(0),
                    lines: Vec::new(),
                });
            };
            let usable = verify::ensure_usable(
                engine.executor(),
                engine.program(),
                engine.timeouts(),
                name,
                cancel,
            )
            .await?;
            let lines = if usable {
                Vec::new()
            } else {
                vec![OutputLine {
                    stream: Stream::Stderr,
                    text: format!("machine '{name}' is not available"),
                }]
            };
            Ok(CommandOutput {
                success: usable,
                exit_code: None,
                lines,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutionResult;
    use crate::executor::fake::{ScriptedExecutor, fail, ok};
    use crate::options::CONTROL_KEYS;

    fn request(target: Target, action: RequestAction, pairs: &[(&str, &str)]) -> HostRequest {
        HostRequest {
            target,
            action,
            arguments: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn shell_request_splits_output_streams() {
        let engine = RetryEngine::new(ScriptedExecutor::new([
            ExecutionResult::completed(
                Some(0),
                "one\ntwo\n".into(),
                "warn\n".into(),
                std::time::Duration::from_millis(1),
            ),
        ]));
        let output = handle(
            &engine,
            request(
                Target::Machine("demo".into()),
                RequestAction::Shell(LogicalCommand::line("ls")),
                &[],
            ),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(output.success);
        assert_eq!(output.stdout(), ["one", "two"]);
        assert_eq!(output.stderr(), ["warn"]);
    }

    #[tokio::test]
    async fn control_options_never_reach_verb_argv() {
        let engine = RetryEngine::new(ScriptedExecutor::new([ok("")]));
        let output = handle(
            &engine,
            request(
                Target::Local,
                RequestAction::Verb("create".into()),
                &[
                    ("name", "demo"),
                    ("image", "alpine"),
                    ("_sudo", "false"),
                    ("_sudo_user", "postgres"),
                    ("_timeout", "240s"),
                    ("_success_exit_codes", "0"),
                    ("_get_pty", "true"),
                    ("_stdin", "hello"),
                ],
            ),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(output.success);

        let (inv, timeout) = &engine.executor().calls()[0];
        assert_eq!(inv.args, ["-c", "orbctl create alpine demo"]);
        assert_eq!(*timeout, std::time::Duration::from_secs(240));
        for key in CONTROL_KEYS {
            assert!(!inv.display().contains(key));
        }
        assert!(!inv.display().contains("postgres"));
    }

    #[tokio::test]
    async fn login_user_selects_machine_account() {
        let engine = RetryEngine::new(ScriptedExecutor::new([ok("dev\n")]));
        handle(
            &engine,
            request(
                Target::Machine("demo".into()),
                RequestAction::Shell(LogicalCommand::line("whoami")),
                &[("_login_user", "dev"), ("_chdir", "/home/dev")],
            ),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let (inv, _) = &engine.executor().calls()[0];
        assert_eq!(
            inv.args,
            ["run", "-m", "demo", "-u", "dev", "-w", "/home/dev", "sh", "-c", "whoami"]
        );
    }

    #[tokio::test]
    async fn elevated_verb_keeps_identity_out_of_verb_args() {
        let engine = RetryEngine::new(ScriptedExecutor::new([ok("")]));
        handle(
            &engine,
            request(
                Target::Local,
                RequestAction::Verb("stop".into()),
                &[("name", "demo"), ("_sudo", "true"), ("_sudo_user", "ops")],
            ),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let (inv, _) = &engine.executor().calls()[0];
        assert_eq!(inv.args, ["-c", "sudo -H -n -u ops orbctl stop demo"]);
    }

    #[tokio::test]
    async fn bad_control_option_is_validation_error() {
        let engine = RetryEngine::new(ScriptedExecutor::new(Vec::<ExecutionResult>::new()));
        let err = handle(
            &engine,
            request(
                Target::Local,
                RequestAction::Shell(LogicalCommand::line("true")),
                &[("_timeout", "soon")],
            ),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OrbError::Validation { .. }));
        assert!(engine.executor().calls().is_empty());
    }

    #[tokio::test]
    async fn connect_reports_missing_machine() {
        let engine = RetryEngine::new(ScriptedExecutor::new([fail(1, "not found")]));
        let output = handle(
            &engine,
            request(Target::Machine("ghost".into()), RequestAction::Connect, &[]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(!output.success);
        assert_eq!(output.stderr(), ["machine 'ghost' is not available"]);
    }
}
