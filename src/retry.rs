//! Bounded retry with exponential backoff around a [`ProcessExecutor`].
//!
//! One call to [`RetryEngine::run`] drives one logical command through
//! `Ready → Executing → {Success | Timeout | ClassifiedFailure} →
//! {Retrying | Terminal}`. The decision after each attempt is the pure
//! [`decide`] function; the engine only performs the effects it asks for
//! (sleep, verify, finish).

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::classify::{ErrorClassifier, TransientVocabulary, is_already_exists};
use crate::command::LogicalCommand;
use crate::error::OrbError;
use crate::executor::{ExecutionResult, Invocation, ProcessExecutor, Target};
use crate::logging::Timed;
use crate::normalize::CommandNormalizer;
use crate::options::ExecutionControlOptions;
use crate::timeout::TimeoutPolicy;
use crate::util::preview;
use crate::verbs::VmVerb;
use crate::verify;

/// Stderr preview length for intermediate attempt logs.
const ATTEMPT_PREVIEW: usize = 200;
/// Stderr preview length for the final failure log.
const FINAL_PREVIEW: usize = 500;

pub const DEFAULT_PROGRAM: &str = "orbctl";

// ── Policy & context ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            multiplier: 2,
        }
    }
}

/// Per-command retry state. Created once per logical command and dropped
/// with it; nothing is shared between commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryContext {
    pub label: String,
    /// 1-based index of the attempt that just finished.
    pub attempt: u32,
    pub elapsed: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl RetryContext {
    pub fn new(label: impl Into<String>, policy: &RetryPolicy) -> Self {
        Self {
            label: label.into(),
            attempt: 0,
            elapsed: Duration::ZERO,
            max_attempts: policy.max_attempts.max(1),
            base_delay: policy.base_delay,
            multiplier: policy.multiplier,
        }
    }

    pub fn attempts_remaining(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Delay before the next attempt: `base * multiplier^(attempt-1)`.
    pub fn backoff(&self) -> Duration {
        let factor = self
            .multiplier
            .saturating_pow(self.attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Whether `label` names a resource-creation operation.
pub fn is_creation(label: &str) -> bool {
    label.to_lowercase().contains("creat")
}

// ── Transition ──────────────────────────────────────────────────────

/// What one attempt amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    TimedOut {
        stderr: String,
    },
    Failed {
        exit_code: Option<i32>,
        stderr: String,
        retryable: bool,
        already_exists: bool,
    },
}

impl AttemptOutcome {
    pub fn assess(
        result: &ExecutionResult,
        success_codes: &[i32],
        classifier: &dyn ErrorClassifier,
    ) -> Self {
        if result.timed_out {
            return AttemptOutcome::TimedOut {
                stderr: result.stderr.clone(),
            };
        }
        if result.succeeded(success_codes) {
            return AttemptOutcome::Succeeded;
        }
        AttemptOutcome::Failed {
            exit_code: result.exit_code,
            stderr: result.stderr.clone(),
            retryable: classifier.is_retryable(&result.stderr),
            already_exists: is_already_exists(&result.stderr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Success,
    /// Exit code and stderr of the last attempt, verbatim.
    Failure {
        exit_code: Option<i32>,
        stderr: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Finish(Terminal),
    Retry { delay: Duration },
    /// Creation collided with an existing resource: check it instead of
    /// retrying.
    VerifyExisting,
}

/// Pure transition after an attempt.
pub fn decide(ctx: &RetryContext, outcome: &AttemptOutcome) -> Step {
    match outcome {
        AttemptOutcome::Succeeded => Step::Finish(Terminal::Success),
        AttemptOutcome::TimedOut { stderr } => {
            if ctx.attempts_remaining() {
                Step::Retry {
                    delay: ctx.backoff(),
                }
            } else {
                Step::Finish(Terminal::Failure {
                    exit_code: None,
                    stderr: stderr.clone(),
                })
            }
        }
        // Checked before classification: "machine" is transient vocabulary.
        AttemptOutcome::Failed {
            already_exists: true,
            ..
        } if is_creation(&ctx.label) => Step::VerifyExisting,
        AttemptOutcome::Failed {
            exit_code,
            stderr,
            retryable,
            ..
        } => {
            if *retryable && ctx.attempts_remaining() {
                Step::Retry {
                    delay: ctx.backoff(),
                }
            } else {
                Step::Finish(Terminal::Failure {
                    exit_code: *exit_code,
                    stderr: stderr.clone(),
                })
            }
        }
    }
}

// ── Outcome ─────────────────────────────────────────────────────────

/// Final result of one logical command.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub terminal: Terminal,
    /// The last attempt's raw result.
    pub result: ExecutionResult,
    pub attempts: u32,
    pub elapsed: Duration,
    /// Success came from already-exists verification, not a clean exit.
    pub recovered: bool,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.terminal == Terminal::Success
    }

    /// Convert a terminal failure into an error for callers that only care
    /// about success.
    pub fn into_result(self, label: &str) -> Result<ExecutionResult, OrbError> {
        match self.terminal {
            Terminal::Success => Ok(self.result),
            Terminal::Failure { exit_code, stderr } => Err(OrbError::CommandFailed {
                label: label.to_string(),
                exit_code,
                stderr: stderr.trim().to_string(),
            }),
        }
    }
}

// ── Engine ──────────────────────────────────────────────────────────

pub struct RetryEngine<E> {
    executor: E,
    program: String,
    normalizer: CommandNormalizer,
    timeouts: TimeoutPolicy,
    classifier: Box<dyn ErrorClassifier>,
    policy: RetryPolicy,
}

impl<E: ProcessExecutor> RetryEngine<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            program: DEFAULT_PROGRAM.into(),
            normalizer: CommandNormalizer::default(),
            timeouts: TimeoutPolicy::default(),
            classifier: Box::new(TransientVocabulary::default()),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_normalizer(mut self, normalizer: CommandNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_classifier(mut self, classifier: impl ErrorClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeouts(&self) -> &TimeoutPolicy {
        &self.timeouts
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run a lifecycle verb on the controlling host.
    pub async fn run_verb(
        &self,
        verb: &VmVerb,
        opts: &ExecutionControlOptions,
        cancel: &CancellationToken,
    ) -> Result<Outcome, OrbError> {
        let built = verb.build(&self.program);
        self.run(
            &Target::Local,
            &built.command,
            opts,
            &built.label,
            built.resource.as_deref(),
            cancel,
        )
        .await
    }

    /// Run `command` on `target` until it succeeds, fails fatally, or the
    /// attempt budget runs out.
    ///
    /// `resource` names the machine an already-exists collision refers to;
    /// without it a collision cannot be verified and is a failure.
    pub async fn run(
        &self,
        target: &Target,
        command: &LogicalCommand,
        opts: &ExecutionControlOptions,
        label: &str,
        resource: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Outcome, OrbError> {
        let line = self.normalizer.normalize(command, opts);
        let invocation = Invocation::for_target(&self.program, target, &line, opts)?;
        let timeout = self.timeouts.resolve(label, opts.timeout);
        let mut ctx = RetryContext::new(label, &self.policy);

        let timed = Timed::start(label);
        let started = Instant::now();

        loop {
            ctx.attempt += 1;
            tracing::debug!(
                label,
                attempt = ctx.attempt,
                max_attempts = ctx.max_attempts,
                timeout_s = timeout.as_secs(),
                line = %line,
                "attempt starting"
            );

            let result = self
                .executor
                .execute(&invocation, timeout, cancel)
                .await
                .map_err(|e| relabel(e, label))?;
            ctx.elapsed = started.elapsed();

            let outcome =
                AttemptOutcome::assess(&result, &opts.success_codes, self.classifier.as_ref());

            match decide(&ctx, &outcome) {
                Step::Finish(terminal) => {
                    let success = terminal == Terminal::Success;
                    if success {
                        if ctx.attempt > 1 {
                            tracing::info!(label, attempt = ctx.attempt, "succeeded after retry");
                        }
                        timed.succeed();
                    } else {
                        tracing::error!(
                            label,
                            attempt = ctx.attempt,
                            max_attempts = ctx.max_attempts,
                            elapsed_ms = ctx.elapsed.as_millis() as u64,
                            exit_code = ?result.exit_code,
                            timed_out = result.timed_out,
                            stderr = %preview(&result.stderr, FINAL_PREVIEW),
                            "giving up"
                        );
                        timed.fail();
                    }
                    return Ok(Outcome {
                        terminal,
                        result,
                        attempts: ctx.attempt,
                        elapsed: ctx.elapsed,
                        recovered: false,
                    });
                }
                Step::Retry { delay } => {
                    tracing::warn!(
                        label,
                        attempt = ctx.attempt,
                        max_attempts = ctx.max_attempts,
                        elapsed_ms = ctx.elapsed.as_millis() as u64,
                        timed_out = result.timed_out,
                        stderr = %preview(&result.stderr, ATTEMPT_PREVIEW),
                        delay_s = delay.as_secs_f64(),
                        "attempt failed, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            timed.fail();
                            return Err(OrbError::Cancelled { label: label.to_string() });
                        }
                    }
                }
                Step::VerifyExisting => {
                    tracing::info!(
                        label,
                        attempt = ctx.attempt,
                        resource = ?resource,
                        "resource already exists, verifying"
                    );
                    let usable = match resource {
                        Some(name) => verify::ensure_usable(
                            &self.executor,
                            &self.program,
                            &self.timeouts,
                            name,
                            cancel,
                        )
                        .await
                        .map_err(|e| relabel(e, label))?,
                        None => {
                            tracing::warn!(label, "no resource name to verify");
                            false
                        }
                    };
                    ctx.elapsed = started.elapsed();

                    let terminal = if usable {
                        tracing::info!(label, resource = ?resource, "existing resource verified");
                        timed.succeed();
                        Terminal::Success
                    } else {
                        tracing::error!(
                            label,
                            resource = ?resource,
                            stderr = %preview(&result.stderr, FINAL_PREVIEW),
                            "existing resource could not be verified"
                        );
                        timed.fail();
                        Terminal::Failure {
                            exit_code: result.exit_code,
                            stderr: result.stderr.clone(),
                        }
                    };
                    return Ok(Outcome {
                        recovered: usable,
                        terminal,
                        result,
                        attempts: ctx.attempt,
                        elapsed: ctx.elapsed,
                    });
                }
            }
        }
    }
}

fn relabel(err: OrbError, label: &str) -> OrbError {
    match err {
        OrbError::Cancelled { .. } => OrbError::Cancelled {
            label: label.to_string(),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::fake::{ScriptedExecutor, fail, ok, timeout};
    use crate::timeout::LONG_TIMEOUT;

    const CREATE: &str = "VM creation (demo)";

    fn ctx(label: &str, attempt: u32) -> RetryContext {
        let mut ctx = RetryContext::new(label, &RetryPolicy::default());
        ctx.attempt = attempt;
        ctx
    }

    fn failed(stderr: &str, retryable: bool) -> AttemptOutcome {
        AttemptOutcome::Failed {
            exit_code: Some(1),
            stderr: stderr.into(),
            retryable,
            already_exists: is_already_exists(stderr),
        }
    }

    fn instant_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn engine(responses: Vec<ExecutionResult>) -> RetryEngine<ScriptedExecutor> {
        RetryEngine::new(ScriptedExecutor::new(responses)).with_policy(instant_policy())
    }

    fn create_demo() -> LogicalCommand {
        LogicalCommand::parts(["orbctl", "create", "ubuntu", "demo"]).unwrap()
    }

    async fn run_create(
        engine: &RetryEngine<ScriptedExecutor>,
    ) -> Result<Outcome, OrbError> {
        engine
            .run(
                &Target::Local,
                &create_demo(),
                &ExecutionControlOptions::default(),
                CREATE,
                Some("demo"),
                &CancellationToken::new(),
            )
            .await
    }

    // ── decide ──

    #[test]
    fn success_finishes() {
        assert_eq!(
            decide(&ctx("shell", 1), &AttemptOutcome::Succeeded),
            Step::Finish(Terminal::Success)
        );
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let outcome = AttemptOutcome::TimedOut {
            stderr: String::new(),
        };
        let delays: Vec<_> = (1..=3)
            .map(|a| decide(&ctx("shell", a), &outcome))
            .collect();
        assert_eq!(
            delays,
            vec![
                Step::Retry { delay: Duration::from_secs(2) },
                Step::Retry { delay: Duration::from_secs(4) },
                Step::Retry { delay: Duration::from_secs(8) },
            ]
        );
    }

    #[test]
    fn timeout_on_last_attempt_fails() {
        let outcome = AttemptOutcome::TimedOut {
            stderr: "partial".into(),
        };
        assert_eq!(
            decide(&ctx("shell", 4), &outcome),
            Step::Finish(Terminal::Failure {
                exit_code: None,
                stderr: "partial".into()
            })
        );
    }

    #[test]
    fn transient_failure_retries_while_attempts_remain() {
        let outcome = failed("connection refused", true);
        assert!(matches!(decide(&ctx("shell", 3), &outcome), Step::Retry { .. }));
        assert!(matches!(decide(&ctx("shell", 4), &outcome), Step::Finish(_)));
    }

    #[test]
    fn fatal_failure_finishes_on_first_attempt() {
        let outcome = failed("invalid argument: --bogus-flag", false);
        assert_eq!(
            decide(&ctx("shell", 1), &outcome),
            Step::Finish(Terminal::Failure {
                exit_code: Some(1),
                stderr: "invalid argument: --bogus-flag".into()
            })
        );
    }

    #[test]
    fn already_exists_on_creation_verifies_even_on_last_attempt() {
        let outcome = failed("machine already exists: demo", true);
        assert_eq!(decide(&ctx(CREATE, 2), &outcome), Step::VerifyExisting);
        assert_eq!(decide(&ctx(CREATE, 4), &outcome), Step::VerifyExisting);
    }

    #[test]
    fn already_exists_never_verifies_for_other_operations() {
        let outcome = failed("machine already exists: demo", true);
        assert!(matches!(
            decide(&ctx("VM clone (demo -> copy)", 1), &outcome),
            Step::Retry { .. }
        ));
        let fatal = failed("file already exists", false);
        assert!(matches!(
            decide(&ctx("file push", 1), &fatal),
            Step::Finish(Terminal::Failure { .. })
        ));
    }

    #[test]
    fn assess_orders_timeout_before_exit_code() {
        let classifier = TransientVocabulary::default();
        assert_eq!(
            AttemptOutcome::assess(&timeout(), &[0], &classifier),
            AttemptOutcome::TimedOut {
                stderr: String::new()
            }
        );
        assert_eq!(
            AttemptOutcome::assess(&fail(2, "warn"), &[0, 2], &classifier),
            AttemptOutcome::Succeeded
        );
    }

    // ── engine ──

    #[tokio::test]
    async fn creation_timeout_then_already_exists_recovers() {
        let engine = engine(vec![
            timeout(),
            fail(1, "machine already exists: demo"),
            ok(r#"{"record":{"name":"demo","state":"running"}}"#),
        ]);
        let outcome = run_create(&engine).await.unwrap();

        assert_eq!(outcome.terminal, Terminal::Success);
        assert!(outcome.recovered);
        assert_eq!(outcome.attempts, 2);

        let calls = engine.executor().calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].1, LONG_TIMEOUT);
        assert_eq!(calls[2].0.program, "orbctl");
        assert_eq!(calls[2].0.args, ["info", "demo", "-f", "json"]);
    }

    #[tokio::test]
    async fn already_exists_starts_stopped_machine() {
        let engine = engine(vec![
            fail(1, "machine already exists: demo"),
            ok(r#"{"record":{"name":"demo","state":"stopped"}}"#),
            ok(""),
        ]);
        let outcome = run_create(&engine).await.unwrap();

        assert!(outcome.is_success());
        assert!(outcome.recovered);
        assert_eq!(engine.executor().calls()[2].0.args, ["start", "demo"]);
    }

    #[tokio::test]
    async fn unverifiable_collision_reports_original_failure() {
        let engine = engine(vec![
            fail(1, "machine already exists: demo"),
            fail(1, "machine not found: demo"),
        ]);
        let outcome = run_create(&engine).await.unwrap();

        assert_eq!(
            outcome.terminal,
            Terminal::Failure {
                exit_code: Some(1),
                stderr: "machine already exists: demo".into()
            }
        );
        assert!(!outcome.recovered);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn collision_without_resource_is_failure() {
        let engine = engine(vec![fail(1, "machine already exists: demo")]);
        let outcome = engine
            .run(
                &Target::Local,
                &create_demo(),
                &ExecutionControlOptions::default(),
                CREATE,
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(!outcome.is_success());
        assert_eq!(engine.executor().calls().len(), 1);
    }

    #[tokio::test]
    async fn recovered_creation_matches_clean_creation() {
        let clean = engine(vec![ok("")]);
        let recovered = engine(vec![
            fail(1, "machine already exists: demo"),
            ok(r#"{"record":{"state":"running"}}"#),
        ]);
        let a = run_create(&clean).await.unwrap();
        let b = run_create(&recovered).await.unwrap();
        assert_eq!(a.terminal, b.terminal);
        assert_eq!(a.terminal, Terminal::Success);
    }

    #[tokio::test]
    async fn fatal_failure_stops_after_one_attempt() {
        let engine = engine(vec![
            fail(1, "invalid argument: --bogus-flag"),
            ok(""),
            ok(""),
            ok(""),
        ]);
        let outcome = engine
            .run(
                &Target::Machine("demo".into()),
                &LogicalCommand::line("orbctl --bogus-flag"),
                &ExecutionControlOptions::default(),
                "shell command",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 1);
        assert_eq!(engine.executor().calls().len(), 1);
        assert_eq!(engine.executor().remaining(), 3);
        assert!(matches!(outcome.terminal, Terminal::Failure { .. }));
    }

    #[tokio::test]
    async fn transient_failures_exhaust_budget_and_keep_last_stderr() {
        let engine = engine(vec![
            fail(1, "connection refused"),
            fail(1, "connection refused"),
            fail(1, "connection refused"),
            fail(7, "connection reset by peer"),
        ]);
        let outcome = engine
            .run(
                &Target::Machine("demo".into()),
                &LogicalCommand::line("apt-get update"),
                &ExecutionControlOptions::default(),
                "shell command",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 4);
        assert_eq!(
            outcome.terminal,
            Terminal::Failure {
                exit_code: Some(7),
                stderr: "connection reset by peer".into()
            }
        );
        let err = outcome.into_result("shell command").unwrap_err();
        assert!(err.to_string().contains("connection reset by peer"));
    }

    #[tokio::test]
    async fn custom_success_codes_are_honored() {
        let engine = engine(vec![fail(2, "")]);
        let opts = ExecutionControlOptions {
            success_codes: vec![0, 2],
            ..Default::default()
        };
        let outcome = engine
            .run(
                &Target::Local,
                &LogicalCommand::line("grep -q x /etc/hosts"),
                &opts,
                "shell command",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn elevated_line_reaches_executor_once_wrapped() {
        let engine = engine(vec![ok("root\n")]);
        let opts = ExecutionControlOptions {
            elevate: true,
            timeout: Some(Duration::from_secs(9)),
            ..Default::default()
        };
        engine
            .run(
                &Target::Machine("demo".into()),
                &LogicalCommand::line("echo hi!"),
                &opts,
                "shell command",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let (inv, timeout) = &engine.executor().calls()[0];
        assert_eq!(*timeout, Duration::from_secs(9));
        assert_eq!(
            inv.args,
            ["run", "-m", "demo", "sh", "-c", "sudo -H -n bash +H -c 'echo hi!'"]
        );
    }

    #[tokio::test]
    async fn cancelled_before_start_is_labelled() {
        let engine = engine(vec![ok("")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = engine
            .run(
                &Target::Local,
                &LogicalCommand::line("true"),
                &ExecutionControlOptions::default(),
                "shell command",
                None,
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrbError::Cancelled { label } if label == "shell command"));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_schedule_is_exponential() {
        let engine = RetryEngine::new(ScriptedExecutor::new(vec![
            fail(1, "dns lookup failed"),
            fail(1, "dns lookup failed"),
            fail(1, "dns lookup failed"),
            fail(1, "dns lookup failed"),
        ]));
        let start = Instant::now();
        let outcome = engine
            .run(
                &Target::Local,
                &LogicalCommand::line("true"),
                &ExecutionControlOptions::default(),
                "shell command",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 4);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(2 + 4 + 8), "{waited:?}");
        assert!(waited < Duration::from_secs(15), "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_backoff_sleep() {
        let engine = RetryEngine::new(ScriptedExecutor::new(vec![
            fail(1, "network unreachable"),
            ok(""),
        ]));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let err = engine
            .run(
                &Target::Local,
                &LogicalCommand::line("true"),
                &ExecutionControlOptions::default(),
                "shell command",
                None,
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrbError::Cancelled { .. }));
        assert_eq!(engine.executor().calls().len(), 1);
    }
}
