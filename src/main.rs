use std::io::IsTerminal;
use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use orbrun::cli::{Cli, Command, ExecArgs, OutputFormat};
use orbrun::command::LogicalCommand;
use orbrun::config;
use orbrun::error::OrbError;
use orbrun::executor::{CliExecutor, Target};
use orbrun::host::SHELL_LABEL;
use orbrun::inventory::{self, Machine};
use orbrun::logging;
use orbrun::options::ExecutionControlOptions;
use orbrun::progress::{OutputMode, Progress};
use orbrun::retry::{Outcome, RetryEngine};
use orbrun::util::parse_duration;
use orbrun::verbs::VmVerb;
use orbrun::verify;

type Engine = RetryEngine<CliExecutor>;

#[derive(facet::Facet)]
struct ExecJson {
    target: String,
    success: bool,
    exit_code: Option<i32>,
    attempts: u32,
    recovered: bool,
    stdout: String,
    stderr: String,
}

#[derive(facet::Facet)]
struct InventoryJson {
    name: String,
    id: String,
    state: String,
    distro: String,
    version: String,
    arch: String,
    username: String,
    groups: Vec<String>,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let output_format = resolve_output_format(&cli.output);
    let mode = resolve_output_mode(&output_format, cli.verbose, cli.quiet);

    // Spinners own the terminal in Normal mode; tracing lines would corrupt
    // indicatif's redraws.
    let terminal_filter = match mode {
        OutputMode::Verbose => EnvFilter::new("debug"),
        OutputMode::Normal | OutputMode::Quiet => EnvFilter::new("off"),
        OutputMode::Plain => EnvFilter::from_default_env()
            .add_directive("orbrun=info".parse().expect("valid log directive")),
    };

    let terminal_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(terminal_filter);

    let (log_file, log_file_handle) = logging::LogFile::new();
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("orbrun=debug"));

    tracing_subscriber::registry()
        .with(terminal_layer)
        .with(file_layer)
        .init();

    let (config, config_path) = config::resolve_config(cli.config.as_deref())?;

    let log_path = cli
        .log_file
        .clone()
        .or_else(|| config.logging.file.as_ref().map(PathBuf::from));
    if let Some(path) = log_path {
        log_file_handle
            .attach(&path)
            .map_err(|source| OrbError::Io {
                context: format!("opening log file {}", path.display()),
                source,
            })?;
    }
    if let Some(path) = &config_path {
        tracing::debug!(path = %path.display(), "using config");
    }

    let engine = config.engine(CliExecutor)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, stopping running commands");
                cancel.cancel();
            }
        });
    }

    let progress = Progress::new(mode);
    let json = matches!(output_format, OutputFormat::Json);

    match cli.command {
        Command::Exec(args) => {
            let code = run_exec(&engine, &progress, args, json, &cancel).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Command::Vm { action } => {
            let verb = VmVerb::from(action);
            run_verb(&engine, &progress, &verb, &cancel).await?;
        }
        Command::Push {
            machine,
            local,
            remote,
        } => {
            let verb = VmVerb::Push {
                machine,
                local,
                remote,
            };
            run_verb(&engine, &progress, &verb, &cancel).await?;
        }
        Command::Pull {
            machine,
            remote,
            local,
        } => {
            let verb = VmVerb::Pull {
                machine,
                remote,
                local,
            };
            run_verb(&engine, &progress, &verb, &cancel).await?;
        }
        Command::Inventory { name } => {
            let machines = inventory::fetch(&engine, name.as_deref(), &cancel).await?;
            print_inventory(&machines, json);
        }
    }

    Ok(())
}

// ── Verbs ────────────────────────────────────────────────

async fn run_verb(
    engine: &Engine,
    progress: &Progress,
    verb: &VmVerb,
    cancel: &CancellationToken,
) -> Result<(), OrbError> {
    let label = verb.label();
    let task = progress.start(&label);
    let outcome = engine
        .run_verb(verb, &ExecutionControlOptions::default(), cancel)
        .await;

    match outcome {
        Ok(outcome) => {
            task.finish(outcome.is_success(), &outcome_detail(&outcome));
            let result = outcome.into_result(&label)?;
            print!("{}", result.stdout);
            Ok(())
        }
        Err(e) => {
            task.finish(false, "error");
            Err(e)
        }
    }
}

// ── Exec ─────────────────────────────────────────────────

async fn run_exec(
    engine: &Engine,
    progress: &Progress,
    args: ExecArgs,
    json: bool,
    cancel: &CancellationToken,
) -> Result<i32, OrbError> {
    let opts = exec_options(&args)?;
    let command = if args.command.len() == 1 {
        LogicalCommand::line(args.command[0].clone())
    } else {
        LogicalCommand::from_argv(&args.command)?
    };

    let targets: Vec<Target> = if args.local {
        vec![Target::Local]
    } else if let Some(group) = &args.group {
        let machines = inventory::fetch(engine, None, cancel).await?;
        machines
            .into_iter()
            .filter(|m| m.in_group(group))
            .map(|m| Target::Machine(m.name))
            .collect()
    } else {
        args.machines.iter().cloned().map(Target::Machine).collect()
    };
    if targets.is_empty() {
        return Err(OrbError::Validation {
            message: match &args.group {
                Some(group) => format!("no machines in group '{group}'"),
                None => "exec needs --machine, --group or --local".into(),
            },
        });
    }

    let runs = targets.iter().map(|target| {
        exec_on(engine, progress, target, &command, &opts, !args.no_start, cancel)
    });
    let results = futures_util::future::join_all(runs).await;

    let prefix = targets.len() > 1;
    let mut exit_code = 0;
    let mut reports = Vec::new();
    for (target, result) in targets.iter().zip(results) {
        // One failing machine must not hide the others' output.
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if prefix || json => {
                tracing::error!(machine = target.name(), "{e}");
                if exit_code == 0 {
                    exit_code = 1;
                }
                if json {
                    reports.push(ExecJson {
                        target: target.name().to_string(),
                        success: false,
                        exit_code: None,
                        attempts: 0,
                        recovered: false,
                        stdout: String::new(),
                        stderr: e.to_string(),
                    });
                } else {
                    eprintln!("[{}] error: {e}", target.name());
                }
                continue;
            }
            Err(e) => return Err(e),
        };
        let result = &outcome.result;
        if !outcome.is_success() && exit_code == 0 {
            exit_code = result.exit_code.filter(|c| *c != 0).unwrap_or(1);
        }
        if json {
            reports.push(ExecJson {
                target: target.name().to_string(),
                success: outcome.is_success(),
                exit_code: result.exit_code,
                attempts: outcome.attempts,
                recovered: outcome.recovered,
                stdout: result.stdout.clone(),
                stderr: result.stderr.clone(),
            });
        } else if prefix {
            for line in result.stdout.lines() {
                println!("[{}] {line}", target.name());
            }
            for line in result.stderr.lines() {
                eprintln!("[{}] {line}", target.name());
            }
        } else {
            print!("{}", result.stdout);
            eprint!("{}", result.stderr);
        }
    }

    if json {
        println!(
            "{}",
            facet_json::to_string(&reports).expect("JSON serialization")
        );
    }
    Ok(exit_code)
}

async fn exec_on(
    engine: &Engine,
    progress: &Progress,
    target: &Target,
    command: &LogicalCommand,
    opts: &ExecutionControlOptions,
    start_stopped: bool,
    cancel: &CancellationToken,
) -> Result<Outcome, OrbError> {
    let task = progress.start(&format!("{command} on {}", target.name()));

    if let (Target::Machine(name), true) = (target, start_stopped) {
        let usable = verify::ensure_usable(
            engine.executor(),
            engine.program(),
            engine.timeouts(),
            name,
            cancel,
        )
        .await;
        match usable {
            Ok(true) => {}
            Ok(false) => {
                task.finish(false, "unavailable");
                return Err(OrbError::Validation {
                    message: format!("machine '{name}' does not exist or failed to start"),
                });
            }
            Err(e) => {
                task.finish(false, "error");
                return Err(e);
            }
        }
    }

    match engine
        .run(target, command, opts, SHELL_LABEL, None, cancel)
        .await
    {
        Ok(outcome) => {
            task.finish(outcome.is_success(), &outcome_detail(&outcome));
            Ok(outcome)
        }
        Err(e) => {
            task.finish(false, "error");
            Err(e)
        }
    }
}

fn exec_options(args: &ExecArgs) -> Result<ExecutionControlOptions, OrbError> {
    let stdin = match &args.stdin_file {
        Some(path) => Some(std::fs::read(path).map_err(|source| OrbError::Io {
            context: format!("reading {}", path.display()),
            source,
        })?),
        None => None,
    };
    Ok(ExecutionControlOptions {
        elevate: args.sudo || args.sudo_user.is_some(),
        elevate_user: args.sudo_user.clone(),
        success_codes: if args.success_codes.is_empty() {
            vec![0]
        } else {
            args.success_codes.clone()
        },
        timeout: args.timeout.as_deref().map(parse_duration).transpose()?,
        pty: false,
        stdin,
        working_dir: args.workdir.clone(),
        login_user: args.user.clone(),
    })
}

fn outcome_detail(outcome: &Outcome) -> String {
    let mut parts = Vec::new();
    if outcome.attempts > 1 {
        parts.push(format!("{} attempts", outcome.attempts));
    }
    if outcome.recovered {
        parts.push("already existed".to_string());
    }
    if !outcome.is_success() {
        match outcome.result.exit_code {
            Some(code) if !outcome.result.timed_out => parts.push(format!("exit {code}")),
            _ => parts.push("timed out".to_string()),
        }
    }
    parts.push(format!("{:.1}s", outcome.elapsed.as_secs_f64()));
    parts.join(", ")
}

// ── Inventory ────────────────────────────────────────────

fn print_inventory(machines: &[Machine], json: bool) {
    if json {
        let entries: Vec<InventoryJson> = machines
            .iter()
            .map(|m| InventoryJson {
                name: m.name.clone(),
                id: m.id.clone(),
                state: m.state.clone(),
                distro: m.distro.clone(),
                version: m.version.clone(),
                arch: m.arch.clone(),
                username: m.username.clone(),
                groups: m.groups(),
            })
            .collect();
        println!(
            "{}",
            facet_json::to_string(&entries).expect("JSON serialization")
        );
        return;
    }

    if machines.is_empty() {
        println!("No machines.");
        return;
    }
    for m in machines {
        let state = format!("{:<10}", m.state);
        let state = if m.is_running() {
            console::style(state).green()
        } else {
            console::style(state).dim()
        };
        println!(
            "{:<20} {} {:<10} {:<10} {:<8} {}",
            m.name,
            state,
            m.distro,
            m.version,
            m.arch,
            m.groups().join(",")
        );
    }
}

// ── Output mode ──────────────────────────────────────────

fn resolve_output_format(format: &OutputFormat) -> OutputFormat {
    match format {
        OutputFormat::Auto => {
            if std::io::stderr().is_terminal() {
                OutputFormat::Interactive
            } else {
                OutputFormat::Plain
            }
        }
        other => other.clone(),
    }
}

/// Map the resolved output format (plus `--verbose`/`--quiet` modifiers)
/// into the `OutputMode` used by `Progress`.
fn resolve_output_mode(format: &OutputFormat, verbose: bool, quiet: bool) -> OutputMode {
    match format {
        OutputFormat::Json => OutputMode::Quiet,
        _ if quiet => OutputMode::Quiet,
        _ if verbose => OutputMode::Verbose,
        OutputFormat::Plain => OutputMode::Plain,
        OutputFormat::Auto | OutputFormat::Interactive => OutputMode::Normal,
    }
}
