//! Execution control options and their extraction from host requests.
//!
//! These fields steer how the engine runs a command. They are consumed here
//! and must never reach a verb builder or the wrapped CLI's argument list.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::OrbError;
use crate::util::parse_duration;

pub const KEY_ELEVATE: &str = "_sudo";
pub const KEY_ELEVATE_USER: &str = "_sudo_user";
pub const KEY_SUCCESS_CODES: &str = "_success_exit_codes";
pub const KEY_TIMEOUT: &str = "_timeout";
pub const KEY_PTY: &str = "_get_pty";
pub const KEY_STDIN: &str = "_stdin";
pub const KEY_WORKING_DIR: &str = "_chdir";
pub const KEY_LOGIN_USER: &str = "_login_user";

/// Every key owned by the engine.
pub const CONTROL_KEYS: &[&str] = &[
    KEY_ELEVATE,
    KEY_ELEVATE_USER,
    KEY_SUCCESS_CODES,
    KEY_TIMEOUT,
    KEY_PTY,
    KEY_STDIN,
    KEY_WORKING_DIR,
    KEY_LOGIN_USER,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionControlOptions {
    pub elevate: bool,
    /// Identity to elevate to; `None` means the elevation tool's default.
    pub elevate_user: Option<String>,
    pub success_codes: Vec<i32>,
    /// Overrides the label-derived timeout when set.
    pub timeout: Option<Duration>,
    pub pty: bool,
    pub stdin: Option<Vec<u8>>,
    pub working_dir: Option<String>,
    /// Account the machine logs in as (`run -u`); unrelated to elevation.
    pub login_user: Option<String>,
}

impl Default for ExecutionControlOptions {
    fn default() -> Self {
        Self {
            elevate: false,
            elevate_user: None,
            success_codes: vec![0],
            timeout: None,
            pty: false,
            stdin: None,
            working_dir: None,
            login_user: None,
        }
    }
}

impl ExecutionControlOptions {
    pub fn is_success(&self, exit_code: i32) -> bool {
        self.success_codes.contains(&exit_code)
    }
}

/// Split engine-owned keys off a host argument map.
///
/// Returns the parsed options and the remaining arguments, which are the
/// only ones a verb builder may see.
pub fn split_control_options(
    mut arguments: BTreeMap<String, String>,
) -> Result<(ExecutionControlOptions, BTreeMap<String, String>), OrbError> {
    let mut opts = ExecutionControlOptions::default();

    if let Some(v) = arguments.remove(KEY_ELEVATE) {
        opts.elevate = parse_bool(KEY_ELEVATE, &v)?;
    }
    if let Some(v) = arguments.remove(KEY_ELEVATE_USER) {
        let user = v.trim();
        if !user.is_empty() {
            opts.elevate_user = Some(user.to_string());
        }
    }
    if let Some(v) = arguments.remove(KEY_SUCCESS_CODES) {
        opts.success_codes = parse_codes(&v)?;
    }
    if let Some(v) = arguments.remove(KEY_TIMEOUT) {
        opts.timeout = Some(parse_duration(&v)?);
    }
    if let Some(v) = arguments.remove(KEY_PTY) {
        opts.pty = parse_bool(KEY_PTY, &v)?;
    }
    if let Some(v) = arguments.remove(KEY_STDIN) {
        opts.stdin = Some(v.into_bytes());
    }
    if let Some(v) = arguments.remove(KEY_WORKING_DIR) {
        if !v.trim().is_empty() {
            opts.working_dir = Some(v);
        }
    }
    if let Some(v) = arguments.remove(KEY_LOGIN_USER) {
        let user = v.trim();
        if !user.is_empty() {
            opts.login_user = Some(user.to_string());
        }
    }

    Ok((opts, arguments))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, OrbError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(OrbError::Validation {
            message: format!("{key} expects a boolean (got '{other}')"),
        }),
    }
}

fn parse_codes(value: &str) -> Result<Vec<i32>, OrbError> {
    let codes = value
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| {
            c.parse::<i32>().map_err(|_| OrbError::Validation {
                message: format!("{KEY_SUCCESS_CODES} expects integers (got '{c}')"),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if codes.is_empty() {
        return Err(OrbError::Validation {
            message: format!("{KEY_SUCCESS_CODES} must list at least one exit code"),
        });
    }
    Ok(codes)
}
