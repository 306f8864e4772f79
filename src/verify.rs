//! Checks that a machine exists and brings it to a running state.
//!
//! Backs both the already-exists recovery side-step and the connect step
//! before `exec`. Each query is a single attempt; the caller owns retries.

use tokio_util::sync::CancellationToken;

use crate::error::OrbError;
use crate::executor::{Invocation, ProcessExecutor};
use crate::timeout::TimeoutPolicy;

#[derive(Debug, Default, facet::Facet)]
#[facet(default)]
struct InfoJson {
    #[facet(default)]
    record: InfoRecord,
}

#[derive(Debug, Default, facet::Facet)]
#[facet(default)]
struct InfoRecord {
    #[facet(default)]
    name: String,
    #[facet(default)]
    state: String,
}

/// Parse the `state` of an `info -f json` document.
pub fn parse_state(json: &str) -> Result<String, OrbError> {
    let info: InfoJson = facet_json::from_str(json).map_err(|e| OrbError::Inventory {
        message: format!("invalid info output: {e}"),
    })?;
    Ok(info.record.state)
}

/// `true` if `name` exists and is running afterwards.
///
/// A failed info query means the machine is absent. A machine in any
/// other state is started once.
pub async fn ensure_usable<E: ProcessExecutor>(
    executor: &E,
    program: &str,
    timeouts: &TimeoutPolicy,
    name: &str,
    cancel: &CancellationToken,
) -> Result<bool, OrbError> {
    let label = format!("VM info ({name})");
    let info = executor
        .execute(
            &Invocation::direct(program, ["info", name, "-f", "json"]),
            timeouts.resolve(&label, None),
            cancel,
        )
        .await?;
    if !info.succeeded(&[0]) {
        tracing::debug!(name, exit_code = ?info.exit_code, "machine not found");
        return Ok(false);
    }

    let state = match parse_state(&info.stdout) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!(name, "{e}");
            return Ok(false);
        }
    };
    if state == "running" {
        return Ok(true);
    }

    tracing::info!(name, state = %state, "starting machine");
    let label = format!("VM start ({name})");
    let start = executor
        .execute(
            &Invocation::direct(program, ["start", name]),
            timeouts.resolve(&label, None),
            cancel,
        )
        .await?;
    if !start.succeeded(&[0]) {
        tracing::warn!(name, stderr = %start.stderr.trim(), "machine failed to start");
    }
    Ok(start.succeeded(&[0]))
}
