//! Machine inventory from `list -f json`, grouped for host targeting.

use tokio_util::sync::CancellationToken;

use crate::error::OrbError;
use crate::executor::ProcessExecutor;
use crate::options::ExecutionControlOptions;
use crate::retry::RetryEngine;
use crate::verbs::VmVerb;

/// Group every machine belongs to.
pub const ALL_GROUP: &str = "orbstack";

#[derive(Debug, Default, facet::Facet)]
#[facet(default)]
struct ListEntry {
    #[facet(default)]
    name: String,
    #[facet(default)]
    id: String,
    #[facet(default)]
    state: String,
    #[facet(default)]
    image: ListImage,
    #[facet(default)]
    config: ListConfig,
}

#[derive(Debug, Default, facet::Facet)]
#[facet(default)]
struct ListImage {
    #[facet(default)]
    distro: String,
    #[facet(default)]
    version: String,
    #[facet(default)]
    arch: String,
}

#[derive(Debug, Default, facet::Facet)]
#[facet(default)]
struct ListConfig {
    #[facet(default)]
    default_username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, facet::Facet)]
pub struct Machine {
    pub name: String,
    pub id: String,
    pub state: String,
    pub distro: String,
    pub version: String,
    pub arch: String,
    pub username: String,
}

impl Machine {
    /// Host groups derived from state, architecture and distro.
    pub fn groups(&self) -> Vec<String> {
        let mut groups = vec![ALL_GROUP.to_string()];
        match self.state.as_str() {
            "running" | "stopped" => groups.push(format!("{ALL_GROUP}_{}", self.state)),
            _ => {}
        }
        match self.arch.as_str() {
            "arm64" | "amd64" => groups.push(format!("{ALL_GROUP}_{}", self.arch)),
            _ => {}
        }
        if !self.distro.is_empty() {
            groups.push(format!("{ALL_GROUP}_{}", self.distro));
        }
        groups
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups().iter().any(|g| g == group)
    }

    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

impl From<ListEntry> for Machine {
    fn from(entry: ListEntry) -> Self {
        Self {
            name: entry.name,
            id: entry.id,
            state: if entry.state.is_empty() {
                "unknown".into()
            } else {
                entry.state
            },
            distro: entry.image.distro,
            version: entry.image.version,
            arch: entry.image.arch,
            username: entry.config.default_username,
        }
    }
}

/// Parse `list -f json` output, keeping only `name` when given.
pub fn parse_list(json: &str, name: Option<&str>) -> Result<Vec<Machine>, OrbError> {
    let trimmed = json.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<ListEntry> =
        facet_json::from_str(trimmed).map_err(|e| OrbError::Inventory {
            message: e.to_string(),
        })?;
    Ok(entries
        .into_iter()
        .map(Machine::from)
        .filter(|m| name.is_none_or(|n| m.name == n))
        .collect())
}

/// Query the wrapped CLI for its machines.
pub async fn fetch<E: ProcessExecutor>(
    engine: &RetryEngine<E>,
    name: Option<&str>,
    cancel: &CancellationToken,
) -> Result<Vec<Machine>, OrbError> {
    let verb = VmVerb::List;
    let result = engine
        .run_verb(&verb, &ExecutionControlOptions::default(), cancel)
        .await?
        .into_result(&verb.label())?;
    let machines = parse_list(&result.stdout, name)?;
    tracing::debug!(count = machines.len(), "inventory loaded");
    Ok(machines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::fake::{ScriptedExecutor, fail, ok};
    use crate::retry::RetryPolicy;
    use std::time::Duration;

    const LIST: &str = r#"[
        {"name":"web","id":"01A","state":"running",
         "image":{"distro":"ubuntu","version":"noble","arch":"arm64","variant":"default"},
         "config":{"isolated":false,"default_username":"dev"}},
        {"name":"db","id":"01B","state":"stopped",
         "image":{"distro":"alpine","version":"3.20","arch":"amd64"},
         "config":{}},
        {"name":"odd","id":"01C","state":"starting","image":{"arch":"riscv64"}}
    ]"#;

    #[test]
    fn parses_machine_fields() {
        let machines = parse_list(LIST, None).unwrap();
        assert_eq!(machines.len(), 3);
        assert_eq!(
            machines[0],
            Machine {
                name: "web".into(),
                id: "01A".into(),
                state: "running".into(),
                distro: "ubuntu".into(),
                version: "noble".into(),
                arch: "arm64".into(),
                username: "dev".into(),
            }
        );
        assert_eq!(machines[1].username, "");
    }

    #[test]
    fn groups_follow_state_arch_and_distro() {
        let machines = parse_list(LIST, None).unwrap();
        assert_eq!(
            machines[0].groups(),
            ["orbstack", "orbstack_running", "orbstack_arm64", "orbstack_ubuntu"]
        );
        assert_eq!(
            machines[1].groups(),
            ["orbstack", "orbstack_stopped", "orbstack_amd64", "orbstack_alpine"]
        );
        assert_eq!(machines[2].groups(), ["orbstack"]);
    }

    #[test]
    fn name_filter_keeps_one() {
        let machines = parse_list(LIST, Some("db")).unwrap();
        assert_eq!(machines.len(), 1);
        assert!(machines[0].in_group("orbstack_alpine"));
        assert!(!machines[0].is_running());
    }

    #[test]
    fn empty_output_is_empty_inventory() {
        assert!(parse_list("  \n", None).unwrap().is_empty());
        assert!(parse_list("[]", None).unwrap().is_empty());
    }

    #[test]
    fn malformed_output_is_inventory_error() {
        assert!(matches!(
            parse_list("{not json", None),
            Err(OrbError::Inventory { .. })
        ));
    }

    #[tokio::test]
    async fn fetch_runs_list_verb() {
        let engine = RetryEngine::new(ScriptedExecutor::new([ok(LIST)]));
        let machines = fetch(&engine, Some("web"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(machines.len(), 1);
        let calls = engine.executor().calls();
        assert_eq!(calls[0].0.args, ["-c", "orbctl list -f json"]);
    }

    #[tokio::test]
    async fn fetch_surfaces_cli_failure() {
        let engine = RetryEngine::new(ScriptedExecutor::new([fail(1, "orbstack is not running")]))
            .with_policy(RetryPolicy {
                base_delay: Duration::ZERO,
                ..Default::default()
            });
        let err = fetch(&engine, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrbError::CommandFailed { .. }));
    }
}
