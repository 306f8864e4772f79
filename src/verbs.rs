//! Lifecycle verbs of the wrapped CLI.
//!
//! Each verb is a thin builder: typed arguments in, a multi-part command
//! plus an operation label out. Labels drive timeout selection and the
//! already-exists recovery, so their wording matters.

use std::collections::BTreeMap;

use crate::command::{LogicalCommand, shell_quote};
use crate::error::OrbError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmVerb {
    Create {
        image: String,
        name: String,
        arch: Option<String>,
        user: Option<String>,
    },
    Delete {
        name: String,
    },
    Start {
        name: String,
    },
    Stop {
        name: String,
        force: bool,
    },
    Restart {
        name: String,
    },
    Clone {
        source: String,
        name: String,
    },
    Export {
        name: String,
        path: String,
    },
    Import {
        name: String,
        path: String,
    },
    Info {
        name: String,
    },
    List,
    Push {
        machine: String,
        local: String,
        remote: String,
    },
    Pull {
        machine: String,
        remote: String,
        local: String,
    },
}

/// What a verb hands to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbCommand {
    pub command: LogicalCommand,
    pub label: String,
    /// Machine a creation collision refers to.
    pub resource: Option<String>,
}

impl VmVerb {
    /// Declarative create: `present = false` means a forced delete.
    pub fn ensure(
        name: impl Into<String>,
        image: impl Into<String>,
        arch: Option<String>,
        user: Option<String>,
        present: bool,
    ) -> Self {
        let name = name.into();
        if present {
            VmVerb::Create {
                image: image.into(),
                name,
                arch,
                user,
            }
        } else {
            VmVerb::Delete { name }
        }
    }

    pub fn label(&self) -> String {
        match self {
            VmVerb::Create { name, .. } => format!("VM creation ({name})"),
            VmVerb::Delete { name } => format!("VM deletion ({name})"),
            VmVerb::Start { name } => format!("VM start ({name})"),
            VmVerb::Stop { name, .. } => format!("VM stop ({name})"),
            VmVerb::Restart { name } => format!("VM restart ({name})"),
            VmVerb::Clone { source, name } => format!("VM clone ({source} -> {name})"),
            VmVerb::Export { name, .. } => format!("VM export ({name})"),
            VmVerb::Import { name, .. } => format!("VM import ({name})"),
            VmVerb::Info { name } => format!("VM info ({name})"),
            VmVerb::List => "VM list".into(),
            VmVerb::Push { machine, .. } => format!("file push ({machine})"),
            VmVerb::Pull { machine, .. } => format!("file pull ({machine})"),
        }
    }

    fn args(&self) -> Vec<&str> {
        match self {
            VmVerb::Create {
                image,
                name,
                arch,
                user,
            } => {
                let mut args = vec!["create", image.as_str(), name.as_str()];
                if let Some(arch) = arch {
                    args.extend(["--arch", arch.as_str()]);
                }
                if let Some(user) = user {
                    args.extend(["--user", user.as_str()]);
                }
                args
            }
            VmVerb::Delete { name } => vec!["delete", "-f", name.as_str()],
            VmVerb::Start { name } => vec!["start", name.as_str()],
            VmVerb::Stop { name, force } => {
                let mut args = vec!["stop"];
                if *force {
                    args.push("-f");
                }
                args.push(name.as_str());
                args
            }
            VmVerb::Restart { name } => vec!["restart", name.as_str()],
            VmVerb::Clone { source, name } => vec!["clone", source.as_str(), name.as_str()],
            VmVerb::Export { name, path } => vec!["export", name.as_str(), path.as_str()],
            VmVerb::Import { name, path } => vec!["import", "-n", name.as_str(), path.as_str()],
            VmVerb::Info { name } => vec!["info", name.as_str(), "-f", "json"],
            VmVerb::List => vec!["list", "-f", "json"],
            VmVerb::Push {
                machine,
                local,
                remote,
            } => vec!["push", "-m", machine.as_str(), local.as_str(), remote.as_str()],
            VmVerb::Pull {
                machine,
                remote,
                local,
            } => vec!["pull", "-m", machine.as_str(), remote.as_str(), local.as_str()],
        }
    }

    pub fn build(&self, program: &str) -> VerbCommand {
        let parts = std::iter::once(program)
            .chain(self.args())
            .map(shell_quote)
            .collect();
        VerbCommand {
            command: LogicalCommand::Parts(parts),
            label: self.label(),
            resource: match self {
                VmVerb::Create { name, .. } => Some(name.clone()),
                _ => None,
            },
        }
    }

    /// Build a verb from a host argument map that already had its control
    /// options removed.
    pub fn from_arguments(verb: &str, args: &BTreeMap<String, String>) -> Result<Self, OrbError> {
        let get = |key: &str| -> Result<String, OrbError> {
            args.get(key)
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .ok_or_else(|| OrbError::Validation {
                    message: format!("verb '{verb}' requires argument '{key}'"),
                })
        };
        let opt = |key: &str| args.get(key).filter(|v| !v.trim().is_empty()).cloned();
        let flag = |key: &str| {
            opt(key).is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        };

        Ok(match verb {
            "create" => {
                let present = opt("present")
                    .is_none_or(|v| !matches!(v.to_ascii_lowercase().as_str(), "false" | "0" | "no"));
                let name = get("name")?;
                if present {
                    VmVerb::ensure(name, get("image")?, opt("arch"), opt("user"), true)
                } else {
                    VmVerb::Delete { name }
                }
            }
            "delete" => VmVerb::Delete { name: get("name")? },
            "start" => VmVerb::Start { name: get("name")? },
            "stop" => VmVerb::Stop {
                name: get("name")?,
                force: flag("force"),
            },
            "restart" => VmVerb::Restart { name: get("name")? },
            "clone" => VmVerb::Clone {
                source: get("source")?,
                name: get("name")?,
            },
            "export" => VmVerb::Export {
                name: get("name")?,
                path: get("path")?,
            },
            "import" => VmVerb::Import {
                name: get("name")?,
                path: get("path")?,
            },
            "info" => VmVerb::Info { name: get("name")? },
            "list" => VmVerb::List,
            "push" => VmVerb::Push {
                machine: get("machine")?,
                local: get("local")?,
                remote: get("remote")?,
            },
            "pull" => VmVerb::Pull {
                machine: get("machine")?,
                remote: get("remote")?,
                local: get("local")?,
            },
            other => {
                return Err(OrbError::Validation {
                    message: format!("unknown verb '{other}'"),
                });
            }
        })
    }
}
