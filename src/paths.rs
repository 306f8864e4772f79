use std::path::PathBuf;

/// Project-local config file, looked up in the working directory.
pub const LOCAL_CONFIG: &str = "orbrun.toml";

/// Per-user config: `~/.config/orbrun/config.toml`
pub fn user_config() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("orbrun").join("config.toml"))
}

/// Implicit config locations, most specific first.
pub fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(LOCAL_CONFIG)];
    candidates.extend(user_config());
    candidates
}
