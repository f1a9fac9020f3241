//! Manager configuration.
//!
//! Mirrors the teacher convention for per-field `#[serde(default = ...)]`
//! values: a missing config file (or a missing field within one) is not an
//! error, it just means "use the default."

use std::path::PathBuf;

use serde::Deserialize;

/// Tunables for a [`crate::manager::CloneManager`] instance.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagerConfig {
    /// Path to the SQLite database backing the durable task store.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// How often the connectivity watcher re-examines `CONNECT` tasks, in
    /// milliseconds.
    #[serde(default = "default_watcher_tick_ms")]
    pub watcher_tick_ms: u64,

    /// How many `-N` alternates the worktree resolver tries in probe mode
    /// before giving up.
    #[serde(default = "default_worktree_synth_cap")]
    pub worktree_synth_cap: u32,

    /// The branch the transfer engine should populate when none is
    /// specified explicitly.
    #[serde(default = "default_target_branch")]
    pub default_target_branch: String,

    /// The ref name the transfer engine should leave pointing at the
    /// fetched tip when none is specified explicitly.
    #[serde(default = "default_fetch_head_ref")]
    pub default_fetch_head_ref: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            watcher_tick_ms: default_watcher_tick_ms(),
            worktree_synth_cap: default_worktree_synth_cap(),
            default_target_branch: default_target_branch(),
            default_fetch_head_ref: default_fetch_head_ref(),
        }
    }
}

impl ManagerConfig {
    /// Parse a config from TOML text. A blank document parses to all
    /// defaults.
    ///
    /// # Errors
    /// Returns the underlying `toml` parse error on malformed input or an
    /// unknown field.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("clone-tasks.sqlite3")
}

const fn default_watcher_tick_ms() -> u64 {
    5000
}

const fn default_worktree_synth_cap() -> u32 {
    1000
}

fn default_target_branch() -> String {
    "master".to_owned()
}

fn default_fetch_head_ref() -> String {
    "fetch_head".to_owned()
}
