//! Configuration loading and resolution.

use std::path::{Path, PathBuf};

use action_mapper::EvalMethod;
use serde::{Deserialize, Serialize};

use crate::types::{GatewayError, GatewayResult};

/// Environment variable naming the rules directory.
pub const RULES_DIR_ENV: &str = "ACTION_RULES_DIR";

/// Optional gateway settings file inside the rules directory.
pub const CONFIG_FILE: &str = "gateway.json";

/// Resolve the directory holding action rule files.
pub fn resolve_rules_dir(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var(RULES_DIR_ENV) {
        return PathBuf::from(env_path);
    }

    let cwd_rules = PathBuf::from(".actions");
    if cwd_rules.is_dir() {
        return cwd_rules;
    }

    resolve_default_rules_dir()
}

fn resolve_default_rules_dir() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    PathBuf::from(format!("{home}/.action-mapper/rules"))
}

/// Gateway settings. Every field has a default; `gateway.json` may set any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub eval_method: EvalMethod,
    /// Upstream request timeout.
    pub timeout_ms: u64,
    /// Retries for idempotent requests on 5xx, 429 or connection failure.
    pub max_retries: u32,
    pub max_redirects: usize,
    pub user_agent: String,
    pub listen_addr: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            eval_method: EvalMethod::default(),
            timeout_ms: 10_000,
            max_retries: 2,
            max_redirects: 5,
            user_agent: format!("action-mapper/{}", env!("CARGO_PKG_VERSION")),
            listen_addr: "127.0.0.1:3200".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load `gateway.json` from `rules_dir`, falling back to defaults when absent.
    pub fn load(rules_dir: &Path) -> GatewayResult<Self> {
        let file = rules_dir.join(CONFIG_FILE);
        if !file.is_file() {
            tracing::debug!(path = %file.display(), "no gateway config, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&file)?;
        serde_json::from_str(&raw)
            .map_err(|e| GatewayError::Config(format!("{}: {e}", file.display())))
    }
}
