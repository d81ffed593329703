//! Run configuration.
//!
//! The config is a single JSON file. Every field has a default so a missing
//! file behaves like `lead-enrich init` output; CLI flags override file values
//! after loading.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::retry::RetryPolicy;
use crate::site::{ProfileUrls, SiteConfig};

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_WORKLIST_SHEET: &str = "FRANCE: 78000 lawyers";
pub const DEFAULT_COMPLETED_SHEET: &str = "Completed";
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 5.0;
const CONFIG_DIR_NAME: &str = "lead-enrich";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EnrichConfig {
    pub schema_version: u32,
    /// Workbook file holding both sheets; usually given on the command line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workbook: Option<PathBuf>,
    pub worklist_sheet: String,
    pub completed_sheet: String,
    /// Plaintext file holding the session cookie value.
    pub credential_path: PathBuf,
    /// Pause between full scans.
    pub poll_interval_secs: f64,
    /// Pause before each row that triggers remote calls.
    pub politeness_delay_ms: u64,
    /// JSONL file receiving one line per processed row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_path: Option<PathBuf>,
    pub site: SiteConfig,
    pub retry: RetryPolicy,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        default_config()
    }
}

/// Build the config written by `init` and used when no file exists.
pub fn default_config() -> EnrichConfig {
    EnrichConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        workbook: None,
        worklist_sheet: DEFAULT_WORKLIST_SHEET.to_string(),
        completed_sheet: DEFAULT_COMPLETED_SHEET.to_string(),
        credential_path: PathBuf::from("session.txt"),
        poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        politeness_delay_ms: 2_000,
        history_path: None,
        site: SiteConfig::default(),
        retry: RetryPolicy::default(),
    }
}

/// Per-user config location, e.g. `~/.config/lead-enrich/config.json`.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Pick the config file to load: an explicit path always wins, otherwise the
/// per-user file if it exists.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    user_config_path().filter(|path| path.is_file())
}

/// Load and validate a config file. Relative paths inside it are resolved
/// against the file's directory.
pub fn load_config(path: &Path) -> Result<EnrichConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let mut config: EnrichConfig =
        serde_json::from_slice(&bytes).with_context(|| format!("parse config {}", path.display()))?;
    validate_config(&config).with_context(|| format!("validate config {}", path.display()))?;
    if let Some(base) = path.parent() {
        anchor_paths(&mut config, base);
    }
    Ok(config)
}

/// Load the resolved config, or defaults when there is none.
pub fn load_or_default(explicit: Option<&Path>) -> Result<(EnrichConfig, Option<PathBuf>)> {
    match resolve_config_path(explicit) {
        Some(path) => Ok((load_config(&path)?, Some(path))),
        None => Ok((default_config(), None)),
    }
}

/// Persist a config in a stable JSON format.
pub fn write_config(path: &Path, config: &EnrichConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create config dir {}", parent.display()))?;
        }
    }
    let text = serde_json::to_string_pretty(config).context("serialize config")?;
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Check value ranges that serde cannot express.
pub fn validate_config(config: &EnrichConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if config.worklist_sheet.trim().is_empty() {
        return Err(anyhow!("worklist_sheet must be non-empty"));
    }
    if config.completed_sheet.trim().is_empty() {
        return Err(anyhow!("completed_sheet must be non-empty"));
    }
    if config.worklist_sheet == config.completed_sheet {
        return Err(anyhow!(
            "worklist_sheet and completed_sheet must differ (both {:?})",
            config.worklist_sheet
        ));
    }
    validate_interval(config.poll_interval_secs)?;
    if config.credential_path.as_os_str().is_empty() {
        return Err(anyhow!("credential_path must be non-empty"));
    }
    if !config.site.decisions_url_template.contains("{id}") {
        return Err(anyhow!(
            "site.decisions_url_template must contain an {{id}} placeholder"
        ));
    }
    if config.site.request_timeout_secs == 0 {
        return Err(anyhow!("site.request_timeout_secs must be positive"));
    }
    ProfileUrls::new(&config.site).context("site.profile_base_url")?;
    let retry = &config.retry;
    if retry.transient_max_attempts == 0 || retry.rate_limit_max_attempts == 0 {
        return Err(anyhow!("retry attempt limits must be at least 1"));
    }
    if retry.rate_limit_base_ms == 0 {
        return Err(anyhow!("retry.rate_limit_base_ms must be positive"));
    }
    if retry.rate_limit_cap_ms < retry.rate_limit_base_ms {
        return Err(anyhow!(
            "retry.rate_limit_cap_ms ({}) must be at least rate_limit_base_ms ({})",
            retry.rate_limit_cap_ms,
            retry.rate_limit_base_ms
        ));
    }
    Ok(())
}

/// Poll intervals must be finite and strictly positive.
pub fn validate_interval(secs: f64) -> Result<()> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(anyhow!("poll interval must be a positive number (got {secs})"));
    }
    Ok(())
}

fn anchor_paths(config: &mut EnrichConfig, base: &Path) {
    let anchor = |path: &Path| {
        if path.is_relative() && !base.as_os_str().is_empty() {
            base.join(path)
        } else {
            path.to_path_buf()
        }
    };
    config.credential_path = anchor(&config.credential_path);
    config.workbook = config.workbook.as_deref().map(anchor);
    config.history_path = config.history_path.as_deref().map(anchor);
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
