use anyhow::{Context, Result};
use cpe_import::ImportConfig;
use nvd_client::ClientConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "cpe-ingest.yaml";
pub const DEFAULT_DB_PATH: &str = "cpe.db";

#[derive(Debug, Default, Deserialize, Clone)]
pub struct NvdConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub rate_limit_requests: Option<usize>,
    pub rate_limit_window_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub retry_delay_secs: Option<u64>,
    pub max_rate_limit_retries: Option<u32>,
    pub entries_endpoint: Option<String>,
    pub changed_entries_endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ImportSection {
    pub batch_size: Option<usize>,
    pub incremental_offset_cap: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub nvd: Option<NvdConfig>,
    pub import: Option<ImportSection>,
    pub database: Option<DatabaseConfig>,
}

impl Config {
    /// Client settings; a key given on the command line wins over the file.
    pub fn client_config(&self, api_key: Option<String>) -> ClientConfig {
        let mut c = ClientConfig::default();
        let Some(n) = &self.nvd else {
            c.api_key = api_key;
            return c;
        };
        if let Some(v) = &n.base_url { c.base_url = v.clone(); }
        c.api_key = api_key.or_else(|| n.api_key.clone());
        if let Some(v) = n.rate_limit_requests { c.rate_limit_requests = v; }
        if let Some(v) = n.rate_limit_window_secs { c.rate_limit_window = Duration::from_secs(v); }
        if let Some(v) = n.timeout_secs { c.timeout = Duration::from_secs(v); }
        if let Some(v) = n.retry_delay_secs { c.retry_delay = Duration::from_secs(v); }
        if let Some(v) = n.max_rate_limit_retries { c.max_rate_limit_retries = v; }
        if let Some(v) = &n.entries_endpoint { c.entries_endpoint = v.clone(); }
        if let Some(v) = &n.changed_entries_endpoint { c.changed_entries_endpoint = v.clone(); }
        c
    }

    pub fn import_config(&self) -> ImportConfig {
        let mut c = ImportConfig::default();
        if let Some(i) = &self.import {
            if let Some(v) = i.batch_size { c.batch_size = v.max(1); }
            if let Some(v) = i.incremental_offset_cap { c.incremental_offset_cap = v; }
        }
        c
    }

    pub fn db_path(&self, cli: Option<&Path>) -> PathBuf {
        cli.map(Path::to_path_buf)
            .or_else(|| self.database.as_ref().and_then(|d| d.path.clone()))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
    }
}

/// Load `path`, or `./cpe-ingest.yaml` if it exists. No file means defaults.
pub fn load_config(path: Option<&Path>) -> Result<Option<Config>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() { p.to_path_buf() } else { return Ok(None); }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let cfg = serde_yaml::from_str(&s).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let cfg: Config = serde_yaml::from_str(
            "nvd:\n  base_url: http://localhost:9000\n  api_key: from-file\n  rate_limit_requests: 40\n  rate_limit_window_secs: 10\n  retry_delay_secs: 2\nimport:\n  batch_size: 500\ndatabase:\n  path: /tmp/cpe.db\n",
        )
        .unwrap();
        let c = cfg.client_config(None);
        assert_eq!(c.base_url, "http://localhost:9000");
        assert_eq!(c.api_key.as_deref(), Some("from-file"));
        assert_eq!(c.rate_limit_requests, 40);
        assert_eq!(c.rate_limit_window, Duration::from_secs(10));
        assert_eq!(c.retry_delay, Duration::from_secs(2));
        assert_eq!(c.timeout, Duration::from_secs(30));

        let i = cfg.import_config();
        assert_eq!(i.batch_size, 500);
        assert_eq!(i.incremental_offset_cap, 10_000);
        assert_eq!(cfg.db_path(None), PathBuf::from("/tmp/cpe.db"));
    }

    #[test]
    fn command_line_wins() {
        let cfg: Config = serde_yaml::from_str("nvd:\n  api_key: from-file\n").unwrap();
        assert_eq!(cfg.client_config(Some("cli".into())).api_key.as_deref(), Some("cli"));
        assert_eq!(cfg.db_path(Some(Path::new("x.db"))), PathBuf::from("x.db"));
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let cfg = Config::default();
        let c = cfg.client_config(None);
        assert_eq!(c.base_url, nvd_client::DEFAULT_BASE_URL);
        assert!(c.api_key.is_none());
        assert_eq!(cfg.import_config().batch_size, 2000);
        assert_eq!(cfg.db_path(None), PathBuf::from(DEFAULT_DB_PATH));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/cpe-ingest.yaml"))).is_err());
    }
}
