use crate::executor::ExecutorOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default)]
    pub documents: Documents,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }

    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            reset_after: Duration::from_millis(self.progress.reset_after_ms),
            call_interval: Duration::from_millis(self.progress.call_interval_ms),
        }
    }

    pub fn duplicate_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            reset_after: Duration::from_millis(self.progress.reset_after_ms),
            call_interval: Duration::from_millis(self.progress.duplicate_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    /// Re-use an existing run directory when the same input is run again.
    pub rerun_existing: bool,
    pub print_summary: bool,
    pub print_table: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            rerun_existing: true,
            print_summary: true,
            print_table: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Api {
    pub base_url: String,
    pub user_agent: String,
}
impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:10000".into(),
            user_agent: concat!("seller-bulk/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub reset_after_ms: u64,
    pub call_interval_ms: u64,
    pub duplicate_interval_ms: u64,
}
impl Default for Progress {
    fn default() -> Self {
        Self {
            reset_after_ms: 1500,
            call_interval_ms: 0,
            duplicate_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Documents {
    pub document_type: String,
}
impl Default for Documents {
    fn default() -> Self {
        Self {
            document_type: "THERMAL_AIR_WAYBILL".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub out_dir: String,
    pub write_report_json: bool,
    pub report_filename: String,
    pub write_documents: bool,
    pub documents_dir: String,
    pub write_index_json: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
            write_report_json: true,
            report_filename: "report.json".into(),
            write_documents: true,
            documents_dir: "documents".into(),
            write_index_json: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            dump_effective_config: true,
        }
    }
}
