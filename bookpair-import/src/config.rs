//! Configuration for bookpair-import
//!
//! Loaded from TOML (`bookpair.toml`, see [`bookpair_common::config::find_config_file`]).
//! Every field has a compiled default so an empty or missing file is valid.
//!
//! ```toml
//! [database]
//! path = "/var/lib/bookpair/bookpair.db"
//!
//! [oracles]
//! base_url = "http://127.0.0.1:8000"
//! qe_batch_size = 64
//!
//! [scoring]
//! good_min = 0.85
//! ```

use bookpair_common::{config as common_config, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `database.path`
pub const DB_ENV_VAR: &str = "BOOKPAIR_DB";
/// Environment variable overriding `oracles.base_url`
pub const ORACLE_URL_ENV_VAR: &str = "BOOKPAIR_ORACLE_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub oracles: OracleConfig,
    pub filter: FilterConfig,
    pub alignment: AlignmentConfig,
    pub scoring: ScoringConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; falls back to the platform data dir
    pub path: Option<String>,
    /// Total retry budget for lock contention during merge
    pub max_lock_wait_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_lock_wait_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5731".to_string(),
        }
    }
}

/// External scoring services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Shared base URL; per-oracle URLs below override it
    pub base_url: String,
    pub embedding_url: Option<String>,
    pub qe_url: Option<String>,
    pub backtranslation_url: Option<String>,

    pub embedding_batch_size: usize,
    pub qe_batch_size: usize,
    pub backtranslation_batch_size: usize,

    pub embedding_timeout_secs: u64,
    pub qe_timeout_secs: u64,
    pub backtranslation_timeout_secs: u64,

    /// Extra attempts per chunk after the first failure
    pub retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,

    /// Chunks dispatched concurrently per oracle (1 = sequential)
    pub max_in_flight: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            embedding_url: None,
            qe_url: None,
            backtranslation_url: None,
            embedding_batch_size: 256,
            qe_batch_size: 128,
            backtranslation_batch_size: 64,
            embedding_timeout_secs: 60,
            qe_timeout_secs: 300,
            backtranslation_timeout_secs: 300,
            retries: 2,
            backoff_base_ms: 300,
            backoff_max_ms: 2000,
            max_in_flight: 1,
        }
    }
}

impl OracleConfig {
    pub fn embedding_base(&self) -> &str {
        self.embedding_url.as_deref().unwrap_or(&self.base_url)
    }

    pub fn qe_base(&self) -> &str {
        self.qe_url.as_deref().unwrap_or(&self.base_url)
    }

    pub fn backtranslation_base(&self) -> &str {
        self.backtranslation_url.as_deref().unwrap_or(&self.base_url)
    }
}

/// Cheap rule gates applied before any oracle call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub ratio_min: f64,
    pub ratio_max: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            ratio_min: 0.5,
            ratio_max: 2.0,
        }
    }
}

/// Optimal-assignment aligner tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Pairs below this blended similarity are dropped after repair
    pub min_similarity: f64,
    /// Max container distance before a cell is forbidden
    pub spine_band: usize,
    /// Fusion acceptance slack below `min_similarity`
    pub repair_slack: f64,
    pub weight_similarity: f64,
    pub weight_position: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.70,
            spine_band: 3,
            repair_slack: 0.02,
            weight_similarity: 0.75,
            weight_position: 0.25,
        }
    }
}

/// Final-score weights and status thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weight_similarity: f64,
    pub weight_qe: f64,
    pub weight_rule: f64,
    pub good_min: f64,
    pub suspect_min: f64,
    pub qe_good_min: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weight_similarity: 0.45,
            weight_qe: 0.35,
            weight_rule: 0.20,
            good_min: 0.80,
            suspect_min: 0.55,
            qe_good_min: 0.75,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Candidates enriched and staged per group
    pub group_size: usize,
    pub max_examples: usize,
    /// Call the back-translation oracle for every staged candidate
    pub back_translation: bool,
    /// Stage paired embeddings in optimal mode
    pub stream_embeddings: bool,
    /// Only stream embeddings for candidates reaching `scoring.suspect_min`
    pub embed_only_approved: bool,
    /// Staging partitions older than this are purged at run start
    pub stale_staging_minutes: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            group_size: 512,
            max_examples: 10,
            back_translation: false,
            stream_embeddings: true,
            embed_only_approved: false,
            stale_staging_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive used when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ImportConfig {
    /// Load from the discovered config file, then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config: ImportConfig = common_config::load_or_default(explicit)?;
        if let Ok(url) = std::env::var(ORACLE_URL_ENV_VAR) {
            if !url.trim().is_empty() {
                config.oracles.base_url = url;
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Database path with CLI > ENV > TOML > default priority
    pub fn database_path(&self, cli_arg: Option<&str>) -> PathBuf {
        common_config::resolve_path(
            cli_arg,
            DB_ENV_VAR,
            self.database.path.as_deref(),
            common_config::default_database_path(),
        )
    }

    /// Reject settings that would make the pipeline meaningless
    pub fn validate(&self) -> Result<()> {
        let f = &self.filter;
        if !(f.ratio_min > 0.0 && f.ratio_min < 1.0 && f.ratio_max > 1.0) {
            return Err(Error::Config(format!(
                "filter ratio bounds must satisfy 0 < ratio_min < 1 < ratio_max (got {} / {})",
                f.ratio_min, f.ratio_max
            )));
        }
        let s = &self.scoring;
        if s.suspect_min > s.good_min {
            return Err(Error::Config(format!(
                "scoring.suspect_min ({}) exceeds scoring.good_min ({})",
                s.suspect_min, s.good_min
            )));
        }
        let o = &self.oracles;
        if o.embedding_batch_size == 0 || o.qe_batch_size == 0 || o.backtranslation_batch_size == 0 {
            return Err(Error::Config("oracle batch sizes must be positive".to_string()));
        }
        if self.pipeline.group_size == 0 {
            return Err(Error::Config("pipeline.group_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Example config file contents with every default spelled out
    pub fn default_toml() -> Result<String> {
        toml::to_string_pretty(&ImportConfig::default())
            .map_err(|e| Error::Internal(format!("serialize default config: {}", e)))
    }
}

impl OracleConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}
