//! Application configuration.
//!
//! Loaded from a TOML file named by `ORDERFLOW_CONFIG` (with `.env` support),
//! falling back to defaults for every key. `DATABASE_URL` always wins over
//! the file value.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub executor: ExecutorSettings,
    pub db: DbSettings,
    pub queue: QueueSettings,
    pub document_store: DocumentStoreSettings,
    pub cache: CacheSettings,
    pub grouping: GroupingSettings,
    pub events: EventSettings,
    /// Free-form overrides surfaced to operators; not interpreted by the core.
    pub custom_settings: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Transform-stage semaphore permits.
    pub processing_concurrency: usize,
    /// Preloader chunk parallelism; 0 disables the cap.
    pub db_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbSettings {
    /// Maximum ids per IN-clause chunk; keeps bound parameters under the
    /// driver cap (typically 2100).
    pub chunk_size: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// false = log-only mock publisher.
    pub enabled: bool,
    pub name: String,
    /// Publish-stage semaphore permits.
    pub publish_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentStoreSettings {
    /// false = deterministic mock order source.
    pub enabled: bool,
    /// Row cap for the scope-less pending-order fallback query.
    pub top_n: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub data: CacheTierSettings,
    pub partner: CacheTierSettings,
    pub dedup: CacheTierSettings,
    /// Toggles the caching preloader in front of the direct one.
    pub data_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheTierSettings {
    pub max_size: u64,
    pub ttl_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GroupingSettings {
    pub strategy: String,
    pub high_value_threshold: String,
    pub min_group_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    pub queue: String,
    /// How long a read message stays invisible before redelivery.
    pub visibility_timeout_secs: i32,
    pub batch_size: i32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            executor: ExecutorSettings::default(),
            db: DbSettings::default(),
            queue: QueueSettings::default(),
            document_store: DocumentStoreSettings::default(),
            cache: CacheSettings::default(),
            grouping: GroupingSettings::default(),
            events: EventSettings::default(),
            custom_settings: HashMap::new(),
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            processing_concurrency: 100,
            db_concurrency: 10,
        }
    }
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            max_retries: 2,
            retry_delay_ms: 100,
            max_connections: 10,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            name: "processed-orders".to_string(),
            publish_concurrency: 50,
        }
    }
}

impl Default for DocumentStoreSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            top_n: 100,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            data: CacheTierSettings {
                max_size: 10_000,
                ttl_minutes: 5,
            },
            partner: CacheTierSettings {
                max_size: 1_000,
                ttl_minutes: 10,
            },
            dedup: CacheTierSettings {
                max_size: 50_000,
                ttl_minutes: 60,
            },
            data_enabled: true,
        }
    }
}

impl Default for CacheTierSettings {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            ttl_minutes: 5,
        }
    }
}

impl Default for GroupingSettings {
    fn default() -> Self {
        Self {
            strategy: "BY_CUSTOMER".to_string(),
            high_value_threshold: "1000".to_string(),
            min_group_size: 2,
        }
    }
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            queue: "order-events".to_string(),
            visibility_timeout_secs: 300,
            batch_size: 10,
        }
    }
}

impl CacheTierSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes * 60)
    }
}

impl AppConfig {
    /// Load configuration: `.env`, then `ORDERFLOW_CONFIG` TOML if set,
    /// then `DATABASE_URL` override.
    pub fn load() -> PipelineResult<Self> {
        dotenvy::dotenv().ok();

        let mut config = match std::env::var("ORDERFLOW_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = Some(url);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: AppConfig = toml::from_str(&raw)
            .map_err(|e| PipelineError::Config(format!("invalid TOML in {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.db.chunk_size == 0 {
            return Err(PipelineError::Config("db.chunk_size must be positive".into()));
        }
        if self.executor.processing_concurrency == 0 {
            return Err(PipelineError::Config(
                "executor.processing_concurrency must be positive".into(),
            ));
        }
        if self.queue.publish_concurrency == 0 {
            return Err(PipelineError::Config(
                "queue.publish_concurrency must be positive".into(),
            ));
        }
        if self.grouping.min_group_size == 0 {
            return Err(PipelineError::Config(
                "grouping.min_group_size must be positive".into(),
            ));
        }
        if (self.document_store.enabled || self.queue.enabled) && self.database_url.is_none() {
            return Err(PipelineError::Config(
                "DATABASE_URL required when document_store or queue is enabled".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.executor.processing_concurrency, 100);
        assert_eq!(config.executor.db_concurrency, 10);
        assert_eq!(config.queue.publish_concurrency, 50);
        assert_eq!(config.db.chunk_size, 500);
        assert_eq!(config.db.max_retries, 2);
        assert_eq!(config.db.retry_delay_ms, 100);
        assert_eq!(config.cache.data.max_size, 10_000);
        assert_eq!(config.cache.partner.ttl_minutes, 10);
        assert_eq!(config.cache.dedup.max_size, 50_000);
        assert_eq!(config.grouping.strategy, "BY_CUSTOMER");
        assert!(!config.document_store.enabled);
        assert!(!config.queue.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_toml_with_defaults_for_the_rest() {
        let raw = r#"
            [db]
            chunk_size = 250

            [grouping]
            strategy = "HIGH_VALUE"
            min_group_size = 3
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.db.chunk_size, 250);
        assert_eq!(config.db.max_retries, 2);
        assert_eq!(config.grouping.strategy, "HIGH_VALUE");
        assert_eq!(config.grouping.min_group_size, 3);
        assert_eq!(config.executor.processing_concurrency, 100);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let mut config = AppConfig::default();
        config.db.chunk_size = 0;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn enabled_store_requires_database_url() {
        let mut config = AppConfig::default();
        config.document_store.enabled = true;
        config.database_url = None;
        assert!(config.validate().is_err());
        config.database_url = Some("postgresql://localhost/orders".into());
        assert!(config.validate().is_ok());
    }
}
