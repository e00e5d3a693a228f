// Configuration management for tsgraph

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = ".tsgraph.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub indexing: IndexingConfig,
    pub cache: CacheConfig,
    pub query: QueryConfig,
    pub logging: LoggingConfig,
    pub mcp: McpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Used when a caller passes no include patterns
    pub include: Vec<String>,
    /// Used when a caller passes no exclude patterns
    pub exclude: Vec<String>,
    /// Files extracted concurrently per batch
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Defaults to `<temp dir>/tsgraph-cache`
    pub directory: Option<PathBuf>,
    pub ttl_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub max_depth: usize,
    pub search_limit: usize,
    pub usage_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    pub transport: String,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            include: ["**/*.ts", "**/*.tsx", "**/*.js", "**/*.jsx", "**/*.mjs"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude: [
                "node_modules/**",
                "**/node_modules/**",
                ".git/**",
                "dist/**",
                "build/**",
                "coverage/**",
                ".tsgraph/**",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            batch_size: 50,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            ttl_ms: 24 * 60 * 60 * 1000,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            search_limit: 50,
            usage_limit: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("tsgraph-cache"))
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.tsgraph.toml` from a directory, falling back to defaults
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Self {
        let config_path = dir.as_ref().join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            tracing::debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, dir.as_ref().display());
            return Self::default();
        }

        match Self::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::warn!("Could not load config from {}: {:#}", config_path.display(), e);
                tracing::info!("Using default configuration");
                Self::default()
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.indexing.batch_size == 0 {
            anyhow::bail!("Batch size must be greater than 0");
        }

        if self.query.max_depth == 0 {
            anyhow::bail!("Query max depth must be greater than 0");
        }
        if self.query.search_limit == 0 {
            anyhow::bail!("Search limit must be greater than 0");
        }
        if self.query.usage_limit == 0 {
            anyhow::bail!("Usage limit must be greater than 0");
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }
        let valid_formats = ["compact", "pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        if self.mcp.transport != "stdio" {
            anyhow::bail!("Invalid MCP transport: {}", self.mcp.transport);
        }

        Ok(())
    }
}
