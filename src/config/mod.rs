//! Configuration management.
//!
//! [`ContextKeepConfig`] is built from defaults, then an optional TOML file,
//! then environment variables.

use crate::observability::{LogFormat, LoggingConfig};
use crate::storage::vector::DEFAULT_DIMENSIONS;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding [`ContextKeepConfig::data_dir`].
pub const DATA_DIR_ENV: &str = "CONTEXTKEEP_DATA_DIR";
/// Environment variable overriding [`ContextKeepConfig::storage`].
pub const STORAGE_ENV: &str = "CONTEXTKEEP_STORAGE";
/// Environment variable overriding the log format.
pub const LOG_FORMAT_ENV: &str = "CONTEXTKEEP_LOG_FORMAT";

/// Where workspace stores live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// One directory per workspace under the data dir.
    #[default]
    Disk,
    /// In-process only; nothing survives the process.
    Memory,
}

impl StorageMode {
    /// Parses a storage mode.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "disk" | "sqlite" | "file" => Some(Self::Disk),
            "memory" | "in-memory" | "in_memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    /// Weight of the normalized lexical score in hybrid mode.
    pub lexical_weight: f32,
    /// Weight of the normalized semantic score in hybrid mode.
    pub semantic_weight: f32,
    /// Result count when a search gives no limit.
    pub default_limit: usize,
    /// Candidates fetched from each index before join-back and filtering.
    pub candidate_pool: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            lexical_weight: 0.5,
            semantic_weight: 0.5,
            default_limit: crate::models::DEFAULT_SEARCH_LIMIT,
            candidate_pool: 200,
        }
    }
}

/// Stable-context assembly settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerSettings {
    /// Serialized size (characters) above which unhinted custom data is a
    /// reference-data candidate.
    pub content_threshold: usize,
    /// Maximum number of system patterns in the prefix.
    pub prefix_pattern_limit: usize,
    /// Prefix hashes remembered per workspace.
    pub hash_ledger_capacity: usize,
    /// Token budget when a dynamic-context call gives none.
    pub default_dynamic_budget: usize,
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self {
            content_threshold: 1500,
            prefix_pattern_limit: 3,
            hash_ledger_capacity: 64,
            default_dynamic_budget: 2000,
        }
    }
}

/// Main configuration for contextkeep.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextKeepConfig {
    /// Root directory for workspace stores.
    pub data_dir: PathBuf,
    /// Disk or memory storage.
    pub storage: StorageMode,
    /// Retrieval settings.
    pub search: SearchSettings,
    /// Embedding dimensions.
    pub embedding_dimensions: usize,
    /// Assembly settings.
    pub assembler: AssemblerSettings,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Storage mode.
    pub storage: Option<StorageMode>,
    /// Search section.
    pub search: Option<ConfigFileSearch>,
    /// Embedding section.
    pub embedding: Option<ConfigFileEmbedding>,
    /// Assembler section.
    pub assembler: Option<ConfigFileAssembler>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Search section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileSearch {
    /// Lexical weight.
    pub lexical_weight: Option<f32>,
    /// Semantic weight.
    pub semantic_weight: Option<f32>,
    /// Default limit.
    pub default_limit: Option<usize>,
    /// Candidate pool.
    pub candidate_pool: Option<usize>,
}

/// Embedding section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileEmbedding {
    /// Vector dimensions.
    pub dimensions: Option<usize>,
}

/// Assembler section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileAssembler {
    /// Content threshold.
    pub content_threshold: Option<usize>,
    /// Prefix pattern limit.
    pub prefix_pattern_limit: Option<usize>,
    /// Hash ledger capacity.
    pub hash_ledger_capacity: Option<usize>,
    /// Default dynamic budget.
    pub default_dynamic_budget: Option<usize>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileLogging {
    /// Level directive.
    pub level: Option<String>,
    /// Output format.
    pub format: Option<LogFormat>,
    /// Log file path.
    pub file: Option<String>,
}

impl Default for ContextKeepConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            storage: StorageMode::Disk,
            search: SearchSettings::default(),
            embedding_dimensions: DEFAULT_DIMENSIONS,
            assembler: AssemblerSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Returns the platform data directory, or `.contextkeep` when unknown.
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".contextkeep"),
        |dirs| dirs.data_local_dir().join("contextkeep"),
    )
}

impl ContextKeepConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that keeps everything in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default().with_storage(StorageMode::Memory)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds
    /// invalid values.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        let config = Self::from_config_file(file);
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/contextkeep/` on macOS)
    /// 2. XDG config dir (`~/.config/contextkeep/` for Unix compatibility)
    ///
    /// Returns default configuration if no readable config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("contextkeep").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("contextkeep")
                .join("config.toml"),
        ];
        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file"),
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `ContextKeepConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(storage) = file.storage {
            config.storage = storage;
        }
        if let Some(search) = file.search {
            if let Some(v) = search.lexical_weight {
                config.search.lexical_weight = v;
            }
            if let Some(v) = search.semantic_weight {
                config.search.semantic_weight = v;
            }
            if let Some(v) = search.default_limit {
                config.search.default_limit = v;
            }
            if let Some(v) = search.candidate_pool {
                config.search.candidate_pool = v;
            }
        }
        if let Some(dimensions) = file.embedding.and_then(|e| e.dimensions) {
            config.embedding_dimensions = dimensions;
        }
        if let Some(assembler) = file.assembler {
            if let Some(v) = assembler.content_threshold {
                config.assembler.content_threshold = v;
            }
            if let Some(v) = assembler.prefix_pattern_limit {
                config.assembler.prefix_pattern_limit = v;
            }
            if let Some(v) = assembler.hash_ledger_capacity {
                config.assembler.hash_ledger_capacity = v;
            }
            if let Some(v) = assembler.default_dynamic_budget {
                config.assembler.default_dynamic_budget = v;
            }
        }
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                config.logging.level = level;
            }
            if let Some(format) = logging.format {
                config.logging.format = format;
            }
            config.logging.file = logging.file.map(PathBuf::from);
        }

        config
    }

    /// Applies `CONTEXTKEEP_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unrecognized storage mode or
    /// log format.
    pub fn apply_env_overrides(self) -> Result<Self> {
        self.apply_env_overrides_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides read through `lookup` instead of the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unrecognized storage mode or
    /// log format.
    pub fn apply_env_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(storage) = lookup(STORAGE_ENV) {
            self.storage = StorageMode::parse(&storage).ok_or_else(|| {
                Error::InvalidInput(format!("{STORAGE_ENV}: unknown storage mode '{storage}'"))
            })?;
        }
        if let Some(format) = lookup(LOG_FORMAT_ENV) {
            self.logging.format = format.parse()?;
        }
        Ok(self)
    }

    /// Checks that numeric settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the first bad setting.
    pub fn validate(&self) -> Result<()> {
        let weights = [self.search.lexical_weight, self.search.semantic_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().sum::<f32>() <= 0.0
        {
            return Err(Error::InvalidInput(
                "search weights must be non-negative and not both zero".to_string(),
            ));
        }
        for (name, value) in [
            ("search.default_limit", self.search.default_limit),
            ("search.candidate_pool", self.search.candidate_pool),
            ("embedding.dimensions", self.embedding_dimensions),
            ("assembler.hash_ledger_capacity", self.assembler.hash_ledger_capacity),
        ] {
            if value == 0 {
                return Err(Error::InvalidInput(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Sets the storage mode.
    #[must_use]
    pub const fn with_storage(mut self, storage: StorageMode) -> Self {
        self.storage = storage;
        self
    }

    /// Sets the hybrid weights.
    #[must_use]
    pub const fn with_search_weights(mut self, lexical: f32, semantic: f32) -> Self {
        self.search.lexical_weight = lexical;
        self.search.semantic_weight = semantic;
        self
    }

    /// Sets the embedding dimensions.
    #[must_use]
    pub const fn with_embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = dimensions;
        self
    }

    /// Sets the custom-data size threshold for reference-data candidates.
    #[must_use]
    pub const fn with_content_threshold(mut self, threshold: usize) -> Self {
        self.assembler.content_threshold = threshold;
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ContextKeepConfig::default();
        assert_eq!(config.storage, StorageMode::Disk);
        assert!((config.search.lexical_weight - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.search.default_limit, 10);
        assert_eq!(config.search.candidate_pool, 200);
        assert_eq!(config.embedding_dimensions, 384);
        assert_eq!(config.assembler.content_threshold, 1500);
        assert_eq!(config.assembler.prefix_pattern_limit, 3);
        assert_eq!(config.assembler.default_dynamic_budget, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_merges_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
data_dir = "/tmp/ck"
storage = "memory"

[search]
lexical_weight = 0.7
semantic_weight = 0.3

[assembler]
prefix_pattern_limit = 5

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = ContextKeepConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/ck"));
        assert_eq!(config.storage, StorageMode::Memory);
        assert!((config.search.lexical_weight - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.search.candidate_pool, 200);
        assert_eq!(config.assembler.prefix_pattern_limit, 5);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_load_rejects_unknown_keys_and_bad_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bogus = 1").unwrap();
        assert!(ContextKeepConfig::load_from_file(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[search]\ncandidate_pool = 0").unwrap();
        assert!(ContextKeepConfig::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = ContextKeepConfig::default()
            .apply_env_overrides_from(|name| match name {
                DATA_DIR_ENV => Some("/data".to_string()),
                STORAGE_ENV => Some("memory".to_string()),
                LOG_FORMAT_ENV => Some("json".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.storage, StorageMode::Memory);
        assert_eq!(config.logging.format, LogFormat::Json);

        let bad = ContextKeepConfig::default()
            .apply_env_overrides_from(|name| (name == STORAGE_ENV).then(|| "tape".to_string()));
        assert!(bad.is_err());
    }
}
