//! Configuration for bundless builds
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (bundless.toml)
//! - The user config directory
//! - Environment variables (BUNDLESS__*)
//!
//! ## Example config file (bundless.toml):
//! ```toml
//! [build]
//! concurrency = 4
//!
//! [[targets]]
//! id = "esm"
//! source_root = "src"
//! output_root = "dist/esm"
//! include = ["**/*.ts"]
//! exclude = ["**/*.test.ts"]
//! default_chain = ["strip-comments"]
//!
//! [targets.chains]
//! ts = ["define", { transformer = "banner", options = { text = "/* esm */" } }]
//!
//! [targets.transformers.define]
//! replacements = { "process.env.node_env" = "\"production\"" }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Result};
use crate::schema::RawOptions;
use crate::transformer::normalize_extension;

/// Main configuration for a build
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build-wide settings
    #[serde(default)]
    pub build: BuildSettings,

    /// One entry per output target
    #[serde(default)]
    pub targets: Vec<BundlessConfig>,
}

/// Build-wide settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSettings {
    /// Worker threads; defaults to the available parallelism
    #[serde(default)]
    pub concurrency: Option<usize>,
}

/// Configuration for a single output target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundlessConfig {
    /// Target identifier (e.g. a module format label)
    pub id: String,

    /// Directory whose tree is transformed
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,

    /// Directory the transformed tree is written under
    pub output_root: PathBuf,

    /// Globs (relative to the source root) a file must match; empty means all
    #[serde(default)]
    pub include: Vec<String>,

    /// Globs excluding files
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Chains keyed by file extension, without a leading dot (`ts`, `d.ts`)
    #[serde(default)]
    pub chains: BTreeMap<String, Vec<ChainEntry>>,

    /// Chain for files no extension chain matches
    #[serde(default)]
    pub default_chain: Vec<ChainEntry>,

    /// Target-level options per transformer id
    #[serde(default)]
    pub transformers: BTreeMap<String, RawOptions>,
}

/// One step of a configured chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChainEntry {
    /// Bare transformer id
    Id(String),
    /// Transformer id with per-entry options
    Configured(ConfiguredEntry),
}

/// Table form of a chain entry; misspelled keys are rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfiguredEntry {
    pub transformer: String,
    #[serde(default)]
    pub options: RawOptions,
}

impl ChainEntry {
    pub fn new(transformer: impl Into<String>) -> Self {
        ChainEntry::Id(transformer.into())
    }

    pub fn with_options(transformer: impl Into<String>, options: RawOptions) -> Self {
        ChainEntry::Configured(ConfiguredEntry {
            transformer: transformer.into(),
            options,
        })
    }

    pub fn transformer(&self) -> &str {
        match self {
            ChainEntry::Id(id) => id,
            ChainEntry::Configured(entry) => &entry.transformer,
        }
    }

    /// Options given on the entry itself
    pub fn options(&self) -> Option<&RawOptions> {
        match self {
            ChainEntry::Id(_) => None,
            ChainEntry::Configured(entry) => Some(&entry.options),
        }
    }
}

impl From<&str> for ChainEntry {
    fn from(id: &str) -> Self {
        ChainEntry::new(id)
    }
}

fn default_source_root() -> PathBuf {
    PathBuf::from("src")
}

impl BundlessConfig {
    pub fn new(
        id: impl Into<String>,
        source_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            source_root: source_root.into(),
            output_root: output_root.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            chains: BTreeMap::new(),
            default_chain: Vec::new(),
            transformers: BTreeMap::new(),
        }
    }

    /// Set the chain for an extension (a leading dot is ignored)
    pub fn with_chain<E: Into<ChainEntry>>(
        mut self,
        extension: &str,
        entries: impl IntoIterator<Item = E>,
    ) -> Self {
        self.chains.insert(
            normalize_extension(extension),
            entries.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn with_default_chain<E: Into<ChainEntry>>(
        mut self,
        entries: impl IntoIterator<Item = E>,
    ) -> Self {
        self.default_chain = entries.into_iter().map(Into::into).collect();
        self
    }

    /// Set target-level options for a transformer
    pub fn with_transformer_options(mut self, id: impl Into<String>, options: RawOptions) -> Self {
        self.transformers.insert(id.into(), options);
        self
    }

    pub fn include(mut self, glob: impl Into<String>) -> Self {
        self.include.push(glob.into());
        self
    }

    pub fn exclude(mut self, glob: impl Into<String>) -> Self {
        self.exclude.push(glob.into());
        self
    }

    /// Chain configured for an extension, tolerating a leading dot in config keys
    pub fn chain_for(&self, extension: &str) -> Option<&[ChainEntry]> {
        self.chains
            .get(extension)
            .or_else(|| self.chains.get(&format!(".{}", extension)))
            .map(Vec::as_slice)
    }
}

impl BuildConfig {
    pub fn new(targets: Vec<BundlessConfig>) -> Self {
        Self {
            build: BuildSettings::default(),
            targets,
        }
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the default locations
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_locations = ["bundless.toml", ".bundless.toml", "config/bundless.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "bundless", "bundless") {
            let user_config = config_dir.config_dir().join("bundless.toml");
            if user_config.exists() {
                builder = builder.add_source(File::from(user_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        // BUNDLESS__BUILD__CONCURRENCY=8
        builder = builder.add_source(
            Environment::with_prefix("BUNDLESS")
                .separator("__")
                .try_parsing(true),
        );

        let config: BuildConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: BuildConfig = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| BuildError::Config(e.to_string()))?;
        std::fs::write(path, content).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Structural checks that do not need the registry
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(BuildError::Config("no targets configured".to_string()));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.id.trim().is_empty() {
                return Err(BuildError::Config("target id must not be empty".to_string()));
            }
            if !seen.insert(target.id.as_str()) {
                return Err(BuildError::Config(format!(
                    "duplicate target id '{}'",
                    target.id
                )));
            }
            if target.chains.keys().any(|ext| normalize_extension(ext).is_empty()) {
                return Err(BuildError::Config(format!(
                    "target '{}' has a chain with an empty extension key",
                    target.id
                )));
            }
        }

        if self.build.concurrency == Some(0) {
            return Err(BuildError::Config("concurrency must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Make relative source and output roots absolute against `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        for target in &mut self.targets {
            if target.source_root.is_relative() {
                target.source_root = base.join(&target.source_root);
            }
            if target.output_root.is_relative() {
                target.output_root = base.join(&target.output_root);
            }
        }
    }

    /// Effective worker count
    pub fn concurrency(&self) -> usize {
        self.build.concurrency.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn target(&self, id: &str) -> Option<&BundlessConfig> {
        self.targets.iter().find(|t| t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[build]
concurrency = 2

[[targets]]
id = "esm"
output_root = "dist/esm"
exclude = ["**/*.test.ts"]
default_chain = ["strip-comments"]

[targets.chains]
ts = ["define", { transformer = "banner", options = { text = "/* esm */" } }]

[targets.transformers.define]
replacements = { version = "1" }

[[targets]]
id = "types"
source_root = "lib"
output_root = "dist/types"
"#;

    #[test]
    fn test_parse_toml() {
        let config = BuildConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.concurrency(), 2);
        assert_eq!(config.targets.len(), 2);

        let esm = config.target("esm").unwrap();
        assert_eq!(esm.source_root, PathBuf::from("src"));
        assert_eq!(esm.default_chain, vec![ChainEntry::new("strip-comments")]);

        let chain = esm.chain_for("ts").unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0], ChainEntry::new("define"));
        assert_eq!(chain[1].transformer(), "banner");
        assert_eq!(
            chain[1].options().and_then(|o| o.get("text")),
            Some(&serde_json::json!("/* esm */"))
        );

        assert!(esm.transformers.contains_key("define"));
        assert_eq!(config.target("types").unwrap().source_root, PathBuf::from("lib"));
    }

    #[test]
    fn test_misspelled_chain_entry_key_rejected() {
        let toml = r#"
[[targets]]
id = "esm"
output_root = "dist"

[targets.chains]
js = [{ transformer = "banner", option = { text = "x" } }]
"#;
        assert!(matches!(
            BuildConfig::from_toml_str(toml),
            Err(BuildError::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let config = BuildConfig::new(vec![
            BundlessConfig::new("esm", "src", "a"),
            BundlessConfig::new("esm", "src", "b"),
        ]);
        assert!(matches!(config.validate(), Err(BuildError::Config(_))));
    }

    #[test]
    fn test_no_targets_rejected() {
        assert!(BuildConfig::default().validate().is_err());
    }

    #[test]
    fn test_chain_for_tolerates_dot() {
        let mut target = BundlessConfig::new("esm", "src", "dist");
        target
            .chains
            .insert(".js".to_string(), vec![ChainEntry::new("banner")]);
        assert!(target.chain_for("js").is_some());

        let target = BundlessConfig::new("esm", "src", "dist").with_chain(".ts", ["define"]);
        assert!(target.chains.contains_key("ts"));
    }

    #[test]
    fn test_resolve_paths() {
        let mut config = BuildConfig::new(vec![BundlessConfig::new("esm", "src", "/abs/out")]);
        config.resolve_paths(Path::new("/project"));
        assert_eq!(config.targets[0].source_root, PathBuf::from("/project/src"));
        assert_eq!(config.targets[0].output_root, PathBuf::from("/abs/out"));
    }

    #[test]
    fn test_serialize_config() {
        let config = BuildConfig::from_toml_str(SAMPLE).unwrap();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[build]"));
        assert!(toml_str.contains("[[targets]]"));
    }
}
