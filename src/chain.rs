//! Chain resolution
//!
//! Decides which transformers run, in which order and with which options, for
//! one file under one target. Resolution is a pure function of the file's
//! relative path and the target configuration.
//!
//! Matching rules:
//! - a file's kind is its extension suffixes, longest first (`a.d.ts` gives
//!   `d.ts` then `ts`);
//! - the longest suffix with a configured chain wins, regardless of the
//!   order chains were declared in;
//! - otherwise the target's default chain applies;
//! - otherwise, or when the matching chain is empty, the file is a
//!   passthrough and is copied unmodified. Passthrough is not an error.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{BundlessConfig, ChainEntry};
use crate::schema::RawOptions;

/// One resolved chain step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainStep {
    pub transformer: String,
    /// Target-level options for this id overlaid with the entry's own options
    pub options: RawOptions,
}

/// Which part of the configuration produced a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "extension", rename_all = "snake_case")]
pub enum ChainMatch {
    Extension(String),
    Default,
}

/// Result of chain resolution for one (file, target) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ResolvedChain {
    /// Copy the file unmodified
    Passthrough,
    Transform {
        matched: ChainMatch,
        steps: Vec<ChainStep>,
    },
}

impl ResolvedChain {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, ResolvedChain::Passthrough)
    }

    pub fn steps(&self) -> &[ChainStep] {
        match self {
            ResolvedChain::Passthrough => &[],
            ResolvedChain::Transform { steps, .. } => steps,
        }
    }
}

/// Resolve the chain for `relative_path` under `config`
pub fn resolve_chain(relative_path: &Path, config: &BundlessConfig) -> ResolvedChain {
    for extension in extension_candidates(relative_path) {
        if let Some(entries) = config.chain_for(&extension) {
            return build_chain(ChainMatch::Extension(extension), entries, config);
        }
    }

    if config.default_chain.is_empty() {
        ResolvedChain::Passthrough
    } else {
        build_chain(ChainMatch::Default, &config.default_chain, config)
    }
}

fn build_chain(matched: ChainMatch, entries: &[ChainEntry], config: &BundlessConfig) -> ResolvedChain {
    if entries.is_empty() {
        return ResolvedChain::Passthrough;
    }

    let steps = entries
        .iter()
        .map(|entry| {
            let mut options = config
                .transformers
                .get(entry.transformer())
                .cloned()
                .unwrap_or_default();
            if let Some(overrides) = entry.options() {
                for (key, value) in overrides {
                    options.insert(key.clone(), value.clone());
                }
            }
            ChainStep {
                transformer: entry.transformer().to_string(),
                options,
            }
        })
        .collect();

    ResolvedChain::Transform { matched, steps }
}

/// Extension suffixes of a file name, longest first.
///
/// A leading dot (dotfiles) does not start an extension.
pub fn extension_candidates(path: &Path) -> Vec<String> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Vec::new();
    };
    let offset = usize::from(name.starts_with('.'));
    let stem = &name[offset..];

    stem.match_indices('.')
        .map(|(i, _)| &stem[i + 1..])
        .filter(|suffix| !suffix.is_empty())
        .map(str::to_string)
        .collect()
}

/// Replace the `old` extension suffix of `path` with `new`
pub fn replace_extension(path: &Path, old: &str, new: &str) -> PathBuf {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return path.to_path_buf();
    };
    let Some(base) = name
        .strip_suffix(old)
        .and_then(|rest| rest.strip_suffix('.'))
    else {
        return path.to_path_buf();
    };

    let renamed = if new.is_empty() {
        base.to_string()
    } else {
        format!("{}.{}", base, new)
    };
    path.with_file_name(renamed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opts(value: serde_json::Value) -> RawOptions {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_extension_candidates() {
        assert_eq!(extension_candidates(Path::new("a/b.d.ts")), vec!["d.ts", "ts"]);
        assert_eq!(extension_candidates(Path::new("x.js")), vec!["js"]);
        assert!(extension_candidates(Path::new("Makefile")).is_empty());
        assert!(extension_candidates(Path::new(".eslintrc")).is_empty());
        assert_eq!(extension_candidates(Path::new(".eslintrc.js")), vec!["js"]);
        assert!(extension_candidates(Path::new("trailing.")).is_empty());
    }

    #[test]
    fn test_replace_extension() {
        assert_eq!(
            replace_extension(Path::new("lib/a.ts"), "ts", "js"),
            PathBuf::from("lib/a.js")
        );
        assert_eq!(
            replace_extension(Path::new("a.d.ts"), "d.ts", "d.mts"),
            PathBuf::from("a.d.mts")
        );
        assert_eq!(
            replace_extension(Path::new("a.ts"), "js", "mjs"),
            PathBuf::from("a.ts")
        );
    }

    #[test]
    fn test_no_chain_is_passthrough() {
        let config = BundlessConfig::new("types", "src", "dist");
        assert_eq!(resolve_chain(Path::new("b.ts"), &config), ResolvedChain::Passthrough);
    }

    #[test]
    fn test_empty_chain_is_passthrough() {
        let config = BundlessConfig::new("esm", "src", "dist")
            .with_default_chain(["banner"])
            .with_chain("json", Vec::<ChainEntry>::new());
        assert!(resolve_chain(Path::new("data.json"), &config).is_passthrough());
    }

    #[test]
    fn test_specific_extension_beats_default_and_shorter() {
        let config = BundlessConfig::new("esm", "src", "dist")
            .with_default_chain(["banner"])
            .with_chain("ts", ["define"])
            .with_chain("d.ts", ["strip-comments"]);

        let chain = resolve_chain(Path::new("types/a.d.ts"), &config);
        assert_eq!(
            chain,
            ResolvedChain::Transform {
                matched: ChainMatch::Extension("d.ts".to_string()),
                steps: vec![ChainStep {
                    transformer: "strip-comments".to_string(),
                    options: RawOptions::new(),
                }],
            }
        );

        let chain = resolve_chain(Path::new("a.ts"), &config);
        assert_eq!(chain.steps()[0].transformer, "define");

        let chain = resolve_chain(Path::new("a.css"), &config);
        match chain {
            ResolvedChain::Transform { matched, steps } => {
                assert_eq!(matched, ChainMatch::Default);
                assert_eq!(steps[0].transformer, "banner");
            }
            other => panic!("Expected default chain, got {:?}", other),
        }
    }

    #[test]
    fn test_entry_options_override_target_options() {
        let config = BundlessConfig::new("esm", "src", "dist")
            .with_transformer_options("banner", opts(json!({ "text": "a", "position": "top" })))
            .with_transformer_options("define", opts(json!({ "replacements": {} })))
            .with_chain(
                "js",
                [ChainEntry::with_options("banner", opts(json!({ "text": "b" })))],
            );

        let chain = resolve_chain(Path::new("x.js"), &config);
        let steps = chain.steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(
            steps[0].options,
            opts(json!({ "text": "b", "position": "top" }))
        );
    }

    #[test]
    fn test_resolution_is_pure() {
        let config = BundlessConfig::new("esm", "src", "dist")
            .with_chain("ts", ["define", "banner"])
            .with_default_chain(["strip-comments"]);

        let first = resolve_chain(Path::new("a.ts"), &config);
        let _ = resolve_chain(Path::new("b.css"), &config);
        let _ = resolve_chain(Path::new("c.d.ts"), &config);
        let second = resolve_chain(Path::new("a.ts"), &config);
        assert_eq!(first, second);
    }
}
