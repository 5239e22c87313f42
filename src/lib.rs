//! Bundless
//!
//! A bundless build tool core: every source file is transformed on its own
//! and written to the output tree at the same relative path, once per
//! configured target (e.g. `esm`, `cjs`, `types`).
//!
//! ## Features
//!
//! - **Pluggable engines**: transformers register a descriptor with an id, an
//!   option schema and an extension remap
//! - **Per-extension chains**: the longest matching extension picks the chain,
//!   unmatched files pass through unchanged
//! - **Exhaustive validation**: unknown ids, bad options and output collisions
//!   are reported for every unit before anything is written
//! - **Parallel execution**: units run on a bounded pool of worker threads
//!
//! ## Architecture
//!
//! ```text
//! BuildConfig ──▶ Pipeline::plan ──▶ BuildPlan ──▶ workers ──▶ OutputWriter
//!                    │                               │
//!                    ├─ source::enumerate            └─ Transformer::process
//!                    ├─ chain::resolve_chain
//!                    ├─ TransformerRegistry::resolve
//!                    └─ schema::validate
//! ```

pub mod builtin;
pub mod chain;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod schema;
pub mod source;
pub mod transformer;

pub use chain::{resolve_chain, ChainMatch, ChainStep, ResolvedChain};
pub use config::{BuildConfig, BundlessConfig, ChainEntry};
pub use error::{BuildError, RegistryError, Result, TransformError, WriteError};
pub use output::OutputWriter;
pub use pipeline::{build, BuildPlan, Pipeline, PlannedUnit, TransformResult, UnitSummary};
pub use registry::TransformerRegistry;
pub use report::{BuildOutcome, BuildReport, UnitError};
pub use schema::{validate, FieldViolation, OptionRule, OptionSchema, ValidatedOptions, Validation};
pub use source::SourceFile;
pub use transformer::{
    FnTransformer, Transformer, TransformerContext, TransformerDescriptor, TransformerFactory,
};
