//! Pipeline executor
//!
//! A build runs in two phases:
//!
//! 1. **Planning** enumerates every (file, target) unit, resolves its chain,
//!    looks up each transformer, validates its options and computes the output
//!    path from the declared extension remaps. Nothing is read or written.
//!    Configuration mistakes are collected for every unit and the offending
//!    units are dropped; output paths claimed by more than one source file are
//!    reported once per path and all colliding units are dropped.
//! 2. **Execution** runs the remaining units on a bounded pool of scoped
//!    worker threads. A unit either writes its fully transformed output or
//!    nothing.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chain::{extension_candidates, replace_extension, resolve_chain, ChainStep};
use crate::config::{BuildConfig, BundlessConfig};
use crate::error::{BuildError, TransformError, WriteError};
use crate::output::OutputWriter;
use crate::registry::TransformerRegistry;
use crate::report::{BuildReport, UnitError};
use crate::schema::{self, FieldViolation, ValidatedOptions};
use crate::source::{self, SourceFile};
use crate::transformer::{TransformerContext, TransformerDescriptor};

/// One transformer invocation within a planned unit
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub descriptor: Arc<TransformerDescriptor>,
    pub options: ValidatedOptions,
}

/// A (file, target) pair that passed planning
#[derive(Debug)]
pub struct PlannedUnit {
    /// Index into [`BuildConfig::targets`]
    pub target_index: usize,
    pub target: String,
    pub source: Arc<SourceFile>,
    /// Empty for passthrough
    pub steps: Vec<PlannedStep>,
    /// Relative to the target's output root
    pub output_path: PathBuf,
    /// Last transformer whose remap changed the output extension
    pub extension_set_by: Option<String>,
}

impl PlannedUnit {
    pub fn is_passthrough(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn summary(&self) -> UnitSummary {
        UnitSummary {
            target: self.target.clone(),
            source: self.source.relative_path().to_path_buf(),
            output: self.output_path.clone(),
            chain: self
                .steps
                .iter()
                .map(|s| s.descriptor.id().to_string())
                .collect(),
        }
    }
}

/// Serializable view of a planned unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSummary {
    pub target: String,
    pub source: PathBuf,
    pub output: PathBuf,
    pub chain: Vec<String>,
}

/// Result of the planning phase
#[derive(Debug, Default)]
pub struct BuildPlan {
    pub units: Vec<PlannedUnit>,
    pub errors: Vec<UnitError>,
}

impl BuildPlan {
    pub fn summaries(&self) -> Vec<UnitSummary> {
        self.units.iter().map(PlannedUnit::summary).collect()
    }
}

/// Final content of one unit, before it is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResult {
    pub content: Vec<u8>,
    pub output_path: PathBuf,
    pub extension_set_by: Option<String>,
}

impl TransformResult {
    /// Content as text, when it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

/// Per-worker tallies, merged after the pool joins
#[derive(Debug, Default)]
struct WorkerTally {
    transformed: usize,
    passthrough: usize,
    errors: Vec<UnitError>,
}

type ValidationCache = HashMap<(String, String), Result<ValidatedOptions, Vec<FieldViolation>>>;

/// Build driver over a loaded configuration and a finished registry
pub struct Pipeline<'a> {
    config: &'a BuildConfig,
    registry: &'a TransformerRegistry,
    concurrency: usize,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a BuildConfig, registry: &'a TransformerRegistry) -> Self {
        Self {
            config,
            registry,
            concurrency: config.concurrency(),
        }
    }

    /// Override the configured worker count (at least one worker is used)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Plan and execute the build
    pub fn run(&self) -> BuildReport {
        info!(
            targets = self.config.targets.len(),
            concurrency = self.concurrency,
            "starting build"
        );
        self.run_plan(self.plan())
    }

    /// Execute an already computed plan; its errors are carried into the report
    pub fn run_plan(&self, plan: BuildPlan) -> BuildReport {
        let started_at = Utc::now();
        let units = plan.units.len();
        let writer = OutputWriter::new();
        let (tally, halted) = self.execute(&plan, &writer);

        let mut errors = plan.errors;
        errors.extend(tally.errors);
        let report = BuildReport::new(
            units,
            tally.transformed,
            tally.passthrough,
            halted,
            errors,
            started_at,
        );

        info!(
            outcome = ?report.outcome,
            written = writer.written(),
            errors = report.errors.len(),
            halted,
            "build finished"
        );
        report
    }

    /// Planning phase; reads and writes nothing
    pub fn plan(&self) -> BuildPlan {
        let mut plan = BuildPlan::default();
        let mut cache = ValidationCache::new();
        let mut sources: HashMap<PathBuf, Arc<SourceFile>> = HashMap::new();

        // Output roots nested in a source root must not be read back as sources
        let skip: Vec<PathBuf> = self
            .config
            .targets
            .iter()
            .map(|t| t.output_root.clone())
            .collect();

        for (target_index, target) in self.config.targets.iter().enumerate() {
            if target.source_root.starts_with(&target.output_root) {
                let err = BuildError::Config(format!(
                    "target '{}': output root {} contains source root {}",
                    target.id,
                    target.output_root.display(),
                    target.source_root.display()
                ));
                warn!(target_id = %target.id, error = %err, "unusable output root");
                plan.errors.push(UnitError::new(&target.id, None, err));
                continue;
            }

            let files = match source::enumerate(target, &skip) {
                Ok(files) => files,
                Err(err) => {
                    warn!(target_id = %target.id, error = %err, "cannot enumerate sources");
                    plan.errors.push(UnitError::new(&target.id, None, err));
                    continue;
                }
            };

            let mut by_output: BTreeMap<PathBuf, Vec<PlannedUnit>> = BTreeMap::new();
            for relative in files {
                match self.plan_unit(target, &relative, &mut cache) {
                    Ok((steps, output_path, extension_set_by)) => {
                        let absolute = target.source_root.join(&relative);
                        let source = sources
                            .entry(absolute.clone())
                            .or_insert_with(|| Arc::new(SourceFile::new(absolute, relative)))
                            .clone();
                        by_output
                            .entry(output_path.clone())
                            .or_default()
                            .push(PlannedUnit {
                                target_index,
                                target: target.id.clone(),
                                source,
                                steps,
                                output_path,
                                extension_set_by,
                            });
                    }
                    Err(errors) => {
                        for err in errors {
                            warn!(target_id = %target.id, path = %relative.display(), error = %err, "unit rejected");
                            plan.errors
                                .push(UnitError::new(&target.id, Some(relative.clone()), err));
                        }
                    }
                }
            }

            for (output_path, mut group) in by_output {
                if group.len() == 1 {
                    if let Some(unit) = group.pop() {
                        unit.source.retain();
                        plan.units.push(unit);
                    }
                    continue;
                }
                let sources: Vec<PathBuf> = group
                    .iter()
                    .map(|u| u.source.relative_path().to_path_buf())
                    .collect();
                let err = BuildError::OutputCollision {
                    path: output_path,
                    sources,
                };
                warn!(target_id = %target.id, error = %err, "output collision");
                plan.errors.push(UnitError::new(&target.id, None, err));
            }
        }

        debug!(
            units = plan.units.len(),
            errors = plan.errors.len(),
            "planning finished"
        );
        plan
    }

    /// Resolve, look up and validate every step of one unit.
    ///
    /// Every problem in the chain is reported, not only the first.
    #[allow(clippy::type_complexity)]
    fn plan_unit(
        &self,
        target: &BundlessConfig,
        relative: &Path,
        cache: &mut ValidationCache,
    ) -> Result<(Vec<PlannedStep>, PathBuf, Option<String>), Vec<BuildError>> {
        let chain = resolve_chain(relative, target);
        let mut steps = Vec::with_capacity(chain.steps().len());
        let mut errors = Vec::new();

        for step in chain.steps() {
            let descriptor = match self.registry.resolve(&step.transformer) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    errors.push(BuildError::from(err));
                    continue;
                }
            };
            match validate_cached(cache, &descriptor, step) {
                Ok(options) => steps.push(PlannedStep {
                    descriptor,
                    options,
                }),
                Err(violations) => errors.push(BuildError::SchemaValidation {
                    transformer: step.transformer.clone(),
                    violations,
                }),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let (output_path, extension_set_by) = output_path_for(relative, &steps);
        Ok((steps, output_path, extension_set_by))
    }

    /// Execution phase over a finished plan
    fn execute(&self, plan: &BuildPlan, writer: &OutputWriter) -> (WorkerTally, bool) {
        if plan.units.is_empty() {
            return (WorkerTally::default(), false);
        }

        let workers = self.concurrency.min(plan.units.len());
        let cursor = AtomicUsize::new(0);
        let halt = AtomicBool::new(false);

        let tallies: Vec<WorkerTally> = thread::scope(|scope| {
            let (cursor, halt) = (&cursor, &halt);
            let handles: Vec<_> = (0..workers)
                .map(|_| scope.spawn(move || self.worker(plan, writer, cursor, halt)))
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        });

        let mut merged = WorkerTally::default();
        for tally in tallies {
            merged.transformed += tally.transformed;
            merged.passthrough += tally.passthrough;
            merged.errors.extend(tally.errors);
        }
        (merged, halt.load(Ordering::SeqCst))
    }

    fn worker(
        &self,
        plan: &BuildPlan,
        writer: &OutputWriter,
        cursor: &AtomicUsize,
        halt: &AtomicBool,
    ) -> WorkerTally {
        let mut tally = WorkerTally::default();

        while !halt.load(Ordering::SeqCst) {
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            let Some(unit) = plan.units.get(index) else {
                break;
            };

            debug!(
                target_id = %unit.target,
                path = %unit.source.relative_path().display(),
                steps = unit.steps.len(),
                "processing unit"
            );

            let outcome = self.run_unit(unit, writer);
            unit.source.release();

            match outcome {
                Ok(()) if unit.is_passthrough() => tally.passthrough += 1,
                Ok(()) => tally.transformed += 1,
                Err(err) => {
                    if matches!(err, BuildError::OutputCollision { .. }) {
                        halt.store(true, Ordering::SeqCst);
                    }
                    warn!(
                        target_id = %unit.target,
                        path = %unit.source.relative_path().display(),
                        error = %err,
                        "unit failed"
                    );
                    tally.errors.push(UnitError::new(
                        &unit.target,
                        Some(unit.source.relative_path().to_path_buf()),
                        err,
                    ));
                }
            }
        }

        tally
    }

    /// Target configuration a unit was planned for
    fn target_of(&self, unit: &PlannedUnit) -> Result<&'a BundlessConfig, BuildError> {
        self.config
            .targets
            .get(unit.target_index)
            .filter(|target| target.id == unit.target)
            .ok_or_else(|| {
                BuildError::Config(format!(
                    "unit {} was planned for unknown target '{}'",
                    unit.source.relative_path().display(),
                    unit.target
                ))
            })
    }

    fn run_unit(&self, unit: &PlannedUnit, writer: &OutputWriter) -> Result<(), BuildError> {
        let target = self.target_of(unit)?;
        let result = self.transform(unit)?;

        writer
            .write(
                &target.id,
                &target.output_root,
                &result.output_path,
                unit.source.relative_path(),
                &result.content,
            )
            .map_err(|err| match err {
                WriteError::Collision {
                    path, claimed_by, ..
                } => BuildError::OutputCollision {
                    path,
                    sources: vec![claimed_by, unit.source.relative_path().to_path_buf()],
                },
                WriteError::Io { path, source } => BuildError::Io { path, source },
            })?;
        Ok(())
    }

    /// Run one unit's chain without writing anything
    pub fn transform(&self, unit: &PlannedUnit) -> Result<TransformResult, BuildError> {
        let target = self.target_of(unit)?;
        let raw = unit.source.content()?;

        let content = match unit.steps.first() {
            None => raw.to_vec(),
            Some(first) => {
                let mut content = std::str::from_utf8(&raw)
                    .map_err(|e| BuildError::ContentTransform {
                        transformer: first.descriptor.id().to_string(),
                        source: TransformError::new(format!("source is not valid UTF-8: {}", e)),
                    })?
                    .to_string();

                for step in &unit.steps {
                    let context = TransformerContext {
                        target: &target.id,
                        options: &step.options,
                        config: target,
                    };
                    let failed = |source| BuildError::ContentTransform {
                        transformer: step.descriptor.id().to_string(),
                        source,
                    };
                    let transformer = step.descriptor.instantiate(&context).map_err(failed)?;
                    content = transformer.process(&content).map_err(failed)?;
                }
                content.into_bytes()
            }
        };

        Ok(TransformResult {
            content,
            output_path: unit.output_path.clone(),
            extension_set_by: unit.extension_set_by.clone(),
        })
    }
}

/// Validate once per distinct (transformer, options) pair
fn validate_cached(
    cache: &mut ValidationCache,
    descriptor: &TransformerDescriptor,
    step: &ChainStep,
) -> Result<ValidatedOptions, Vec<FieldViolation>> {
    // Map keys are ordered, so the JSON text is a stable key
    let options_key = serde_json::to_string(&step.options).unwrap_or_default();
    cache
        .entry((step.transformer.clone(), options_key))
        .or_insert_with(|| schema::validate(descriptor.schema(), &step.options).into_result())
        .clone()
}

/// Apply each step's extension remap in chain order
fn output_path_for(relative: &Path, steps: &[PlannedStep]) -> (PathBuf, Option<String>) {
    let mut path = relative.to_path_buf();
    let mut set_by = None;

    for step in steps {
        for extension in extension_candidates(&path) {
            if let Some(remapped) = step.descriptor.remap_extension(&extension) {
                path = replace_extension(&path, &extension, remapped);
                set_by = Some(step.descriptor.id().to_string());
                break;
            }
        }
    }

    (path, set_by)
}

/// Plan and run a build with the given registry
pub fn build(config: &BuildConfig, registry: &TransformerRegistry) -> BuildReport {
    Pipeline::new(config, registry).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::FnTransformer;
    use tempfile::tempdir;

    fn rename(id: &str, from: &str, to: &str) -> TransformerDescriptor {
        TransformerDescriptor::new(id, |_ctx| {
            Ok(Box::new(FnTransformer(|content: &str| {
                Ok::<_, TransformError>(content.to_string())
            })))
        })
        .with_extension_remap(from, to)
    }

    fn step(descriptor: TransformerDescriptor) -> PlannedStep {
        PlannedStep {
            descriptor: Arc::new(descriptor),
            options: ValidatedOptions::empty(),
        }
    }

    #[test]
    fn test_output_path_remaps_in_order() {
        let steps = vec![step(rename("ts", "ts", "js")), step(rename("mjs", "js", "mjs"))];
        let (path, set_by) = output_path_for(Path::new("lib/a.ts"), &steps);
        assert_eq!(path, PathBuf::from("lib/a.mjs"));
        assert_eq!(set_by.as_deref(), Some("mjs"));
    }

    #[test]
    fn test_output_path_prefers_longest_suffix() {
        let descriptor = rename("dts", "ts", "js").with_extension_remap("d.ts", "d.mts");
        let (path, _) = output_path_for(Path::new("a.d.ts"), &[step(descriptor)]);
        assert_eq!(path, PathBuf::from("a.d.mts"));
    }

    #[test]
    fn test_output_path_untouched_without_remap() {
        let (path, set_by) = output_path_for(Path::new("a.css"), &[step(rename("ts", "ts", "js"))]);
        assert_eq!(path, PathBuf::from("a.css"));
        assert!(set_by.is_none());
    }

    #[test]
    fn test_plan_shares_sources_across_targets() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.js"), "a").unwrap();

        let config = BuildConfig::new(vec![
            BundlessConfig::new("esm", &src, dir.path().join("esm")),
            BundlessConfig::new("cjs", &src, dir.path().join("cjs")),
        ]);
        let registry = TransformerRegistry::with_builtins();
        let plan = Pipeline::new(&config, &registry).plan();

        assert!(plan.errors.is_empty());
        assert_eq!(plan.units.len(), 2);
        assert!(Arc::ptr_eq(&plan.units[0].source, &plan.units[1].source));
        assert!(!plan.units[0].source.is_loaded());
    }

    #[test]
    fn test_validation_cached_per_options() {
        let registry = TransformerRegistry::with_builtins();
        let descriptor = registry.resolve("banner").unwrap();
        let mut cache = ValidationCache::new();
        let step = ChainStep {
            transformer: "banner".to_string(),
            options: serde_json::json!({ "text": "x" }).as_object().cloned().unwrap(),
        };

        let first = validate_cached(&mut cache, &descriptor, &step).unwrap();
        let second = validate_cached(&mut cache, &descriptor, &step).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(first.get_str("position"), Some("top"));
    }

    fn passthrough_unit(src: &Path, relative: &str, output: &str) -> PlannedUnit {
        let source = Arc::new(SourceFile::new(src.join(relative), relative));
        source.retain();
        PlannedUnit {
            target_index: 0,
            target: "esm".to_string(),
            source,
            steps: Vec::new(),
            output_path: PathBuf::from(output),
            extension_set_by: None,
        }
    }

    #[test]
    fn test_write_collision_stops_scheduling() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let out = dir.path().join("dist");
        std::fs::create_dir_all(&src).unwrap();
        for name in ["a.js", "b.js", "c.js"] {
            std::fs::write(src.join(name), name).unwrap();
        }

        let config = BuildConfig::new(vec![BundlessConfig::new("esm", &src, &out)]);
        let registry = TransformerRegistry::with_builtins();
        let plan = BuildPlan {
            units: vec![
                passthrough_unit(&src, "a.js", "out.js"),
                passthrough_unit(&src, "b.js", "out.js"),
                passthrough_unit(&src, "c.js", "c.js"),
            ],
            errors: Vec::new(),
        };

        let report = Pipeline::new(&config, &registry)
            .with_concurrency(1)
            .run_plan(plan);

        assert!(report.halted);
        assert!(!report.is_success());
        assert_eq!(report.passthrough, 1);
        assert_eq!(report.errors.len(), 1);
        match &report.errors[0].error {
            BuildError::OutputCollision { path, sources } => {
                assert_eq!(path, &PathBuf::from("out.js"));
                assert_eq!(sources, &vec![PathBuf::from("a.js"), PathBuf::from("b.js")]);
            }
            other => panic!("Expected OutputCollision, got {:?}", other),
        }
        assert_eq!(std::fs::read_to_string(out.join("out.js")).unwrap(), "a.js");
        assert!(!out.join("c.js").exists());
    }

    #[test]
    fn test_source_content_released_after_build() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.js"), "a").unwrap();

        let config = BuildConfig::new(vec![
            BundlessConfig::new("esm", &src, dir.path().join("esm")),
            BundlessConfig::new("cjs", &src, dir.path().join("cjs")),
        ]);
        let registry = TransformerRegistry::with_builtins();
        let pipeline = Pipeline::new(&config, &registry);
        let plan = pipeline.plan();
        let shared = Arc::clone(&plan.units[0].source);

        let report = pipeline.run_plan(plan);

        assert!(report.is_success());
        assert_eq!(report.passthrough, 2);
        assert!(!shared.is_loaded());
    }

    #[test]
    fn test_transform_rejects_unit_from_other_config() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.js"), "a").unwrap();

        let registry = TransformerRegistry::with_builtins();
        let two = BuildConfig::new(vec![
            BundlessConfig::new("esm", &src, dir.path().join("esm")),
            BundlessConfig::new("cjs", &src, dir.path().join("cjs")),
        ]);
        let plan = Pipeline::new(&two, &registry).plan();
        let cjs_unit = plan.units.iter().find(|u| u.target == "cjs").unwrap();

        let one = BuildConfig::new(vec![BundlessConfig::new("esm", &src, dir.path().join("esm"))]);
        let result = Pipeline::new(&one, &registry).transform(cjs_unit);
        assert!(matches!(result, Err(BuildError::Config(_))));
    }
}
