//! Build outcome reporting
//!
//! The pipeline never stops at the first problem. Every failing unit ends up
//! here as a [`UnitError`], tagged with its target, file and transformer, so
//! the caller can render one complete report.

use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::BuildError;

/// Overall result of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildOutcome {
    Success,
    Failure,
}

/// One failure, tagged with where it happened
#[derive(Debug, Serialize)]
pub struct UnitError {
    /// Target id
    pub target: String,
    /// Source path relative to the target's source root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// Output path relative to the target's output root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformer: Option<String>,
    /// Offending option fields, for schema violations
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    pub kind: &'static str,
    pub message: String,
    #[serde(skip)]
    pub error: BuildError,
}

impl UnitError {
    pub fn new(target: impl Into<String>, source: Option<PathBuf>, error: BuildError) -> Self {
        let output = match &error {
            BuildError::OutputCollision { path, .. } => Some(path.clone()),
            _ => None,
        };
        let fields = match &error {
            BuildError::SchemaValidation { violations, .. } => {
                violations.iter().map(|v| v.field.clone()).collect()
            }
            _ => Vec::new(),
        };

        Self {
            target: target.into(),
            source,
            output,
            transformer: error.transformer().map(str::to_string),
            fields,
            kind: error.kind(),
            message: error.to_string(),
            error,
        }
    }

    fn sort_key(&self) -> (&str, Option<&PathBuf>, Option<&PathBuf>, &str, Option<&str>) {
        (
            self.target.as_str(),
            self.source.as_ref(),
            self.output.as_ref(),
            self.kind,
            self.transformer.as_deref(),
        )
    }
}

/// Final report of a build
#[derive(Debug, Serialize)]
pub struct BuildReport {
    pub outcome: BuildOutcome,
    /// Units planned for execution
    pub units: usize,
    /// Files written with transformed content
    pub transformed: usize,
    /// Files copied unmodified
    pub passthrough: usize,
    /// Whether scheduling stopped early after a fatal error
    pub halted: bool,
    pub errors: Vec<UnitError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BuildReport {
    /// Assemble a report; errors are sorted so output is stable across runs
    pub fn new(
        units: usize,
        transformed: usize,
        passthrough: usize,
        halted: bool,
        mut errors: Vec<UnitError>,
        started_at: DateTime<Utc>,
    ) -> Self {
        errors.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        let outcome = if errors.is_empty() && !halted {
            BuildOutcome::Success
        } else {
            BuildOutcome::Failure
        };

        Self {
            outcome,
            units,
            transformed,
            passthrough,
            halted,
            errors,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == BuildOutcome::Success
    }

    /// Process exit code: 0 on full success, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// Files written, transformed or copied
    pub fn written(&self) -> usize {
        self.transformed + self.passthrough
    }

    /// Errors of one class (see [`BuildError::kind`])
    pub fn errors_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a UnitError> + 'a {
        self.errors.iter().filter(move |e| e.kind == kind)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable report
    pub fn render(&self) -> String {
        let mut out = String::new();
        let elapsed = self.finished_at - self.started_at;

        for error in &self.errors {
            let location = error
                .source
                .as_ref()
                .or(error.output.as_ref())
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(out, "❌ [{}] {}: {}", error.target, location, error.message);
        }
        if !self.errors.is_empty() {
            out.push('\n');
        }

        match self.outcome {
            BuildOutcome::Success => {
                let _ = writeln!(
                    out,
                    "✅ Built {} file(s) ({} transformed, {} copied) in {} ms",
                    self.written(),
                    self.transformed,
                    self.passthrough,
                    elapsed.num_milliseconds()
                );
            }
            BuildOutcome::Failure => {
                let _ = writeln!(
                    out,
                    "❌ Build failed with {} error(s); {} of {} unit(s) written{}",
                    self.errors.len(),
                    self.written(),
                    self.units,
                    if self.halted { " (stopped early)" } else { "" }
                );
            }
        }
        out
    }
}
