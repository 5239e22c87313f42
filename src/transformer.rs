//! Transformer plugin contract
//!
//! An engine plugs into the pipeline as a [`TransformerDescriptor`]: its id,
//! optional option schema and declared extension remap are plain data known
//! before any instance exists. The descriptor's factory builds a
//! [`Transformer`] for one validated configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::BundlessConfig;
use crate::error::TransformError;
use crate::schema::{OptionSchema, ValidatedOptions};

/// A constructed transformer bound to one resolved configuration.
///
/// `process` must be callable repeatedly with unrelated content and must fail,
/// not pass content through, on input it cannot handle.
pub trait Transformer: Send + Sync {
    fn process(&self, content: &str) -> Result<String, TransformError>;
}

/// Everything a factory sees when constructing a transformer
#[derive(Debug, Clone, Copy)]
pub struct TransformerContext<'a> {
    /// Target being built (e.g. `esm`, `cjs`)
    pub target: &'a str,
    /// This transformer's validated options
    pub options: &'a ValidatedOptions,
    /// The whole target configuration
    pub config: &'a BundlessConfig,
}

pub type TransformerFactory = Arc<
    dyn Fn(&TransformerContext<'_>) -> Result<Box<dyn Transformer>, TransformError> + Send + Sync,
>;

/// Registration record for a transformer engine
#[derive(Clone)]
pub struct TransformerDescriptor {
    id: String,
    description: String,
    schema: Option<OptionSchema>,
    /// Input extension -> output extension, without leading dots
    extension_remap: BTreeMap<String, String>,
    factory: TransformerFactory,
}

impl TransformerDescriptor {
    pub fn new<F>(id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&TransformerContext<'_>) -> Result<Box<dyn Transformer>, TransformError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            id: id.into(),
            description: String::new(),
            schema: None,
            extension_remap: BTreeMap::new(),
            factory: Arc::new(factory),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_schema(mut self, schema: OptionSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Declare that files with extension `from` come out with extension `to`
    pub fn with_extension_remap(mut self, from: &str, to: &str) -> Self {
        self.extension_remap
            .insert(normalize_extension(from), normalize_extension(to));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> Option<&OptionSchema> {
        self.schema.as_ref()
    }

    pub fn extension_remap(&self) -> &BTreeMap<String, String> {
        &self.extension_remap
    }

    /// Output extension for a file with the given extension, if remapped
    pub fn remap_extension(&self, extension: &str) -> Option<&str> {
        self.extension_remap.get(extension).map(String::as_str)
    }

    /// Construct an instance for one validated configuration
    pub fn instantiate(
        &self,
        context: &TransformerContext<'_>,
    ) -> Result<Box<dyn Transformer>, TransformError> {
        (self.factory)(context)
    }
}

impl fmt::Debug for TransformerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformerDescriptor")
            .field("id", &self.id)
            .field("schema", &self.schema)
            .field("extension_remap", &self.extension_remap)
            .finish_non_exhaustive()
    }
}

/// Extensions are stored without a leading dot
pub(crate) fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_string()
}

/// Adapter so plain closures can serve as transformers
pub struct FnTransformer<F>(pub F);

impl<F> Transformer for FnTransformer<F>
where
    F: Fn(&str) -> Result<String, TransformError> + Send + Sync,
{
    fn process(&self, content: &str) -> Result<String, TransformError> {
        (self.0)(content)
    }
}
