//! Built-in transformer engines
//!
//! These are registered by [`TransformerRegistry::with_builtins`]. Real
//! syntax engines (downleveling, native compilers) plug in through the same
//! [`TransformerDescriptor`] contract.
//!
//! [`TransformerRegistry::with_builtins`]: crate::registry::TransformerRegistry::with_builtins

pub mod banner;
pub mod define;
pub mod strip_comments;

use crate::transformer::TransformerDescriptor;

pub use banner::BannerTransformer;
pub use define::DefineTransformer;
pub use strip_comments::StripCommentsTransformer;

/// Descriptors for every built-in engine
pub fn descriptors() -> Vec<TransformerDescriptor> {
    vec![
        banner::descriptor(),
        define::descriptor(),
        strip_comments::descriptor(),
    ]
}
