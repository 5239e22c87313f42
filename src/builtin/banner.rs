//! `banner`: prepend or append a fixed text block

use serde::Deserialize;
use serde_json::json;

use crate::error::TransformError;
use crate::schema::{OptionRule, OptionSchema};
use crate::transformer::{Transformer, TransformerDescriptor};

pub const ID: &str = "banner";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Top,
    Bottom,
}

#[derive(Debug, Clone, Deserialize)]
struct BannerOptions {
    text: String,
    position: Position,
}

#[derive(Debug, Clone)]
pub struct BannerTransformer {
    text: String,
    position: Position,
}

impl BannerTransformer {
    pub fn new(text: impl Into<String>, position: Position) -> Self {
        Self {
            text: text.into(),
            position,
        }
    }
}

impl Transformer for BannerTransformer {
    fn process(&self, content: &str) -> Result<String, TransformError> {
        Ok(match self.position {
            Position::Top => format!("{}\n{}", self.text, content),
            Position::Bottom if content.is_empty() || content.ends_with('\n') => {
                format!("{}{}\n", content, self.text)
            }
            Position::Bottom => format!("{}\n{}\n", content, self.text),
        })
    }
}

pub fn descriptor() -> TransformerDescriptor {
    TransformerDescriptor::new(ID, |ctx| {
        let options: BannerOptions = ctx
            .options
            .deserialize()
            .map_err(|e| TransformError::new(format!("invalid banner options: {}", e)))?;
        Ok(Box::new(BannerTransformer::new(options.text, options.position)))
    })
    .with_description("Add a fixed text block at the top or bottom of each file")
    .with_schema(
        OptionSchema::new()
            .field(
                "text",
                OptionRule::string().required().describe("Banner text, inserted verbatim"),
            )
            .field(
                "position",
                OptionRule::new(json!({ "enum": ["top", "bottom"] }))
                    .with_default(json!("top"))
                    .describe("Where to place the banner"),
            ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top() {
        let banner = BannerTransformer::new("/* lib */", Position::Top);
        assert_eq!(banner.process("var a;").unwrap(), "/* lib */\nvar a;");
    }

    #[test]
    fn test_bottom() {
        let banner = BannerTransformer::new("//# end", Position::Bottom);
        assert_eq!(banner.process("var a;\n").unwrap(), "var a;\n//# end\n");
        assert_eq!(banner.process("var a;").unwrap(), "var a;\n//# end\n");
    }
}
