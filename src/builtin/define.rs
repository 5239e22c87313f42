//! `define`: replace global identifiers with literal expressions
//!
//! Keys are matched as whole identifiers (or dotted member paths such as
//! `process.env.NODE_ENV`); longer keys win over their prefixes.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;

use crate::error::TransformError;
use crate::schema::{OptionRule, OptionSchema};
use crate::transformer::{Transformer, TransformerDescriptor};

pub const ID: &str = "define";

#[derive(Debug, Clone, Deserialize)]
struct DefineOptions {
    replacements: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct DefineTransformer {
    pattern: Option<Regex>,
    replacements: BTreeMap<String, String>,
}

impl DefineTransformer {
    pub fn new(replacements: BTreeMap<String, String>) -> Result<Self, TransformError> {
        if replacements.is_empty() {
            return Ok(Self {
                pattern: None,
                replacements,
            });
        }

        let mut keys: Vec<&String> = replacements.keys().collect();
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation = keys
            .iter()
            .map(|key| regex::escape(key))
            .collect::<Vec<_>>()
            .join("|");

        let pattern = Regex::new(&format!(r"(?:^|[^\w$.])({})", alternation))
            .map_err(|e| TransformError::new(format!("invalid define key: {}", e)))?;

        Ok(Self {
            pattern: Some(pattern),
            replacements,
        })
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

impl Transformer for DefineTransformer {
    fn process(&self, content: &str) -> Result<String, TransformError> {
        let Some(pattern) = &self.pattern else {
            return Ok(content.to_string());
        };

        let mut output = String::with_capacity(content.len());
        let mut last = 0;
        for caps in pattern.captures_iter(content) {
            let Some(key) = caps.get(1) else {
                continue;
            };
            // The regex has no look-ahead, so the trailing boundary is checked here
            if content[key.end()..]
                .chars()
                .next()
                .is_some_and(is_identifier_char)
            {
                continue;
            }
            let Some(value) = self.replacements.get(key.as_str()) else {
                continue;
            };
            output.push_str(&content[last..key.start()]);
            output.push_str(value);
            last = key.end();
        }
        output.push_str(&content[last..]);
        Ok(output)
    }
}

pub fn descriptor() -> TransformerDescriptor {
    TransformerDescriptor::new(ID, |ctx| {
        let options: DefineOptions = ctx
            .options
            .deserialize()
            .map_err(|e| TransformError::new(format!("invalid define options: {}", e)))?;
        Ok(Box::new(DefineTransformer::new(options.replacements)?))
    })
    .with_description("Replace global identifiers with literal expressions")
    .with_schema(OptionSchema::new().field(
        "replacements",
        OptionRule::string_map()
            .required()
            .describe("Identifier (or dotted path) to replacement expression"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn define(pairs: &[(&str, &str)]) -> DefineTransformer {
        DefineTransformer::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_replaces_whole_identifiers() {
        let t = define(&[("VERSION", "\"1.0.0\"")]);
        assert_eq!(
            t.process("const v = VERSION; const w = MY_VERSION;").unwrap(),
            "const v = \"1.0.0\"; const w = MY_VERSION;"
        );
    }

    #[test]
    fn test_dotted_path() {
        let t = define(&[("process.env.NODE_ENV", "\"production\"")]);
        assert_eq!(
            t.process("if (process.env.NODE_ENV !== 'x') {}").unwrap(),
            "if (\"production\" !== 'x') {}"
        );
    }

    #[test]
    fn test_longest_key_wins() {
        let t = define(&[("DEBUG", "false"), ("DEBUG_LEVEL", "0")]);
        assert_eq!(t.process("DEBUG_LEVEL + DEBUG").unwrap(), "0 + false");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let t = define(&[("A", "B"), ("B", "C")]);
        assert_eq!(t.process("A B").unwrap(), "B C");
    }

    #[test]
    fn test_adjacent_keys() {
        let t = define(&[("A", "1"), ("B", "2")]);
        assert_eq!(t.process("A+B").unwrap(), "1+2");
    }

    #[test]
    fn test_empty_is_identity() {
        let t = define(&[]);
        assert_eq!(t.process("anything").unwrap(), "anything");
    }
}
