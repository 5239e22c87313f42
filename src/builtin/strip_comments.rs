//! `strip-comments`: remove `//` and `/* */` comments from JS/TS-like sources
//!
//! String, template and regex literals are copied untouched. A `/` starts a
//! regex literal where an expression may begin (after an operator, an opening
//! bracket or a keyword such as `return`) and is division otherwise. Line
//! structure is kept so that positions in later diagnostics still point at the
//! right line.

use std::iter::Peekable;
use std::str::Chars;

use serde_json::json;

use crate::error::TransformError;
use crate::schema::{OptionRule, OptionSchema};
use crate::transformer::{Transformer, TransformerDescriptor};

pub const ID: &str = "strip-comments";

#[derive(Debug, Clone, Default)]
pub struct StripCommentsTransformer {
    /// Keep `/*! ... */` license comments
    preserve_license: bool,
}

impl StripCommentsTransformer {
    pub fn new(preserve_license: bool) -> Self {
        Self { preserve_license }
    }
}

/// Keywords after which `/` starts a regex literal
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case",
    "do", "else", "yield", "await",
];

/// Punctuation after which `/` starts a regex literal
const REGEX_PUNCTUATORS: &str = "(,=:[!&|?{};+-*%<>~^";

/// Last significant token, enough to tell a regex from division
#[derive(Debug, Clone, PartialEq, Eq)]
enum Prev {
    Start,
    Word(String),
    Punct(char),
    Literal,
}

impl Prev {
    fn allows_regex(&self) -> bool {
        match self {
            Prev::Start => true,
            Prev::Word(word) => REGEX_KEYWORDS.contains(&word.as_str()),
            Prev::Punct(c) => REGEX_PUNCTUATORS.contains(*c),
            Prev::Literal => false,
        }
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

struct Scanner<'a> {
    chars: Peekable<Chars<'a>>,
    output: String,
    line: usize,
    prev: Prev,
    /// Whether the last consumed char continues an identifier
    in_word: bool,
}

impl<'a> Scanner<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            chars: content.chars().peekable(),
            output: String::with_capacity(content.len()),
            line: 1,
            prev: Prev::Start,
            in_word: false,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn peek_is(&mut self, expected: char) -> bool {
        self.chars.peek() == Some(&expected)
    }

    fn copy_string(&mut self, quote: char) -> Result<(), TransformError> {
        let start = self.line;
        while let Some(c) = self.advance() {
            self.output.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = self.advance() {
                        self.output.push(escaped);
                    }
                }
                '\n' if quote != '`' => {
                    return Err(TransformError::new(format!(
                        "unterminated string literal on line {}",
                        start
                    )));
                }
                c if c == quote => return Ok(()),
                _ => {}
            }
        }
        Err(TransformError::new(format!(
            "unterminated string literal on line {}",
            start
        )))
    }

    /// Copy a regex literal whose opening `/` was already emitted
    fn copy_regex(&mut self) -> Result<(), TransformError> {
        let start = self.line;
        let mut in_class = false;
        while let Some(c) = self.advance() {
            if c == '\n' {
                break;
            }
            self.output.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = self.advance() {
                        self.output.push(escaped);
                    }
                }
                '[' => in_class = true,
                ']' => in_class = false,
                '/' if !in_class => {
                    while let Some(&flag) = self.chars.peek() {
                        if !flag.is_ascii_alphabetic() {
                            break;
                        }
                        self.output.push(flag);
                        self.chars.next();
                    }
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(TransformError::new(format!(
            "unterminated regex literal on line {}",
            start
        )))
    }

    /// Emit a code char and track the token it belongs to
    fn push_code(&mut self, c: char) {
        self.output.push(c);
        if is_identifier_char(c) {
            if let (Prev::Word(word), true) = (&mut self.prev, self.in_word) {
                word.push(c);
            } else {
                self.prev = Prev::Word(c.to_string());
            }
            self.in_word = true;
        } else {
            if !c.is_whitespace() {
                self.prev = Prev::Punct(c);
            }
            self.in_word = false;
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.chars.next();
        }
    }

    fn block_comment(&mut self, preserve_license: bool) -> Result<(), TransformError> {
        let start = self.line;
        let keep = preserve_license && self.peek_is('!');
        let mut body = String::from("/*");
        loop {
            let Some(c) = self.advance() else {
                return Err(TransformError::new(format!(
                    "unterminated block comment starting on line {}",
                    start
                )));
            };
            body.push(c);
            if c == '*' && self.peek_is('/') {
                self.chars.next();
                body.push('/');
                break;
            }
        }

        if keep {
            self.output.push_str(&body);
        } else {
            self.output
                .extend(body.chars().filter(|&c| c == '\n'));
        }
        Ok(())
    }
}

impl Transformer for StripCommentsTransformer {
    fn process(&self, content: &str) -> Result<String, TransformError> {
        let mut scanner = Scanner::new(content);

        while let Some(c) = scanner.advance() {
            match c {
                '"' | '\'' | '`' => {
                    scanner.output.push(c);
                    scanner.copy_string(c)?;
                    scanner.prev = Prev::Literal;
                    scanner.in_word = false;
                }
                '/' if scanner.peek_is('/') => {
                    scanner.skip_line_comment();
                    scanner.in_word = false;
                }
                '/' if scanner.peek_is('*') => {
                    scanner.chars.next();
                    scanner.block_comment(self.preserve_license)?;
                    scanner.in_word = false;
                }
                '/' if scanner.prev.allows_regex() => {
                    scanner.output.push(c);
                    scanner.copy_regex()?;
                    scanner.prev = Prev::Literal;
                    scanner.in_word = false;
                }
                _ => scanner.push_code(c),
            }
        }

        Ok(scanner.output)
    }
}

pub fn descriptor() -> TransformerDescriptor {
    TransformerDescriptor::new(ID, |ctx| {
        let preserve_license = ctx.options.get_bool("preserve_license").unwrap_or(true);
        Ok(Box::new(StripCommentsTransformer::new(preserve_license)))
    })
    .with_description("Remove line and block comments")
    .with_schema(OptionSchema::new().field(
        "preserve_license",
        OptionRule::boolean()
            .with_default(json!(true))
            .describe("Keep /*! ... */ comments"),
    ))
}
