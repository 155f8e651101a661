// SPDX-License-Identifier: MIT
//! `core/complex` codec: complex numbers as a single text scalar
//!
//! Accepted literals are `re±imj`, a bare real part (`3`, `inf`) or a bare
//! imaginary part (`4j`, `infj`), optionally wrapped in one pair of
//! parentheses. The unit marker may be `i` or `j` in either case, and `inf`
//! may stand in for either magnitude. Whitespace is never accepted.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use super::codec::{ReadContext, TagCodec, WriteContext};
use super::errors::{TagError, TagResult};
use super::value::{Value, ValueKind};
use crate::tree::{Node, Tag, TagVersion};

pub const COMPLEX_TAG: &str = "core/complex";
pub const COMPLEX_VERSION: TagVersion = TagVersion::new(1, 0, 0);

const NUMBER: &str = r"(?:inf|(?:\d+(?:\.\d+)?|\.\d+)(?:e[+-]?\d+)?)";

static COMPLEX_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^(?:(?P<re>[+-]?{n})(?P<im>[+-]{n})[ij]|(?P<re_only>[+-]?{n})|(?P<im_only>[+-]?{n})[ij])$",
        n = NUMBER
    ))
    .expect("Invalid regex pattern for complex literals")
});

/// Complex number with `f64` parts
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    /// Parse a complex literal, rejecting anything outside the grammar
    pub fn parse_literal(literal: &str) -> TagResult<Self> {
        let invalid = || TagError::InvalidComplexLiteral(literal.to_string());

        let body = literal
            .strip_prefix('(')
            .and_then(|inner| inner.strip_suffix(')'))
            .unwrap_or(literal);
        let captures = COMPLEX_LITERAL.captures(body).ok_or_else(invalid)?;

        let part = |name: &str| -> TagResult<Option<f64>> {
            captures
                .name(name)
                .map(|m| parse_number(m.as_str()).ok_or_else(invalid))
                .transpose()
        };

        let re = part("re")?.or(part("re_only")?).unwrap_or(0.0);
        let im = part("im")?.or(part("im_only")?).unwrap_or(0.0);
        Ok(Complex::new(re, im))
    }

    /// Canonical `re+imj` literal; NaN parts have no literal form
    pub fn to_literal(&self) -> TagResult<String> {
        if self.re.is_nan() || self.im.is_nan() {
            return Err(TagError::InvalidComplexLiteral(format!(
                "{:?}+{:?}j",
                self.re, self.im
            )));
        }
        let sign = if self.im.is_sign_negative() { '-' } else { '+' };
        Ok(format!(
            "{}{}{}j",
            format_number(self.re),
            sign,
            format_number(self.im.abs())
        ))
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.to_ascii_lowercase().parse().ok()
}

fn format_number(value: f64) -> String {
    if value.is_infinite() {
        let literal = if value.is_sign_negative() { "-inf" } else { "inf" };
        literal.to_string()
    } else {
        // Debug keeps a decimal point or exponent, so the output stays in
        // the literal grammar
        format!("{:?}", value)
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_literal() {
            Ok(literal) => f.write_str(&literal),
            Err(_) => write!(f, "({:?}, {:?})", self.re, self.im),
        }
    }
}

impl FromStr for Complex {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Complex::parse_literal(s)
    }
}

/// Codec writing complex values as their literal text
#[derive(Debug)]
pub struct ComplexCodec {
    tag: Tag,
}

impl Default for ComplexCodec {
    fn default() -> Self {
        Self {
            tag: Tag::new(COMPLEX_TAG, COMPLEX_VERSION),
        }
    }
}

impl TagCodec for ComplexCodec {
    fn tag(&self) -> &Tag {
        &self.tag
    }

    fn kinds(&self) -> &[ValueKind] {
        &[ValueKind::Complex]
    }

    fn to_tree(&self, value: &Value, _ctx: &mut WriteContext<'_>) -> TagResult<Node> {
        let complex = value.as_complex().ok_or_else(|| {
            TagError::invalid_tree(COMPLEX_TAG, format!("cannot write a {}", value.kind()))
        })?;
        Ok(Node::Str(complex.to_literal()?))
    }

    fn from_tree(&self, node: &Node, _ctx: &ReadContext<'_>) -> TagResult<Value> {
        let literal = node
            .as_str()
            .ok_or_else(|| TagError::invalid_tree(COMPLEX_TAG, "expected a string scalar"))?;
        Ok(Value::Complex(Complex::parse_literal(literal)?))
    }
}
