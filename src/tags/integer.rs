// SPDX-License-Identifier: MIT
//! `core/integer` codec: arbitrary precision integers
//!
//! A big integer is a sign plus its magnitude split into 32-bit words,
//! least significant word first. The words are written through the
//! `core/ndarray` codec as a `uint32` array, so a very large integer ends up
//! in a block like any other array.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::codec::{ReadContext, TagCodec, WriteContext};
use super::errors::{TagError, TagResult};
use super::ndarray::NdArray;
use super::value::{Value, ValueKind};
use crate::tree::{Node, Tag, TagVersion};

pub const INTEGER_TAG: &str = "core/integer";
pub const INTEGER_VERSION: TagVersion = TagVersion::new(1, 0, 0);

const WORD_MASK: u128 = 0xFFFF_FFFF;
const WORD_BITS: u32 = 32;
const DECIMAL_CHUNK: u32 = 1_000_000_000;
const DECIMAL_CHUNK_DIGITS: usize = 9;

/// Sign and magnitude integer of unbounded size
///
/// Always normalized: no most-significant zero words, and zero is never
/// negative, so derived equality is numeric equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BigInt {
    negative: bool,
    words: Vec<u32>,
}

impl BigInt {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Rebuild an integer from its sign and least-significant-first words
    pub fn from_words(negative: bool, words: &[u32]) -> Self {
        Self::normalized(negative, words.to_vec())
    }

    fn normalized(negative: bool, mut words: Vec<u32>) -> Self {
        while words.last() == Some(&0) {
            words.pop();
        }
        Self {
            negative: negative && !words.is_empty(),
            words,
        }
    }

    /// Magnitude words, least significant first; empty for zero
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_zero(&self) -> bool {
        self.words.is_empty()
    }

    /// `"-"` for negative values, `"+"` otherwise
    pub fn sign_str(&self) -> &'static str {
        if self.negative {
            "-"
        } else {
            "+"
        }
    }

    /// Number of significant bits in the magnitude
    pub fn bit_len(&self) -> u64 {
        match self.words.last() {
            None => 0,
            Some(top) => {
                (self.words.len() as u64 - 1) * u64::from(WORD_BITS)
                    + u64::from(WORD_BITS - top.leading_zeros())
            }
        }
    }

    pub fn to_i128(&self) -> Option<i128> {
        if self.words.len() > 4 {
            return None;
        }
        let magnitude = self
            .words
            .iter()
            .rev()
            .fold(0u128, |acc, &word| (acc << WORD_BITS) | u128::from(word));
        if self.negative {
            if magnitude > i128::MAX as u128 + 1 {
                None
            } else {
                // 2^127 wraps to i128::MIN, which is the intended value
                Some((magnitude as i128).wrapping_neg())
            }
        } else {
            i128::try_from(magnitude).ok()
        }
    }

    pub fn to_i64(&self) -> Option<i64> {
        self.to_i128().and_then(|value| i64::try_from(value).ok())
    }

    /// magnitude = magnitude * factor + addend
    fn mul_add_small(words: &mut Vec<u32>, factor: u32, addend: u32) {
        let mut carry = u64::from(addend);
        for word in words.iter_mut() {
            let product = u64::from(*word) * u64::from(factor) + carry;
            *word = product as u32;
            carry = product >> WORD_BITS;
        }
        if carry > 0 {
            words.push(carry as u32);
        }
    }

    /// magnitude /= divisor, returning the remainder
    fn div_rem_small(words: &mut Vec<u32>, divisor: u32) -> u32 {
        let mut remainder = 0u64;
        for word in words.iter_mut().rev() {
            let current = (remainder << WORD_BITS) | u64::from(*word);
            *word = (current / u64::from(divisor)) as u32;
            remainder = current % u64::from(divisor);
        }
        while words.last() == Some(&0) {
            words.pop();
        }
        remainder as u32
    }
}

impl From<u128> for BigInt {
    fn from(value: u128) -> Self {
        let mut magnitude = value;
        let mut words = Vec::new();
        while magnitude != 0 {
            words.push((magnitude & WORD_MASK) as u32);
            magnitude >>= WORD_BITS;
        }
        Self::normalized(false, words)
    }
}

impl From<i128> for BigInt {
    fn from(value: i128) -> Self {
        let magnitude = BigInt::from(value.unsigned_abs());
        Self::normalized(value < 0, magnitude.words)
    }
}

impl From<u64> for BigInt {
    fn from(value: u64) -> Self {
        BigInt::from(u128::from(value))
    }
}

impl From<i64> for BigInt {
    fn from(value: i64) -> Self {
        BigInt::from(i128::from(value))
    }
}

impl std::ops::Neg for BigInt {
    type Output = BigInt;

    fn neg(self) -> Self::Output {
        Self::normalized(!self.negative, self.words)
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0");
        }
        let mut magnitude = self.words.clone();
        let mut chunks = Vec::new();
        while !magnitude.is_empty() {
            chunks.push(Self::div_rem_small(&mut magnitude, DECIMAL_CHUNK));
        }

        let mut digits = String::with_capacity(chunks.len() * DECIMAL_CHUNK_DIGITS);
        let mut chunks = chunks.iter().rev();
        if let Some(first) = chunks.next() {
            digits.push_str(&first.to_string());
        }
        for chunk in chunks {
            digits.push_str(&format!("{:0width$}", chunk, width = DECIMAL_CHUNK_DIGITS));
        }
        f.pad_integral(!self.negative, "", &digits)
    }
}

impl FromStr for BigInt {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TagError::InvalidInteger(s.to_string());
        let (negative, digits) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let mut words = Vec::new();
        for digit in digits.bytes() {
            Self::mul_add_small(&mut words, 10, u32::from(digit - b'0'));
        }
        Ok(Self::normalized(negative, words))
    }
}

/// Codec for [`BigInt`] values
#[derive(Debug)]
pub struct IntegerCodec {
    tag: Tag,
}

impl Default for IntegerCodec {
    fn default() -> Self {
        Self {
            tag: Tag::new(INTEGER_TAG, INTEGER_VERSION),
        }
    }
}

impl IntegerCodec {
    fn words_from_tree(node: &Node, ctx: &ReadContext<'_>) -> TagResult<Vec<u32>> {
        let word_error = || TagError::invalid_tree(INTEGER_TAG, "words must be 32-bit unsigned integers");
        match node {
            // A plain sequence of words is accepted as well as an ndarray
            Node::Sequence(items) => items
                .iter()
                .map(|item| {
                    item.as_i64()
                        .and_then(|word| u32::try_from(word).ok())
                        .ok_or_else(word_error)
                })
                .collect(),
            other => match ctx.from_tree(other)? {
                Value::Array(array) => array.to_u32_vec().ok_or_else(word_error),
                _ => Err(word_error()),
            },
        }
    }
}

impl TagCodec for IntegerCodec {
    fn tag(&self) -> &Tag {
        &self.tag
    }

    fn kinds(&self) -> &[ValueKind] {
        &[ValueKind::BigInt]
    }

    fn to_tree(&self, value: &Value, ctx: &mut WriteContext<'_>) -> TagResult<Node> {
        let big = value.as_bigint().ok_or_else(|| {
            TagError::invalid_tree(INTEGER_TAG, format!("cannot write a {}", value.kind()))
        })?;

        let words = Value::Array(NdArray::from_u32(big.words()));
        let mut payload = BTreeMap::new();
        payload.insert("sign".to_string(), Node::from(big.sign_str()));
        payload.insert("words".to_string(), ctx.to_tree(&words)?);
        Ok(Node::Mapping(payload))
    }

    fn from_tree(&self, node: &Node, ctx: &ReadContext<'_>) -> TagResult<Value> {
        let sign = node
            .get("sign")
            .and_then(Node::as_str)
            .ok_or_else(|| TagError::invalid_tree(INTEGER_TAG, "missing sign"))?;
        let negative = match sign {
            "+" => false,
            "-" => true,
            other => {
                return Err(TagError::invalid_tree(
                    INTEGER_TAG,
                    format!("sign must be '+' or '-', got '{}'", other),
                ))
            }
        };
        let words = node
            .get("words")
            .ok_or_else(|| TagError::invalid_tree(INTEGER_TAG, "missing words"))?;

        let words = Self::words_from_tree(words, ctx)?;
        Ok(Value::BigInt(BigInt::from_words(negative, &words)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_packing() {
        assert!(BigInt::from(0u64).words().is_empty());
        assert_eq!(BigInt::from(1u64).words(), &[1]);
        assert_eq!(BigInt::from(u64::from(u32::MAX) + 1).words(), &[0, 1]);
        assert_eq!(
            BigInt::from(-0x1_0000_0002_i64).words(),
            &[2, 1]
        );
        assert!(BigInt::from(-5i64).is_negative());
    }

    #[test]
    fn test_from_words_reverse_fold() {
        let big = BigInt::from_words(false, &[0xDEAD_BEEF, 0x1234_5678, 0x9]);
        assert_eq!(big.to_i128(), Some(0x9_1234_5678_DEAD_BEEF));
    }

    #[test]
    fn test_negative_zero_is_zero() {
        let zero = BigInt::from_words(true, &[]);
        assert!(zero.is_zero());
        assert!(!zero.is_negative());
        assert_eq!(zero, BigInt::zero());
        assert_eq!(zero.sign_str(), "+");
        assert_eq!(BigInt::from_words(true, &[0, 0]), BigInt::zero());
    }

    #[test]
    fn test_i128_limits() {
        for value in [i128::MIN, i128::MIN + 1, -1, 0, 1, i128::MAX] {
            assert_eq!(BigInt::from(value).to_i128(), Some(value));
        }
        assert_eq!(BigInt::from(u128::MAX).to_i128(), None);
        assert_eq!(BigInt::from(i64::MIN).to_i64(), Some(i64::MIN));
        assert_eq!(BigInt::from(u64::MAX).to_i64(), None);
    }

    #[test]
    fn test_decimal_text() {
        let text = "-123456789012345678901234567890";
        let big: BigInt = text.parse().unwrap();
        assert_eq!(big.to_string(), text);
        assert_eq!(BigInt::zero().to_string(), "0");
        assert_eq!(BigInt::from(1_000_000_000u64).to_string(), "1000000000");
        assert_eq!("+42".parse::<BigInt>().unwrap(), BigInt::from(42i64));
        assert_eq!("-0".parse::<BigInt>().unwrap(), BigInt::zero());
        for bad in ["", "-", "12a", "1 2", "0x10"] {
            assert!(matches!(
                bad.parse::<BigInt>(),
                Err(TagError::InvalidInteger(_))
            ));
        }
    }

    #[test]
    fn test_bit_len() {
        assert_eq!(BigInt::zero().bit_len(), 0);
        assert_eq!(BigInt::from(1u64).bit_len(), 1);
        assert_eq!(BigInt::from(u64::MAX).bit_len(), 64);
        assert_eq!(BigInt::from(1u128 << 100).bit_len(), 101);
    }

    #[test]
    fn test_negation() {
        assert_eq!(-BigInt::from(5i64), BigInt::from(-5i64));
        assert_eq!(-BigInt::zero(), BigInt::zero());
    }
}
