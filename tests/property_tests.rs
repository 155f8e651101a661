// SPDX-License-Identifier: MIT
//! Property-based tests for codecs and block storage

use blockdoc::tags::{BigInt, Complex, NdArray, Value};
use blockdoc::{BlockManager, CompressionId, CompressionRegistry, Document, StorageMode};
use proptest::prelude::*;

/// Up to four little-endian words whose top word keeps the value within 100 bits
fn words_strategy() -> impl Strategy<Value = Vec<u32>> {
    (prop::collection::vec(any::<u32>(), 0..=3), 0u32..16).prop_map(|(mut words, top)| {
        words.push(top);
        words
    })
}

fn finite_f64() -> impl Strategy<Value = f64> {
    prop_oneof![
        any::<f64>().prop_filter("finite", |f| f.is_finite()),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
        (-1000i32..1000).prop_map(f64::from),
    ]
}

fn codec_strategy() -> impl Strategy<Value = Option<CompressionId>> {
    prop_oneof![Just(None), Just(Some(CompressionId::ZLIB))]
}

fn round_trip(value: Value) -> Value {
    let mut doc = Document::new();
    doc.insert("v", value).unwrap();
    let bytes = doc.encode(None).unwrap().main;
    Document::from_bytes(bytes).unwrap().get("v").unwrap().unwrap()
}

proptest! {
    #[test]
    fn test_integer_text_round_trip(n in any::<i128>()) {
        let big = BigInt::from(n);
        prop_assert_eq!(big.to_string(), n.to_string());
        prop_assert_eq!(big.to_i128(), Some(n));
        prop_assert_eq!(n.to_string().parse::<BigInt>().unwrap(), big);
    }

    #[test]
    fn test_integer_document_round_trip(n in any::<i128>()) {
        // Wide i64 values are promoted on write and compare equal as BigInt
        let value = match i64::try_from(n) {
            Ok(small) => Value::Int(small),
            Err(_) => Value::BigInt(BigInt::from(n)),
        };
        prop_assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn test_wide_integer_round_trip(negative in any::<bool>(), words in words_strategy()) {
        let big = BigInt::from_words(negative, &words);
        prop_assert!(big.bit_len() <= 100);

        let magnitude = words
            .iter()
            .rev()
            .fold(0u128, |acc, &word| (acc << 32) | u128::from(word));
        let expected = if negative { -(magnitude as i128) } else { magnitude as i128 };
        prop_assert_eq!(big.to_i128(), Some(expected));

        let value = Value::BigInt(big);
        prop_assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn test_complex_literal_round_trip(re in finite_f64(), im in finite_f64()) {
        let z = Complex::new(re, im);
        let literal = z.to_literal().unwrap();
        prop_assert_eq!(Complex::parse_literal(&literal).unwrap(), z);
        prop_assert_eq!(Complex::parse_literal(&format!("({})", literal)).unwrap(), z);
        prop_assert_eq!(round_trip(Value::Complex(z)), Value::Complex(z));
    }

    #[test]
    fn test_compression_round_trip(data in prop::collection::vec(any::<u8>(), 0..4096)) {
        let registry = CompressionRegistry::new();
        for id in registry.ids() {
            let codec = registry.get(id).unwrap();
            let compressed = codec.compress(&data).unwrap();
            prop_assert_eq!(&codec.decompress(&compressed, data.len()).unwrap(), &data);
        }
    }

    #[test]
    fn test_blocks_read_back(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..512), 1..8),
        codec in codec_strategy(),
    ) {
        let mut blocks = BlockManager::new(StorageMode::Internal);
        for payload in &payloads {
            blocks.allocate(payload, codec).unwrap();
        }
        for (index, payload) in payloads.iter().enumerate() {
            prop_assert_eq!(&blocks.read(index as u32).unwrap(), payload);
        }
    }

    #[test]
    fn test_array_round_trip(values in prop::collection::vec(any::<u32>(), 0..256)) {
        let array = NdArray::from_u32(&values);
        let value = Value::Array(array);
        prop_assert_eq!(round_trip(value.clone()), value);
    }
}
