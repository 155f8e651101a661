// SPDX-License-Identifier: MIT
//! Type tag codecs: conversion between native values and tagged tree nodes

pub mod codec;
pub mod complex;
pub mod errors;
pub mod integer;
pub mod ndarray;
pub mod registry;
pub mod value;

pub use codec::{CodecOptions, FnCodec, ReadContext, TagCodec, WriteContext};
pub use complex::{Complex, ComplexCodec};
pub use errors::{TagError, TagResult};
pub use integer::{BigInt, IntegerCodec};
pub use ndarray::{DType, NdArray, NdArrayCodec};
pub use registry::TagRegistry;
pub use value::{Value, ValueKind};
