//! Error types for geometry validation, encoding capacity and numeral parsing.
//!
//! Decoding never fails: a buffer that violates the layout contract yields
//! unspecified values, never an error or an out-of-bounds read.

use thiserror::Error;

/// Invalid chunk geometry or value count supplied to the encoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("data size must be >= 1 on every axis (got {0:?})")]
    EmptyDataSize([u32; 3]),
    #[error("block size must be >= 1 on every axis (got {0:?})")]
    EmptyBlockSize([u32; 3]),
    #[error("channel count must be >= 1")]
    NoChannels,
    #[error("expected {expected} values for this geometry, got {actual}")]
    ValueCountMismatch { expected: usize, actual: usize },
    #[error("geometry declares {declared} values but {supplied} values were supplied")]
    DataTypeMismatch {
        declared: &'static str,
        supplied: &'static str,
    },
    #[error("unknown data type {0:?}")]
    UnknownDataType(String),
    #[error("channel {channel} out of range for {num_channels} channel(s)")]
    ChannelOutOfRange { channel: u32, num_channels: u32 },
}

/// A chunk too large to address with the fixed-width fields of the format
/// or with a single texture.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatCapacityError {
    #[error("{field} offset {offset} does not fit in a 24-bit field")]
    OffsetOverflow { field: &'static str, offset: usize },
    #[error("block holds {distinct} distinct values, more than a {max_bits}-bit code can index")]
    TooManyDistinctValues { distinct: usize, max_bits: u32 },
    #[error(
        "buffer of {word_length} words needs texture width {width}, \
         exceeding max dimension {max_dimension}"
    )]
    TextureTooLarge {
        word_length: usize,
        width: usize,
        max_dimension: u32,
    },
}

/// Failure while producing an encoded buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Capacity(#[from] FormatCapacityError),
}

/// Rejected numeral string for [`Uint64`](crate::uint64::Uint64).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseUint64Error {
    #[error("empty numeral")]
    Empty,
    #[error("base {0} is outside 2..=36")]
    InvalidBase(u32),
    #[error("invalid digit {digit:?} for base {base}")]
    InvalidDigit { digit: char, base: u32 },
    #[error("numeral exceeds 64 bits")]
    Overflow,
}
