//! Definition of fixed size types with a compile time known wire size.

use thiserror::Error;

/// Error returned when bytes cannot be framed into a [`Record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Expected a multiple of {expected} bytes, got {len}")]
pub struct FramingError {
    /// Number of bytes that were offered.
    pub len: usize,

    /// Size of a single record.
    pub expected: usize,
}

/// Fixed sized record with a compile time known encoded size.
///
/// Every record encodes to exactly [`Record::SIZE`] bytes, there are no
/// variable length fields. This is what allows a consumer to recover record
/// boundaries from a plain byte stream.
pub trait Record: Sized {
    /// Number of bytes in the encoded form of a record.
    const SIZE: usize;

    /// Encoded form of a record, always [`Record::SIZE`] bytes long.
    type Bytes: AsRef<[u8]>;

    /// Encode a record into its wire representation.
    fn encode(&self) -> Self::Bytes;

    /// Decode a record from its wire representation.
    ///
    /// Returns a [`FramingError`] if `bytes.len() != Self::SIZE`.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Bytes to decode.
    fn decode(bytes: &[u8]) -> Result<Self, FramingError>;
}

/// Decode a contiguous run of records, in stream order.
///
/// The whole run is rejected when its length is not a multiple of
/// [`Record::SIZE`]. Records are never salvaged from a misaligned run.
///
/// # Arguments
///
/// * `bytes` - Concatenated encoded records.
pub fn decode_all<R: Record>(bytes: &[u8]) -> Result<Vec<R>, FramingError> {
    if bytes.len() % R::SIZE != 0 {
        return Err(FramingError {
            len: bytes.len(),
            expected: R::SIZE,
        });
    }

    bytes.chunks_exact(R::SIZE).map(R::decode).collect()
}
