//! Wire format compression for network messages.
//!
//! All messages (gossip and request/response) are LZ4-compressed to reduce
//! bandwidth. The size prefix is part of LZ4's framing; it stores the
//! original uncompressed size so decompression can pre-allocate the output
//! buffer.

use thiserror::Error;

/// Errors from wire encoding/decoding.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),
}

/// Compress payload bytes for transmission.
#[inline]
pub fn compress(data: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(data)
}

/// Decompress bytes received from the network.
#[inline]
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, WireError> {
    lz4_flex::decompress_size_prepended(data)
        .map_err(|e| WireError::DecompressionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let original = b"location-transparent invocation payload";
        let decompressed = decompress(&compress(original)).unwrap();
        assert_eq!(original.as_slice(), decompressed.as_slice());
    }

    #[test]
    fn test_garbage_input_is_an_error() {
        assert!(decompress(b"not valid lz4 data").is_err());
    }
}
