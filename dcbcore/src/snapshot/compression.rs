//! Gzip codec for snapshot bodies.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::errors::{SnapshotError, SnapshotResult};

/// Gzip-compresses `bytes`.
pub fn compress(bytes: &[u8]) -> SnapshotResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// Decompresses a gzip stream, refusing to inflate beyond `limit` bytes.
pub fn decompress(bytes: &[u8], limit: Option<usize>) -> SnapshotResult<Vec<u8>> {
    let mut decoded = Vec::new();
    let mut decoder = GzDecoder::new(bytes);
    match limit {
        Some(limit) => {
            (&mut decoder)
                .take(u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1))
                .read_to_end(&mut decoded)?;
            if decoded.len() > limit {
                return Err(SnapshotError::TooLarge {
                    size: decoded.len(),
                    limit,
                });
            }
        }
        None => {
            decoder.read_to_end(&mut decoded)?;
        }
    }
    Ok(decoded)
}
