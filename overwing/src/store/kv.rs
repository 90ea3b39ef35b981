//! Gzip-transparent key-value cache.
//!
//! Values are compressed on write. Reads sniff the gzip magic bytes and
//! decompress; anything that fails to decompress is returned raw, and any
//! database error on the read path is treated as a miss. The write path still
//! reports errors normally.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sqlx::Row;

use super::{Store, StoreError};

/// Gzip stream magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compress a payload for storage.
pub(crate) fn compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 16), Compression::default());
    // Writing into a Vec cannot fail
    encoder.write_all(data).expect("write to Vec");
    encoder.finish().expect("finish to Vec")
}

/// Decompress a stored payload, falling back to the raw bytes when the value
/// is not gzip or the stream is corrupt.
pub(crate) fn decompress_transparent(data: Vec<u8>) -> Vec<u8> {
    if data.len() < 2 || data[0..2] != GZIP_MAGIC {
        return data;
    }
    let mut decoder = GzDecoder::new(&data[..]);
    let mut out = Vec::with_capacity(data.len() * 2);
    match decoder.read_to_end(&mut out) {
        Ok(_) => out,
        Err(e) => {
            tracing::warn!(error = %e, "Cache payload failed to decompress, using raw bytes");
            data
        }
    }
}

impl Store {
    /// Store a value, compressed.
    pub async fn cache_set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let compressed = compress(value);
        sqlx::query("INSERT OR REPLACE INTO cache (key, data) VALUES (?, ?)")
            .bind(key)
            .bind(compressed)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Fetch a value. Any error is a miss.
    pub async fn cache_get(&self, key: &str) -> Option<Vec<u8>> {
        let row = match sqlx::query("SELECT data FROM cache WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await
        {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };
        let data: Vec<u8> = row?.get(0);
        Some(decompress_transparent(data))
    }

    /// Whether a key exists. Errors read as absent.
    pub async fn cache_has(&self, key: &str) -> bool {
        sqlx::query("SELECT 1 FROM cache WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await
            .ok()
            .flatten()
            .is_some()
    }

    /// List keys with the given prefix.
    pub async fn cache_list_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        // Escape LIKE wildcards in the prefix
        let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let rows = sqlx::query("SELECT key FROM cache WHERE key LIKE ? ESCAPE '\\' ORDER BY key")
            .bind(format!("{escaped}%"))
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(|r| r.get(0)).collect())
    }
}
