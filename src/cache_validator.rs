use chrono::{DateTime, Utc};
use hex;
use sha2::{Digest, Sha256};

/// Validates persisted visa-data cache entries using SHA-256 checksums
///
/// Cache entries live as plain JSON files on disk, so a partially written
/// or hand-edited file must never be served as real data. Each entry is
/// sealed with a checksum on write and validated on read:
/// 1. Generating a checksum when the record is persisted
/// 2. Validating the checksum when the record is read back
/// 3. Rejecting corrupted or tampered entries (treated as cache miss)

/// Wrapper for a persisted cache entry with integrity validation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SealedRecord {
    /// The serialized `ScrapedVisaData` JSON.
    pub payload: String,
    /// SHA-256 checksum of the payload (hex encoded).
    pub checksum: String,
    /// When the entry was written to disk.
    pub cached_at: DateTime<Utc>,
}

impl SealedRecord {
    /// Creates a new sealed entry with computed checksum.
    pub fn new(payload: String) -> Self {
        let checksum = Self::compute_checksum(&payload);
        Self {
            payload,
            checksum,
            cached_at: Utc::now(),
        }
    }

    /// Computes SHA-256 checksum of the payload.
    fn compute_checksum(payload: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Validates the integrity of the sealed payload.
    ///
    /// Returns true if the checksum matches, false if tampered.
    pub fn is_intact(&self) -> bool {
        let computed = Self::compute_checksum(&self.payload);
        computed == self.checksum
    }

    /// Serializes the entry for writing to the cache file.
    pub fn seal(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Deserializes and validates a cache file's content.
    ///
    /// Returns the inner payload if intact, None if corrupted or invalid
    /// JSON. Callers treat None as a cache miss and refetch from source.
    pub fn unseal(serialized: &str) -> Option<String> {
        let entry: SealedRecord = serde_json::from_str(serialized).ok()?;

        if entry.is_intact() {
            Some(entry.payload)
        } else {
            // Checksum mismatch - entry corrupted on disk
            tracing::warn!(
                "Cache validation failed: checksum mismatch. Expected: {}, Payload length: {}",
                entry.checksum,
                entry.payload.len()
            );
            None
        }
    }
}
