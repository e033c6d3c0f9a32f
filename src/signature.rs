//! Frame signing: 13-byte V2 signatures with replay protection.
//!
//! A signature covers the whole frame from the magic byte through the
//! checksum, prefixed with the 32-byte secret key and suffixed with the link
//! id and a 48-bit timestamp counting 10-µs units since 2015-01-01T00:00:00Z.
//! The SHA-256 digest is truncated to its leading 6 bytes.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use zeroize::ZeroizeOnDrop;

use crate::frame::SignatureBlock;

/// Seconds between the Unix epoch and the signature epoch (2015-01-01T00:00:00Z).
const EPOCH_OFFSET_SECS: u64 = 1_420_070_400;

/// A 32-byte signing key. Shorter input is zero-padded.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    /// Build a key from up to 32 bytes of secret material.
    pub fn new(material: &[u8]) -> Self {
        let mut key = [0u8; 32];
        let len = material.len().min(32);
        key[..len].copy_from_slice(&material[..len]);
        Self(key)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// Key material never reaches logs.
impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(..)")
    }
}

/// Compute the 6-byte truncated signature of a frame.
///
/// `frame_bytes` covers the magic byte through the checksum.
pub(crate) fn compute(
    key: &SecretKey,
    frame_bytes: &[u8],
    link_id: u8,
    timestamp: u64,
) -> [u8; 6] {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(frame_bytes);
    hasher.update([link_id]);
    hasher.update(&timestamp.to_le_bytes()[..6]);
    let digest = hasher.finalize();
    let mut signature = [0u8; 6];
    signature.copy_from_slice(&digest[..6]);
    signature
}

/// Verify a received signature in constant time.
pub(crate) fn verify(
    key: &SecretKey,
    frame_bytes: &[u8],
    link_id: u8,
    timestamp: u64,
    signature: &[u8; 6],
) -> bool {
    let computed = compute(key, frame_bytes, link_id, timestamp);
    computed
        .iter()
        .zip(signature)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Current time in 10-µs ticks since the signature epoch.
pub(crate) fn now_ticks() -> u64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .saturating_sub(Duration::from_secs(EPOCH_OFFSET_SECS));
    (since_epoch.as_micros() / 10) as u64
}

/// Transmit-side signing state for one channel.
///
/// Timestamps are strictly increasing across all frames signed by one
/// signer, even when the wall clock has not advanced between frames.
pub struct Signer {
    key: SecretKey,
    link_id: u8,
    last_timestamp: u64,
}

impl Signer {
    /// Create a signer for a channel.
    pub fn new(key: SecretKey, link_id: u8) -> Self {
        Self {
            key,
            link_id,
            last_timestamp: 0,
        }
    }

    /// Sign a frame. `frame_bytes` covers the magic byte through the checksum.
    pub(crate) fn sign(&mut self, frame_bytes: &[u8]) -> SignatureBlock {
        let timestamp = now_ticks().max(self.last_timestamp + 1);
        self.last_timestamp = timestamp;
        SignatureBlock {
            link_id: self.link_id,
            timestamp,
            signature: compute(&self.key, frame_bytes, self.link_id, timestamp),
        }
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("link_id", &self.link_id)
            .field("last_timestamp", &self.last_timestamp)
            .finish()
    }
}
