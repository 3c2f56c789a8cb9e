//! Per-packet AEAD sealing.
//!
//! Encrypted packet kinds are sealed with ChaCha20-Poly1305 under a
//! per-direction session key. The 12-byte nonce is derived from the
//! 64-bit packet sequence number (little-endian, zero-padded), so the
//! sender's strictly monotonic sequence guarantees nonce uniqueness for
//! the lifetime of a key. The packet header bytes are the associated
//! data: the type byte, sequence, and encrypted flag are authenticated
//! even though they travel in the clear.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};

use crate::errors::{ProtocolError, Result};
use crate::token::Key;

/// Bytes added to a payload by sealing (the Poly1305 tag).
pub const SEAL_OVERHEAD: usize = 16;

/// One direction of a session's packet encryption.
pub struct PacketCipher {
    cipher: ChaCha20Poly1305,
}

impl PacketCipher {
    /// Create a cipher from a 32-byte session key.
    #[must_use]
    pub fn new(key: &Key) -> Self {
        Self { cipher: ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key.as_bytes())) }
    }

    /// Seal `plaintext` under the nonce derived from `sequence`, binding
    /// `aad` (the packet header bytes).
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Seal`] on cipher failure.
    pub fn seal(&self, sequence: u64, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .encrypt(&nonce_for(sequence), Payload { msg: plaintext, aad })
            .map_err(|_| ProtocolError::Seal)
    }

    /// Open `ciphertext` sealed under `sequence` and `aad`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Open`] if authentication fails: the datagram was
    /// tampered with, truncated, or sealed under a different key,
    /// sequence, or header.
    pub fn open(&self, sequence: u64, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .decrypt(&nonce_for(sequence), Payload { msg: ciphertext, aad })
            .map_err(|_| ProtocolError::Open)
    }
}

impl std::fmt::Debug for PacketCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PacketCipher(…)")
    }
}

/// nonce[0..8] = sequence (little-endian), nonce[8..12] = zero padding.
fn nonce_for(sequence: u64) -> Nonce {
    let mut nonce = [0u8; 12];
    nonce[..8].copy_from_slice(&sequence.to_le_bytes());
    Nonce::from(nonce)
}
