//! Fixed-size credential and key value types.
//!
//! Connect tokens are minted out-of-band (by a matchmaker) and are opaque
//! to the client; challenge tokens are issued by the server mid-handshake
//! and echoed back verbatim. Both are carried as owned fixed-size byte
//! arrays and zeroed in place the moment the handshake no longer needs
//! them, in addition to being zeroed on drop.
//!
//! `Debug` output is redacted for all types here: tokens show a 4-byte
//! prefix, keys show nothing.

use std::fmt;

use serde::de::{Error as DeError, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of an opaque connect token in bytes.
pub const CONNECT_TOKEN_BYTES: usize = 1024;

/// Size of an opaque challenge token in bytes.
pub const CHALLENGE_TOKEN_BYTES: usize = 256;

/// Size of a token nonce in bytes.
pub const NONCE_BYTES: usize = 8;

/// Size of a packet encryption key in bytes.
pub const KEY_BYTES: usize = 32;

macro_rules! fixed_secret {
    ($(#[$doc:meta])* $name:ident, $len:expr, $expecting:literal, debug_prefix) => {
        fixed_secret!($(#[$doc])* $name, $len, $expecting);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    concat!(stringify!($name), "({:02x}{:02x}{:02x}{:02x}…)"),
                    self.0[0], self.0[1], self.0[2], self.0[3]
                )
            }
        }
    };
    ($(#[$doc:meta])* $name:ident, $len:expr, $expecting:literal, debug_opaque) => {
        fixed_secret!($(#[$doc])* $name, $len, $expecting);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(…)"))
            }
        }
    };
    ($(#[$doc:meta])* $name:ident, $len:expr, $expecting:literal) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Length of this value in bytes.
            pub const LEN: usize = $len;

            /// All-zero value.
            #[must_use]
            pub const fn zeroed() -> Self {
                Self([0u8; $len])
            }

            /// Construct from a byte slice of exactly [`Self::LEN`] bytes.
            /// `None` on any other length.
            #[must_use]
            pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
                let mut value = [0u8; $len];
                if bytes.len() != $len {
                    return None;
                }
                value.copy_from_slice(bytes);
                Some(Self(value))
            }

            /// The raw bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Whether every byte is zero.
            #[must_use]
            pub fn is_zeroed(&self) -> bool {
                self.0.iter().all(|&b| b == 0)
            }

            /// Zero the value in place.
            pub fn clear(&mut self) {
                self.0.zeroize();
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        // Serde arrays cap at 32 elements, and CBOR byte strings are more
        // compact than element arrays anyway, so serialize as raw bytes
        // with an exact-length check on the way back in.
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_bytes(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct BytesVisitor;

                impl<'de> Visitor<'de> for BytesVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        f.write_str($expecting)
                    }

                    fn visit_bytes<E: DeError>(self, v: &[u8]) -> Result<$name, E> {
                        $name::from_bytes(v)
                            .ok_or_else(|| E::invalid_length(v.len(), &self))
                    }

                    fn visit_seq<A: serde::de::SeqAccess<'de>>(
                        self,
                        mut seq: A,
                    ) -> Result<$name, A::Error> {
                        let mut value = [0u8; $len];
                        for (i, slot) in value.iter_mut().enumerate() {
                            *slot = seq
                                .next_element()?
                                .ok_or_else(|| A::Error::invalid_length(i, &self))?;
                        }
                        if seq.next_element::<u8>()?.is_some() {
                            return Err(A::Error::invalid_length($len + 1, &self));
                        }
                        Ok($name(value))
                    }
                }

                deserializer.deserialize_bytes(BytesVisitor)
            }
        }
    };
}

fixed_secret!(
    /// Opaque, server-verifiable connect credential, carried in the
    /// connection request packet. The client never inspects it.
    ConnectToken,
    CONNECT_TOKEN_BYTES,
    "a 1024-byte connect token",
    debug_prefix
);

fixed_secret!(
    /// Server-issued, client-echoed proof-of-receipt used to complete the
    /// handshake.
    ChallengeToken,
    CHALLENGE_TOKEN_BYTES,
    "a 256-byte challenge token",
    debug_prefix
);

fixed_secret!(
    /// Per-token initialization bytes for the token's cryptographic
    /// envelope. Carried alongside the token it belongs to.
    TokenNonce,
    NONCE_BYTES,
    "an 8-byte token nonce",
    debug_prefix
);

fixed_secret!(
    /// Symmetric packet encryption key for one direction of a session.
    Key,
    KEY_BYTES,
    "a 32-byte packet key",
    debug_opaque
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_enforces_exact_length() {
        assert!(TokenNonce::from_bytes(&[0u8; NONCE_BYTES]).is_some());
        assert!(TokenNonce::from_bytes(&[0u8; NONCE_BYTES - 1]).is_none());
        assert!(TokenNonce::from_bytes(&[0u8; NONCE_BYTES + 1]).is_none());
    }

    #[test]
    fn clear_zeroes_in_place() {
        let mut token = ConnectToken::from([0xAA; CONNECT_TOKEN_BYTES]);
        assert!(!token.is_zeroed());
        token.clear();
        assert!(token.is_zeroed());
    }

    #[test]
    fn cbor_roundtrip_preserves_bytes() {
        let token = ChallengeToken::from([0xCC; CHALLENGE_TOKEN_BYTES]);
        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&token, &mut encoded).unwrap();
        let decoded: ChallengeToken = ciborium::de::from_reader(encoded.as_slice()).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn cbor_rejects_wrong_length() {
        // A 7-byte CBOR byte string must not deserialize as a TokenNonce.
        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&serde_bytes_like(&[0u8; 7]), &mut encoded).unwrap();
        let decoded: Result<TokenNonce, _> = ciborium::de::from_reader(encoded.as_slice());
        assert!(decoded.is_err());
    }

    #[test]
    fn debug_is_redacted() {
        let key = Key::from([0x41; KEY_BYTES]);
        assert_eq!(format!("{key:?}"), "Key(…)");

        let nonce = TokenNonce::from([0xBB; NONCE_BYTES]);
        let debug = format!("{nonce:?}");
        assert!(debug.starts_with("TokenNonce(bbbbbbbb"));
        assert!(!debug.contains(&"bb".repeat(NONCE_BYTES)));
    }

    /// Wrap a slice so ciborium emits a byte string rather than an array.
    fn serde_bytes_like(bytes: &[u8]) -> impl Serialize + '_ {
        struct AsBytes<'a>(&'a [u8]);
        impl Serialize for AsBytes<'_> {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_bytes(self.0)
            }
        }
        AsBytes(bytes)
    }
}
