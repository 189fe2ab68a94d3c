//! Core identifiers and newtypes

use serde::{Deserialize, Serialize};

/// Size of an address in bytes
pub const ADDRESS_SIZE: usize = 20;

/// Identity of a caller: a group member, an approval group, the governance
/// manager or the emergency admin (20 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(#[serde(with = "hex_bytes_20")] pub [u8; ADDRESS_SIZE]);

impl Address {
    /// The absent address
    pub const ZERO: Address = Address([0u8; ADDRESS_SIZE]);

    /// Create a new Address from bytes
    pub fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Address whose every byte is `b` (handy for fixtures)
    pub fn repeat_byte(b: u8) -> Self {
        Self([b; ADDRESS_SIZE])
    }

    /// Take the trailing 20 bytes of a 32-byte digest
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(&digest[32 - ADDRESS_SIZE..]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_SIZE]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex, with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; ADDRESS_SIZE];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Short display format (first 4 bytes as hex)
    pub fn short(&self) -> String {
        format!("0x{}..", hex::encode(&self.0[..4]))
    }
}

impl core::fmt::Display for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

macro_rules! digest_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(#[serde(with = "hex_bytes_32")] pub [u8; 32]);

        impl $name {
            pub fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from hex, with or without a `0x` prefix
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s, &mut bytes)?;
                Ok(Self(bytes))
            }

            /// Short display format (first 4 bytes as hex)
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "0x{}", self.to_hex())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

digest_newtype!(
    /// Digest of an accumulator value; doubles as the parent hash of a proposal
    AccumulatorHash
);

digest_newtype!(
    /// Caller-supplied idempotency key for one logical intent
    OperationId
);

digest_newtype!(
    /// Digest of an external device identifier, the key of a device record
    DeviceKey
);

digest_newtype!(
    /// Key of a queued governance change
    ChangeKey
);

/// Identity of a mutating call: the immediate caller plus the external
/// party that originated it.
///
/// For calls made through an approval group `caller` is the group's address
/// while `origin` is the member who submitted the batched approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub caller: Address,
    pub origin: Address,
}

impl CallContext {
    pub fn new(caller: Address, origin: Address) -> Self {
        Self { caller, origin }
    }

    /// A call made directly by an externally owned identity
    pub fn direct(caller: Address) -> Self {
        Self {
            caller,
            origin: caller,
        }
    }
}

/// Serde helper for 32-byte arrays as hex strings
pub mod hex_bytes_32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(serde::de::Error::custom)?;
        Ok(bytes)
    }
}

/// Serde helper for 20-byte arrays as hex strings
pub mod hex_bytes_20 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 20], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 20], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(s, &mut bytes).map_err(serde::de::Error::custom)?;
        Ok(bytes)
    }
}

/// Serde helper for variable-length byte strings as hex
pub mod hex_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_roundtrip() {
        let addr = Address::repeat_byte(0xab);
        let recovered = Address::from_hex(&addr.to_hex()).unwrap();
        assert_eq!(addr, recovered);

        let prefixed = Address::from_hex(&addr.to_string()).unwrap();
        assert_eq!(addr, prefixed);
    }

    #[test]
    fn test_zero_address() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::repeat_byte(1).is_zero());
    }

    #[test]
    fn test_address_from_digest_takes_tail() {
        let mut digest = [0u8; 32];
        digest[12] = 0x77;
        digest[31] = 0x01;
        let addr = Address::from_digest(&digest);
        assert_eq!(addr.0[0], 0x77);
        assert_eq!(addr.0[19], 0x01);
    }

    #[test]
    fn test_operation_id_serde_is_hex() {
        let op = OperationId::new([0x11; 32]);
        let json = serde_json::to_string(&op).unwrap();
        assert_eq!(json, format!("\"{}\"", "11".repeat(32)));

        let recovered: OperationId = serde_json::from_str(&json).unwrap();
        assert_eq!(op, recovered);
    }

    #[test]
    fn test_call_context_direct() {
        let admin = Address::repeat_byte(9);
        let ctx = CallContext::direct(admin);
        assert_eq!(ctx.caller, ctx.origin);
    }
}
