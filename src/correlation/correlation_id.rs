use bincode::{Decode, Encode};

/// Opaque 128-bit identifier naming one request/response exchange or one broadcast.
///
/// Encoded on the wire as exactly 16 bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct CorrelationId([u8; 16]);

impl CorrelationId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(rand::random::<u128>().to_be_bytes())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn as_u128(&self) -> u128 {
        u128::from_be_bytes(self.0)
    }
}

impl From<u128> for CorrelationId {
    fn from(value: u128) -> Self {
        Self(value.to_be_bytes())
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.as_u128())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: HashSet<CorrelationId> = (0..1000).map(|_| CorrelationId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_equality_is_by_value() {
        let id = CorrelationId::from(42u128);
        assert_eq!(id, CorrelationId::from_bytes(*id.as_bytes()));
        assert_eq!(id.as_u128(), 42);
    }

    #[test]
    fn test_encodes_to_sixteen_bytes() {
        let config = bincode::config::standard().with_big_endian();
        let encoded = bincode::encode_to_vec(CorrelationId::generate(), config).unwrap();
        assert_eq!(encoded.len(), 16);
    }

    #[test]
    fn test_display_is_hex() {
        let id = CorrelationId::from(255u128);
        assert_eq!(id.to_string(), format!("{:032x}", 255));
    }
}
