//! Protocol Message
//!
//! The single wire unit exchanged between peers. A message is either direct
//! (its `type_url` names the payload type) or a broadcast envelope (its
//! `type_url` is [`ENVELOPE_TYPE_URL`] and its `value` is the encoded inner
//! message). An envelope always carries the correlation id of the message it
//! wraps.
//!
//! All messages use bincode with the big-endian standard configuration, matching
//! the rest of the node's internal traffic.
use bincode::{Decode, Encode};

use crate::correlation::CorrelationId;
use crate::error::{Result, RumorError};
use crate::peer::PeerId;

/// Reserved type tag marking a broadcast envelope
pub const ENVELOPE_TYPE_URL: &str = "rumor.Envelope";

pub const REQUEST_SUFFIX: &str = "Request";
pub const RESPONSE_SUFFIX: &str = "Response";
pub const BROADCAST_SUFFIX: &str = "Broadcast";

/// Largest UDP payload, and the most a single decode may claim
pub const MAX_DATAGRAM_SIZE: usize = 65536;

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ProtocolMessage {
    pub correlation_id: CorrelationId,
    /// Peer that put this message on the wire
    pub sender: PeerId,
    /// Tag telling the receiver how to decode `value`
    pub type_url: String,
    pub value: Vec<u8>,
}

impl ProtocolMessage {
    pub fn new(
        type_url: impl Into<String>,
        value: Vec<u8>,
        sender: PeerId,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            correlation_id,
            sender,
            type_url: type_url.into(),
            value,
        }
    }

    /// New message starting its own exchange
    pub fn originate(type_url: impl Into<String>, value: Vec<u8>, sender: PeerId) -> Self {
        Self::new(type_url, value, sender, CorrelationId::generate())
    }

    /// Build the response to `request`, reusing its correlation id
    pub fn respond_to(
        request: &ProtocolMessage,
        value: Vec<u8>,
        sender: PeerId,
    ) -> Result<Self> {
        let type_url = response_type_for(&request.type_url)?;
        Ok(Self::new(type_url, value, sender, request.correlation_id))
    }

    pub fn is_broadcast(&self) -> bool {
        self.type_url == ENVELOPE_TYPE_URL
    }

    pub fn is_request(&self) -> bool {
        is_request_type(&self.type_url)
    }

    pub fn is_response(&self) -> bool {
        is_response_type(&self.type_url)
    }

    /// Wrap this message in a broadcast envelope sent by `forwarder`
    pub fn into_broadcast_envelope(self, forwarder: PeerId) -> Result<ProtocolMessage> {
        if self.is_broadcast() {
            return Err(crate::protocol_error!(
                "Cannot wrap message {} which is already a broadcast envelope",
                self.correlation_id
            ));
        }
        let correlation_id = self.correlation_id;
        let value = self.encode()?;
        Ok(Self::new(ENVELOPE_TYPE_URL, value, forwarder, correlation_id))
    }

    /// Decode the message carried by a broadcast envelope
    pub fn unwrap_broadcast(&self) -> Result<ProtocolMessage> {
        if !self.is_broadcast() {
            return Err(crate::protocol_error!(
                "Message {} of type {} is not a broadcast envelope",
                self.correlation_id,
                self.type_url
            ));
        }
        let inner = Self::decode(&self.value)?;
        if inner.is_broadcast() {
            return Err(crate::protocol_error!(
                "Broadcast envelope {} wraps another envelope",
                self.correlation_id
            ));
        }
        if inner.correlation_id != self.correlation_id {
            return Err(crate::protocol_error!(
                "Broadcast envelope {} carries message {}",
                self.correlation_id,
                inner.correlation_id
            ));
        }
        Ok(inner)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let config = bincode::config::standard().with_big_endian();
        Ok(bincode::encode_to_vec(self, config)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let config = bincode::config::standard()
            .with_big_endian()
            .with_limit::<MAX_DATAGRAM_SIZE>();
        let (message, _) = bincode::decode_from_slice(data, config)?;
        Ok(message)
    }
}

pub fn is_request_type(type_url: &str) -> bool {
    type_url.ends_with(REQUEST_SUFFIX)
}

pub fn is_response_type(type_url: &str) -> bool {
    type_url.ends_with(RESPONSE_SUFFIX)
}

pub fn is_broadcast_type(type_url: &str) -> bool {
    type_url.ends_with(BROADCAST_SUFFIX)
}

/// `FooResponse` -> `FooRequest`
pub fn request_type_for(response_type: &str) -> Result<String> {
    response_type
        .strip_suffix(RESPONSE_SUFFIX)
        .map(|stem| format!("{}{}", stem, REQUEST_SUFFIX))
        .ok_or_else(|| RumorError::TypeMismatch {
            request_type: "<none>".to_string(),
            response_type: response_type.to_string(),
        })
}

/// `FooRequest` -> `FooResponse`
pub fn response_type_for(request_type: &str) -> Result<String> {
    request_type
        .strip_suffix(REQUEST_SUFFIX)
        .map(|stem| format!("{}{}", stem, RESPONSE_SUFFIX))
        .ok_or_else(|| RumorError::TypeMismatch {
            request_type: request_type.to_string(),
            response_type: "<none>".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SerializationError;

    fn ping() -> ProtocolMessage {
        ProtocolMessage::originate("PingRequest", vec![1, 2, 3], PeerId::new(7))
    }

    #[test]
    fn test_suffix_swapping() {
        assert_eq!(request_type_for("PingResponse").unwrap(), "PingRequest");
        assert_eq!(response_type_for("PingRequest").unwrap(), "PingResponse");
        assert!(matches!(
            request_type_for("PingRequest"),
            Err(RumorError::TypeMismatch { .. })
        ));
        assert!(is_broadcast_type("TransactionBroadcast"));
    }

    #[test]
    fn test_envelope_wrap_and_unwrap() {
        let original = ping();
        let envelope = original.clone().into_broadcast_envelope(PeerId::new(9)).unwrap();

        assert!(envelope.is_broadcast());
        assert_eq!(envelope.correlation_id, original.correlation_id);
        assert_eq!(envelope.sender, PeerId::new(9));

        let inner = envelope.unwrap_broadcast().unwrap();
        assert_eq!(inner, original);
    }

    #[test]
    fn test_nested_envelope_rejected() {
        let envelope = ping().into_broadcast_envelope(PeerId::new(9)).unwrap();
        let err = envelope.into_broadcast_envelope(PeerId::new(9)).unwrap_err();
        assert!(err.is_caller_fault());
    }

    #[test]
    fn test_unwrap_direct_message_rejected() {
        let err = ping().unwrap_broadcast().unwrap_err();
        assert!(matches!(err, RumorError::ProtocolMisuse(_)));
    }

    #[test]
    fn test_decode_garbage_is_serialization_error() {
        let err = ProtocolMessage::decode(&[0xff, 0x01]).unwrap_err();
        assert!(matches!(err, RumorError::Serialization(_)));
    }

    #[test]
    fn test_decode_rejects_oversized_length_claim() {
        // id, sender, then a type_url claiming ~1 TiB
        let mut data = vec![0u8; 16];
        data.push(0x00);
        data.push(0xFD);
        data.extend_from_slice(&0x0000_00FF_FFFF_FFFFu64.to_be_bytes());

        let err = ProtocolMessage::decode(&data).unwrap_err();
        assert!(matches!(
            err,
            RumorError::Serialization(SerializationError::Decode(
                bincode::error::DecodeError::LimitExceeded
            ))
        ));
    }

    #[test]
    fn test_envelope_with_foreign_correlation_id_rejected() {
        let inner = ping();
        let forged = ProtocolMessage::new(
            ENVELOPE_TYPE_URL,
            inner.encode().unwrap(),
            PeerId::new(9),
            CorrelationId::generate(),
        );

        let err = forged.unwrap_broadcast().unwrap_err();
        assert!(matches!(err, RumorError::ProtocolMisuse(_)));
    }

    #[test]
    fn test_respond_to_keeps_correlation() {
        let request = ping();
        let response = ProtocolMessage::respond_to(&request, vec![], PeerId::new(8)).unwrap();
        assert_eq!(response.type_url, "PingResponse");
        assert_eq!(response.correlation_id, request.correlation_id);
        assert!(response.is_response());
    }
}
