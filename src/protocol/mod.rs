//! Wire messages and the request/response/broadcast naming convention.
pub mod message;

pub use message::{
    is_broadcast_type, is_request_type, is_response_type, request_type_for, response_type_for,
    ProtocolMessage, ENVELOPE_TYPE_URL, MAX_DATAGRAM_SIZE,
};
