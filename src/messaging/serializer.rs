use crate::errors::CodecError;
use crate::models::{ControlMessage, SessionReply};

/// Converts session envelopes to and from the bytes carried by pub/sub.
pub trait WireSerializer: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn encode_reply(&self, reply: &SessionReply) -> Result<Vec<u8>, CodecError>;

    fn decode_reply(&self, bytes: &[u8]) -> Result<SessionReply, CodecError>;

    fn encode_control(&self, message: &ControlMessage) -> Result<Vec<u8>, CodecError>;

    fn decode_control(&self, bytes: &[u8]) -> Result<ControlMessage, CodecError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl WireSerializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode_reply(&self, reply: &SessionReply) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(reply)?)
    }

    fn decode_reply(&self, bytes: &[u8]) -> Result<SessionReply, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode_control(&self, message: &ControlMessage) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(message)?)
    }

    fn decode_control(&self, bytes: &[u8]) -> Result<ControlMessage, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
