//! Framing of relay messages: one version byte followed by the postcard payload.

use crate::error::CodecError;
use crate::traits::SerializationCap;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use postcard::{from_bytes, to_stdvec};
use protocol::PROTOCOL_VERSION;

pub fn encode<T: SerializationCap>(message: &T) -> Result<Vec<u8>, CodecError> {
    let payload = to_stdvec(message).map_err(|e| CodecError::Payload(e.to_string()))?;
    let mut msg_builder = BytesMut::with_capacity(1 + payload.len());
    msg_builder.put_u8(PROTOCOL_VERSION);
    msg_builder.put_slice(&payload);
    Ok(msg_builder.to_vec())
}

pub fn decode<T: SerializationCap>(frame: &[u8]) -> Result<T, CodecError> {
    let mut bytes = Bytes::copy_from_slice(frame);
    if !bytes.has_remaining() {
        return Err(CodecError::Empty);
    }
    let version = bytes.get_u8();
    if version != PROTOCOL_VERSION {
        return Err(CodecError::Version {
            found: version,
            expected: PROTOCOL_VERSION,
        });
    }
    from_bytes(bytes.chunk()).map_err(|e| CodecError::Payload(e.to_string()))
}
