use bytes::{Buf, Bytes};
use rivet_common::CodecError;

/// Inteiros são gravados como 8 bytes big-endian com sinal.
pub fn encode_i64(n: i64) -> Bytes {
    Bytes::copy_from_slice(&n.to_be_bytes())
}

pub fn decode_i64(mut src: &[u8]) -> Result<i64, CodecError> {
    if src.len() != 8 {
        return Err(CodecError::InvalidInteger(src.len()));
    }
    Ok(src.get_i64())
}
