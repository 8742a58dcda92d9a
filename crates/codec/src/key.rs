use bytes::{Buf, BufMut, Bytes, BytesMut};
use rivet_common::CodecError;

/// Tamanho máximo de um varint de 64 bits (10 grupos de 7 bits).
pub const MAX_VARINT_LEN: usize = 10;

/// Chave do índice de expiração: `uvarint(len(bucket)) ‖ bucket ‖ key`.
///
/// O prefixo de tamanho torna a codificação injetiva: um bucket que é prefixo
/// de outro, ou uma key que começa com bytes parecidos com um bucket, não
/// geram colisão.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey(Bytes);

impl CompositeKey {
    /// Codifica o par (bucket, key). Nunca falha.
    pub fn encode(bucket: &[u8], key: &[u8]) -> CompositeKey {
        let mut buf = BytesMut::with_capacity(MAX_VARINT_LEN + bucket.len() + key.len());
        put_uvarint(&mut buf, bucket.len() as u64);
        buf.put_slice(bucket);
        buf.put_slice(key);
        CompositeKey(buf.freeze())
    }

    /// Recupera (bucket, key). Só falha com bytes corrompidos no índice.
    pub fn decode(&self) -> Result<(&[u8], &[u8]), CodecError> {
        Self::decode_slice(&self.0)
    }

    /// Igual a [`decode`](Self::decode), mas sobre bytes lidos da engine.
    pub fn decode_slice(packed: &[u8]) -> Result<(&[u8], &[u8]), CodecError> {
        let mut src = packed;
        let declared = get_uvarint(&mut src)?;
        if declared > src.len() as u64 {
            return Err(CodecError::MalformedKey {
                declared,
                available: src.len(),
            });
        }
        Ok(src.split_at(declared as usize))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for CompositeKey {
    fn from(bytes: Bytes) -> Self {
        CompositeKey(bytes)
    }
}

impl AsRef<[u8]> for CompositeKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Escreve `n` como LEB128 sem sinal (grupo menos significativo primeiro).
pub fn put_uvarint(dst: &mut impl BufMut, mut n: u64) {
    while n >= 0x80 {
        dst.put_u8((n as u8) | 0x80);
        n >>= 7;
    }
    dst.put_u8(n as u8);
}

/// Lê um LEB128 sem sinal, avançando o slice.
pub fn get_uvarint(src: &mut &[u8]) -> Result<u64, CodecError> {
    let mut value = 0u64;
    let mut shift = 0;

    for i in 0..MAX_VARINT_LEN {
        if !src.has_remaining() {
            return Err(CodecError::TruncatedVarint);
        }
        let byte = src.get_u8();
        // O décimo grupo só pode carregar o bit 63
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            return Err(CodecError::TruncatedVarint);
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte < 0x80 {
            return Ok(value);
        }
        shift += 7;
    }

    Err(CodecError::TruncatedVarint)
}
