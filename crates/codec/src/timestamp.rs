use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rivet_common::CodecError;

/// versão (1) + segundos Unix i64 BE (8) + nanos u32 BE (4)
pub const TIMESTAMP_LEN: usize = 13;

const TIMESTAMP_VERSION: u8 = 1;
const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Serializa um instante absoluto de relógio de parede.
/// Instantes anteriores à época Unix usam segundos negativos e nanos positivos.
pub fn encode_timestamp(at: SystemTime) -> Bytes {
    let (secs, nanos) = match at.duration_since(UNIX_EPOCH) {
        Ok(d) => (i64::try_from(d.as_secs()).unwrap_or(i64::MAX), d.subsec_nanos()),
        Err(e) => {
            let d = e.duration();
            let secs = i64::try_from(d.as_secs()).unwrap_or(i64::MAX);
            if d.subsec_nanos() == 0 {
                (-secs, 0)
            } else {
                (-secs - 1, NANOS_PER_SEC - d.subsec_nanos())
            }
        }
    };

    let mut buf = BytesMut::with_capacity(TIMESTAMP_LEN);
    buf.put_u8(TIMESTAMP_VERSION);
    buf.put_i64(secs);
    buf.put_u32(nanos);
    buf.freeze()
}

/// Desserializa um instante gravado por [`encode_timestamp`].
pub fn decode_timestamp(mut src: &[u8]) -> Result<SystemTime, CodecError> {
    if src.len() != TIMESTAMP_LEN {
        return Err(CodecError::CorruptTimestamp(format!(
            "esperados {TIMESTAMP_LEN} bytes, recebidos {}",
            src.len()
        )));
    }

    let version = src.get_u8();
    if version != TIMESTAMP_VERSION {
        return Err(CodecError::CorruptTimestamp(format!(
            "versão desconhecida: {version}"
        )));
    }

    let secs = src.get_i64();
    let nanos = src.get_u32();
    if nanos >= NANOS_PER_SEC {
        return Err(CodecError::CorruptTimestamp(format!(
            "nanossegundos fora do intervalo: {nanos}"
        )));
    }

    let instant = if secs >= 0 {
        UNIX_EPOCH.checked_add(Duration::new(secs as u64, nanos))
    } else {
        UNIX_EPOCH
            .checked_sub(Duration::from_secs(secs.unsigned_abs()))
            .and_then(|t| t.checked_add(Duration::from_nanos(u64::from(nanos))))
    };

    instant.ok_or_else(|| {
        CodecError::CorruptTimestamp(format!("instante não representável: {secs}s"))
    })
}
