//! Índice de expiração.
//!
//! Um namespace único (`__expires__`) guarda `CompositeKey(bucket, key) →
//! instante absoluto` para todos os buckets do arquivo. A expiração é
//! preguiçosa: nenhuma tarefa de fundo varre o índice, cada leitura consulta
//! o registro e remove valor + registro quando o prazo venceu.
//!
//! Consequência para quem chama: operações de leitura (`get`, `ttl`,
//! `exists`, `keys`) podem executar uma escrita limitada (a remoção da
//! entrada vencida).

use std::time::{Duration, SystemTime};

use redb::{Database, ReadableTable, WriteTransaction};
use tracing::{debug, trace, warn};

use rivet_codec::{CompositeKey, decode_timestamp, encode_timestamp};
use rivet_common::{KEY_NOT_FOUND, NO_EXPIRATION, StorageError};

use crate::engine::{EXPIRE_TABLE, bucket_table, with_read, with_write};

/// Resultado de consultar o registro de expiração de uma chave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Sem registro: a entrada (se existir) é permanente.
    NoExpiration,
    /// Prazo no futuro.
    Alive { remaining: Duration },
    /// Prazo vencido; a entrada e o registro foram removidos.
    Expired,
}

/// Resposta de `TTL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    KeyNotFound,
    NoExpiration,
    Remaining(Duration),
}

impl Ttl {
    /// Milissegundos restantes, ou as sentinelas `-1` / `-2`.
    pub fn as_millis(&self) -> i64 {
        match self {
            Ttl::KeyNotFound => KEY_NOT_FOUND,
            Ttl::NoExpiration => NO_EXPIRATION,
            // Chave viva nunca reporta 0
            Ttl::Remaining(d) => i64::try_from(d.as_millis().max(1)).unwrap_or(i64::MAX),
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Ttl::Remaining(d) => Some(*d),
            _ => None,
        }
    }
}

/// Classifica um prazo em relação a `now`. Prazo igual a `now` já venceu.
pub(crate) fn classify(at: Option<SystemTime>, now: SystemTime) -> Outcome {
    match at {
        None => Outcome::NoExpiration,
        Some(at) => match at.duration_since(now) {
            Ok(remaining) if !remaining.is_zero() => Outcome::Alive { remaining },
            _ => Outcome::Expired,
        },
    }
}

/// Lê o prazo gravado. Registro corrompido vira `None` (chave permanente):
/// metadado ruim nunca derruba uma leitura nem apaga dados.
pub(crate) fn read_expiration(
    table: &impl ReadableTable<&'static [u8], &'static [u8]>,
    composite: &CompositeKey,
) -> Result<Option<SystemTime>, StorageError> {
    let Some(raw) = table.get(composite.as_bytes())? else {
        return Ok(None);
    };
    match decode_timestamp(raw.value()) {
        Ok(at) => Ok(Some(at)),
        Err(e) => {
            warn!("registro de expiração ignorado: {e}");
            Ok(None)
        }
    }
}

/// Grava (ou sobrescreve) o prazo de (bucket, key). Não verifica se a entrada existe.
pub(crate) fn set_expiration(
    txn: &WriteTransaction,
    bucket: &str,
    key: &[u8],
    at: SystemTime,
) -> Result<(), StorageError> {
    let composite = CompositeKey::encode(bucket.as_bytes(), key);
    let encoded = encode_timestamp(at);
    let mut table = txn.open_table(EXPIRE_TABLE)?;
    table.insert(composite.as_bytes(), &encoded[..])?;
    debug!(bucket, key = ?String::from_utf8_lossy(key), "expiração gravada");
    Ok(())
}

/// Remove o prazo de (bucket, key). Idempotente; retorna se havia registro.
pub(crate) fn clear_expiration(
    txn: &WriteTransaction,
    bucket: &str,
    key: &[u8],
) -> Result<bool, StorageError> {
    let composite = CompositeKey::encode(bucket.as_bytes(), key);
    let mut table = txn.open_table(EXPIRE_TABLE)?;
    let removed = table.remove(composite.as_bytes())?.is_some();
    Ok(removed)
}

/// Prazo de (bucket, key) dentro de uma transação de escrita já aberta.
pub(crate) fn expiration_in(
    txn: &WriteTransaction,
    bucket: &str,
    key: &[u8],
) -> Result<Option<SystemTime>, StorageError> {
    let composite = CompositeKey::encode(bucket.as_bytes(), key);
    let table = txn.open_table(EXPIRE_TABLE)?;
    read_expiration(&table, &composite)
}

/// Primitiva central da expiração preguiçosa.
///
/// A consulta é feita num snapshot de leitura; só quando o prazo venceu é
/// aberta uma transação de escrita, que relê o registro (pode ter sido
/// renovado nesse intervalo) e remove valor + registro atomicamente.
pub fn check_and_evict(db: &Database, bucket: &str, key: &[u8]) -> Result<Outcome, StorageError> {
    let composite = CompositeKey::encode(bucket.as_bytes(), key);
    let at = with_read(db, |txn| {
        let table = txn.open_table(EXPIRE_TABLE)?;
        read_expiration(&table, &composite)
    })?;

    match classify(at, SystemTime::now()) {
        Outcome::Expired => evict_if_due(db, bucket, key),
        outcome => {
            trace!(bucket, ?outcome, "expiração consultada");
            Ok(outcome)
        }
    }
}

/// Remove (bucket, key) e seu registro se o prazo ainda estiver vencido.
pub(crate) fn evict_if_due(db: &Database, bucket: &str, key: &[u8]) -> Result<Outcome, StorageError> {
    with_write(db, |txn| {
        let outcome = classify(expiration_in(txn, bucket, key)?, SystemTime::now());
        if outcome == Outcome::Expired {
            {
                let mut values = txn.open_table(bucket_table(bucket))?;
                values.remove(key)?;
            }
            clear_expiration(txn, bucket, key)?;
            debug!(bucket, key = ?String::from_utf8_lossy(key), "chave expirada removida");
        }
        Ok(outcome)
    })
}
