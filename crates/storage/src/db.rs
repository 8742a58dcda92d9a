use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use redb::{Database, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use rivet_codec::{CompositeKey, decode_i64, decode_timestamp, encode_i64};
use rivet_common::{DEFAULT_BUCKET, EXPIRE_BUCKET, StorageError};

use crate::engine::{ByteTable, EXPIRE_TABLE, bucket_table, with_read, with_write};
use crate::expire::{self, Outcome, Ttl, classify};
use crate::registry::{Lease, Registry};

/// Registro do índice de expiração, já decodificado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationEntry {
    pub bucket: String,
    pub key: Bytes,
    pub at: SystemTime,
}

/// Handle lógico para um bucket de um arquivo.
///
/// Vários handles (do mesmo bucket ou de buckets diferentes) podem apontar
/// para o mesmo arquivo; a engine é compartilhada através do [`Registry`].
/// Soltar o handle (ou chamar [`close`](Self::close)) devolve a referência.
///
/// Leituras consultam o índice de expiração antes de responder e podem
/// remover a entrada vencida: nenhuma operação aqui é estritamente read-only.
pub struct Rivet {
    // Campos caem na ordem de declaração: o Arc precisa sair antes do lease
    db: Arc<Database>,
    lease: Lease,
    bucket: String,
}

impl Rivet {
    /// Abre `bucket` no arquivo `path`, criando arquivo e bucket se preciso.
    pub fn open(
        registry: &Registry,
        path: impl AsRef<Path>,
        bucket: &str,
    ) -> Result<Rivet, StorageError> {
        if bucket.is_empty() || bucket == EXPIRE_BUCKET {
            return Err(StorageError::InvalidBucket(bucket.to_string()));
        }

        let (path, db) = registry.acquire(path)?;
        // Daqui em diante o lease devolve a referência mesmo se a criação falhar
        let rivet = Rivet {
            db,
            lease: Lease::new(registry, path),
            bucket: bucket.to_string(),
        };

        with_write(&rivet.db, |txn| {
            txn.open_table(rivet.table())?;
            txn.open_table(EXPIRE_TABLE)?;
            Ok(())
        })?;

        Ok(rivet)
    }

    /// Abre o bucket padrão (`__default__`).
    pub fn open_default(registry: &Registry, path: impl AsRef<Path>) -> Result<Rivet, StorageError> {
        Self::open(registry, path, DEFAULT_BUCKET)
    }

    /// Abre outro bucket no mesmo arquivo.
    pub fn bucket(&self, name: &str) -> Result<Rivet, StorageError> {
        Self::open(self.lease.registry(), self.lease.path(), name)
    }

    pub fn name(&self) -> &str {
        &self.bucket
    }

    pub fn path(&self) -> &Path {
        self.lease.path()
    }

    /// Fecha o handle. Equivale a soltá-lo.
    pub fn close(self) {}

    fn table(&self) -> ByteTable<'_> {
        bucket_table(&self.bucket)
    }

    // --- Escrita ---

    /// Grava o valor e remove qualquer TTL anterior, numa única transação.
    pub fn set_bytes(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<(), StorageError> {
        let key = key.as_ref();
        with_write(&self.db, |txn| {
            {
                let mut table = txn.open_table(self.table())?;
                table.insert(key, value.as_ref())?;
            }
            expire::clear_expiration(txn, &self.bucket, key)?;
            Ok(())
        })
    }

    pub fn set(&self, key: impl AsRef<[u8]>, value: &str) -> Result<(), StorageError> {
        self.set_bytes(key, value)
    }

    /// Grava o valor com TTL relativo ao instante atual.
    pub fn set_x(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        self.set_x_at(key, value, deadline(ttl)?)
    }

    /// Grava valor + prazo absoluto na mesma transação. Prazo no passado
    /// deixa a entrada expirada desde já.
    pub fn set_x_at(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        at: SystemTime,
    ) -> Result<(), StorageError> {
        let key = key.as_ref();
        with_write(&self.db, |txn| {
            {
                let mut table = txn.open_table(self.table())?;
                table.insert(key, value.as_ref())?;
            }
            expire::set_expiration(txn, &self.bucket, key, at)
        })
    }

    pub fn set_int(&self, key: impl AsRef<[u8]>, n: i64) -> Result<(), StorageError> {
        self.set_bytes(key, encode_i64(n))
    }

    pub fn set_data<T: Serialize + ?Sized>(
        &self,
        key: impl AsRef<[u8]>,
        data: &T,
    ) -> Result<(), StorageError> {
        let encoded =
            serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.set_bytes(key, encoded)
    }

    /// Remove a entrada e seu TTL. Retorna se havia uma entrada viva.
    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<bool, StorageError> {
        let key = key.as_ref();
        with_write(&self.db, |txn| {
            let due = classify(
                expire::expiration_in(txn, &self.bucket, key)?,
                SystemTime::now(),
            ) == Outcome::Expired;
            let existed = {
                let mut table = txn.open_table(self.table())?;
                let removed = table.remove(key)?.is_some();
                removed
            };
            expire::clear_expiration(txn, &self.bucket, key)?;
            Ok(existed && !due)
        })
    }

    // --- Expiração ---

    /// Define TTL para uma chave existente. Chave ausente: no-op, retorna `false`.
    pub fn expire(&self, key: impl AsRef<[u8]>, ttl: Duration) -> Result<bool, StorageError> {
        self.expire_at(key, deadline(ttl)?)
    }

    /// Igual a [`expire`](Self::expire) com prazo absoluto; aceita instantes no passado.
    ///
    /// Entrada com prazo já vencido conta como ausente: é removida aqui
    /// mesmo e o novo prazo não é gravado.
    pub fn expire_at(&self, key: impl AsRef<[u8]>, at: SystemTime) -> Result<bool, StorageError> {
        let key = key.as_ref();
        with_write(&self.db, |txn| {
            let due = classify(
                expire::expiration_in(txn, &self.bucket, key)?,
                SystemTime::now(),
            ) == Outcome::Expired;
            let exists = {
                let mut table = txn.open_table(self.table())?;
                if due {
                    table.remove(key)?;
                    false
                } else {
                    let found = table.get(key)?.is_some();
                    found
                }
            };
            if due {
                expire::clear_expiration(txn, &self.bucket, key)?;
                debug!(bucket = %self.bucket, "expire em chave vencida: entrada removida");
            } else if exists {
                expire::set_expiration(txn, &self.bucket, key, at)?;
            } else {
                debug!(bucket = %self.bucket, "expire em chave inexistente ignorado");
            }
            Ok(exists)
        })
    }

    /// Remove o TTL de uma chave viva, tornando-a permanente.
    pub fn persist(&self, key: impl AsRef<[u8]>) -> Result<bool, StorageError> {
        let key = key.as_ref();
        if self.ttl(key)? == Ttl::KeyNotFound {
            return Ok(false);
        }
        with_write(&self.db, |txn| expire::clear_expiration(txn, &self.bucket, key))
    }

    /// TTL restante: `KeyNotFound` se a entrada não existe (ou acabou de
    /// expirar), `NoExpiration` se não há prazo.
    pub fn ttl(&self, key: impl AsRef<[u8]>) -> Result<Ttl, StorageError> {
        let key = key.as_ref();
        if !self.contains_raw(key)? {
            return Ok(Ttl::KeyNotFound);
        }
        let ttl = match expire::check_and_evict(&self.db, &self.bucket, key)? {
            Outcome::Expired => Ttl::KeyNotFound,
            Outcome::NoExpiration => Ttl::NoExpiration,
            Outcome::Alive { remaining } => Ttl::Remaining(remaining),
        };
        Ok(ttl)
    }

    // --- Leitura ---

    pub fn get_bytes(&self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>, StorageError> {
        let key = key.as_ref();
        if expire::check_and_evict(&self.db, &self.bucket, key)? == Outcome::Expired {
            return Ok(None);
        }
        with_read(&self.db, |txn| {
            let table = txn.open_table(self.table())?;
            let value = table.get(key)?.map(|v| Bytes::copy_from_slice(v.value()));
            Ok(value)
        })
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<String>, StorageError> {
        match self.get_bytes(key)? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|_| StorageError::Serialization("valor não é UTF-8 válido".into())),
            None => Ok(None),
        }
    }

    pub fn get_int(&self, key: impl AsRef<[u8]>) -> Result<Option<i64>, StorageError> {
        match self.get_bytes(key)? {
            Some(bytes) => decode_i64(&bytes)
                .map(Some)
                .map_err(|_| StorageError::NotAnInteger),
            None => Ok(None),
        }
    }

    /// Como [`get_int`](Self::get_int), mas chave ausente vira `(0, false)`.
    pub fn get_int_ok(&self, key: impl AsRef<[u8]>) -> Result<(i64, bool), StorageError> {
        Ok(match self.get_int(key)? {
            Some(n) => (n, true),
            None => (0, false),
        })
    }

    pub fn get_data<T: DeserializeOwned>(
        &self,
        key: impl AsRef<[u8]>,
    ) -> Result<Option<T>, StorageError> {
        match self.get_bytes(key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn exists(&self, key: impl AsRef<[u8]>) -> Result<bool, StorageError> {
        Ok(self.ttl(key)? != Ttl::KeyNotFound)
    }

    /// Chaves vivas do bucket, em ordem crescente de bytes.
    ///
    /// Primeiro coleta chaves e prazos num único snapshot de leitura; só
    /// depois de fechá-lo remove as vencidas, cada uma na sua transação.
    /// O custo é O(n) no tamanho do bucket.
    pub fn keys_bytes(&self) -> Result<Vec<Bytes>, StorageError> {
        let collected = with_read(&self.db, |txn| {
            let table = txn.open_table(self.table())?;
            let expires = txn.open_table(EXPIRE_TABLE)?;
            let mut collected = Vec::new();
            for item in table.iter()? {
                let (key, _) = item?;
                let key = Bytes::copy_from_slice(key.value());
                let composite = CompositeKey::encode(self.bucket.as_bytes(), &key);
                let at = expire::read_expiration(&expires, &composite)?;
                collected.push((key, at));
            }
            Ok(collected)
        })?;

        let now = SystemTime::now();
        let mut keys = Vec::with_capacity(collected.len());
        for (key, at) in collected {
            let alive = match classify(at, now) {
                Outcome::Expired => expire::evict_if_due(&self.db, &self.bucket, &key)? != Outcome::Expired,
                _ => true,
            };
            if alive {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    pub fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .keys_bytes()?
            .iter()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .collect())
    }

    /// Lista todo o índice de expiração do arquivo (todos os buckets).
    /// Uso de manutenção/depuração; registros ilegíveis são pulados.
    pub fn expirations(&self) -> Result<Vec<ExpirationEntry>, StorageError> {
        with_read(&self.db, |txn| {
            let table = txn.open_table(EXPIRE_TABLE)?;
            let mut entries = Vec::new();
            for item in table.iter()? {
                let (packed, raw) = item?;
                let (bucket, key) = match CompositeKey::decode_slice(packed.value()) {
                    Ok(parts) => parts,
                    Err(e) => {
                        warn!("chave do índice ignorada: {e}");
                        continue;
                    }
                };
                let at = match decode_timestamp(raw.value()) {
                    Ok(at) => at,
                    Err(e) => {
                        warn!("registro de expiração ignorado: {e}");
                        continue;
                    }
                };
                entries.push(ExpirationEntry {
                    bucket: String::from_utf8_lossy(bucket).into_owned(),
                    key: Bytes::copy_from_slice(key),
                    at,
                });
            }
            Ok(entries)
        })
    }

    /// Existência física no bucket, sem consultar a expiração.
    fn contains_raw(&self, key: &[u8]) -> Result<bool, StorageError> {
        with_read(&self.db, |txn| {
            let table = txn.open_table(self.table())?;
            let found = table.get(key)?.is_some();
            Ok(found)
        })
    }
}

impl fmt::Debug for Rivet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rivet")
            .field("path", &self.lease.path())
            .field("bucket", &self.bucket)
            .finish()
    }
}

fn deadline(ttl: Duration) -> Result<SystemTime, StorageError> {
    SystemTime::now()
        .checked_add(ttl)
        .ok_or(StorageError::TtlOverflow)
}
