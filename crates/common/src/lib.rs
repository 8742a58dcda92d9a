#![forbid(unsafe_code)]

mod error;

pub use error::*;

/// Bucket usado quando nenhum é informado na abertura.
pub const DEFAULT_BUCKET: &str = "__default__";
/// Namespace reservado do índice de expiração, compartilhado por todos os buckets.
pub const EXPIRE_BUCKET: &str = "__expires__";

/// Sentinela de TTL: a chave existe mas não tem expiração.
pub const NO_EXPIRATION: i64 = -1;
/// Sentinela de TTL: a chave não existe (ou acabou de expirar).
pub const KEY_NOT_FOUND: i64 = -2;

pub const DEFAULT_DB_FILE: &str = "rivet.redb";
pub const DEFAULT_CACHE_SIZE: usize = 64 * 1024 * 1024; // 64 MB
