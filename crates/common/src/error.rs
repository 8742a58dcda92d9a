/// Erros de codificação das chaves compostas e dos registros de expiração.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("chave composta malformada: prefixo declara {declared} bytes, restam {available}")]
    MalformedKey { declared: u64, available: usize },
    #[error("varint truncado ou maior que 64 bits")]
    TruncatedVarint,
    #[error("timestamp de expiração corrompido: {0}")]
    CorruptTimestamp(String),
    #[error("inteiro inválido: esperados 8 bytes, recebidos {0}")]
    InvalidInteger(usize),
}

/// Erros de armazenamento/engine de dados.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Falha da engine (I/O, disco cheio, arquivo travado). Nunca é re-tentada aqui.
    #[error("falha na engine de armazenamento: {0}")]
    Engine(#[from] redb::Error),
    #[error("nome de bucket inválido: '{0}'")]
    InvalidBucket(String),
    #[error("valor não é um inteiro válido")]
    NotAnInteger,
    #[error("TTL excede o maior instante representável")]
    TtlOverflow,
    #[error("erro de serialização: {0}")]
    Serialization(String),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

// A engine tem um tipo de erro por etapa da transação; todos convergem em Engine.
macro_rules! engine_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StorageError {
                fn from(e: $ty) -> Self {
                    StorageError::Engine(e.into())
                }
            }
        )*
    };
}

engine_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// Erro top-level do Rivet.
#[derive(Debug, thiserror::Error)]
pub enum RivetError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type alias.
pub type RivetResult<T> = Result<T, RivetError>;

impl From<std::io::Error> for RivetError {
    fn from(e: std::io::Error) -> Self {
        RivetError::Storage(StorageError::Io(e))
    }
}

impl From<redb::Error> for RivetError {
    fn from(e: redb::Error) -> Self {
        RivetError::Storage(StorageError::Engine(e))
    }
}
