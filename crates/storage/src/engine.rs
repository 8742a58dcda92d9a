use redb::{Database, ReadTransaction, TableDefinition, WriteTransaction};

use rivet_common::{EXPIRE_BUCKET, StorageError};

/// Tabela de bytes opacos: um bucket de valores ou o índice de expiração.
pub(crate) type ByteTable<'a> = TableDefinition<'a, &'static [u8], &'static [u8]>;

/// Índice de expiração: CompositeKey → timestamp absoluto.
pub(crate) const EXPIRE_TABLE: ByteTable<'static> = TableDefinition::new(EXPIRE_BUCKET);

pub(crate) fn bucket_table(name: &str) -> ByteTable<'_> {
    TableDefinition::new(name)
}

/// Executa `f` numa transação de escrita e faz commit.
/// Se `f` falhar (ou der panic) a transação é descartada sem commit, o que
/// faz a engine executar rollback.
pub(crate) fn with_write<T>(
    db: &Database,
    f: impl FnOnce(&WriteTransaction) -> Result<T, StorageError>,
) -> Result<T, StorageError> {
    let txn = db.begin_write()?;
    let out = f(&txn)?;
    txn.commit()?;
    Ok(out)
}

/// Executa `f` sobre um snapshot consistente de leitura.
pub(crate) fn with_read<T>(
    db: &Database,
    f: impl FnOnce(&ReadTransaction) -> Result<T, StorageError>,
) -> Result<T, StorageError> {
    let txn = db.begin_read()?;
    f(&txn)
}
