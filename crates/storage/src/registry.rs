use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use redb::{Builder, Database};
use tracing::{debug, info};

use rivet_common::{DEFAULT_CACHE_SIZE, StorageError};

/// Configuração aplicada às engines abertas por um [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Cache de páginas da engine, em bytes.
    pub cache_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

/// Engine aberta + número de handles lógicos que a referenciam.
///
/// `db` só fica `None` dentro de `release`, entre fechar a engine e remover
/// a entrada, sempre sob o lock do shard.
struct OpenEngine {
    db: Option<Arc<Database>>,
    refs: usize,
}

struct Shared {
    engines: DashMap<PathBuf, OpenEngine>,
    config: RegistryConfig,
}

/// Registro de arquivos abertos, indexado pelo caminho absoluto.
///
/// Vários handles sobre o mesmo arquivo compartilham uma única engine. A
/// engine é aberta no primeiro `acquire` de um caminho e fechada quando o
/// último `release` zera a contagem. Registros diferentes não compartilham
/// nada entre si.
#[derive(Clone)]
pub struct Registry {
    shared: Arc<Shared>,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Registry {
            shared: Arc::new(Shared {
                engines: DashMap::new(),
                config,
            }),
        }
    }

    pub fn config(&self) -> RegistryConfig {
        self.shared.config
    }

    /// Obtém a engine do arquivo, abrindo (ou criando) se for o primeiro uso.
    /// Retorna o caminho normalizado, que deve ser passado ao `release`.
    pub fn acquire(&self, path: impl AsRef<Path>) -> Result<(PathBuf, Arc<Database>), StorageError> {
        let path = std::path::absolute(path.as_ref())?;

        match self.shared.engines.entry(path.clone()) {
            Entry::Occupied(mut entry) => {
                let engine = entry.get_mut();
                let db = match &engine.db {
                    Some(db) => Arc::clone(db),
                    None => {
                        let db = self.open_engine(&path)?;
                        engine.db = Some(Arc::clone(&db));
                        db
                    }
                };
                engine.refs += 1;
                debug!(path = %path.display(), refs = engine.refs, "engine reutilizada");
                Ok((path, db))
            }
            Entry::Vacant(entry) => {
                let db = self.open_engine(&path)?;
                entry.insert(OpenEngine {
                    db: Some(Arc::clone(&db)),
                    refs: 1,
                });
                Ok((path, db))
            }
        }
    }

    fn open_engine(&self, path: &Path) -> Result<Arc<Database>, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Builder::new()
            .set_cache_size(self.shared.config.cache_size)
            .create(path)?;
        info!(path = %path.display(), "engine aberta");
        Ok(Arc::new(db))
    }

    /// Devolve uma referência obtida com `acquire`. Caminho desconhecido é no-op.
    ///
    /// O chamador deve soltar o seu `Arc<Database>` antes: a engine só fecha
    /// o arquivo quando a última cópia cai.
    pub fn release(&self, path: &Path) {
        if let Entry::Occupied(mut entry) = self.shared.engines.entry(path.to_path_buf()) {
            let engine = entry.get_mut();
            engine.refs = engine.refs.saturating_sub(1);
            if engine.refs == 0 {
                // Fecha ainda sob o lock: um acquire concorrente do mesmo
                // caminho espera aqui em vez de achar o arquivo travado
                drop(engine.db.take());
                entry.remove();
                info!(path = %path.display(), "engine fechada");
            } else {
                debug!(path = %path.display(), refs = engine.refs, "handle liberado");
            }
        }
    }

    /// Quantidade de arquivos com engine aberta.
    pub fn open_count(&self) -> usize {
        self.shared.engines.len()
    }

    /// Número de handles vivos sobre o arquivo (0 se fechado).
    pub fn ref_count(&self, path: impl AsRef<Path>) -> usize {
        let Ok(path) = std::path::absolute(path.as_ref()) else {
            return 0;
        };
        self.shared
            .engines
            .get(&path)
            .map(|engine| engine.refs)
            .unwrap_or(0)
    }
}

/// Referência obtida com `acquire`, devolvida ao registro quando cai.
pub(crate) struct Lease {
    registry: Registry,
    path: PathBuf,
}

impl Lease {
    pub(crate) fn new(registry: &Registry, path: PathBuf) -> Lease {
        Lease {
            registry: registry.clone(),
            path,
        }
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.registry.release(&self.path);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
