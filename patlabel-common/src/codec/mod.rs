//! Project document codec
//!
//! Two interchangeable backends behind [`CodecBackend`]:
//! - [`StreamingBackend`]: forward-only reader/writer, the format every save
//!   produces.
//! - [`TreeBackend`]: in-memory DOM reader/writer for the older layout.
//!
//! `load` tries the backends in order. When a later backend succeeds after
//! the primary failed, the file is treated as legacy and migrated by an
//! explicit re-save through the primary backend, so the next load takes the
//! fast path. Only parse failures fall through to the next backend; I/O
//! errors and unknown attribute values abort the load.

mod stream;
mod tree;

pub use stream::StreamingBackend;
pub use tree::{sanitize_identifier, TreeBackend};

use crate::project::ProjectState;
use crate::registry::TypeRegistry;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One document format
pub trait CodecBackend: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// Parse `path`; image names are resolved below `root`
    fn try_load(&self, path: &Path, root: &Path, registry: &TypeRegistry) -> Result<ProjectState>;

    /// Write `state` to `path`
    fn try_save(&self, path: &Path, state: &ProjectState, registry: &TypeRegistry) -> Result<()>;
}

/// Result of a successful load
#[derive(Debug)]
pub struct LoadOutcome {
    pub state: ProjectState,
    /// Backend that parsed the document
    pub backend: &'static str,
    /// A non-primary backend was needed
    pub fell_back: bool,
    /// The document was rewritten through the primary backend
    pub migrated: bool,
}

/// Ordered list of backends plus the project context they need
pub struct DocumentCodec {
    registry: Arc<TypeRegistry>,
    root: PathBuf,
    backends: Vec<Box<dyn CodecBackend>>,
}

impl DocumentCodec {
    /// Streaming backend first, tree backend as fallback
    pub fn new(registry: Arc<TypeRegistry>, root: impl Into<PathBuf>) -> Self {
        Self::with_backends(
            registry,
            root,
            vec![Box::new(StreamingBackend), Box::new(TreeBackend)],
        )
    }

    /// Custom backend order; the first entry is the primary (save) backend
    pub fn with_backends(
        registry: Arc<TypeRegistry>,
        root: impl Into<PathBuf>,
        backends: Vec<Box<dyn CodecBackend>>,
    ) -> Self {
        Self {
            registry,
            root: root.into(),
            backends,
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Project root folder image names are resolved against
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn primary(&self) -> Result<&dyn CodecBackend> {
        self.backends
            .first()
            .map(|b| b.as_ref())
            .ok_or_else(|| Error::Config("No codec backends configured".to_string()))
    }

    /// Load with fallback, migrating legacy documents in place
    pub fn load(&self, path: &Path) -> Result<LoadOutcome> {
        let mut outcome = self.read(path)?;
        if outcome.fell_back {
            warn!(
                "{} is a legacy/incompatible document (read by {} backend)",
                path.display(),
                outcome.backend
            );
            match self.migrate(path, &outcome.state) {
                Ok(()) => outcome.migrated = true,
                Err(e) => warn!("Migration of {} failed: {}", path.display(), e),
            }
        }
        Ok(outcome)
    }

    /// Load with fallback, never writing
    pub fn read(&self, path: &Path) -> Result<LoadOutcome> {
        let mut first_err: Option<Error> = None;
        for (index, backend) in self.backends.iter().enumerate() {
            match backend.try_load(path, &self.root, &self.registry) {
                Ok(state) => {
                    debug!(
                        "Loaded {} subjects, {} patterns from {} ({})",
                        state.subjects.len(),
                        state.patterns.len(),
                        path.display(),
                        backend.name()
                    );
                    return Ok(LoadOutcome {
                        state,
                        backend: backend.name(),
                        fell_back: index > 0,
                        migrated: false,
                    });
                }
                Err(e) if e.is_recoverable_parse() => {
                    debug!("{} backend rejected {}: {}", backend.name(), path.display(), e);
                    first_err.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(first_err.unwrap_or_else(|| Error::Config("No codec backends configured".to_string())))
    }

    /// Save through the primary backend
    pub fn save(&self, path: &Path, state: &ProjectState) -> Result<()> {
        let backend = self.primary()?;
        backend.try_save(path, state, &self.registry)?;
        debug!("Saved {} ({})", path.display(), backend.name());
        Ok(())
    }

    /// Rewrite a document in the primary format
    pub fn migrate(&self, path: &Path, state: &ProjectState) -> Result<()> {
        self.save(path, state)?;
        info!("Migrated {} to {} format", path.display(), self.primary()?.name());
        Ok(())
    }

    /// Write a `<path>_backup_loaded` copy next to a freshly loaded document
    pub fn save_backup(&self, path: &Path, state: &ProjectState) -> Result<PathBuf> {
        let mut name = path.as_os_str().to_os_string();
        name.push("_backup_loaded");
        let backup = PathBuf::from(name);
        self.save(&backup, state)?;
        Ok(backup)
    }
}
