//! Labelling session
//!
//! The explicit context object holding everything one open project needs:
//! registry, codec, subjects, pattern catalog and its usage table, the current
//! position, the decoded-image cache and an optional background save worker.
//! Every mutation goes through here so the usage table stays in step with the
//! assignments.

use crate::image_cache::{DecodedImage, ImageCache, ImageDecoder};
use crate::last_run::LastRunInfo;
use crate::save_worker::{SaveRequest, SaveWorker};
use patlabel_common::config::DEFAULT_IMAGE_CACHE_KIB;
use patlabel_common::import;
use patlabel_common::matching::rank;
use patlabel_common::{
    Candidate, DocumentCodec, Error, MappingTable, MatchMode, PatternCatalog, ProjectState,
    Record, Result, TypeRegistry,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Session {
    registry: Arc<TypeRegistry>,
    codec: Arc<DocumentCodec>,
    subjects: Vec<Record>,
    catalog: PatternCatalog,
    table: MappingTable,
    document: PathBuf,
    current: usize,
    images: Arc<ImageCache>,
    worker: Option<SaveWorker>,
}

/// Outcome of merging an external list into the subjects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub added: usize,
    pub updated: usize,
    /// Attribute cells translated through the external mapping
    pub mapped: usize,
}

impl Session {
    /// Load `document` (with fallback and migration) and write the load backup
    pub fn open(registry: Arc<TypeRegistry>, root: &Path, document: &Path) -> Result<Self> {
        let codec = Arc::new(DocumentCodec::new(Arc::clone(&registry), root));
        let outcome = codec.load(document)?;
        info!(
            "Opened {}: {} subjects, {} patterns ({} backend{})",
            document.display(),
            outcome.state.subjects.len(),
            outcome.state.patterns.len(),
            outcome.backend,
            if outcome.migrated { ", migrated" } else { "" }
        );

        if let Err(e) = codec.save_backup(document, &outcome.state) {
            warn!("Could not write load backup of {}: {}", document.display(), e);
        }
        Self::with_codec(codec, document, outcome.state)
    }

    /// Open `document`, or start an empty project if it does not exist yet
    pub fn open_or_create(registry: Arc<TypeRegistry>, root: &Path, document: &Path) -> Result<Self> {
        if document.exists() {
            Self::open(registry, root, document)
        } else {
            info!("Starting new project {}", document.display());
            Self::from_state(registry, root, document, ProjectState::default())
        }
    }

    /// Session over an in-memory state
    pub fn from_state(
        registry: Arc<TypeRegistry>,
        root: &Path,
        document: &Path,
        state: ProjectState,
    ) -> Result<Self> {
        let codec = Arc::new(DocumentCodec::new(registry, root));
        Self::with_codec(codec, document, state)
    }

    fn with_codec(codec: Arc<DocumentCodec>, document: &Path, state: ProjectState) -> Result<Self> {
        let catalog = PatternCatalog::from_records(state.patterns)?;
        let table = MappingTable::new(&state.subjects, &catalog);
        Ok(Self {
            registry: Arc::clone(codec.registry()),
            codec,
            subjects: state.subjects,
            catalog,
            table,
            document: document.to_path_buf(),
            current: 0,
            images: Arc::new(ImageCache::with_capacity_kib(DEFAULT_IMAGE_CACHE_KIB)),
            worker: None,
        })
    }

    /// Share `cache` instead of the session's own
    pub fn with_image_cache(mut self, cache: Arc<ImageCache>) -> Self {
        self.images = cache;
        self
    }

    pub fn image_cache(&self) -> &Arc<ImageCache> {
        &self.images
    }

    /// Project root folder; image paths resolve below it
    pub fn root(&self) -> &Path {
        self.codec.root()
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn document(&self) -> &Path {
        &self.document
    }

    pub fn subjects(&self) -> &[Record] {
        &self.subjects
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    pub fn table(&self) -> &MappingTable {
        &self.table
    }

    /// Index of a subject by base name
    pub fn subject_index(&self, name: &str) -> Result<usize> {
        self.subjects
            .iter()
            .position(|s| s.base_name == name)
            .ok_or_else(|| Error::NotFound(format!("subject '{}'", name)))
    }

    pub fn subject(&self, index: usize) -> Result<&Record> {
        self.subjects
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("subject #{}", index)))
    }

    fn subject_mut(&mut self, index: usize) -> Result<&mut Record> {
        self.subjects
            .get_mut(index)
            .ok_or_else(|| Error::NotFound(format!("subject #{}", index)))
    }

    /// First decodable image of a subject, from image `start` on
    pub fn thumbnail(
        &self,
        subject: usize,
        start: usize,
        decoder: &dyn ImageDecoder,
    ) -> Result<Option<(usize, Arc<DecodedImage>)>> {
        let record = self.subject(subject)?;
        Ok(self.images.first_decodable(record, start, decoder))
    }

    /// First decodable image of a catalog pattern
    pub fn pattern_thumbnail(
        &self,
        pattern: &str,
        decoder: &dyn ImageDecoder,
    ) -> Result<Option<(usize, Arc<DecodedImage>)>> {
        let record = self
            .catalog
            .get(pattern)
            .ok_or_else(|| Error::NotFound(format!("pattern '{}'", pattern)))?;
        Ok(self.images.first_decodable(record, 0, decoder))
    }

    /// Append a subject for every image folder below `root` not yet known
    ///
    /// Folders named like an existing subject or a catalog pattern are
    /// skipped. Returns how many subjects were added.
    pub fn import_image_folders(&mut self, root: &Path) -> Result<usize> {
        let found = import::scan_image_folders(root, &self.registry)?;
        let mut known: HashSet<String> = self.subjects.iter().map(|s| s.base_name.clone()).collect();

        let mut added = 0;
        for record in found {
            if self.catalog.contains(&record.base_name) || !known.insert(record.base_name.clone()) {
                debug!("{} already known, skipped", record.base_name);
                continue;
            }
            self.subjects.push(record);
            added += 1;
        }
        info!("Imported {} subjects from {}", added, root.display());
        Ok(added)
    }

    /// Merge an external catalogue export into the subjects
    ///
    /// A row updates the subject whose base name is the row's id, or adds a
    /// new subject with the images of `<root>/<id>/`. A row whose attributes
    /// cannot be applied is rejected as a whole; earlier rows stay merged.
    pub fn import_external_list(&mut self, path: &Path) -> Result<ImportReport> {
        let items = import::read_external_list(path)?;
        let registry = Arc::clone(&self.registry);
        let mut report = ImportReport::default();

        for item in items {
            let existing = self.subjects.iter().position(|s| s.base_name == item.id);
            let mut record = match existing {
                Some(index) => self.subjects[index].clone(),
                None => {
                    let mut record = Record::new(&registry, item.id.clone());
                    record.images = import::folder_images(self.root(), &item.id);
                    record
                }
            };
            report.mapped += item.apply_to(&mut record, &registry)?;

            match existing {
                Some(index) => {
                    self.subjects[index] = record;
                    report.updated += 1;
                }
                None => {
                    self.subjects.push(record);
                    report.added += 1;
                }
            }
        }
        info!(
            "Imported {}: {} added, {} updated, {} attributes mapped",
            path.display(),
            report.added,
            report.updated,
            report.mapped
        );
        Ok(report)
    }

    /// Snapshot of the project as it would be saved
    pub fn state(&self) -> ProjectState {
        ProjectState::new(self.subjects.clone(), self.catalog.records().to_vec())
    }

    /// Save synchronously to the session document
    pub fn save(&self) -> Result<()> {
        self.codec.save(&self.document, &self.state())
    }

    /// Save to another path (export)
    pub fn save_as(&self, path: &Path) -> Result<()> {
        self.codec.save(path, &self.state())
    }

    /// Start the background save worker
    pub fn enable_background_save(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let codec = Arc::clone(&self.codec);
        self.worker = Some(SaveWorker::spawn(move |request: &SaveRequest| {
            codec.save(&request.path, &request.state)
        })?);
        Ok(())
    }

    /// Hand the current snapshot to the worker, or save inline without one
    pub fn request_save(&self) -> Result<()> {
        match &self.worker {
            Some(worker) => worker.request_save(SaveRequest {
                path: self.document.clone(),
                state: self.state(),
            }),
            None => self.save(),
        }
    }

    /// Ranked patterns for one subject
    pub fn candidates(&self, subject: usize, mode: &MatchMode) -> Result<Vec<Candidate<'_>>> {
        let query = self.subject(subject)?;
        Ok(rank(query, &self.catalog, &self.table, mode))
    }

    /// Assign `pattern` to a subject; the pattern must exist in the catalog
    pub fn assign(&mut self, subject: usize, pattern: &str) -> Result<bool> {
        if !self.catalog.contains(pattern) {
            return Err(Error::NotFound(format!("pattern '{}'", pattern)));
        }
        let record = self
            .subjects
            .get_mut(subject)
            .ok_or_else(|| Error::NotFound(format!("subject #{}", subject)))?;
        let changed = self.table.reassign(record, pattern);
        if changed {
            debug!("{} -> {}", record.base_name, pattern);
        }
        Ok(changed)
    }

    /// Clear a subject's assignment
    pub fn unassign(&mut self, subject: usize) -> Result<bool> {
        let record = self
            .subjects
            .get_mut(subject)
            .ok_or_else(|| Error::NotFound(format!("subject #{}", subject)))?;
        Ok(self.table.reassign(record, ""))
    }

    /// Set one attribute of a subject; the record is untouched on error
    pub fn set_attribute(&mut self, subject: usize, type_name: &str, value: &str) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        self.subject_mut(subject)?
            .set_attribute(&registry, type_name, value)
    }

    /// Set one attribute of a catalog pattern
    pub fn set_pattern_attribute(&mut self, pattern: &str, type_name: &str, value: &str) -> Result<()> {
        self.catalog
            .set_attribute(&self.registry, pattern, type_name, value)
    }

    /// Translate an external attribute/value pair onto a subject
    pub fn apply_external(&mut self, subject: usize, external_name: &str, external_value: &str) -> Result<bool> {
        let registry = Arc::clone(&self.registry);
        self.subject_mut(subject)?
            .apply_external(&registry, external_name, external_value)
    }

    /// Add a pattern to the catalog
    pub fn add_pattern(&mut self, pattern: Record) -> Result<()> {
        let name = pattern.base_name.clone();
        self.catalog.add(pattern)?;
        self.table.rebuild(&self.subjects, &self.catalog);
        info!("Added pattern '{}'", name);
        Ok(())
    }

    /// Remove a pattern; assignments to it are left dangling and stop counting
    pub fn remove_pattern(&mut self, name: &str) -> Result<Record> {
        let removed = self
            .catalog
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("pattern '{}'", name)))?;
        self.table.rebuild(&self.subjects, &self.catalog);
        let dangling = self
            .subjects
            .iter()
            .filter(|s| s.mapped_pattern() == Some(name))
            .count();
        info!("Removed pattern '{}' ({} assignments left dangling)", name, dangling);
        Ok(removed)
    }

    /// Cross-check the usage table against a rebuild; repairs on divergence
    ///
    /// Returns whether the table was consistent.
    pub fn verify_mapping(&mut self) -> bool {
        if self.table.is_consistent_with(&self.subjects, &self.catalog) {
            return true;
        }
        warn!("Usage table diverged from assignments, rebuilding");
        self.table.rebuild(&self.subjects, &self.catalog);
        false
    }

    pub fn current(&self) -> usize {
        self.current
    }

    /// Move to subject `index`, wrapping around at either end
    pub fn navigate(&mut self, index: isize) -> usize {
        let len = self.subjects.len();
        self.current = if len == 0 {
            0
        } else {
            index.rem_euclid(len as isize) as usize
        };
        self.current
    }

    /// Return to where the last run left off, if it worked on this root
    pub fn restore(&mut self, last_run: &LastRunInfo) -> Option<usize> {
        if last_run.root_folder.as_deref() != Some(self.root()) {
            return None;
        }
        if last_run.subject_index >= self.subjects.len() {
            debug!(
                "Last-run subject #{} out of range ({} subjects)",
                last_run.subject_index,
                self.subjects.len()
            );
            return None;
        }
        Some(self.navigate(last_run.subject_index as isize))
    }

    /// Step forward or back from the current subject
    pub fn step(&mut self, delta: isize) -> usize {
        self.navigate(self.current as isize + delta)
    }

    /// Flush pending work and stop the save worker
    pub fn close(mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}
