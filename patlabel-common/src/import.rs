//! Subject records built from what is on disk
//!
//! Two sources feed a project besides its own document:
//! - image folders: every subfolder of the root folder is one subject, its
//!   image files are the subject's images
//! - external lists: a tab-separated export of an external catalogue, one
//!   item per row, whose attribute columns are translated through the
//!   registry's external mapping
//!
//! ```text
//! jdId    jdTitle         url                 fabric        colour
//! 1002    Summer dress    http://shop/1002    100% cotton   Rot
//! ```

use crate::record::Record;
use crate::registry::TypeRegistry;
use crate::xml;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// File extensions treated as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tif", "tiff", "webp"];

/// Column holding the item id, which becomes the subject's base name
pub const ID_COLUMN: &str = "jdId";
pub const TITLE_COLUMN: &str = "jdTitle";
pub const URL_COLUMN: &str = "url";

const BACKEND: &str = "external-list";

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Image files of `<root>/<name>/`, sorted by file name
///
/// A missing folder yields no images.
pub fn folder_images(root: &Path, name: &str) -> Vec<PathBuf> {
    let dir = root.join(name);
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(&dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Error accessing entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_image_file(entry.path()))
        .map(DirEntry::into_path)
        .collect()
}

/// One unlabelled record per subfolder of `root` holding at least one image,
/// in folder-name order
pub fn scan_image_folders(root: &Path, registry: &TypeRegistry) -> Result<Vec<Record>> {
    if !root.is_dir() {
        return Err(Error::NotFound(format!("image folder root {}", root.display())));
    }

    let mut records = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Error accessing entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        let mut record = Record::new(registry, entry.file_name().to_string_lossy().into_owned());
        record.images = folder_images(root, &record.base_name);
        if record.images.is_empty() {
            debug!("{} holds no images, skipped", entry.path().display());
            continue;
        }
        records.push(record);
    }

    info!("Found {} image folders below {}", records.len(), root.display());
    Ok(records)
}

/// One row of an external catalogue export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalItem {
    pub id: String,
    pub title: Option<String>,
    pub url: Option<String>,

    /// (external attribute name, external value), in column order
    pub attributes: Vec<(String, String)>,
}

impl ExternalItem {
    /// Copy the item onto `record`: identity fields, then every attribute the
    /// registry knows a mapping for
    ///
    /// Returns how many attributes were mapped. On error `record` may be
    /// partly updated; callers work on a copy.
    pub fn apply_to(&self, record: &mut Record, registry: &TypeRegistry) -> Result<usize> {
        record.external_id = Some(self.id.clone());
        if self.title.is_some() {
            record.external_title = self.title.clone();
        }
        if self.url.is_some() {
            record.url = self.url.clone();
        }

        let mut mapped = 0;
        for (name, value) in &self.attributes {
            if record.apply_external(registry, name, value)? {
                mapped += 1;
            } else {
                debug!("{}: no mapping for {}={}", self.id, name, value);
            }
        }
        Ok(mapped)
    }
}

/// Read an external catalogue export
pub fn read_external_list(path: &Path) -> Result<Vec<ExternalItem>> {
    let text = xml::read_utf8(path, BACKEND)?;
    parse_external_list(&text, path)
}

/// Parse a tab-separated export whose first line names the columns
///
/// Blank lines and `#` comments are skipped. Empty cells are absent values.
/// A row without an id is skipped; a repeated id keeps the first row.
pub fn parse_external_list(text: &str, path: &Path) -> Result<Vec<ExternalItem>> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.starts_with('#'));

    let header: Vec<&str> = match lines.next() {
        Some((_, line)) => line.split('\t').map(str::trim).collect(),
        None => return Err(Error::parse(path, BACKEND, "empty list")),
    };
    let id_column = header
        .iter()
        .position(|&c| c == ID_COLUMN)
        .ok_or_else(|| Error::parse(path, BACKEND, format!("no '{}' column", ID_COLUMN)))?;

    let mut items: Vec<ExternalItem> = Vec::new();
    for (number, line) in lines {
        let cells: Vec<&str> = line.split('\t').map(str::trim).collect();
        if cells.len() > header.len() {
            warn!("{}:{}: extra cells ignored", path.display(), number + 1);
        }
        let cell = |column: usize| cells.get(column).copied().filter(|c| !c.is_empty());

        let Some(id) = cell(id_column) else {
            warn!("{}:{}: row without {}, skipped", path.display(), number + 1, ID_COLUMN);
            continue;
        };
        if items.iter().any(|item| item.id == id) {
            warn!("{}:{}: duplicate id {}, skipped", path.display(), number + 1, id);
            continue;
        }

        let mut item = ExternalItem {
            id: id.to_string(),
            title: None,
            url: None,
            attributes: Vec::new(),
        };
        for (column, &name) in header.iter().enumerate() {
            let Some(value) = cell(column) else { continue };
            match name {
                ID_COLUMN => {}
                TITLE_COLUMN => item.title = Some(value.to_string()),
                URL_COLUMN => item.url = Some(value.to_string()),
                _ => item.attributes.push((name.to_string(), value.to_string())),
            }
        }
        items.push(item);
    }

    info!("Read {} items from {}", items.len(), path.display());
    Ok(items)
}
