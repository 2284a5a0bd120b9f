//! Attribute type registry
//!
//! The controlled vocabulary every record is labelled with: for each attribute
//! type an ordered list of allowed values, plus a mapping from an external
//! vendor vocabulary into the local one.
//!
//! # Load path
//!
//! 1. Canonical document (`<types value=..><type>..</type></types>` +
//!    `<jdtypemap>` entries), read forward-only.
//! 2. On failure, the legacy element-per-type document, read into a DOM. A
//!    legacy hit is migrated once by writing the canonical form back to the
//!    same file, so the next start takes path 1.
//! 3. Both fail: fatal, nothing that needs the taxonomy can run.
//!
//! Index 0 of every type is the sentinel ("unknown"), a wildcard for matching.

mod canonical;
mod legacy;

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Fixed taxonomy file name, looked up in the working directory
pub const ATTRIBUTES_FILE: &str = "__attributes.xml";

/// Index of the sentinel value in every type's value list
pub const SENTINEL_INDEX: usize = 0;

/// Conventional name of the sentinel value
pub const SENTINEL_NAME: &str = "unknown";

/// Where a loaded registry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrySource {
    /// Parsed directly from the canonical document
    Canonical,
    /// Parsed from the legacy document and rewritten in canonical form
    MigratedLegacy,
    /// Built in memory
    InMemory,
}

/// Mapping of one external attribute into the local vocabulary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalMapping {
    /// Local attribute type the external attribute maps onto
    pub local_type: String,
    /// External value -> local value
    pub values: BTreeMap<String, String>,
}

/// Raw registry contents as produced by either reader
#[derive(Debug, Default)]
pub(crate) struct RegistryParts {
    pub types: BTreeMap<String, Vec<String>>,
    pub external: BTreeMap<String, ExternalMapping>,
}

/// Attribute taxonomy, immutable after load apart from extend-only mapping additions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRegistry {
    types: BTreeMap<String, Vec<String>>,
    external: BTreeMap<String, ExternalMapping>,
    source: RegistrySource,
}

impl TypeRegistry {
    /// Load `__attributes.xml` from the working directory
    pub fn load() -> Result<Self> {
        Self::load_from(ATTRIBUTES_FILE)
    }

    /// Load the taxonomy from `path`, migrating a legacy file in place
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            error!("Attribute taxonomy {} does not exist", path.display());
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let primary_err = match canonical::read(path) {
            Ok(parts) => {
                let registry = Self::from_parts(parts, RegistrySource::Canonical);
                info!(
                    "Loaded {} attribute types from {}",
                    registry.types.len(),
                    path.display()
                );
                return Ok(registry);
            }
            Err(e) => e,
        };

        warn!(
            "Canonical taxonomy parse failed ({}), trying legacy format",
            primary_err
        );
        let parts = legacy::read(path).map_err(|legacy_err| {
            error!(
                "Attribute taxonomy unusable: canonical: {}; legacy: {}",
                primary_err, legacy_err
            );
            legacy_err
        })?;

        let registry = Self::from_parts(parts, RegistrySource::MigratedLegacy);
        info!(
            "Loaded {} attribute types from legacy {}",
            registry.types.len(),
            path.display()
        );
        match registry.save_canonical(path) {
            Ok(()) => info!("Migrated {} to canonical format", path.display()),
            Err(e) => warn!("Could not rewrite {} in canonical format: {}", path.display(), e),
        }
        Ok(registry)
    }

    /// Build a registry in memory (tests, tooling)
    ///
    /// Every type needs at least one value: index 0 is the sentinel.
    pub fn from_types<I, N, V>(types: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, Vec<V>)>,
        N: Into<String>,
        V: Into<String>,
    {
        let parts = RegistryParts {
            types: types
                .into_iter()
                .map(|(name, values)| (name.into(), values.into_iter().map(Into::into).collect()))
                .collect(),
            external: BTreeMap::new(),
        };
        validate(&parts, Path::new("<memory>"), "memory")?;
        Ok(Self::from_parts(parts, RegistrySource::InMemory))
    }

    fn from_parts(parts: RegistryParts, source: RegistrySource) -> Self {
        for (name, values) in &parts.types {
            if values.first().map(String::as_str) != Some(SENTINEL_NAME) {
                warn!(
                    "Attribute type '{}' has '{}' at index 0; it still acts as the wildcard",
                    name,
                    values.first().map(String::as_str).unwrap_or_default()
                );
            }
        }
        Self {
            types: parts.types,
            external: parts.external,
            source,
        }
    }

    /// Write the canonical document
    pub fn save_canonical(&self, path: impl AsRef<Path>) -> Result<()> {
        canonical::write(path.as_ref(), &self.types, &self.external)
    }

    /// How this registry was obtained
    pub fn source(&self) -> RegistrySource {
        self.source
    }

    /// Registered type names, sorted
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn contains_type(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Allowed values of one type (index 0 is the sentinel)
    pub fn values_of(&self, type_name: &str) -> Option<&[String]> {
        self.types.get(type_name).map(Vec::as_slice)
    }

    /// Position of `value` within `type_name`'s value list
    pub fn index_of(&self, type_name: &str, value: &str) -> Result<usize> {
        let values = self
            .types
            .get(type_name)
            .ok_or_else(|| Error::UnknownType(type_name.to_string()))?;
        values
            .iter()
            .position(|v| v == value)
            .ok_or_else(|| Error::UnknownValue {
                type_name: type_name.to_string(),
                value: value.to_string(),
            })
    }

    /// Value string at `index`, if the index is valid for the type
    pub fn value_at(&self, type_name: &str, index: usize) -> Option<&str> {
        self.types
            .get(type_name)
            .and_then(|values| values.get(index))
            .map(String::as_str)
    }

    /// Name of the sentinel value of a type
    pub fn sentinel_of(&self, type_name: &str) -> Option<&str> {
        self.value_at(type_name, SENTINEL_INDEX)
    }

    /// Default attribute map: every registered type at the sentinel
    pub fn default_attributes(&self) -> BTreeMap<String, usize> {
        self.types
            .keys()
            .map(|name| (name.clone(), SENTINEL_INDEX))
            .collect()
    }

    /// External attribute names with a mapping
    pub fn external_names(&self) -> impl Iterator<Item = &str> {
        self.external.keys().map(String::as_str)
    }

    pub fn external_mapping(&self, external_name: &str) -> Option<&ExternalMapping> {
        self.external.get(external_name)
    }

    /// Translate an external attribute/value pair into (local type, local value)
    pub fn resolve_external(&self, external_name: &str, external_value: &str) -> Option<(&str, &str)> {
        let mapping = self.external.get(external_name)?;
        let local_value = mapping.values.get(external_value)?;
        Some((mapping.local_type.as_str(), local_value.as_str()))
    }

    /// Add (or retarget) one external value mapping
    ///
    /// Extends the mapping table; never removes entries. The local side must
    /// name a registered type and one of its values.
    pub fn add_external_mapping(
        &mut self,
        external_name: &str,
        local_type: &str,
        external_value: &str,
        local_value: &str,
    ) -> Result<()> {
        self.index_of(local_type, local_value)?;
        let entry = self.external.entry(external_name.to_string()).or_default();
        if !entry.local_type.is_empty() && entry.local_type != local_type {
            warn!(
                "External attribute '{}' retargeted from '{}' to '{}'",
                external_name, entry.local_type, local_type
            );
        }
        entry.local_type = local_type.to_string();
        entry
            .values
            .insert(external_value.to_string(), local_value.to_string());
        Ok(())
    }
}

/// Reject registries the rest of the engine cannot work with
pub(crate) fn validate(parts: &RegistryParts, path: &Path, backend: &'static str) -> Result<()> {
    if parts.types.is_empty() {
        return Err(Error::parse(path, backend, "no attribute types defined"));
    }
    if let Some((name, _)) = parts.types.iter().find(|(_, values)| values.is_empty()) {
        return Err(Error::parse(
            path,
            backend,
            format!("attribute type '{}' has no values", name),
        ));
    }
    Ok(())
}

/// Resolve the taxonomy path against a working directory
pub fn attributes_path(working_dir: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        working_dir.join(file)
    }
}
