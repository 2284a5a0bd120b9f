//! # Pattern Labelling Common Library
//!
//! Non-UI engine shared by every pattern-labelling front end:
//! - Attribute type registry (controlled vocabulary + external mapping)
//! - Records for subject images and patterns
//! - Pattern catalog and usage-frequency mapping table
//! - Candidate ranking (match engine)
//! - Project document codec with legacy fallback and migration
//! - Subject import from image folders and external catalogue lists
//! - Configuration loading

pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod import;
pub mod mapping;
pub mod matching;
pub mod project;
pub mod record;
pub mod registry;
mod xml;

pub use catalog::PatternCatalog;
pub use codec::{DocumentCodec, LoadOutcome};
pub use error::{Error, Result};
pub use import::ExternalItem;
pub use mapping::MappingTable;
pub use matching::{rank, Candidate, MatchMode};
pub use project::ProjectState;
pub use record::Record;
pub use registry::{RegistrySource, TypeRegistry};
