//! Whole-project state as stored in one document

use crate::record::Record;

/// Subjects and patterns of one project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectState {
    pub subjects: Vec<Record>,
    pub patterns: Vec<Record>,
}

impl ProjectState {
    pub fn new(subjects: Vec<Record>, patterns: Vec<Record>) -> Self {
        Self { subjects, patterns }
    }

    pub fn find_subject(&self, name: &str) -> Option<usize> {
        self.subjects.iter().position(|s| s.base_name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty() && self.patterns.is_empty()
    }
}
