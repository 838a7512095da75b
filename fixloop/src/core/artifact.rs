//! Working text of an artifact under modification.
//!
//! Candidates are provisional: only an accepted candidate becomes the new
//! last-known-good text. A rejected candidate leaves the state untouched.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactState {
    committed: String,
}

impl ArtifactState {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            committed: text.into(),
        }
    }

    /// Last-known-good text.
    pub fn current(&self) -> &str {
        &self.committed
    }

    /// Replace the last-known-good text with an accepted candidate.
    pub fn commit(&mut self, candidate: String) {
        self.committed = candidate;
    }

    pub fn into_current(self) -> String {
        self.committed
    }
}
