use crate::Configuration;

/// Configurations reached by successful moves, oldest first.
///
/// Each entry is the state *after* a move; an empty stack means the puzzle is
/// at its initial placement. The length is the move count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryStack {
    entries: Vec<Configuration>,
}

impl HistoryStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, configuration: Configuration) {
        self.entries.push(configuration);
    }

    /// Removes the newest entry, returning it.
    pub fn pop(&mut self) -> Option<Configuration> {
        self.entries.pop()
    }

    /// The newest entry, i.e. the configuration the session is in.
    pub fn top(&self) -> Option<&Configuration> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
