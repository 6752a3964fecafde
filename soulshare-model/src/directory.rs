/// A directory visible to remote peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    /// Uniquely identifies the directory; backslash-separated, e.g.
    /// `"alias\\sub"`.
    pub masked_name: String,
    /// `started_at` of the scan that most recently saw this directory.
    pub timestamp: i64,
}

impl DirectoryRecord {
    pub fn new(masked_name: impl Into<String>, timestamp: i64) -> Self {
        Self {
            masked_name: masked_name.into(),
            timestamp,
        }
    }
}
