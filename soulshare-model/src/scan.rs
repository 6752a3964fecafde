/// One execution of the crawl that rebuilds the index.
///
/// `started_at` is milliseconds since the Unix epoch and doubles as the
/// primary key and the row-timestamp watermark every directory/file write
/// during that scan carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub started_at: i64,
    pub options_json: String,
    pub ended_at: Option<i64>,
    /// Set when a cached file resolved to a missing on-disk file since
    /// this scan.
    pub suspect: bool,
}

impl ScanRecord {
    pub fn new(started_at: i64, options_json: impl Into<String>) -> Self {
        Self {
            started_at,
            options_json: options_json.into(),
            ended_at: None,
            suspect: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.ended_at.is_some()
    }
}
