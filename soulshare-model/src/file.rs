use serde::{Deserialize, Serialize};

/// One typed media attribute attached to a file record.
///
/// Serialized as the JSON array stored in `files.attributeJson`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "PascalCase")]
pub enum MediaAttribute {
    /// Duration, in seconds.
    Length { seconds: f64 },
    /// Average bitrate, bits per second.
    BitRate { value: u32 },
    /// Sample rate, Hz. Only attached when bits-per-sample is known.
    SampleRate { value: u32 },
    /// Bit depth, bits per sample.
    BitDepth { value: u16 },
}

/// A file visible to remote peers.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    /// Fully qualified, backslash-separated wire path. Primary key;
    /// invertible to `original_filename` via [`crate::Host::resolving_share`].
    pub masked_filename: String,
    /// Local filesystem path this record was built from.
    pub original_filename: String,
    pub size: u64,
    /// When this row was last (re)written, RFC 3339.
    pub touched_at: String,
    /// Always `1` for files produced by [`crate::SOULSEEK_FILE_CODE`];
    /// kept as a plain field rather than derived so the persisted schema
    /// is self-describing.
    pub code: i32,
    /// Lowercased, no leading dot.
    pub extension: String,
    pub attributes: Vec<MediaAttribute>,
    /// `started_at` of the scan that most recently saw this file.
    pub timestamp: i64,
}

/// The fixed code every Soulseek-protocol file record carries.
pub const SOULSEEK_FILE_CODE: i32 = 1;

impl FileRecord {
    pub fn attributes_json(&self) -> String {
        serde_json::to_string(&self.attributes).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn attributes_from_json(raw: &str) -> Vec<MediaAttribute> {
        serde_json::from_str(raw).unwrap_or_default()
    }
}
