use std::path::Path;

use soulshare_model::masking::join_masked;
use soulshare_model::{FileRecord, MediaAttribute, SOULSEEK_FILE_CODE};

/// Known audio/video extensions eligible for media-attribute extraction.
const MEDIA_EXTENSIONS: &[&str] = &[
    "mkv", "ogv", "avi", "wmv", "asf", "mp4", "m4p", "m4v", "mpg", "mpe", "mpv", "m2v", "aa",
    "aax", "aac", "aiff", "ape", "dsf", "flac", "m4a", "m4b", "mp3", "mpc", "mpp", "ogg", "oga",
    "wav", "wma", "wv", "webm",
];

/// Pluggable media-tag collaborator; audio/video tag extraction itself
/// stays out of scope beyond this interface. The factory never depends
/// directly on a tag-reading crate; it calls through this trait.
pub trait MediaAttributeReader: Send + Sync {
    /// Reads media attributes from `path`. `None` means extraction did not
    /// apply or failed; the factory treats that the same as an empty list.
    fn read(&self, path: &Path) -> Option<Vec<MediaAttribute>>;
}

/// Default reader that never extracts anything. Keeps this crate buildable
/// and testable without a tag-reading dependency; production deployments
/// inject a real [`MediaAttributeReader`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAttributeReader;

impl MediaAttributeReader for NullAttributeReader {
    fn read(&self, _path: &Path) -> Option<Vec<MediaAttribute>> {
        None
    }
}

/// Pure builder that turns one local file path into a [`FileRecord`].
pub struct SoulseekFileFactory {
    attribute_reader: Box<dyn MediaAttributeReader>,
}

impl std::fmt::Debug for SoulseekFileFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoulseekFileFactory").finish()
    }
}

impl Default for SoulseekFileFactory {
    fn default() -> Self {
        Self::new(Box::new(NullAttributeReader))
    }
}

impl SoulseekFileFactory {
    pub fn new(attribute_reader: Box<dyn MediaAttributeReader>) -> Self {
        Self { attribute_reader }
    }

    /// Builds a [`FileRecord`] from `original_path`, a file known to exist
    /// under `local_root`, published under `remote_root` (a share's alias).
    /// `timestamp` is the current scan's `started_at` watermark.
    pub fn build(
        &self,
        original_path: &Path,
        local_root: &Path,
        remote_root: &str,
        timestamp: i64,
    ) -> std::io::Result<FileRecord> {
        let metadata = std::fs::metadata(original_path)?;
        let relative = original_path.strip_prefix(local_root).unwrap_or(original_path);
        let masked_filename = join_masked(remote_root, relative);

        let extension = original_path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let attributes = if MEDIA_EXTENSIONS.contains(&extension.as_str()) {
            self.attribute_reader.read(original_path).unwrap_or_default()
        } else {
            Vec::new()
        };

        Ok(FileRecord {
            masked_filename,
            original_filename: original_path.to_string_lossy().into_owned(),
            size: metadata.len(),
            touched_at: chrono::Utc::now().to_rfc3339(),
            code: SOULSEEK_FILE_CODE,
            extension,
            attributes,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn builds_masked_filename_with_backslashes() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("a");
        fs::create_dir_all(&sub).unwrap();
        let file_path = sub.join("song1.mp3");
        fs::write(&file_path, b"0123").unwrap();

        let factory = SoulseekFileFactory::default();
        let record = factory.build(&file_path, dir.path(), "alias", 1000).unwrap();

        assert_eq!(record.masked_filename, "alias\\a\\song1.mp3");
        assert_eq!(record.size, 4);
        assert_eq!(record.extension, "mp3");
        assert_eq!(record.code, SOULSEEK_FILE_CODE);
        assert_eq!(record.timestamp, 1000);
    }

    #[test]
    fn non_media_extension_gets_no_attribute_extraction_attempt() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("readme.nfo");
        fs::write(&file_path, b"hello").unwrap();

        struct AlwaysExtracts;
        impl MediaAttributeReader for AlwaysExtracts {
            fn read(&self, _path: &Path) -> Option<Vec<MediaAttribute>> {
                Some(vec![MediaAttribute::Length { seconds: 1.0 }])
            }
        }

        let factory = SoulseekFileFactory::new(Box::new(AlwaysExtracts));
        let record = factory.build(&file_path, dir.path(), "alias", 1).unwrap();
        assert!(record.attributes.is_empty());
    }

    #[test]
    fn media_extension_uses_injected_reader() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("song.flac");
        fs::write(&file_path, b"0123456").unwrap();

        struct Fixed;
        impl MediaAttributeReader for Fixed {
            fn read(&self, _path: &Path) -> Option<Vec<MediaAttribute>> {
                Some(vec![
                    MediaAttribute::Length { seconds: 180.5 },
                    MediaAttribute::BitRate { value: 320_000 },
                ])
            }
        }

        let factory = SoulseekFileFactory::new(Box::new(Fixed));
        let record = factory.build(&file_path, dir.path(), "alias", 1).unwrap();
        assert_eq!(record.attributes.len(), 2);
    }

    #[test]
    fn reader_failure_still_yields_a_record_with_empty_attributes() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("song.mp3");
        fs::write(&file_path, b"0123456").unwrap();

        let factory = SoulseekFileFactory::default();
        let record = factory.build(&file_path, dir.path(), "alias", 1).unwrap();
        assert!(record.attributes.is_empty());
    }
}
