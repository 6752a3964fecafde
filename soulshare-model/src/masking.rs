//! Path masking: deriving stable, wire-safe directory and file names from
//! local filesystem paths.
//!
//! `remotePath = alias` is canonical here; mask presence never varies by
//! code path.

use std::path::Path;
use twox_hash::XxHash64;

/// Fixed seed so the mask is stable across process restarts and Rust
/// toolchain versions (unlike `std`'s `DefaultHasher`, which makes no such
/// promise).
const MASK_SEED: u64 = 0x534f_554c_5345_454b; // "SOULSEEK" folded into 8 bytes

/// A deterministic 5 printable-character token derived from `parent`.
///
/// Uses the lowercase Crockford base32 alphabet (no padding, no ambiguous
/// characters) over the low 40 bits of an `XxHash64` digest, truncated to
/// exactly 5 characters.
pub fn stable_mask5(parent: &Path) -> String {
    use std::hash::Hasher;

    let mut hasher = XxHash64::with_seed(MASK_SEED);
    hasher.write(parent.to_string_lossy().as_bytes());
    let digest = hasher.finish();

    let bytes = digest.to_be_bytes();
    let encoded = data_encoding::BASE32_NOPAD.encode(&bytes[..4]);
    encoded.to_lowercase().chars().take(5).collect()
}

/// Join a share's remote alias and filesystem-relative subpath into a
/// fully-qualified, backslash-separated masked filename:
/// `remotePath \ sub1 \ sub2 \ file.ext`.
pub fn join_masked(remote_path: &str, relative: &Path) -> String {
    let mut out = remote_path.to_string();
    for component in relative.components() {
        out.push('\\');
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    out
}

/// Normalize any mix of `/`/`\` separators to backslash for on-wire
/// transmission.
pub fn to_wire_separators(path: &str) -> String {
    path.replace('/', "\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_is_deterministic() {
        let p = Path::new("/srv/media");
        assert_eq!(stable_mask5(p), stable_mask5(p));
    }

    #[test]
    fn mask_is_five_printable_chars() {
        let mask = stable_mask5(Path::new("/srv/media"));
        assert_eq!(mask.chars().count(), 5);
        assert!(mask.chars().all(|c| c.is_ascii_graphic()));
    }

    #[test]
    fn different_parents_differ() {
        assert_ne!(
            stable_mask5(Path::new("/srv/music")),
            stable_mask5(Path::new("/srv/video"))
        );
    }

    #[test]
    fn join_masked_uses_backslashes() {
        let joined = join_masked("alias", Path::new("a/song.mp3"));
        assert_eq!(joined, "alias\\a\\song.mp3");
    }

    #[test]
    fn to_wire_separators_normalizes_forward_slashes() {
        assert_eq!(to_wire_separators("alias/a/b.mp3"), "alias\\a\\b.mp3");
    }
}
