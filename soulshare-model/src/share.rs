use std::path::{Path, PathBuf};

/// A single operator-declared local directory published to remote peers
/// under an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    /// The raw configuration string this share was parsed from, e.g.
    /// `"[Music]/srv/media/music"` or `"-/srv/media/incoming"`.
    pub raw: String,
    /// Shares prefixed with `-` contribute only to the exclusion set; no
    /// file or directory under them is ever indexed.
    pub is_excluded: bool,
    /// Public, human-readable top-level segment of every masked path this
    /// share produces.
    pub alias: String,
    /// Absolute local filesystem root.
    pub local_path: PathBuf,
    /// Always equal to `alias`, canonicalized so `Resolve` is deterministic.
    pub remote_path: String,
    /// Deterministic 5-character token derived from the stable hash of
    /// `local_path`'s parent directory.
    pub mask: String,
}

impl Share {
    /// Parse one configured share line.
    ///
    /// Grammar: an optional leading `-` marks the share excluded, then an
    /// optional `[alias]` prefix overrides the default alias (the local
    /// path's last segment).
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let (is_excluded, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, trimmed),
        };

        let (alias, path_str) = match parse_alias_prefix(rest) {
            Some((alias, remainder)) => (alias.to_string(), remainder),
            None => (default_alias(rest), rest),
        };

        let local_path = normalize_local_path(path_str);
        let mask = crate::masking::stable_mask5(parent_of(&local_path));

        Share {
            raw: raw.to_string(),
            is_excluded,
            remote_path: alias.clone(),
            alias,
            local_path,
            mask,
        }
    }

    /// `true` if `candidate` names a directory at or below this share's
    /// local root.
    pub fn contains_local_path(&self, candidate: &Path) -> bool {
        candidate.starts_with(&self.local_path)
    }

    /// `true` if `masked` (backslash-separated) begins with this share's
    /// remote path segment.
    pub fn owns_masked_path(&self, masked: &str) -> bool {
        masked == self.remote_path
            || masked.starts_with(&format!("{}\\", self.remote_path))
    }
}

fn parse_alias_prefix(s: &str) -> Option<(&str, &str)> {
    let rest = s.strip_prefix('[')?;
    let close = rest.find(']')?;
    Some((&rest[..close], &rest[close + 1..]))
}

fn default_alias(path_str: &str) -> String {
    let path = normalize_local_path(path_str);
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "share".to_string())
}

fn normalize_local_path(path_str: &str) -> PathBuf {
    let trimmed = path_str.trim();
    let trimmed = trimmed
        .trim_end_matches(['/', '\\'])
        .to_string();
    PathBuf::from(trimmed)
}

fn parent_of(path: &Path) -> &Path {
    path.parent().unwrap_or(path)
}

/// Online/offline lifecycle of a published [`Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostState {
    #[default]
    Offline,
    Online,
    Connecting,
}

/// A named set of shares published as one Soulseek peer identity.
#[derive(Debug, Clone, Default)]
pub struct Host {
    pub name: String,
    pub shares: Vec<Share>,
    pub state: HostState,
}

impl Host {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shares: Vec::new(),
            state: HostState::Offline,
        }
    }

    /// Replace this host's shares, sorting by descending `local_path`
    /// length so subdirectory shares take tie-break precedence over their
    /// parent.
    pub fn set_shares(&mut self, mut shares: Vec<Share>) {
        shares.sort_by(|a, b| {
            b.local_path
                .as_os_str()
                .len()
                .cmp(&a.local_path.as_os_str().len())
        });
        self.shares = shares;
    }

    pub fn included_shares(&self) -> impl Iterator<Item = &Share> {
        self.shares.iter().filter(|s| !s.is_excluded)
    }

    pub fn excluded_shares(&self) -> impl Iterator<Item = &Share> {
        self.shares.iter().filter(|s| s.is_excluded)
    }

    /// The unique included share owning `dir`, by longest-prefix match.
    pub fn owning_share(&self, dir: &Path) -> Option<&Share> {
        self.included_shares().find(|s| s.contains_local_path(dir))
    }

    /// The unique share whose `remote_path` is a prefix of `masked`.
    pub fn resolving_share(&self, masked: &str) -> Option<&Share> {
        self.included_shares().find(|s| s.owns_masked_path(masked))
    }
}
