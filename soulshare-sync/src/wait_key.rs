use std::fmt;

/// A composite key for [`crate::Waiter`], built from any number of tagged
/// components joined by `:`. Equality is by the joined string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaitKey(String);

impl WaitKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = parts
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(":");
        Self(joined)
    }

    pub fn single(part: impl AsRef<str>) -> Self {
        Self(part.as_ref().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WaitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WaitKey {
    fn from(value: &str) -> Self {
        Self::single(value)
    }
}

impl From<String> for WaitKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}
