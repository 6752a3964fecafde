/// A parsed search request.
///
/// The transport collaborator is responsible for tokenizing a peer's raw
/// search string into `terms`/`exclusions` before handing this to the
/// repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub terms: Vec<String>,
    pub exclusions: Vec<String>,
}

impl SearchQuery {
    pub fn new(terms: Vec<String>, exclusions: Vec<String>) -> Self {
        Self { terms, exclusions }
    }

    pub fn terms_only(terms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            terms: terms.into_iter().map(Into::into).collect(),
            exclusions: Vec::new(),
        }
    }
}
