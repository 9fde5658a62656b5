use super::arxiv::ArxivId;

/// One user-supplied import argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportInput {
    Identifier(ArxivId),
    Search(String),
}

impl ImportInput {
    /// IDs and arXiv URLs are identifiers; everything else is a search query.
    pub fn parse(input: &str) -> Self {
        match ArxivId::parse(input) {
            Ok(id) => ImportInput::Identifier(id),
            Err(_) => ImportInput::Search(input.trim().to_string()),
        }
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self, ImportInput::Identifier(_))
    }
}
