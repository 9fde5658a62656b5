pub mod client;
pub mod parser;
pub mod types;

pub use client::{ArxivClient, PaperSearch};
pub use parser::parse_feed;
pub use types::{ARXIV_SOURCE, ArxivEntry, ArxivSearch, SCIENTIFIC_PAPER, SortBy, SortOrder};
