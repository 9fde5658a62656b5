pub mod custom_fields;
pub mod dates;
pub mod dedup_entry;
pub mod document;
pub mod title;

pub use custom_fields::*;
pub use dates::{parse_date, to_iso_date};
pub use dedup_entry::DedupEntry;
pub use document::*;
pub use title::{NormalizedTitle, normalize_title};
