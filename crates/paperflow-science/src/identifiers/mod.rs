pub mod arxiv;
pub mod input;

pub use arxiv::ArxivId;
pub use input::ImportInput;
