pub mod analyses;
pub mod token;

pub use analyses::AnalysisHolder;
pub use token::{FileTokenStore, MemoryTokenStore, TokenStore};
