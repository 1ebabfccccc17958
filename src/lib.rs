pub mod builder;
pub mod cache;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod provider;
pub mod searcher;
pub mod utils;

pub use builder::{BuildReport, IndexBuilder};
pub use cache::EmbeddingCache;
pub use config::Opts;
pub use embedding::Embedding;
pub use error::{Error, Result};
pub use index::{Identifier, Index, IndexEntry};
pub use provider::{Context, EmbeddingProvider, ImagePreprocessor, Tensor};
pub use searcher::{SearchEngine, SearchResult};
