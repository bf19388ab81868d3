pub mod config;
pub mod embedding;
pub mod error;
pub mod executor;
pub mod grounding;
pub mod llm;
pub mod mapping;
pub mod pipeline;
pub mod scanner;
pub mod sql_generator;
pub mod synonyms;
pub mod vector_store;

pub use error::{Result, SptsError};
pub use grounding::{ground, ground_semantic, Grounder, GroundingResult, GroundingStrategy};
pub use mapping::{AliasMapping, CanonicalMatch, SourceLocation};
