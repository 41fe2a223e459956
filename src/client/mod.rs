//! Generation backend integration.
//!
//! Backends plug in through [`GenerationAdapter`]; an [`AdapterRegistry`]
//! picks one per model configuration.

mod adapter;

pub use adapter::{
    AdapterFactory, AdapterRegistry, Generation, GenerationAdapter, GenerationChunk,
    GenerationStream, UnsupportedAdapter,
};
