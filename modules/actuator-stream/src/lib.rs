//! Streaming event reader for batch files.
//!
//! Turns a JSON array of records into a lazy, pausable stream of
//! [`actuator_core::Event`]s. Every produced event is appended to a history
//! cache and announced to the reader's hooks before it is yielded.

pub mod error;
pub mod reader;

pub use error::StreamError;
pub use reader::{
    CacheSnapshot, MalformedPolicy, ReaderConfig, StreamingEventReader, DEFAULT_CACHE_CAPACITY,
    DEFAULT_HOOK_POINT,
};
