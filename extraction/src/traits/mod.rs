//! Core trait abstractions for the extraction library.
//!
//! [`crawler::Crawler`] is the one application-supplied seam left at this
//! layer; the LLM seam lives in [`crate::gateway::LlmClient`] instead, and
//! the storage seam in [`crate::store::{DocumentStore, VectorIndex}`].

pub mod crawler;
