// ABOUTME: Library root for stream-replicator
// ABOUTME: Exposes the sync engine modules for the CLI and for integration tests

pub mod backoff;
pub mod chunker;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod offsets;
pub mod publisher;
pub mod row;
pub mod schema;
pub mod sync;
