//! Thin HTTP/SSE adaptor over the pipeline runner.
//!
//! This crate is not a UI: it exposes the runner's event stream and the
//! Web-interviewer question/answer contract over `axum`, so an embedding
//! host can drive and observe pipeline runs without linking Rust directly.

pub mod server;
