//! Concrete `Provider`/`InternalClient` implementations.
//!
//! `memory` backs the test suite and runnable examples with in-process
//! fakes. `s3` (feature-gated) talks to a real S3-compatible endpoint.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "s3")]
pub mod s3;
