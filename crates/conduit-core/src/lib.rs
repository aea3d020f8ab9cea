//! Shared primitives for the Conduit crates

mod error;

pub use error::HttpError;
