//! Service client implementations
//!
//! `assistant` is the HTTP transport for the support assistant endpoint.

pub mod assistant;
mod common;

pub use common::API_KEY_HEADER;
