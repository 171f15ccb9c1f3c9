//! Data Transfer Objects for the HTTP boundary
//!
//! Request and response bodies exchanged between producers, consumers and the
//! log stream server. All bodies use camelCase field names.

pub mod group;
pub mod log;
pub mod stream;
