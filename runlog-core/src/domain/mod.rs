//! Core domain types
//!
//! Value objects shared between the server (which stores and distributes log
//! records), producers (which ship them) and consumers (which tail them).

pub mod group;
pub mod job;
pub mod log;
pub mod stream;
