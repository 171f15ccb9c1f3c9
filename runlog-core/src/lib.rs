//! Runlog Core
//!
//! Core types shared by the runlog services, client and CLI.
//!
//! This crate contains:
//! - Domain types: job identity, stream addressing, log records, consumer groups
//! - DTOs: request/response bodies exchanged over the HTTP boundary

pub mod domain;
pub mod dto;
