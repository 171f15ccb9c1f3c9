//! Runlog Server
//!
//! Durable per-job log streams with independent consumer groups, served over
//! HTTP.

pub mod api;
pub mod config;
pub mod db;
pub mod service;
pub mod store;
