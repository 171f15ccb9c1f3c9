//! Service Module
//!
//! Business logic over the stream store: consumer group setup, log ingestion
//! and group reads.

pub mod consumer_groups;
pub mod ingestion;
pub mod reader;
pub mod setup;

pub use consumer_groups::ConsumerGroupManager;
pub use ingestion::{IngestError, IngestLimits, LogIngestionService};
pub use reader::{LogReader, ReadOptions, ReaderSettings};
pub use setup::{ConsumerSetupService, SetupError};
