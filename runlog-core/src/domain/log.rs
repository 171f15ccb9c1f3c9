//! Log record types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::job::{JobId, JobIdError, StreamKey};

/// Longest step id a record may carry
pub const MAX_STEP_ID_LEN: usize = 255;

/// Largest line number every store can hold
pub const MAX_LINE_NUMBER: u64 = i64::MAX as u64;

/// One output line produced by a job step
///
/// `(job_id, step_id, line_number)` is unique as produced. Streams are ordered
/// by arrival, not by this tuple; see [`group_by_step`] to rebuild per-step order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub job_id: JobId,
    pub step_id: String,
    pub line_number: u64,
    pub output: String,
}

impl LogRecord {
    pub fn new(
        job_id: impl Into<JobId>,
        step_id: impl Into<String>,
        line_number: u64,
        output: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            step_id: step_id.into(),
            line_number,
            output: output.into(),
        }
    }

    pub fn stream_key(&self) -> StreamKey {
        StreamKey::for_job(&self.job_id)
    }
}

/// A log line as submitted over the wire
///
/// Every field is optional so a malformed line can be rejected on its own
/// without failing the rest of its batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    #[serde(default)]
    pub job_id: Option<JobId>,
    #[serde(default)]
    pub step_id: Option<String>,
    #[serde(default)]
    pub line_number: Option<u64>,
    #[serde(default)]
    pub output: Option<String>,
}

/// Why a submitted line was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("missing jobId")]
    MissingJobId,

    #[error("missing stepId")]
    MissingStepId,

    #[error("missing lineNumber")]
    MissingLineNumber,

    #[error("missing output")]
    MissingOutput,

    #[error("jobId is {len} characters (max: {max})")]
    JobIdTooLong { len: usize, max: usize },

    #[error("stepId is {len} characters (max: {max})")]
    StepIdTooLong { len: usize, max: usize },

    #[error("lineNumber {0} is out of range (max: {max})", max = MAX_LINE_NUMBER)]
    LineNumberOutOfRange(u64),

    #[error("output is {len} bytes (max: {max})")]
    OutputTooLong { len: usize, max: usize },
}

impl LogLine {
    /// Check required fields and convert into a [`LogRecord`]
    ///
    /// `output` may be empty but must be present. Ids and line numbers are
    /// bounded so that every store backend accepts what passes here.
    pub fn validate(self, max_output_len: usize) -> Result<LogRecord, RecordError> {
        let job_id = self.job_id.ok_or(RecordError::MissingJobId)?;
        job_id.check().map_err(|e| match e {
            JobIdError::Blank => RecordError::MissingJobId,
            JobIdError::TooLong { len, max } => RecordError::JobIdTooLong { len, max },
        })?;

        let step_id = self
            .step_id
            .filter(|s| !s.trim().is_empty())
            .ok_or(RecordError::MissingStepId)?;

        let step_len = step_id.chars().count();
        if step_len > MAX_STEP_ID_LEN {
            return Err(RecordError::StepIdTooLong {
                len: step_len,
                max: MAX_STEP_ID_LEN,
            });
        }

        let line_number = self.line_number.ok_or(RecordError::MissingLineNumber)?;
        if line_number > MAX_LINE_NUMBER {
            return Err(RecordError::LineNumberOutOfRange(line_number));
        }

        let output = self.output.ok_or(RecordError::MissingOutput)?;

        if output.len() > max_output_len {
            return Err(RecordError::OutputTooLong {
                len: output.len(),
                max: max_output_len,
            });
        }

        Ok(LogRecord {
            job_id,
            step_id,
            line_number,
            output,
        })
    }
}

impl From<LogRecord> for LogLine {
    fn from(record: LogRecord) -> Self {
        Self {
            job_id: Some(record.job_id),
            step_id: Some(record.step_id),
            line_number: Some(record.line_number),
            output: Some(record.output),
        }
    }
}

/// Lines of one step, sorted by line number
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLog {
    pub step_id: String,
    pub lines: Vec<StepLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLine {
    pub line_number: u64,
    pub output: String,
}

/// Regroup records by step
///
/// Steps keep the order in which they first appear; lines inside a step are
/// sorted by `line_number`, since concurrent steps interleave in the stream.
pub fn group_by_step<'a, I>(records: I) -> Vec<StepLog>
where
    I: IntoIterator<Item = &'a LogRecord>,
{
    let mut steps: Vec<StepLog> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for record in records {
        let slot = *index.entry(record.step_id.as_str()).or_insert_with(|| {
            steps.push(StepLog {
                step_id: record.step_id.clone(),
                lines: Vec::new(),
            });
            steps.len() - 1
        });

        steps[slot].lines.push(StepLine {
            line_number: record.line_number,
            output: record.output.clone(),
        });
    }

    for step in &mut steps {
        step.lines.sort_by_key(|line| line.line_number);
    }

    steps
}
