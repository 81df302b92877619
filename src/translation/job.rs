/*!
 * Per-chunk work records.
 *
 * A `ChunkJob` follows one chunk through `Pending -> InFlight -> Done | Failed`.
 * Jobs live for a single run and are discarded once the output is assembled.
 */

use crate::cost::TokenUsage;

/// Lifecycle of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Pending,
    InFlight,
    Done,
    Failed,
}

/// Work record for one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkJob {
    // @field: Index of the chunk this job translates
    chunk_index: usize,

    // @field: Current lifecycle state
    status: ChunkStatus,

    // @field: Sanitized translation, only when Done
    result: Option<String>,

    // @field: Failure message, only when Failed
    error: Option<String>,

    // @field: Reported usage, only when Done and metered
    usage: Option<TokenUsage>,

    // @field: Requests issued so far
    attempts: usize,
}

impl ChunkJob {
    /// Create a pending job for a chunk
    pub fn new(chunk_index: usize) -> Self {
        Self {
            chunk_index,
            status: ChunkStatus::Pending,
            result: None,
            error: None,
            usage: None,
            attempts: 0,
        }
    }

    pub fn chunk_index(&self) -> usize {
        self.chunk_index
    }

    pub fn status(&self) -> ChunkStatus {
        self.status
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn usage(&self) -> Option<TokenUsage> {
        self.usage
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Mark a request as issued
    pub fn start_attempt(&mut self) {
        self.status = ChunkStatus::InFlight;
        self.attempts += 1;
    }

    /// Store the sanitized translation
    pub fn complete(&mut self, result: String, usage: Option<TokenUsage>) {
        self.status = ChunkStatus::Done;
        self.result = Some(result);
        self.error = None;
        self.usage = usage;
    }

    /// Record the failure that ended this job
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ChunkStatus::Failed;
        self.result = None;
        self.usage = None;
        self.error = Some(error.into());
    }

    /// Move the result out of a finished job
    pub fn take_result(&mut self) -> Option<String> {
        self.result.take()
    }
}
