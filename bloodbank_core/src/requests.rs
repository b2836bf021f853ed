//! Append-only log of blood requests (`requests.csv`).

use crate::{table, BloodRequest, Result};
use std::path::PathBuf;

/// Request log backed by a headerless CSV file
#[derive(Clone, Debug)]
pub struct RequestLog {
    path: PathBuf,
}

impl RequestLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append a request. Requests are never rewritten afterwards.
    pub fn record(&self, request: &BloodRequest) -> Result<()> {
        table::append_row(&self.path, request)?;
        tracing::debug!("Recorded request {} as {:?}", request.id, request.status);
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<BloodRequest>> {
        table::read_rows(&self.path)
    }

    /// Requests made by one recipient, in submission order
    pub fn for_recipient(&self, recipient_id: &str) -> Result<Vec<BloodRequest>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|r| r.recipient_id == recipient_id)
            .collect())
    }
}
