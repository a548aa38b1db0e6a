use std::{fmt::Display, path::PathBuf};

use tracing::error;

/// Files written by an export, and the ones that could not be.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExportReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl ExportReport {
    pub fn record<E: Display>(&mut self, path: PathBuf, result: Result<(), E>) {
        match result {
            Ok(()) => self.written.push(path),
            Err(e) => {
                error!("failed to write {}: {e}", path.display());
                self.failed.push((path, e.to_string()));
            }
        }
    }

    pub fn merge(&mut self, other: ExportReport) {
        self.written.extend(other.written);
        self.failed.extend(other.failed);
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
