//! Transactional save and rollback for one document file.
//!
//! `Loaded -> Repaired -> Committed | RolledBack`. The file on disk always
//! holds either the original bytes or a committed, verified working copy.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::document::{Dialect, Document};
use crate::error::{Error, Result};
use crate::utils::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Loaded,
    Repaired,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackAction {
    /// Working copy dropped; the file was never written.
    Discarded,
    /// The original snapshot was written back over the file.
    Restored,
}

#[derive(Debug)]
pub struct Transaction {
    path: PathBuf,
    original: Document,
    working: Option<Document>,
    state: TxState,
    target_touched: bool,
}

impl Transaction {
    pub fn load(path: &Path, dialect: &Dialect) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::document_load_failed(path.display().to_string(), e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            original: Document::load(text, dialect),
            working: None,
            state: TxState::Loaded,
            target_touched: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original(&self) -> &Document {
        &self.original
    }

    pub fn working(&self) -> Option<&Document> {
        self.working.as_ref()
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Hand over the repaired working copy.
    pub fn stage(&mut self, working: Document) -> Result<()> {
        match self.state {
            TxState::Loaded | TxState::Repaired => {
                self.working = Some(working);
                self.state = TxState::Repaired;
                Ok(())
            }
            state => Err(Error::internal_unexpected(format!(
                "Cannot stage a document in state {:?}",
                state
            ))),
        }
    }

    /// Persist the staged document and verify it on disk.
    ///
    /// Returns the SHA-256 of the committed content.
    pub fn commit(&mut self) -> Result<String> {
        self.commit_with(|path| fs::read(path))
    }

    /// `commit` with the read-back step supplied by the caller.
    fn commit_with<F>(&mut self, read_back: F) -> Result<String>
    where
        F: FnOnce(&Path) -> std::io::Result<Vec<u8>>,
    {
        let content = match (&self.state, &self.working) {
            (TxState::Repaired, Some(working)) => working.text().to_string(),
            (state, _) => {
                return Err(Error::internal_unexpected(format!(
                    "Cannot commit in state {:?}",
                    state
                )))
            }
        };
        let expected = io::content_digest(content.as_bytes());
        let display = self.path.display().to_string();

        if let Err(e) = io::write_file_atomic(&self.path, &content, "commit document") {
            self.rollback()?;
            return Err(Error::document_save_failed(display, e.cause(), true));
        }
        self.target_touched = true;

        let verified = match read_back(&self.path) {
            Ok(bytes) => {
                let actual = io::content_digest(&bytes);
                if actual == expected {
                    Ok(())
                } else {
                    Err(format!("Digest mismatch after write: expected {}, found {}", expected, actual))
                }
            }
            Err(e) => Err(format!("Read-back failed: {}", e)),
        };

        match verified {
            Ok(()) => {
                log_status!("commit", "Wrote {} ({})", display, &expected[..12]);
                self.state = TxState::Committed;
                Ok(expected)
            }
            Err(problem) => {
                let restored = self.rollback().is_ok();
                Err(Error::document_save_failed(display, problem, restored))
            }
        }
    }

    /// Drop the working copy. The original is written back only when a
    /// commit already reached the file.
    pub fn rollback(&mut self) -> Result<RollbackAction> {
        if self.state == TxState::Committed {
            return Err(Error::internal_unexpected(
                "Cannot roll back a committed transaction",
            ));
        }

        self.working = None;
        self.state = TxState::RolledBack;

        if !self.target_touched {
            return Ok(RollbackAction::Discarded);
        }

        io::write_file_atomic(&self.path, self.original.text(), "restore original").map_err(
            |e| Error::document_save_failed(self.path.display().to_string(), e.cause(), false),
        )?;
        self.target_touched = false;
        log_status!("rollback", "Restored original {}", self.path.display());
        Ok(RollbackAction::Restored)
    }
}
