//! The shared, read-only credential pool.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use thiserror::Error;

/// One test account. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to read credential file: {0}")]
    Io(#[from] io::Error),
    /// An empty pool is a startup precondition failure, not a runtime error:
    /// the run must refuse to start before any iteration is attempted.
    #[error("credential table contains no usable rows")]
    Empty,
}

/// Immutable snapshot of the credential table, built once at process start
/// and shared by every virtual user. Cloning is cheap (shared backing
/// storage) and there are no writers after construction.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    entries: Arc<[Credential]>,
}

impl CredentialPool {
    /// Load a `;`-delimited table with a header row. Blank and malformed
    /// rows (missing or empty fields) are discarded; fields are trimmed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PoolError> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self, PoolError> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries = Vec::new();
        for record in rdr.records() {
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    tracing::debug!(%err, "skipping unreadable credential row");
                    continue;
                }
            };
            let (Some(email), Some(password)) = (record.get(0), record.get(1)) else {
                continue;
            };
            if email.is_empty() || password.is_empty() {
                continue;
            }
            entries.push(Credential {
                email: email.to_owned(),
                password: password.to_owned(),
            });
        }

        if entries.is_empty() {
            return Err(PoolError::Empty);
        }
        Ok(Self {
            entries: entries.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pick one credential uniformly at random, with replacement.
    pub fn pick(&self) -> Credential {
        let mut rng = rand::thread_rng();
        let index = rng.gen_range(0..self.entries.len());
        self.entries[index].clone()
    }
}
