//! Write-once JSON record of every chat interaction.

use chrono::Utc;
use log::{ debug, info };
use std::io::ErrorKind;
use std::path::{ Path, PathBuf };
use thiserror::Error;
use tokio::fs::{ self, OpenOptions };
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::models::chat::{ ChatRequest, LogRecord, LoggedResponse };

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const SUFFIX_LEN: usize = 6;
const MAX_NAME_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Failed to write interaction log: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize interaction log: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Could not find a free log file name in {0}")]
    NameExhausted(PathBuf),
}

#[derive(Debug, Clone)]
pub struct InteractionLog {
    dir: PathBuf,
    clock: fn() -> String,
    suffix: fn() -> String,
}

impl InteractionLog {
    /// The directory is not touched until the first record is written.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            clock: utc_timestamp,
            suffix: random_suffix,
        }
    }

    #[cfg(test)]
    fn with_name_sources(mut self, clock: fn() -> String, suffix: fn() -> String) -> Self {
        self.clock = clock;
        self.suffix = suffix;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn record(
        &self,
        request: &ChatRequest,
        response: LoggedResponse
    ) -> Result<PathBuf, HistoryError> {
        let timestamp = (self.clock)();
        let record = LogRecord {
            timestamp: timestamp.clone(),
            request: request.clone(),
            response,
        };
        let body = serde_json::to_vec_pretty(&record)?;

        fs::create_dir_all(&self.dir).await?;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = self.dir.join(file_name(&timestamp, &(self.suffix)()));
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("Log file {} already exists, drawing a new suffix", path.display());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            file.write_all(&body).await?;
            file.flush().await?;
            info!("Logged interaction for model {} to {}", request.model_id, path.display());
            return Ok(path);
        }

        Err(HistoryError::NameExhausted(self.dir.clone()))
    }
}

fn utc_timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

fn random_suffix() -> String {
    let mut suffix = Uuid::new_v4().simple().to_string();
    suffix.truncate(SUFFIX_LEN);
    suffix
}

fn file_name(timestamp: &str, suffix: &str) -> String {
    format!("{}_{}.json", timestamp, suffix)
}
