use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postroom_common::{
    attempt::AttemptLog,
    internal,
    message::{Message, MessageId, Status},
};
use tokio::fs;
use tracing::warn;

use crate::{
    StoreError,
    error::{SerializationError, ValidationError},
    r#trait::MessageStore,
};

const LOGS_DIR: &str = "logs";

const STATUSES: [Status; 4] = [Status::Queued, Status::Sending, Status::Sent, Status::Failed];

const fn dir_name(status: Status) -> &'static str {
    match status {
        Status::Queued => "queued",
        Status::Sending => "sending",
        Status::Sent => "sent",
        Status::Failed => "failed",
    }
}

fn encode(message: &Message) -> crate::Result<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(message, bincode::config::standard())
        .map_err(SerializationError::from)?)
}

/// File-based message store implementation
///
/// Each message is a single bincode record named `{id}.bin` living in the
/// directory of its current status:
///
/// ```text
/// {root}/queued/   eligible for dequeue
/// {root}/sending/  claimed by a worker
/// {root}/sent/     terminal
/// {root}/failed/   terminal
/// {root}/logs/     one record per delivery attempt
/// ```
///
/// # Claiming
/// The claim step is `rename(queued/{id}.bin, sending/{id}.bin)`. Renames
/// are atomic within a filesystem, so when several worker processes race for
/// the same record exactly one rename succeeds; the others fail with
/// `NotFound` and skip to their next candidate. No worker ever waits on a
/// record held by another.
///
/// # Atomicity
/// All record writes go to a `.tmp_` file first and are renamed into place,
/// so a crash never leaves a partially written record visible. Leftover
/// `.tmp_` files are removed on [`open`](FileMessageStore::open).
///
/// # Security
/// - The root path is validated against traversal components and system
///   directories.
/// - Only filenames that parse as valid ULIDs are ever read, preventing
///   path traversal through crafted directory entries.
#[derive(Debug, Clone)]
pub struct FileMessageStore {
    path: PathBuf,
}

impl FileMessageStore {
    /// Open (and if necessary create) a store rooted at `path`.
    ///
    /// Creates the status directories, validates the path, and removes any
    /// `.tmp_` leftovers from a previous crash.
    ///
    /// # Errors
    /// If the path is invalid, exists but is not a directory, or the
    /// directories cannot be created.
    pub async fn open(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        Self::validate_path(&path)?;

        internal!("Initialising message store at {path:?}");

        if fs::try_exists(&path).await? && !path.is_dir() {
            return Err(ValidationError::NotDirectory(path.display().to_string()).into());
        }

        let store = Self { path };

        for status in STATUSES {
            fs::create_dir_all(store.dir_for(status)).await?;
        }
        fs::create_dir_all(store.path.join(LOGS_DIR)).await?;

        store.cleanup_temp_files().await?;

        Ok(store)
    }

    /// Validate a store root path
    ///
    /// # Security Checks
    /// - Rejects paths containing `..` (directory traversal)
    /// - Rejects paths to sensitive system directories
    /// - Ensures the path is absolute
    fn validate_path(path: &Path) -> Result<(), ValidationError> {
        for component in path.components() {
            if component == std::path::Component::ParentDir {
                return Err(ValidationError::InvalidPath(format!(
                    "path cannot contain '..' components: {}",
                    path.display()
                )));
            }
        }

        if !path.is_absolute() {
            return Err(ValidationError::InvalidPath(format!(
                "path must be absolute: {}",
                path.display()
            )));
        }

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        for prefix in &sensitive_prefixes {
            if path.starts_with(prefix) {
                return Err(ValidationError::InvalidPath(format!(
                    "path cannot be in system directory {prefix}: {}",
                    path.display()
                )));
            }
        }

        Ok(())
    }

    /// Remove orphaned `.tmp_` files left by interrupted writes.
    async fn cleanup_temp_files(&self) -> crate::Result<()> {
        let mut cleaned = 0;

        for dir in STATUSES
            .iter()
            .map(|status| self.dir_for(*status))
            .chain(std::iter::once(self.path.join(LOGS_DIR)))
        {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_name().to_string_lossy().starts_with(".tmp_") {
                    fs::remove_file(entry.path()).await?;
                    cleaned += 1;
                }
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} orphaned temporary files from store"
            );
        }

        Ok(())
    }

    fn dir_for(&self, status: Status) -> PathBuf {
        self.path.join(dir_name(status))
    }

    fn record_path(&self, status: Status, id: &MessageId) -> PathBuf {
        self.dir_for(status).join(format!("{id}.bin"))
    }

    /// Write a record into `dir` atomically: temp file first, then rename.
    async fn write_record_in(&self, dir: &Path, message: &Message) -> crate::Result<()> {
        let filename = format!("{}.bin", message.id);
        let temp_path = dir.join(format!(".tmp_{filename}"));
        let target_path = dir.join(filename);

        fs::write(&temp_path, encode(message)?).await?;
        fs::rename(&temp_path, &target_path).await?;

        Ok(())
    }

    async fn read_record(path: &Path) -> crate::Result<Message> {
        let bytes = fs::read(path).await?;
        let (message, _) =
            bincode::serde::decode_from_slice::<Message, _>(&bytes, bincode::config::standard())
                .map_err(SerializationError::from)?;
        Ok(message)
    }

    /// Find which status directory currently holds the record.
    async fn locate(&self, id: &MessageId) -> crate::Result<Status> {
        for status in STATUSES {
            if fs::try_exists(self.record_path(status, id)).await? {
                return Ok(status);
            }
        }

        Err(StoreError::NotFound(id.clone()))
    }
}

#[async_trait]
impl MessageStore for FileMessageStore {
    async fn insert(&self, message: &Message) -> crate::Result<()> {
        if self.locate(&message.id).await.is_ok() {
            return Err(StoreError::AlreadyExists(message.id.clone()));
        }

        self.write_record_in(&self.dir_for(message.status), message)
            .await
    }

    async fn read(&self, id: &MessageId) -> crate::Result<Message> {
        let status = self.locate(id).await?;
        Self::read_record(&self.record_path(status, id)).await
    }

    async fn eligible(&self, now: DateTime<Utc>) -> crate::Result<Vec<Message>> {
        let dir = self.dir_for(Status::Queued);
        let mut entries = fs::read_dir(&dir).await?;
        let mut messages = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if MessageId::from_filename(&filename).is_none() {
                continue;
            }

            match Self::read_record(&entry.path()).await {
                Ok(message) if message.is_eligible(now) => messages.push(message),
                Ok(_) => {}
                // Claimed by another worker between listing and reading
                Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(file = %filename, error = %e, "Skipping unreadable record");
                }
            }
        }

        messages.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(messages)
    }

    async fn claim(&self, id: &MessageId, now: DateTime<Utc>) -> crate::Result<Option<Message>> {
        let queued_path = self.record_path(Status::Queued, id);
        let sending_path = self.record_path(Status::Sending, id);

        // The rename IS the claim: exactly one process wins it, the losers
        // see NotFound and move on to their next candidate.
        match fs::rename(&queued_path, &sending_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let mut message = Self::read_record(&sending_path).await?;
        if !message.is_eligible(now) {
            // The record was requeued for later between listing and
            // claiming; hand it back untouched.
            fs::rename(&sending_path, &queued_path).await?;
            return Ok(None);
        }

        message.status = Status::Sending;
        message.claimed_at = Some(now);
        self.write_record_in(&self.dir_for(Status::Sending), &message)
            .await?;

        Ok(Some(message))
    }

    async fn update(&self, message: &Message) -> crate::Result<()> {
        let current = self.locate(&message.id).await?;

        // Rewrite in place first (atomic), then move across status
        // directories. A crash between the two steps leaves a consistent
        // record in the old directory; the stale-claim sweep recovers it.
        self.write_record_in(&self.dir_for(current), message).await?;

        if current != message.status {
            fs::rename(
                self.record_path(current, &message.id),
                self.record_path(message.status, &message.id),
            )
            .await?;
        }

        Ok(())
    }

    async fn release(&self, id: &MessageId) -> crate::Result<()> {
        let sending_path = self.record_path(Status::Sending, id);

        let mut message = match Self::read_record(&sending_path).await {
            Ok(message) => message,
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                // Not currently claimed; a no-op as long as the record exists
                self.locate(id).await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        message.status = Status::Queued;
        message.claimed_at = None;
        self.write_record_in(&self.dir_for(Status::Sending), &message)
            .await?;
        fs::rename(&sending_path, self.record_path(Status::Queued, id)).await?;

        Ok(())
    }

    async fn stale_claims(&self, cutoff: DateTime<Utc>) -> crate::Result<Vec<MessageId>> {
        let dir = self.dir_for(Status::Sending);
        let mut entries = fs::read_dir(&dir).await?;
        let mut ids = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if MessageId::from_filename(&filename).is_none() {
                continue;
            }

            match Self::read_record(&entry.path()).await {
                // A Sending record without a claim timestamp is equally
                // orphaned: something died before committing the claim.
                Ok(message)
                    if message.claimed_at.is_none_or(|claimed| claimed < cutoff) =>
                {
                    ids.push(message.id);
                }
                Ok(_) => {}
                Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(file = %filename, error = %e, "Skipping unreadable record");
                }
            }
        }

        ids.sort();

        Ok(ids)
    }

    async fn append_log(&self, entry: &AttemptLog) -> crate::Result<()> {
        let dir = self.path.join(LOGS_DIR);
        let filename = format!("{}.bin", ulid::Ulid::new());
        let temp_path = dir.join(format!(".tmp_{filename}"));
        let target_path = dir.join(filename);

        let encoded = bincode::serde::encode_to_vec(entry, bincode::config::standard())
            .map_err(SerializationError::from)?;
        fs::write(&temp_path, encoded).await?;
        fs::rename(&temp_path, &target_path).await?;

        Ok(())
    }

    async fn logs_for(&self, id: &MessageId) -> crate::Result<Vec<AttemptLog>> {
        let dir = self.path.join(LOGS_DIR);
        let mut entries = fs::read_dir(&dir).await?;
        let mut logs = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if filename.starts_with(".tmp_") || !filename.ends_with(".bin") {
                continue;
            }

            let bytes = fs::read(entry.path()).await?;
            match bincode::serde::decode_from_slice::<AttemptLog, _>(
                &bytes,
                bincode::config::standard(),
            ) {
                Ok((log, _)) if &log.message_id == id => logs.push(log),
                Ok(_) => {}
                Err(e) => {
                    warn!(file = %filename, error = %e, "Skipping unreadable attempt log");
                }
            }
        }

        logs.sort_by_key(|log| log.recorded_at);

        Ok(logs)
    }
}
