//! Per-recipient mailboxes: `<queue>/inbox/<recipient>.yaml`.
//!
//! Every call re-reads the file; the file is the source of truth and
//! nothing is cached between calls. The lock serializes callers of one
//! store instance only; other processes writing the same file can still
//! interleave whole-file replacements.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::QueueError;
use crate::model::{Mailbox, Message, MessageStatus, MessageType};
use crate::storage::{RECORD_EXTENSION, is_record_file, read_yaml, validate_name, write_yaml_atomic};

pub const INBOX_DIR: &str = "inbox";
pub const ARCHIVE_DIR: &str = "archive";

pub struct MailboxStore {
    inbox_dir: PathBuf,
    archive_dir: PathBuf,
    lock: Mutex<()>,
}

impl MailboxStore {
    pub fn new(queue_dir: impl AsRef<Path>) -> Self {
        let queue_dir = queue_dir.as_ref();
        Self {
            inbox_dir: queue_dir.join(INBOX_DIR),
            archive_dir: queue_dir.join(ARCHIVE_DIR),
            lock: Mutex::new(()),
        }
    }

    pub fn inbox_dir(&self) -> &Path {
        &self.inbox_dir
    }

    pub fn path_for(&self, recipient: &str) -> PathBuf {
        self.inbox_dir
            .join(format!("{recipient}.{RECORD_EXTENSION}"))
    }

    /// Append a pending message to `recipient`'s mailbox and return it.
    pub fn write(
        &self,
        recipient: &str,
        body: &str,
        kind: MessageType,
        from: &str,
    ) -> Result<Message, QueueError> {
        validate_name("recipient", recipient)?;
        let _guard = self.guard();
        let path = self.path_for(recipient);
        let mut mailbox = load(&path)?;

        let now = Utc::now();
        let taken: HashSet<&str> = mailbox.messages.iter().map(|m| m.id.as_str()).collect();
        let mut id = new_message_id(now);
        while taken.contains(id.as_str()) {
            id = new_message_id(now);
        }

        let message = Message {
            id,
            timestamp: now,
            from: from.to_string(),
            kind,
            body: body.to_string(),
            status: MessageStatus::Pending,
        };
        mailbox.messages.push(message.clone());
        write_yaml_atomic(&path, &mailbox)?;

        tracing::debug!(recipient, id = %message.id, from, "message written");
        Ok(message)
    }

    /// All messages in insertion order. A mailbox that was never written is empty.
    pub fn read(&self, recipient: &str) -> Result<Vec<Message>, QueueError> {
        validate_name("recipient", recipient)?;
        let _guard = self.guard();
        Ok(load(&self.path_for(recipient))?.messages)
    }

    /// Mark one message processed. Marking an already-processed message again
    /// succeeds without rewriting the file.
    pub fn mark_as_processed(&self, recipient: &str, id: &str) -> Result<(), QueueError> {
        validate_name("recipient", recipient)?;
        let _guard = self.guard();
        let path = self.path_for(recipient);
        let mut mailbox = load(&path)?;

        let message = mailbox
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| QueueError::MessageNotFound {
                recipient: recipient.to_string(),
                id: id.to_string(),
            })?;
        if message.status == MessageStatus::Processed {
            return Ok(());
        }
        message.status = MessageStatus::Processed;
        write_yaml_atomic(&path, &mailbox)
    }

    pub fn pending_messages(&self, recipient: &str) -> Result<Vec<Message>, QueueError> {
        Ok(self
            .read(recipient)?
            .into_iter()
            .filter(Message::is_pending)
            .collect())
    }

    /// Timestamp of the oldest pending message, if any.
    pub fn oldest_pending(&self, recipient: &str) -> Result<Option<DateTime<Utc>>, QueueError> {
        Ok(self
            .pending_messages(recipient)?
            .iter()
            .map(|m| m.timestamp)
            .min())
    }

    /// Move processed messages to `<queue>/archive/<recipient>.yaml`, keeping
    /// only pending ones in the inbox. Returns how many were moved.
    pub fn archive_processed(&self, recipient: &str) -> Result<usize, QueueError> {
        validate_name("recipient", recipient)?;
        let _guard = self.guard();
        let path = self.path_for(recipient);
        let mailbox = load(&path)?;

        let (pending, processed): (Vec<Message>, Vec<Message>) =
            mailbox.messages.into_iter().partition(Message::is_pending);
        if processed.is_empty() {
            return Ok(0);
        }

        // Archive first: a crash in between duplicates rather than loses.
        let archive_path = self
            .archive_dir
            .join(format!("{recipient}.{RECORD_EXTENSION}"));
        let mut archive = load(&archive_path)?;
        let moved = processed.len();
        archive.messages.extend(processed);
        write_yaml_atomic(&archive_path, &archive)?;
        write_yaml_atomic(&path, &Mailbox { messages: pending })?;

        tracing::info!(recipient, moved, "archived processed messages");
        Ok(moved)
    }

    /// Names of every mailbox currently on disk, sorted.
    pub fn recipients(&self) -> Result<Vec<String>, QueueError> {
        let entries = match fs::read_dir(&self.inbox_dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_record_file(p))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded data is `()`; a poisoned lock carries no broken state.
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn load(path: &Path) -> Result<Mailbox, QueueError> {
    Ok(read_yaml(path)?.unwrap_or_default())
}

/// `msg_<UTC yyyymmddHHMMSSmmm>_<12 hex>`: sortable by time, and the random
/// suffix keeps writers within the same millisecond apart.
pub fn new_message_id(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("msg_{}_{}", now.format("%Y%m%d%H%M%S%3f"), &random[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, MailboxStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MailboxStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn unknown_recipient_reads_empty() {
        let (_dir, store) = store();
        assert!(store.read("nobody").expect("read").is_empty());
        assert!(store.pending_messages("nobody").expect("pending").is_empty());
        assert!(store.recipients().expect("recipients").is_empty());
    }

    #[test]
    fn write_then_read_preserves_order() {
        let (_dir, store) = store();
        store
            .write("marshall", "first", MessageType::TaskAssigned, "envoy")
            .expect("write");
        store
            .write("marshall", "second", MessageType::WakeUp, "envoy")
            .expect("write");

        let msgs = store.read("marshall").expect("read");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].body, "first");
        assert_eq!(msgs[1].body, "second");
        assert!(msgs.iter().all(Message::is_pending));
        assert_ne!(msgs[0].id, msgs[1].id);
        assert!(store.path_for("marshall").exists());
    }

    #[test]
    fn mark_processed_is_idempotent() {
        let (_dir, store) = store();
        let msg = store
            .write("envoy", "report", MessageType::ReportReceived, "marshall")
            .expect("write");

        store.mark_as_processed("envoy", &msg.id).expect("first");
        store.mark_as_processed("envoy", &msg.id).expect("second");

        let msgs = store.read("envoy").expect("read");
        assert_eq!(msgs[0].status, MessageStatus::Processed);
    }

    #[test]
    fn mark_unknown_id_is_not_found() {
        let (_dir, store) = store();
        let err = store.mark_as_processed("envoy", "msg_missing").unwrap_err();
        assert!(err.is_not_found());

        store
            .write("envoy", "x", MessageType::WakeUp, "marshall")
            .expect("write");
        let err = store.mark_as_processed("envoy", "msg_missing").unwrap_err();
        assert!(matches!(err, QueueError::MessageNotFound { ref id, .. } if id == "msg_missing"));
    }

    #[test]
    fn pending_and_processed_partition_read() {
        let (_dir, store) = store();
        let ids: Vec<String> = (0..5)
            .map(|i| {
                store
                    .write("envoy", &format!("m{i}"), MessageType::WakeUp, "marshall")
                    .expect("write")
                    .id
            })
            .collect();
        store.mark_as_processed("envoy", &ids[1]).expect("mark");
        store.mark_as_processed("envoy", &ids[3]).expect("mark");

        let all = store.read("envoy").expect("read");
        let pending = store.pending_messages("envoy").expect("pending");
        let processed: Vec<&Message> = all.iter().filter(|m| !m.is_pending()).collect();

        assert_eq!(pending.len(), 3);
        assert_eq!(processed.len(), 2);
        assert!(pending.iter().all(|p| all.contains(p)));
        assert!(pending.iter().all(|p| processed.iter().all(|q| q.id != p.id)));
        assert_eq!(pending.len() + processed.len(), all.len());
    }

    #[test]
    fn archive_moves_processed_only() {
        let (dir, store) = store();
        let a = store.write("envoy", "a", MessageType::WakeUp, "x").expect("w");
        store.write("envoy", "b", MessageType::WakeUp, "x").expect("w");
        store.mark_as_processed("envoy", &a.id).expect("mark");

        assert_eq!(store.archive_processed("envoy").expect("archive"), 1);
        assert_eq!(store.archive_processed("envoy").expect("archive"), 0);

        let left = store.read("envoy").expect("read");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].body, "b");

        let archived: Mailbox = read_yaml(&dir.path().join("archive/envoy.yaml"))
            .expect("read")
            .expect("present");
        assert_eq!(archived.messages.len(), 1);
        assert_eq!(archived.messages[0].id, a.id);
    }

    #[test]
    fn recipients_lists_mailbox_files() {
        let (_dir, store) = store();
        store.write("marshall", "x", MessageType::WakeUp, "envoy").expect("w");
        store.write("envoy", "x", MessageType::WakeUp, "marshall").expect("w");
        fs::write(store.inbox_dir().join("README.md"), "ignore me").expect("write");
        assert_eq!(store.recipients().expect("list"), vec!["envoy", "marshall"]);
    }

    #[test]
    fn corrupt_mailbox_is_an_error_not_empty() {
        let (_dir, store) = store();
        fs::create_dir_all(store.inbox_dir()).expect("mkdir");
        fs::write(store.path_for("envoy"), "messages: {not: [a list").expect("write");
        assert!(matches!(store.read("envoy"), Err(QueueError::Corrupt { .. })));
        assert!(store.write("envoy", "x", MessageType::WakeUp, "y").is_err());
    }

    #[test]
    fn path_traversal_rejected() {
        let (_dir, store) = store();
        let err = store
            .write("../escape", "x", MessageType::WakeUp, "y")
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidName { .. }));
    }

    #[test]
    fn message_id_shape() {
        let now = Utc::now();
        let id = new_message_id(now);
        assert!(id.starts_with("msg_"));
        assert_eq!(id.len(), "msg_".len() + 17 + 1 + 12);
        assert_ne!(new_message_id(now), new_message_id(now));
    }
}
