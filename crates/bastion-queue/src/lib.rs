//! bastion-queue: file-based agent messaging.
//! Per-recipient mailboxes, the command ledger and the inbox watcher that
//! turns mailbox writes into events. The files under the queue directory
//! are the only shared state; nothing here caches them.

pub mod error;
pub mod ledger;
pub mod mailbox;
pub mod model;
pub mod storage;
pub mod watcher;

pub use error::{QueueError, WatchError};
pub use ledger::{CommandLedger, TASKS_DIR, new_command_id};
pub use mailbox::{ARCHIVE_DIR, INBOX_DIR, MailboxStore, new_message_id};
pub use model::{Command, CommandStatus, Mailbox, Message, MessageStatus, MessageType};
pub use storage::is_record_file;
pub use watcher::{FileEvent, FileOperation, InboxWatcher, WatchStreams, classify};
