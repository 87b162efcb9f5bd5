//! Command ledger: one YAML file per command under `<queue>/tasks/<id>.yaml`.
//!
//! The ledger stores whatever status it is given; enforcing forward-only
//! transitions is the caller's job.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::QueueError;
use crate::model::{Command, CommandStatus};
use crate::storage::{RECORD_EXTENSION, is_record_file, read_yaml, validate_name, write_yaml_atomic};

pub const TASKS_DIR: &str = "tasks";

pub struct CommandLedger {
    tasks_dir: PathBuf,
    lock: Mutex<()>,
}

impl CommandLedger {
    pub fn new(queue_dir: impl AsRef<Path>) -> Self {
        Self {
            tasks_dir: queue_dir.as_ref().join(TASKS_DIR),
            lock: Mutex::new(()),
        }
    }

    pub fn tasks_dir(&self) -> &Path {
        &self.tasks_dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.tasks_dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    /// Persist `cmd` under its id, replacing any command with the same id.
    pub fn write(&self, cmd: &Command) -> Result<(), QueueError> {
        validate_name("command id", &cmd.id)?;
        let _guard = self.guard();
        write_yaml_atomic(&self.path_for(&cmd.id), cmd)?;
        tracing::debug!(id = %cmd.id, status = %cmd.status, "command written");
        Ok(())
    }

    /// Every readable command, oldest first. Unreadable or corrupt files are
    /// skipped with a warning.
    pub fn read(&self) -> Result<Vec<Command>, QueueError> {
        let _guard = self.guard();
        let entries = match fs::read_dir(&self.tasks_dir) {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_record_file(p))
            .collect();
        // Directory order is arbitrary; fix it so equal timestamps sort stably.
        paths.sort();

        let mut commands = Vec::with_capacity(paths.len());
        for path in paths {
            match read_yaml::<Command>(&path) {
                Ok(Some(cmd)) => commands.push(cmd),
                Ok(None) => {
                    tracing::warn!(path = %path.display(), "skipping empty command file");
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "skipping unreadable command file: {e}");
                }
            }
        }
        commands.sort_by_key(|c| c.created_at);
        Ok(commands)
    }

    /// One command. Absent is `CommandNotFound`; a corrupt file is a hard error.
    pub fn read_by_id(&self, id: &str) -> Result<Command, QueueError> {
        validate_name("command id", id)?;
        let _guard = self.guard();
        self.load(id)
    }

    pub fn update_status(&self, id: &str, status: CommandStatus) -> Result<(), QueueError> {
        validate_name("command id", id)?;
        let _guard = self.guard();
        let mut cmd = self.load(id)?;
        let previous = cmd.status;
        cmd.status = status;
        write_yaml_atomic(&self.path_for(id), &cmd)?;
        tracing::debug!(id, %previous, %status, "command status updated");
        Ok(())
    }

    /// Remove a command. Deleting an absent id succeeds.
    pub fn delete(&self, id: &str) -> Result<(), QueueError> {
        validate_name("command id", id)?;
        let _guard = self.guard();
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn load(&self, id: &str) -> Result<Command, QueueError> {
        read_yaml(&self.path_for(id))?.ok_or_else(|| QueueError::CommandNotFound(id.to_string()))
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `cmd_<UTC yyyymmddHHMMSS>_<6 hex>` for commands created without an id.
pub fn new_command_id(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("cmd_{}_{}", now.format("%Y%m%d%H%M%S"), &random[..6])
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn ledger() -> (tempfile::TempDir, CommandLedger) {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = CommandLedger::new(dir.path());
        (dir, ledger)
    }

    #[test]
    fn read_without_tasks_dir_is_empty() {
        let (_dir, ledger) = ledger();
        assert!(ledger.read().expect("read").is_empty());
    }

    #[test]
    fn update_status_changes_only_status() {
        let (_dir, ledger) = ledger();
        let mut cmd = Command::new("cmd_001", "add login endpoint");
        cmd.acceptance_criteria = vec!["returns 200".into(), "has tests".into()];
        cmd.body = "implement POST /login".into();
        cmd.project = "api".into();
        cmd.priority = "high".into();
        ledger.write(&cmd).expect("write");

        ledger
            .update_status("cmd_001", CommandStatus::InProgress)
            .expect("update");

        let got = ledger.read_by_id("cmd_001").expect("read");
        assert_eq!(got.status, CommandStatus::InProgress);
        assert_eq!(
            Command {
                status: CommandStatus::Pending,
                ..got
            },
            cmd
        );
    }

    #[test]
    fn read_sorts_by_creation_time() {
        let (_dir, ledger) = ledger();
        let base = Utc::now();
        for (id, offset) in [("c", 0), ("a", 20), ("b", 10)] {
            let mut cmd = Command::new(id, id);
            cmd.created_at = base + Duration::seconds(offset);
            ledger.write(&cmd).expect("write");
        }
        let ids: Vec<String> = ledger.read().expect("read").into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn corrupt_entry_is_skipped_in_bulk_but_fails_by_id() {
        let (_dir, ledger) = ledger();
        ledger.write(&Command::new("good", "ok")).expect("write");
        fs::write(ledger.tasks_dir().join("bad.yaml"), "id: [oops").expect("write");
        fs::write(ledger.tasks_dir().join("notes.txt"), "not a command").expect("write");

        let all = ledger.read().expect("read");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "good");

        assert!(matches!(ledger.read_by_id("bad"), Err(QueueError::Corrupt { .. })));
    }

    #[test]
    fn delete_is_idempotent() {
        let (_dir, ledger) = ledger();
        ledger.delete("never-existed").expect("noop");

        ledger.write(&Command::new("cmd_002", "x")).expect("write");
        ledger.delete("cmd_002").expect("delete");
        let err = ledger.read_by_id("cmd_002").unwrap_err();
        assert!(err.is_not_found());
        ledger.delete("cmd_002").expect("second delete");
    }

    #[test]
    fn update_missing_is_not_found() {
        let (_dir, ledger) = ledger();
        let err = ledger
            .update_status("ghost", CommandStatus::Completed)
            .unwrap_err();
        assert!(matches!(err, QueueError::CommandNotFound(ref id) if id == "ghost"));
    }

    #[test]
    fn generated_ids_are_valid_names() {
        let id = new_command_id(Utc::now());
        assert!(id.starts_with("cmd_"));
        validate_name("command id", &id).expect("valid");
        assert_ne!(id, new_command_id(Utc::now()));
    }

    #[test]
    fn write_overwrites_same_id() {
        let (_dir, ledger) = ledger();
        ledger.write(&Command::new("dup", "first")).expect("write");
        ledger.write(&Command::new("dup", "second")).expect("write");
        let all = ledger.read().expect("read");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].purpose, "second");
    }
}
