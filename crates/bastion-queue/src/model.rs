//! Records stored in the queue: mailbox messages and commands.
//!
//! Field names on disk follow the queue file format agents read and write
//! directly (`message` for a message body, `command` for a command body,
//! `timestamp` for creation time).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Messages ────────────────────────────────────────────────────────────────

/// Message kind. Unknown kinds written by agents survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    TaskAssigned,
    ReportReceived,
    WakeUp,
    Other(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::TaskAssigned => "task_assigned",
            Self::ReportReceived => "report_received",
            Self::WakeUp => "wake_up",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for MessageType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "task_assigned" => Self::TaskAssigned,
            "report_received" => Self::ReportReceived,
            "wake_up" => Self::WakeUp,
            _ => Self::Other(s),
        }
    }
}

impl From<MessageType> for String {
    fn from(t: MessageType) -> Self {
        match t {
            MessageType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for MessageType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `pending → processed`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Processed,
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub from: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(rename = "message", default)]
    pub body: String,
    pub status: MessageStatus,
}

impl Message {
    pub fn is_pending(&self) -> bool {
        self.status == MessageStatus::Pending
    }
}

/// Contents of one mailbox file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    #[serde(default)]
    pub messages: Vec<Message>,
}

// ─── Commands ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl CommandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" | "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!(
                "unknown command status {other:?} (expected pending, in_progress, completed, failed)"
            )),
        }
    }
}

/// A unit of work handed from the coordinator to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(rename = "command", default)]
    pub body: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub priority: String,
    pub status: CommandStatus,
}

impl Command {
    /// A pending command created now.
    pub fn new(id: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            purpose: purpose.into(),
            acceptance_criteria: Vec::new(),
            body: String::new(),
            project: String::new(),
            priority: "normal".to_string(),
            status: CommandStatus::Pending,
        }
    }
}
