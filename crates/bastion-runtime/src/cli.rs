//! CLI definition using clap derive.

use std::path::PathBuf;

use bastion_queue::CommandStatus;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bastion", version, about = "Multi-agent orchestration over tmux")]
pub struct Cli {
    /// Project root holding agents/, queue/ and bastion.toml (default: current directory)
    #[arg(long, global = true, env = "BASTION_PROJECT_ROOT")]
    pub project_root: Option<PathBuf>,

    /// tmux session name (overrides bastion.toml)
    #[arg(long, global = true)]
    pub session: Option<String>,

    /// tmux socket path
    #[arg(long, global = true)]
    pub tmux_socket: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build the session, launch every agent and attach
    Start(StartOpts),
    /// Kill the session
    Stop,
    /// Show windows, pane counts and pending mail
    Status,
    /// Attach to the running session
    Attach,
    /// Watch the inbox and wake agents until interrupted
    Watch,
    /// Drop a message into a recipient's mailbox
    Send(SendOpts),
    /// List a recipient's messages
    Inbox(InboxOpts),
    /// Mark a message processed
    InboxDone(InboxDoneOpts),
    /// Move processed messages out of a mailbox
    InboxArchive(InboxArchiveOpts),
    /// Manage the command ledger
    #[command(subcommand)]
    Task(TaskCommand),
}

#[derive(Args, Default)]
pub struct StartOpts {
    /// Number of specialist panes (overrides bastion.toml)
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,
}

#[derive(Args)]
pub struct SendOpts {
    /// Recipient mailbox (envoy, marshall, ...)
    pub to: String,
    /// Message body
    pub message: String,
    /// Sender name
    #[arg(long, default_value = "human")]
    pub from: String,
    /// Message type
    #[arg(long = "type", default_value = "task_assigned")]
    pub kind: String,
}

#[derive(Args)]
pub struct InboxOpts {
    pub name: String,
    /// Only pending messages
    #[arg(long)]
    pub pending: bool,
    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct InboxDoneOpts {
    pub name: String,
    pub id: String,
}

#[derive(Args)]
pub struct InboxArchiveOpts {
    pub name: String,
}

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Record a new command
    Add(TaskAddOpts),
    /// List commands, oldest first
    List(TaskListOpts),
    /// Show one command
    Show(TaskShowOpts),
    /// Change a command's status
    Status(TaskStatusOpts),
    /// Delete a command
    Rm(TaskRmOpts),
}

#[derive(Args)]
pub struct TaskAddOpts {
    /// What the command is for
    pub purpose: String,
    /// Command id (generated when omitted)
    #[arg(long)]
    pub id: Option<String>,
    /// Acceptance criterion; repeat for several
    #[arg(long = "criterion", short = 'c')]
    pub criteria: Vec<String>,
    /// Detailed instructions
    #[arg(long)]
    pub body: Option<String>,
    #[arg(long, default_value = "")]
    pub project: String,
    #[arg(long, default_value = "normal")]
    pub priority: String,
}

#[derive(Args)]
pub struct TaskListOpts {
    /// Only commands in this status
    #[arg(long)]
    pub status: Option<CommandStatus>,
    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct TaskShowOpts {
    pub id: String,
    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct TaskStatusOpts {
    pub id: String,
    /// pending, in_progress, completed or failed
    pub status: CommandStatus,
    /// Allow moving a command backwards
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct TaskRmOpts {
    pub id: String,
}
