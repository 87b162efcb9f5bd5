//! `bastion task ...`: the command ledger from the shell.

use bastion_queue::{Command, CommandLedger, CommandStatus, new_command_id};
use chrono::{Local, Utc};

use crate::cli::{Cli, TaskAddOpts, TaskCommand, TaskListOpts, TaskRmOpts, TaskShowOpts, TaskStatusOpts};
use crate::context::load_config;

pub fn cmd_task(cli: &Cli, command: &TaskCommand) -> anyhow::Result<()> {
    let ledger = CommandLedger::new(load_config(cli)?.queue_path());
    match command {
        TaskCommand::Add(opts) => add(&ledger, opts),
        TaskCommand::List(opts) => list(&ledger, opts),
        TaskCommand::Show(opts) => show(&ledger, opts),
        TaskCommand::Status(opts) => set_status(&ledger, opts),
        TaskCommand::Rm(opts) => remove(&ledger, opts),
    }
}

fn add(ledger: &CommandLedger, opts: &TaskAddOpts) -> anyhow::Result<()> {
    let id = match &opts.id {
        Some(id) => {
            // The ledger overwrites silently; refuse here instead.
            match ledger.read_by_id(id) {
                Ok(_) => anyhow::bail!("command {id} already exists"),
                Err(e) if e.is_not_found() => id.clone(),
                Err(e) => return Err(e.into()),
            }
        }
        None => new_command_id(Utc::now()),
    };

    let mut cmd = Command::new(id, opts.purpose.clone());
    cmd.acceptance_criteria = opts.criteria.clone();
    cmd.body = opts.body.clone().unwrap_or_default();
    cmd.project = opts.project.clone();
    cmd.priority = opts.priority.clone();
    ledger.write(&cmd)?;
    println!("{}", cmd.id);
    Ok(())
}

fn list(ledger: &CommandLedger, opts: &TaskListOpts) -> anyhow::Result<()> {
    let commands: Vec<Command> = ledger
        .read()?
        .into_iter()
        .filter(|c| opts.status.is_none_or(|s| c.status == s))
        .collect();

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&commands)?);
    } else if commands.is_empty() {
        println!("(no commands)");
    } else {
        for c in &commands {
            println!("{}", format_row(c));
        }
    }
    Ok(())
}

fn show(ledger: &CommandLedger, opts: &TaskShowOpts) -> anyhow::Result<()> {
    let cmd = ledger.read_by_id(&opts.id)?;
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&cmd)?);
        return Ok(());
    }
    println!("id:        {}", cmd.id);
    println!("created:   {}", cmd.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"));
    println!("status:    {}", cmd.status);
    println!("priority:  {}", cmd.priority);
    if !cmd.project.is_empty() {
        println!("project:   {}", cmd.project);
    }
    println!("purpose:   {}", cmd.purpose);
    if !cmd.acceptance_criteria.is_empty() {
        println!("criteria:");
        for c in &cmd.acceptance_criteria {
            println!("  - {c}");
        }
    }
    if !cmd.body.is_empty() {
        println!();
        println!("{}", cmd.body);
    }
    Ok(())
}

fn set_status(ledger: &CommandLedger, opts: &TaskStatusOpts) -> anyhow::Result<()> {
    let current = ledger.read_by_id(&opts.id)?.status;
    if !opts.force && !is_forward(current, opts.status) {
        anyhow::bail!(
            "refusing to move {} from {current} to {} (use --force)",
            opts.id,
            opts.status
        );
    }
    ledger.update_status(&opts.id, opts.status)?;
    println!("{}: {current} -> {}", opts.id, opts.status);
    Ok(())
}

fn remove(ledger: &CommandLedger, opts: &TaskRmOpts) -> anyhow::Result<()> {
    ledger.delete(&opts.id)?;
    println!("removed {}", opts.id);
    Ok(())
}

/// `pending → in_progress → completed | failed`. Staying put is allowed;
/// finished commands do not change.
pub fn is_forward(from: CommandStatus, to: CommandStatus) -> bool {
    use CommandStatus::*;
    matches!(
        (from, to),
        (Pending, _) | (InProgress, InProgress | Completed | Failed)
    ) || from == to
}

fn format_row(c: &Command) -> String {
    format!(
        "{:<28} {:<11} {:<8} {}",
        c.id,
        c.status.as_str(),
        c.priority,
        c.purpose
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use CommandStatus::*;

    #[test]
    fn forward_transitions_only() {
        assert!(is_forward(Pending, InProgress));
        assert!(is_forward(Pending, Completed));
        assert!(is_forward(InProgress, Failed));
        assert!(is_forward(Completed, Completed));
        assert!(!is_forward(InProgress, Pending));
        assert!(!is_forward(Completed, InProgress));
        assert!(!is_forward(Failed, Completed));
    }

    #[test]
    fn add_refuses_duplicate_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = CommandLedger::new(dir.path());
        let opts = TaskAddOpts {
            purpose: "add login endpoint".into(),
            id: Some("cmd_001".into()),
            criteria: vec!["returns 200".into()],
            body: None,
            project: String::new(),
            priority: "high".into(),
        };
        add(&ledger, &opts).expect("first add");
        assert!(add(&ledger, &opts).is_err());

        let cmd = ledger.read_by_id("cmd_001").expect("read");
        assert_eq!(cmd.priority, "high");
        assert_eq!(cmd.status, Pending);
    }

    #[test]
    fn status_change_respects_direction() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = CommandLedger::new(dir.path());
        ledger.write(&Command::new("cmd_002", "x")).expect("write");

        let to = |status, force| TaskStatusOpts {
            id: "cmd_002".into(),
            status,
            force,
        };
        set_status(&ledger, &to(Completed, false)).expect("forward");
        assert!(set_status(&ledger, &to(Pending, false)).is_err());
        set_status(&ledger, &to(Pending, true)).expect("forced");
        assert_eq!(ledger.read_by_id("cmd_002").expect("read").status, Pending);
    }
}
