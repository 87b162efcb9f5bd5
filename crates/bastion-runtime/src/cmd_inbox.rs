//! Mailbox commands: `send`, `inbox`, `inbox-done`, `inbox-archive`.

use bastion_queue::{MailboxStore, Message, MessageType};
use chrono::Local;

use crate::cli::{Cli, InboxArchiveOpts, InboxDoneOpts, InboxOpts, SendOpts};
use crate::context::load_config;

fn store(cli: &Cli) -> anyhow::Result<MailboxStore> {
    Ok(MailboxStore::new(load_config(cli)?.queue_path()))
}

pub fn cmd_send(cli: &Cli, opts: &SendOpts) -> anyhow::Result<()> {
    let kind = MessageType::from(opts.kind.clone());
    let msg = store(cli)?.write(&opts.to, &opts.message, kind, &opts.from)?;
    println!("{} -> {}", msg.id, opts.to);
    Ok(())
}

pub fn cmd_inbox(cli: &Cli, opts: &InboxOpts) -> anyhow::Result<()> {
    let store = store(cli)?;
    let messages = if opts.pending {
        store.pending_messages(&opts.name)?
    } else {
        store.read(&opts.name)?
    };

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
    } else if messages.is_empty() {
        println!("(no messages for {})", opts.name);
    } else {
        print!("{}", format_messages(&messages));
    }
    Ok(())
}

pub fn cmd_inbox_done(cli: &Cli, opts: &InboxDoneOpts) -> anyhow::Result<()> {
    store(cli)?.mark_as_processed(&opts.name, &opts.id)?;
    println!("{} marked processed", opts.id);
    Ok(())
}

pub fn cmd_inbox_archive(cli: &Cli, opts: &InboxArchiveOpts) -> anyhow::Result<()> {
    let moved = store(cli)?.archive_processed(&opts.name)?;
    println!("archived {moved} processed message(s) from {}", opts.name);
    Ok(())
}

/// Two lines per message: header, then the indented body.
pub fn format_messages(messages: &[Message]) -> String {
    let mut out = String::new();
    for m in messages {
        let when = m.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
        out.push_str(&format!(
            "{}  {when}  {:<9}  {}  from {}\n",
            m.id, m.status.to_string(), m.kind, m.from
        ));
        for line in m.body.lines() {
            out.push_str(&format!("    {line}\n"));
        }
    }
    out
}
