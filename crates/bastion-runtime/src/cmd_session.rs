//! `bastion stop`, `bastion status` and `bastion attach`.

use bastion_queue::MailboxStore;

use crate::cli::Cli;
use crate::context::{build_executor, build_orchestrator, load_config};
use crate::handoff;

pub fn cmd_stop(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let orch = build_orchestrator(cli, config);
    let session = orch.session();

    if !session.session_exists()? {
        println!("Session {} is not running", session.session_name());
        return Ok(());
    }
    session.kill_session()?;
    println!("Stopped session {}", session.session_name());
    Ok(())
}

pub fn cmd_status(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let orch = build_orchestrator(cli, config);
    let session = orch.session();

    if !session.session_exists()? {
        println!("Session {} is not running", session.session_name());
        println!("Start it with: bastion start");
        return Ok(());
    }

    println!("Session {} is running", session.session_name());
    println!();
    println!("Windows:");
    for window in session.list_windows()? {
        match session.list_panes(&window) {
            Ok(panes) => println!("  {window} ({} panes)", panes.len()),
            Err(e) => println!("  {window} (panes unavailable: {e})"),
        }
    }

    let store = MailboxStore::new(orch.config().queue_path());
    let recipients = store.recipients()?;
    if !recipients.is_empty() {
        println!();
        println!("Pending mail:");
        for name in recipients {
            match store.pending_messages(&name) {
                Ok(pending) => println!("  {name}: {}", pending.len()),
                Err(e) => println!("  {name}: unreadable ({e})"),
            }
        }
    }

    println!();
    println!("Attach: bastion attach");
    println!("Stop:   bastion stop");
    Ok(())
}

/// Returns the exit code of the attached tmux client.
pub async fn cmd_attach(cli: &Cli) -> anyhow::Result<i32> {
    let config = load_config(cli)?;
    let orch = build_orchestrator(cli, config);
    if !orch.session().session_exists()? {
        anyhow::bail!(
            "session {} is not running; start it with: bastion start",
            orch.session().session_name()
        );
    }
    handoff::attach(&build_executor(cli), orch.session().session_name()).await
}
