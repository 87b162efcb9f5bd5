//! bastion: run a team of terminal AI agents inside one tmux session,
//! coordinated through file mailboxes and a command ledger.

use clap::Parser;

mod cli;
mod cmd_inbox;
mod cmd_session;
mod cmd_start;
mod cmd_task;
mod cmd_watch;
mod context;
mod handoff;

/// `BASTION_LOG` > `RUST_LOG` > `default`. Logs go to stderr so command
/// output on stdout stays scriptable.
fn init_logging(default: &str) {
    let filter = std::env::var("BASTION_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    match &args.command {
        cli::Command::Watch => init_logging("info"),
        _ => init_logging("warn"),
    }

    match &args.command {
        cli::Command::Start(opts) => {
            let exit_code = cmd_start::cmd_start(&args, opts).await?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
        cli::Command::Stop => cmd_session::cmd_stop(&args)?,
        cli::Command::Status => cmd_session::cmd_status(&args)?,
        cli::Command::Attach => {
            let exit_code = cmd_session::cmd_attach(&args).await?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
        cli::Command::Watch => {
            tracing::info!("bastion watcher starting");
            cmd_watch::cmd_watch(&args).await?;
        }
        cli::Command::Send(opts) => cmd_inbox::cmd_send(&args, opts)?,
        cli::Command::Inbox(opts) => cmd_inbox::cmd_inbox(&args, opts)?,
        cli::Command::InboxDone(opts) => cmd_inbox::cmd_inbox_done(&args, opts)?,
        cli::Command::InboxArchive(opts) => cmd_inbox::cmd_inbox_archive(&args, opts)?,
        cli::Command::Task(command) => cmd_task::cmd_task(&args, command)?,
    }

    Ok(())
}
