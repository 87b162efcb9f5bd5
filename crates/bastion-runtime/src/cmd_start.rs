//! `bastion start`: build the session, launch agents, start the watcher pane
//! and attach.

use std::sync::Arc;

use bastion_orchestrator::Orchestrator;
use bastion_tmux::TmuxExecutor;

use crate::cli::{Cli, StartOpts};
use crate::context::{build_executor, build_orchestrator, load_config};
use crate::handoff;

/// Returns the exit code to leave with.
pub async fn cmd_start(cli: &Cli, opts: &StartOpts) -> anyhow::Result<i32> {
    let mut config = load_config(cli)?;
    if let Some(workers) = opts.workers {
        config.worker_count = workers;
    }
    let session_name = config.session_name.clone();
    let workers = config.worker_count;
    let orch = Arc::new(build_orchestrator(cli, config));

    println!("Starting session {session_name}...");
    blocking(&orch, |o| o.setup_session().map_err(anyhow::Error::from)).await?;

    if let Err(e) = blocking(&orch, |o| {
        let bastion = o.bastion_command();
        o.session()
            .bind_stop_key(&bastion.to_string_lossy())
            .map_err(anyhow::Error::from)
    })
    .await
    {
        tracing::warn!("could not bind stop key: {e}");
    }

    match blocking(&orch, |o| o.start_all().map_err(anyhow::Error::from)).await {
        Ok(()) => println!("Started envoy, marshall and {workers} specialists"),
        Err(e) => {
            eprintln!("warning: agent startup incomplete: {e:#}");
            eprintln!("start the remaining agents by hand: tmux attach -t {session_name}");
        }
    }

    match blocking(&orch, |o| o.start_watcher_window().map_err(anyhow::Error::from)).await {
        Ok(()) => println!("Inbox watcher running in {}", orch.config().watcher_target),
        Err(e) => eprintln!("warning: could not start the inbox watcher pane: {e:#}"),
    }

    match blocking(&orch, |o| o.session().list_windows().map_err(anyhow::Error::from)).await {
        Ok(windows) => {
            println!("Windows:");
            for w in windows {
                println!("  {w}");
            }
        }
        Err(e) => tracing::warn!("could not list windows: {e}"),
    }

    if std::env::var("BASTION_TEST_MODE").is_ok_and(|v| v == "1") {
        println!("Test mode: not attaching");
        return Ok(0);
    }

    handoff::attach(&build_executor(cli), &session_name).await
}

/// Run a tmux-bound orchestrator call on the blocking pool.
async fn blocking<T, F>(orch: &Arc<Orchestrator<TmuxExecutor>>, f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Orchestrator<TmuxExecutor>) -> anyhow::Result<T> + Send + 'static,
{
    let orch = Arc::clone(orch);
    tokio::task::spawn_blocking(move || f(&orch)).await?
}
