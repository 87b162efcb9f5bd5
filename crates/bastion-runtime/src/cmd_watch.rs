//! `bastion watch`: inbox watcher plus escalation supervisor, until
//! ctrl-c or SIGTERM.

use tokio_util::sync::CancellationToken;

use crate::cli::Cli;
use crate::context::{build_orchestrator, load_config};

pub async fn cmd_watch(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let orch = build_orchestrator(cli, config);

    orch.start_watcher().await?;
    let cancel = CancellationToken::new();
    let supervisor = tokio::spawn(orch.escalation_supervisor().run(cancel.clone()));

    println!(
        "Watching {} (Ctrl-C to stop)",
        orch.config().queue_path().join(bastion_queue::INBOX_DIR).display()
    );

    shutdown_signal().await;

    cancel.cancel();
    if let Err(e) = orch.stop_watcher().await {
        tracing::warn!("failed to stop watcher: {e}");
    }
    if let Err(e) = supervisor.await {
        tracing::warn!("escalation supervisor ended abnormally: {e}");
    }
    println!("Watcher stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!("cannot listen for SIGTERM: {e}");
                ctrl_c.await.ok();
                tracing::info!("received ctrl-c, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received ctrl-c, shutting down");
    }
}
