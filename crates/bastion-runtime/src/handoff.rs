//! Hand the terminal to an interactive `tmux attach`.

use anyhow::Context;
use bastion_tmux::TmuxExecutor;

/// Run `tmux attach-session -t =<session>` on the executor's server with this
/// process's stdio and return the child's exit code once it detaches.
pub async fn attach(executor: &TmuxExecutor, session: &str) -> anyhow::Result<i32> {
    let target = format!("={session}");
    let status = tokio::process::Command::new(executor.tmux_bin())
        .args(executor.server_args())
        .args(["attach-session", "-t", &target])
        .status()
        .await
        .with_context(|| {
            format!("failed to run tmux; attach manually with: tmux attach -t {session}")
        })?;
    Ok(status.code().unwrap_or(1))
}
