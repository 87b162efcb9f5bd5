//! Resolve the project root, configuration and tmux executor for a command.

use std::path::PathBuf;

use anyhow::Context;
use bastion_orchestrator::{Orchestrator, OrchestratorConfig};
use bastion_tmux::TmuxExecutor;

use crate::cli::Cli;

/// `--project-root` or the current directory, made absolute.
pub fn project_root(cli: &Cli) -> anyhow::Result<PathBuf> {
    let root = match &cli.project_root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    std::fs::canonicalize(&root)
        .with_context(|| format!("project root {} is not accessible", root.display()))
}

/// `bastion.toml` under the project root, with CLI overrides applied.
pub fn load_config(cli: &Cli) -> anyhow::Result<OrchestratorConfig> {
    let root = project_root(cli)?;
    let mut config = OrchestratorConfig::load(&root)?;
    if let Some(session) = &cli.session {
        config.session_name = session.clone();
        config.validate()?;
    }
    Ok(config)
}

pub fn build_executor(cli: &Cli) -> TmuxExecutor {
    let mut executor = TmuxExecutor::default();

    // Socket targeting: --tmux-socket > BASTION_TMUX_SOCKET_PATH > BASTION_TMUX_SOCKET_NAME
    if let Some(ref socket) = cli.tmux_socket {
        executor = executor.with_socket_path(socket.clone());
    } else if let Ok(path) = std::env::var("BASTION_TMUX_SOCKET_PATH") {
        executor = executor.with_socket_path(path);
    } else if let Ok(name) = std::env::var("BASTION_TMUX_SOCKET_NAME") {
        executor = executor.with_socket_name(name);
    }

    executor
}

pub fn build_orchestrator(
    cli: &Cli,
    config: OrchestratorConfig,
) -> Orchestrator<TmuxExecutor> {
    Orchestrator::new(build_executor(cli), config)
}
