// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `joshua-agent`: the stateless worker daemon. Registers as a child
//! subreaper, then runs [`joshua_scheduler::run_loop`]
//! until the global idle timeout elapses or it is asked to shut down.

use clap::Parser;
use joshua_cli::open_store;
use joshua_scheduler::{run_loop, AgentConfig, LoopExit};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "joshua-agent", about = "Joshua fleet worker")]
struct Cli {
    /// FoundationDB cluster file. Ignored unless built with `--features fdb`.
    #[arg(long)]
    cluster_file: Option<String>,

    /// Scratch directory packages are materialized under.
    #[arg(long)]
    work_dir: PathBuf,

    /// Exit 0 after this many seconds with no eligible work.
    #[arg(long, default_value_t = 300)]
    agent_idle_timeout: u64,

    /// Pull from the sanity index instead of the default active index.
    #[arg(long)]
    sanity: bool,

    /// Keep a run's working directory (renamed with a `.failed` suffix)
    /// when its run fails, instead of deleting it.
    #[arg(long)]
    keep_failed: bool,
}

fn agent_id() -> String {
    let pid = std::process::id();
    let host = hostname();
    format!("{host}-{pid}")
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname").ok().map(|s| s.trim().to_string())
        })
        .unwrap_or_else(|| "unknown-host".to_string())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    joshua_sandbox::register_subreaper();

    let store = match open_store(cli.cluster_file.as_deref()) {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(error = %err, "failed to open kv store");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let config = AgentConfig {
        agent_id: agent_id(),
        work_dir: cli.work_dir,
        idle_timeout: Duration::from_secs(cli.agent_idle_timeout),
        sanity: cli.sanity,
        keep_failed: cli.keep_failed,
    };

    match run_loop(store, config, shutdown).await {
        Ok(LoopExit::Idle) => {
            tracing::info!("idle timeout elapsed, exiting");
            std::process::exit(0);
        }
        Ok(LoopExit::Cancelled) => {
            tracing::info!("shutdown requested, exiting");
            std::process::exit(0);
        }
        Err(err) => {
            tracing::error!(error = %err, "agent loop exited with a fatal error");
            std::process::exit(1);
        }
    }
}

#[cfg(unix)]
fn spawn_signal_handler(shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};
    tokio::spawn(async move {
        let Ok(mut term) = signal(SignalKind::terminate()) else {
            tracing::warn!("failed to install SIGTERM handler");
            return;
        };
        term.recv().await;
        tracing::info!("received SIGTERM");
        shutdown.cancel();
    });
}

#[cfg(not(unix))]
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });
}
