// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `joshua`: the reference client — submit, list,
//! stop, delete, tail, status, and agent heartbeat inspection. A thin
//! front end over [`joshua_kv::KvStore`]; all scheduling and retry logic
//! lives in the library crates.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use joshua_cli::{open_store, output, resolve_username};
use joshua_core::{EnsembleId, Properties};
use joshua_kv::{ListFilter, ListScope};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "joshua", about = "Client for the Joshua test-execution fabric")]
struct Cli {
    /// FoundationDB cluster file. Ignored unless built with `--features fdb`.
    #[arg(long, global = true)]
    cluster_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a new ensemble from a package file (raw executable or
    /// gzip'd tarball, entrypoint named `joshua_test`).
    Submit {
        package: PathBuf,
        /// Repeatable `key=value` overrides: max_runs, fail_fast,
        /// timeout, priority, sanity, compressed.
        #[arg(long = "property", value_parser = parse_property)]
        properties: Vec<(String, String)>,
    },
    /// List ensembles.
    List {
        #[arg(long)]
        stopped: bool,
        #[arg(long)]
        sanity: bool,
        #[arg(long)]
        username: Option<String>,
    },
    /// Stop one ensemble, or every ensemble owned by a username.
    Stop {
        id: Option<String>,
        #[arg(long)]
        username: Option<String>,
    },
    /// Permanently delete an ensemble and its results.
    Delete { id: String },
    /// Show an ensemble's run results, most recent first.
    Tail {
        id: String,
        #[arg(long)]
        errors_only: bool,
        #[arg(long)]
        raw: bool,
    },
    /// Autoscaler-style active/sanity counts.
    Status,
    #[command(subcommand)]
    Agent(AgentCommand),
}

#[derive(Subcommand)]
enum AgentCommand {
    /// Dump recent agent heartbeats.
    List {
        #[arg(long, default_value_t = 300)]
        max_age_secs: u64,
    },
}

fn parse_property(s: &str) -> Result<(String, String), String> {
    let (k, v) = s.split_once('=').ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    Ok((k.to_string(), v.to_string()))
}

fn apply_property(props: &mut Properties, key: &str, value: &str) -> anyhow::Result<()> {
    match key {
        "max_runs" => props.max_runs = value.parse().context("max_runs must be an integer")?,
        "fail_fast" => props.fail_fast = value.parse().context("fail_fast must be an integer")?,
        "timeout" => props.timeout = value.parse().context("timeout must be an integer")?,
        "priority" => props.priority = value.parse().context("priority must be an integer")?,
        "username_tagged_priority" => {
            props.username_tagged_priority = Some(value.parse().context("username_tagged_priority must be an integer")?)
        }
        "sanity" => props.sanity = value.parse().context("sanity must be true/false")?,
        "compressed" => props.compressed = value.parse().context("compressed must be true/false")?,
        other => bail!("unrecognized property {other:?}"),
    }
    Ok(())
}

fn id_from_hex(s: &str) -> anyhow::Result<EnsembleId> {
    EnsembleId::from_hex(s).ok_or_else(|| anyhow::anyhow!("not a valid ensemble id: {s:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let store = open_store(cli.cluster_file.as_deref())?;

    match cli.command {
        Command::Submit { package, properties } => {
            let bytes = std::fs::read(&package).with_context(|| format!("reading {}", package.display()))?;
            let mut props = Properties {
                max_runs: 0,
                fail_fast: 0,
                timeout: 60,
                priority: 100,
                username_tagged_priority: None,
                sanity: false,
                username: resolve_username(),
                submitted: chrono::Utc::now().to_rfc3339(),
                compressed: false,
            };
            for (k, v) in &properties {
                apply_property(&mut props, k, v)?;
            }
            let id = store.create(props.clone(), bytes).await?;
            println!("{}", output::format_submitted(id, &props));
        }
        Command::List { stopped, sanity, username } => {
            let scope = if stopped {
                Some(ListScope::Stopped)
            } else if sanity {
                Some(ListScope::Sanity)
            } else if username.is_some() {
                None
            } else {
                Some(ListScope::Active)
            };
            let rows = store.list(ListFilter { scope, username }).await?;
            for row in &rows {
                println!("{}", output::format_summary_row(row));
            }
        }
        Command::Stop { id, username } => match (id, username) {
            (Some(id), None) => store.stop(id_from_hex(&id)?).await?,
            (None, Some(user)) => store.stop_username(&user).await?,
            _ => bail!("specify exactly one of <id> or --username"),
        },
        Command::Delete { id } => store.delete(id_from_hex(&id)?).await?,
        Command::Tail { id, errors_only, raw } => {
            let results = store.tail(id_from_hex(&id)?, errors_only).await?;
            for result in &results {
                println!("{}", output::format_run_result(result, raw));
            }
        }
        Command::Status => {
            let active = store.count_active(false).await?;
            let sanity_active = store.count_active(true).await?;
            println!("{}", output::format_status(active, sanity_active));
        }
        Command::Agent(AgentCommand::List { max_age_secs }) => {
            let heartbeats = store.list_heartbeats(Duration::from_secs(max_age_secs)).await?;
            for hb in &heartbeats {
                println!(
                    "{}  epoch_ms={}  current={}",
                    hb.agent_id,
                    hb.epoch_ms,
                    hb.current_ensemble.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string())
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_property_splits_on_first_equals() {
        assert_eq!(parse_property("timeout=30").unwrap(), ("timeout".to_string(), "30".to_string()));
    }

    #[test]
    fn parse_property_rejects_missing_equals() {
        assert!(parse_property("timeout").is_err());
    }

    #[test]
    fn apply_property_rejects_unknown_keys() {
        let mut props = Properties::for_test("alice");
        assert!(apply_property(&mut props, "bogus", "1").is_err());
    }

    #[test]
    fn apply_property_sets_recognized_fields() {
        let mut props = Properties::for_test("alice");
        apply_property(&mut props, "timeout", "120").unwrap();
        apply_property(&mut props, "sanity", "true").unwrap();
        assert_eq!(props.timeout, 120);
        assert!(props.sanity);
    }
}
