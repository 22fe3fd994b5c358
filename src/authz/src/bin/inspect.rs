//! # Role inspector
//!
//! Loads a JSON snapshot into the in-memory store and prints the effective
//! roles of one principal. When role names follow, also reports whether the
//! principal holds them.
//!
//! ```text
//! rolegraph-inspect <snapshot.json> <principal> [role ...] [--mode all|any]
//! ```
//!
//! Exits with status 1 when a membership check fails.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `RUST_LOG` - Log level (default: info)
//! - `ROLEGRAPH_MAX_DEPTH` - Maximum group nesting depth (default: 64)
//! - `ROLEGRAPH_MAX_GROUPS` - Maximum groups per resolution (default: 10000)

use anyhow::Context;
use clap::Parser;
use rolegraph_authz::{
    EngineConfig, InMemoryEntityStore, MatchMode, PrincipalId, RoleEngine, RoleQuery, Snapshot,
};
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Rolegraph role inspector
#[derive(Debug, Parser)]
#[command(name = "rolegraph-inspect")]
#[command(about = "Resolve the effective roles of a principal from a JSON snapshot")]
#[command(version)]
struct Cli {
    /// Path to the JSON snapshot
    snapshot: PathBuf,

    /// Principal id to resolve
    principal: String,

    /// Role names the principal must hold
    roles: Vec<String>,

    /// Match mode for the role check
    #[arg(long, default_value = "all", value_parser = MatchMode::from_str)]
    mode: MatchMode,
}

#[derive(Debug, Serialize)]
struct Report {
    principal: PrincipalId,
    roles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    check: Option<Check>,
}

#[derive(Debug, Serialize)]
struct Check {
    query: Vec<String>,
    mode: MatchMode,
    allowed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env()?;
    let principal = PrincipalId::new(cli.principal);

    let json = std::fs::read_to_string(&cli.snapshot)
        .with_context(|| format!("Failed to read snapshot {}", cli.snapshot.display()))?;
    let store = InMemoryEntityStore::from_snapshot(Snapshot::from_json(&json)?).await?;
    info!("Loaded snapshot from {}", cli.snapshot.display());

    let engine = RoleEngine::with_config(Arc::new(store), config)?;
    let roles = engine.resolve_all_roles(&principal).await?;

    let check = if cli.roles.is_empty() {
        None
    } else {
        let query: RoleQuery = cli.roles.iter().map(String::as_str).collect();
        let allowed = engine.has_role(&principal, &query, cli.mode).await?;
        Some(Check {
            query: cli.roles,
            mode: cli.mode,
            allowed,
        })
    };
    let denied = matches!(check, Some(Check { allowed: false, .. }));

    let report = Report {
        principal,
        roles: roles.names(),
        check,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if denied {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_args() {
        let cli = Cli::try_parse_from([
            "rolegraph-inspect",
            "fixture.json",
            "42",
            "edit_post",
            "--mode",
            "ANY",
            "publish_post",
        ])
        .unwrap();
        assert_eq!(cli.snapshot, PathBuf::from("fixture.json"));
        assert_eq!(cli.principal, "42");
        assert_eq!(cli.roles, vec!["edit_post", "publish_post"]);
        assert_eq!(cli.mode, MatchMode::Any);
    }

    #[test]
    fn test_default_mode_is_all() {
        let cli = Cli::try_parse_from(["rolegraph-inspect", "fixture.json", "42"]).unwrap();
        assert_eq!(cli.mode, MatchMode::All);
        assert!(cli.roles.is_empty());
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let result =
            Cli::try_parse_from(["rolegraph-inspect", "fixture.json", "42", "--mode", "some"]);
        assert!(result.is_err());
    }
}
