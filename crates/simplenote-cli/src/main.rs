//! SimpleNote CLI - keep notes in step with a SimpleNote server
//!
//! Every command works on the local cache first and then talks to the
//! server through the profile's stored credentials.

mod cli;
mod commands;
mod config_profiles;
mod credentials;
mod error;


use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use simplenote_core::auth::CredentialStore;
use simplenote_core::sync::SyncEngine;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::{resolve_db_path, ProfileContext};
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::run_list;
use crate::commands::show::run_show;
use crate::commands::sync::run_sync;
use crate::error::CliError;

const DEFAULT_LOG_FILTER: &str = "simplenote_core=warn,simplenote_cli=info";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile_flag = cli.profile.clone();
    if let Err(error) = run(cli).await {
        eprintln!("Error: {error}");
        if error.is_auth_required() {
            forget_credentials(profile_flag.as_deref());
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let global_profile = cli.profile.as_deref();
    let db_path = cli.db_path;

    match cli.command {
        Some(Commands::Add { title, content }) => {
            let engine = open_engine(global_profile, db_path)?;
            run_add(&engine, title.as_deref(), &content).await
        }
        Some(Commands::List { limit, sync, json }) => {
            let engine = open_engine(global_profile, db_path)?;
            run_list(&engine, limit, sync, json).await
        }
        Some(Commands::Show { id, json }) => {
            run_show(&open_engine(global_profile, db_path)?, &id, json)
        }
        Some(Commands::Edit { id, title }) => {
            let engine = open_engine(global_profile, db_path)?;
            run_edit(&engine, &id, title.as_deref()).await
        }
        Some(Commands::Delete { id }) => {
            let engine = open_engine(global_profile, db_path)?;
            run_delete(&engine, &id).await
        }
        Some(Commands::Sync) => run_sync(&open_engine(global_profile, db_path)?).await,
        Some(Commands::Completions { shell, output }) => run_completions(shell, output.as_deref()),
        Some(Commands::Config { command }) => run_config(command, global_profile),
        Some(Commands::Auth { command }) => {
            let profile = ProfileContext::load(global_profile)?;
            run_auth(command, &profile.gateway()?, &profile.name).await
        }
        None => {
            // Quick capture mode: simplenote "my note"
            if cli.note.is_empty() {
                Cli::command().print_help()?;
                println!();
                Ok(())
            } else {
                let engine = open_engine(global_profile, db_path)?;
                run_add(&engine, None, &cli.note).await
            }
        }
    }
}

fn open_engine(profile_flag: Option<&str>, db_path: Option<PathBuf>) -> Result<SyncEngine, CliError> {
    let profile = ProfileContext::load(profile_flag)?;
    let db_path = resolve_db_path(db_path, &profile.name);
    tracing::debug!("Using profile '{}' with cache {}", profile.name, db_path.display());
    profile.open_engine(&db_path)
}

/// Drop credentials the server no longer accepts.
fn forget_credentials(profile_flag: Option<&str>) {
    let Ok(profile) = ProfileContext::load(profile_flag) else {
        return;
    };
    match profile.credential_store().clear() {
        Ok(()) => eprintln!(
            "Stored credentials for profile '{}' were cleared. Run `simplenote auth login` to sign in again.",
            profile.name
        ),
        Err(error) => tracing::warn!("Failed to clear stored credentials: {}", error),
    }
}
