//! NoteMemo CLI - Markdown notes from the terminal
//!
//! Works fully offline; when sync is configured every change is pushed to the
//! NoteMemo server on a best-effort basis.

mod cli;
mod commands;
mod error;


use clap::{CommandFactory, Parser};
use notememo_core::models::NotePatch;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::add::{run_add, AddArgs};
use crate::commands::categories::run_categories;
use crate::commands::common::{resolve_db_path, Session};
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::export::run_export;
use crate::commands::list::run_list;
use crate::commands::search::run_search;
use crate::commands::sync::{
    run_sync, run_sync_conflicts, run_sync_devices, run_sync_reset, run_sync_status,
    run_sync_watch,
};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("notememo=warn".parse().expect("valid directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(Commands::Completions { shell, output }) = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let db_path = resolve_db_path(cli.db_path);
    let session = Session::open(&db_path, cli.offline)?;

    match cli.command {
        Some(Commands::Add {
            content,
            title,
            category,
            tags,
        }) => {
            run_add(
                AddArgs {
                    content: &content,
                    title: title.as_deref(),
                    category: category.as_deref(),
                    tags: &tags,
                },
                &session,
            )
            .await?;
        }
        Some(Commands::List {
            limit,
            category,
            json,
        }) => run_list(limit, category.as_deref(), json, &session).await?,
        Some(Commands::Search { query, limit, json }) => {
            run_search(&query, limit, json, &session)?;
        }
        Some(Commands::Edit {
            id,
            title,
            category,
            tags,
        }) => {
            let patch = NotePatch {
                title,
                content: None,
                category,
                tags,
            };
            run_edit(&id, patch, &session).await?;
        }
        Some(Commands::Delete { id }) => run_delete(&id, &session).await?,
        Some(Commands::Categories { command }) => run_categories(command, &session).await?,
        Some(Commands::Export { format, output }) => {
            run_export(format, output.as_deref(), &session)?;
        }
        Some(Commands::Sync { command }) => match command.unwrap_or(SyncCommands::Run) {
            SyncCommands::Run => run_sync(&session).await?,
            SyncCommands::Status { json } => run_sync_status(json, &session).await?,
            SyncCommands::Reset => run_sync_reset(&session).await?,
            SyncCommands::Devices { json } => run_sync_devices(json, &session).await?,
            SyncCommands::Conflicts { limit, json } => {
                run_sync_conflicts(limit, json, &session)?;
            }
            SyncCommands::Watch => run_sync_watch(&session).await?,
        },
        Some(Commands::Completions { .. }) => {}
        None => {
            // Quick capture mode: notememo "my note"
            if cli.note.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                let args = AddArgs {
                    content: &cli.note,
                    title: None,
                    category: None,
                    tags: &[],
                };
                run_add(args, &session).await?;
            }
        }
    }

    Ok(())
}
