use notememo_core::db::{SettingsRepository, SqliteSettingsRepository};
use notememo_core::sync::SyncState;

use crate::commands::common::{
    format_optional_timestamp, format_sync_conflict_lines, summary_lines, sync_conflict_to_item,
    Session, SyncConflictItem,
};
use crate::error::CliError;

fn require_sync(session: &Session) -> Result<(), CliError> {
    if session.sync.is_sync_active() {
        Ok(())
    } else {
        Err(CliError::SyncNotConfigured)
    }
}

pub async fn run_sync(session: &Session) -> Result<(), CliError> {
    require_sync(session)?;
    let summary = session.sync.sync_all().await;
    for line in summary_lines(&summary) {
        println!("{line}");
    }

    if summary.is_completed() {
        println!("Sync completed");
        Ok(())
    } else {
        let status = session.sync.status();
        Err(CliError::SyncFailed(
            status
                .last_error
                .unwrap_or_else(|| "pass did not complete".to_string()),
        ))
    }
}

pub async fn run_sync_reset(session: &Session) -> Result<(), CliError> {
    require_sync(session)?;
    let summary = session.sync.force_resync().await?;
    for line in summary_lines(&summary) {
        println!("{line}");
    }
    if summary.is_completed() {
        println!("Full resync completed");
        Ok(())
    } else {
        Err(CliError::SyncFailed("full resync did not complete".to_string()))
    }
}

pub async fn run_sync_status(as_json: bool, session: &Session) -> Result<(), CliError> {
    let status = session.sync.check_status().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("state:      {}", status.state);
    println!("device:     {}", session.sync.device());
    println!(
        "user:       {}",
        status.user_id.as_deref().unwrap_or("-")
    );
    println!(
        "last sync:  {}",
        format_optional_timestamp(status.last_sync_time.as_ref())
    );
    if let Some(error) = status.last_error.as_deref() {
        println!("message:    {error}");
    }
    Ok(())
}

pub async fn run_sync_devices(as_json: bool, session: &Session) -> Result<(), CliError> {
    require_sync(session)?;
    let status = session.sync.check_status().await;
    if status.state != SyncState::Enabled {
        return Err(CliError::SyncFailed(
            status
                .last_error
                .unwrap_or_else(|| format!("sync is {}", status.state)),
        ));
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status.devices)?);
        return Ok(());
    }

    if status.devices.is_empty() {
        println!("No devices have synced yet.");
        return Ok(());
    }

    let this_device = session.sync.device().as_str();
    for device in &status.devices {
        let marker = if device.device_id == this_device { "*" } else { " " };
        println!(
            "{marker} {:<38}  {}",
            device.device_id,
            format_optional_timestamp(device.last_sync_time.as_ref())
        );
    }
    Ok(())
}

pub fn run_sync_conflicts(limit: usize, as_json: bool, session: &Session) -> Result<(), CliError> {
    let conflicts = SqliteSettingsRepository::new(&session.db).list_conflicts(limit)?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_sync_watch(session: &Session) -> Result<(), CliError> {
    require_sync(session)?;
    println!(
        "Syncing every {}s; press Ctrl+C to stop.",
        session.sync.config().sync_interval.as_secs()
    );

    let handle = session.sync.spawn_periodic();
    tokio::signal::ctrl_c().await?;
    handle.abort();

    let status = session.sync.status();
    println!(
        "Stopped ({}). Last sync: {}",
        status.state,
        format_optional_timestamp(status.last_sync_time.as_ref())
    );
    Ok(())
}
