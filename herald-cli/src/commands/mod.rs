//! CLI command implementations

pub mod config;
pub mod list;
pub mod remind;
pub mod report;
pub mod serve;

pub use list::{ListArgs, ShowArgs};
pub use report::ReportArgs;
pub use serve::ServeArgs;

use std::sync::Arc;

use anyhow::Context;
use herald_core::{Config, DeskSettings, ReviewDesk, Secrets};
use herald_db::{Database, SqliteRequestRepository};
use herald_slack::SlackClient;

/// Open the configured database and return its request repository
pub async fn open_repository(config: &Config) -> anyhow::Result<SqliteRequestRepository> {
    let path = config.database.resolved_path()?;
    let db = Database::new(&path)
        .await
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    tracing::debug!(path = %path.display(), "Opened database");
    Ok(db.requests())
}

/// Wire the desk to SQLite and Slack
pub async fn build_desk(config: &Config, secrets: &Secrets) -> anyhow::Result<ReviewDesk> {
    let settings = DeskSettings::from_config(config)?;
    let repo = open_repository(config).await?;
    let slack = Arc::new(SlackClient::from_secrets(secrets)?);

    Ok(ReviewDesk::new(
        Arc::new(repo),
        slack.clone(),
        slack,
        settings,
    ))
}
