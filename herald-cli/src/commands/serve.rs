//! Serve command - the webhook server plus the reminder and report schedules

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, Utc};
use clap::Args;
use herald_core::workflow::{ReportSettings, WeeklySchedule};
use herald_core::{Config, ReviewDesk, Secrets};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use super::build_desk;
use crate::server::{router, AppState};

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl ServeArgs {
    /// Execute the serve command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let secrets = Secrets::load()?;
        let signing_secret = secrets
            .signing_secret()
            .context("No Slack signing secret configured (secrets.toml or SLACK_SIGNING_SECRET)")?;

        let reminder_schedule: WeeklySchedule = config
            .reminders
            .schedule
            .parse()
            .context("Invalid reminders.schedule")?;
        let report_schedule: WeeklySchedule = config
            .report
            .schedule
            .parse()
            .context("Invalid report.schedule")?;

        let state = AppState::new(build_desk(config, &secrets).await?, signing_secret);

        let desk = state.desk.clone();
        tokio::spawn(run_on_schedule("reminders", reminder_schedule, move || {
            let desk = desk.clone();
            async move { remind(&desk).await }
        }));

        let report_settings = Arc::new(ReportSettings::from_config(config));
        if report_settings.enabled {
            let desk = state.desk.clone();
            tokio::spawn(run_on_schedule("weekly report", report_schedule, move || {
                let desk = desk.clone();
                let settings = report_settings.clone();
                async move { report(&desk, &settings).await }
            }));
        } else {
            info!("Weekly report disabled");
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!(%addr, "Listening for Slack requests");

        axum::serve(listener, router(state))
            .await
            .context("Server error")?;

        Ok(())
    }
}

async fn remind(desk: &ReviewDesk) -> herald_core::Result<()> {
    let report = desk.run_reminder_sweep(Utc::now()).await?;
    info!(
        swept = report.swept,
        dispatched = report.dispatched,
        failed = report.failed,
        "Reminder sweep finished"
    );
    Ok(())
}

async fn report(desk: &ReviewDesk, settings: &ReportSettings) -> herald_core::Result<()> {
    if let Some(digest) = desk.run_weekly_report(settings, Utc::now()).await? {
        info!(
            total = digest.summary.total,
            groups = digest.groups.len(),
            "Weekly report published"
        );
    }
    Ok(())
}

/// Run `job` every time the schedule fires, in local time, until the process exits
async fn run_on_schedule<F, Fut>(name: &'static str, schedule: WeeklySchedule, job: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = herald_core::Result<()>>,
{
    loop {
        let now = Local::now();
        let Some(next) = schedule.next_after(&now) else {
            warn!(job = name, "Schedule never fires; job stopped");
            return;
        };

        let wait = (next - now).to_std().unwrap_or_default();
        info!(job = name, next = %next, "Next run scheduled");
        tokio::time::sleep(wait).await;

        if let Err(e) = job().await {
            error!(job = name, error = %e, "Scheduled job failed");
        }
    }
}
