//! Report command - publish or preview the weekly report

use chrono::Utc;
use clap::Args;
use herald_core::workflow::report::build_digest;
use herald_core::workflow::{ReportDigest, ReportSettings, ReportWindow};
use herald_core::{Config, RequestRepository, Secrets};

use super::{build_desk, open_repository};

/// Arguments for the report command
#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Print the report instead of posting it to Slack
    #[arg(long)]
    pub dry_run: bool,
}

impl ReportArgs {
    /// Execute the report command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let settings = ReportSettings::from_config(config);
        let now = Utc::now();

        if self.dry_run {
            let repo = open_repository(config).await?;
            let window = ReportWindow::ending_at(now);
            let requests = repo
                .find_created_between(window.start, window.end, &settings.projects)
                .await?;
            print_digest(&build_digest(&requests, window, &settings));
            return Ok(());
        }

        let secrets = Secrets::load()?;
        let desk = build_desk(config, &secrets).await?;
        match desk.run_weekly_report(&settings, now).await? {
            Some(digest) => {
                println!(
                    "Published report for {} ({} request(s))",
                    digest.window.label(),
                    digest.summary.total
                );
            }
            None => println!("Weekly report not published (disabled or no report channel)"),
        }

        Ok(())
    }
}

fn print_digest(digest: &ReportDigest) {
    println!("{}", digest.summary.text());
    for group in &digest.groups {
        println!();
        println!("{}", group.text());
    }
    if digest.ignored > 0 {
        println!();
        println!(
            "({} of {} request(s) matched no report group)",
            digest.ignored, digest.fetched
        );
    }
}
