//! Remind command - run one reminder sweep now

use chrono::Utc;
use herald_core::{Config, Secrets};

use super::build_desk;

/// Run one reminder sweep
pub async fn execute(config: &Config) -> anyhow::Result<()> {
    let secrets = Secrets::load()?;
    let desk = build_desk(config, &secrets).await?;

    let report = desk.run_reminder_sweep(Utc::now()).await?;

    println!(
        "Reminded {} of {} open request(s)",
        report.dispatched, report.swept
    );
    if report.failed > 0 {
        println!("{} request(s) failed; see the log for details", report.failed);
    }

    Ok(())
}
