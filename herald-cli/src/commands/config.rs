//! Config command - print the effective configuration

use herald_core::{Config, Secrets};

/// Print the effective configuration
pub fn print(config: &Config) {
    println!("Herald Configuration");
    println!("====================");
    println!();
    println!("Slack:");
    println!(
        "  channel: {}",
        config.slack.channel.as_deref().unwrap_or("(not set)")
    );
    println!();
    println!("Reminders:");
    println!(
        "  lookback: {}",
        humanize_days(config.reminders.lookback.as_secs())
    );
    println!(
        "  escalation_contact: {}",
        config
            .reminders
            .escalation_contact
            .as_deref()
            .unwrap_or("(none)")
    );
    println!("  schedule: {}", config.reminders.schedule);
    println!();
    println!("Weekly report:");
    println!("  enabled: {}", config.report.enabled);
    println!(
        "  channel: {}",
        config.report_channel().unwrap_or("(not set)")
    );
    if config.report.projects.is_empty() {
        println!("  projects: (all)");
    } else {
        println!("  projects: {}", config.report.projects.join(", "));
    }
    println!("  group_order: {}", config.report.group_order.join(", "));
    for (group, projects) in &config.report.groups {
        println!("  group {}: {}", group, projects.join(", "));
    }
    println!("  schedule: {}", config.report.schedule);
    println!();
    println!("Database:");
    match config.database.resolved_path() {
        Ok(path) => println!("  path: {}", path.display()),
        Err(e) => println!("  path: (unavailable: {})", e),
    }
    println!();
    println!("Server:");
    println!("  port: {}", config.server.port);
    println!();

    if let Some(path) = Config::default_config_path() {
        println!("Config file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using defaults)");
        }
    }

    match Secrets::load() {
        Ok(secrets) => {
            println!(
                "Bot token: {}",
                if secrets.bot_token().is_some() { "set" } else { "missing" }
            );
            println!(
                "Signing secret: {}",
                if secrets.signing_secret().is_some() { "set" } else { "missing" }
            );
        }
        Err(e) => println!("Secrets: {}", e),
    }
}

fn humanize_days(seconds: u64) -> String {
    const DAY: u64 = 24 * 60 * 60;
    if seconds % DAY == 0 {
        format!("{}d", seconds / DAY)
    } else {
        format!("{}s", seconds)
    }
}
