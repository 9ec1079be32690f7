//! List and show commands - inspect stored review requests

use chrono::Utc;
use clap::Args;
use herald_core::{Config, RequestId, RequestRepository, ReviewRequest};

use super::open_repository;

/// List recent review requests
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Maximum number of requests to show
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,

    /// Only show requests that are still open
    #[arg(long)]
    pub open: bool,
}

impl ListArgs {
    /// Execute the list command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let repo = open_repository(config).await?;
        let requests: Vec<ReviewRequest> = repo
            .find_recent(self.limit)
            .await?
            .into_iter()
            .filter(|r| !self.open || !r.status.is_closed())
            .collect();

        if requests.is_empty() {
            println!("No review requests.");
            return Ok(());
        }

        let now = Utc::now();
        for request in &requests {
            println!("{}", summary_line(request, now));
        }

        Ok(())
    }
}

/// Show one review request
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Request id
    pub id: i64,
}

impl ShowArgs {
    /// Execute the show command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let repo = open_repository(config).await?;
        let Some(request) = repo.find_by_id(RequestId(self.id)).await? else {
            anyhow::bail!("Review request {} not found", self.id);
        };

        let now = Utc::now();
        println!("#{} {}", request.id, request.title);
        println!();
        println!("  Project:   {}", request.project);
        println!("  Type:      {}", request.kind.label());
        println!("  Priority:  {}", request.priority.label());
        println!("  Status:    {}", request.status.label());
        println!("  Link:      {}", request.link);
        println!("  Ticket:    {}", request.ticket_link);
        println!("  Author:    @{}", request.author.handle());
        println!("  Merger:    @{}", request.merger.handle());
        println!("  Reviewers:");
        for reviewer in &request.reviewers {
            println!(
                "    @{} {}",
                reviewer.user.handle(),
                reviewer.status.label()
            );
        }
        println!("  Reminders: {}", request.reminder_count);
        println!(
            "  Created:   {} ({} ago)",
            request.created_at.format("%Y-%m-%d %H:%M UTC"),
            format_duration((now - request.created_at).num_seconds())
        );
        match request.message.as_ref().and_then(|m| m.permalink.as_deref()) {
            Some(permalink) => println!("  Message:   {}", permalink),
            None if request.message.is_some() => println!("  Message:   posted"),
            None => println!("  Message:   not posted"),
        }

        Ok(())
    }
}

fn summary_line(request: &ReviewRequest, now: chrono::DateTime<Utc>) -> String {
    format!(
        "#{:<5} {:<18} {:<10} {:<8} {:>7}  {}",
        request.id.to_string(),
        request.status.label(),
        truncate(&request.project, 10),
        request.priority.label(),
        format_duration((now - request.created_at).num_seconds()),
        request.title
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

/// Format a duration in seconds to human-readable form
fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m", seconds / 60)
    } else if seconds < 86400 {
        let hours = seconds / 3600;
        let mins = (seconds % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    } else {
        let days = seconds / 86400;
        let hours = (seconds % 86400) / 3600;
        if hours > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{}d", days)
        }
    }
}
