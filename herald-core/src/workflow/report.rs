//! Weekly report
//!
//! Requests created in the last seven days are bucketed into groups through a
//! project-to-group map. One summary message is published, with one threaded
//! reply per group.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, Utc};
use tracing::{info, warn};

use super::ReviewDesk;
use crate::config::{normalize_project, Config};
use crate::gateway::MessageContent;
use crate::request::{ReviewRequest, ReviewStatus};
use crate::Result;

/// Length of the report window
pub const REPORT_WINDOW_DAYS: i64 = 7;

/// Statuses counted as pending in the summary
pub const PENDING_STATUSES: [ReviewStatus; 5] = [
    ReviewStatus::Pending,
    ReviewStatus::Reviewing,
    ReviewStatus::Commented,
    ReviewStatus::Approved,
    ReviewStatus::OnHold,
];

/// Report settings resolved from configuration
#[derive(Debug, Clone, Default)]
pub struct ReportSettings {
    pub enabled: bool,
    pub channel: Option<String>,
    /// Allow-list applied when fetching; empty means every project
    pub projects: Vec<String>,
    pub group_order: Vec<String>,
    /// Group name to the projects it covers
    pub groups: BTreeMap<String, Vec<String>>,
}

impl ReportSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.report.enabled,
            channel: config.report_channel().map(str::to_string),
            projects: config.report.projects.clone(),
            group_order: config
                .report
                .group_order
                .iter()
                .map(|g| normalize_project(g))
                .filter(|g| !g.is_empty())
                .collect(),
            groups: config.report.groups.clone(),
        }
    }

    /// Normalized project name to normalized group name
    pub fn project_groups(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for (group, projects) in &self.groups {
            let group = normalize_project(group);
            for project in projects {
                map.entry(normalize_project(project))
                    .or_insert_with(|| group.clone());
            }
        }
        map
    }
}

/// Inclusive time window covered by a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    /// The seven days ending at `now`
    pub fn ending_at(now: DateTime<Utc>) -> Self {
        Self {
            start: now - Duration::days(REPORT_WINDOW_DAYS),
            end: now,
        }
    }

    /// e.g. `Mar 1st → Mar 8th`
    pub fn label(&self) -> String {
        format!("{} → {}", day_label(self.start), day_label(self.end))
    }
}

fn day_label(date: DateTime<Utc>) -> String {
    let day = date.day();
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{} {}{}", date.format("%b"), day, suffix)
}

/// Headline counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSummary {
    pub window: String,
    pub pending: usize,
    pub merged: usize,
    pub total: usize,
}

impl ReportSummary {
    pub fn text(&self) -> String {
        format!(
            "*Weekly Pull Requests Report*  :bookmark_tabs:\n{}\n\n:hourglass_flowing_sand:  Pending: *{}*\n\n:rocket:  Merged: *{}*\n\n:1234:  Total: *{}*",
            self.window, self.pending, self.merged, self.total
        )
    }
}

/// One request line in a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub title: String,
    pub done: bool,
}

/// A group section of the report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportGroup {
    pub key: String,
    pub label: String,
    pub lines: Vec<ReportLine>,
}

impl ReportGroup {
    pub fn text(&self) -> String {
        let body = if self.lines.is_empty() {
            "_No updates for this period._ :zzz:".to_string()
        } else {
            self.lines
                .iter()
                .map(|line| {
                    let status = if line.done { "Done" } else { "In Progress" };
                    format!("• {} → _{}_", line.title, status)
                })
                .collect::<Vec<_>>()
                .join("\n")
        };
        // zero-width space keeps the trailing gap between threaded replies
        format!("*{} Team*\n\n{}\n\n\u{200B}", self.label, body)
    }
}

/// Everything a weekly report publishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDigest {
    pub window: ReportWindow,
    pub summary: ReportSummary,
    pub groups: Vec<ReportGroup>,
    /// Requests returned by the store
    pub fetched: usize,
    /// Requests whose project maps to no group
    pub ignored: usize,
}

fn group_label(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Bucket requests into groups and count them
pub fn build_digest(
    requests: &[ReviewRequest],
    window: ReportWindow,
    settings: &ReportSettings,
) -> ReportDigest {
    let project_groups = settings.project_groups();

    let mut grouped: HashMap<String, Vec<&ReviewRequest>> = HashMap::new();
    let mut extra_order: Vec<String> = Vec::new();
    let mut included: Vec<&ReviewRequest> = Vec::new();

    for request in requests {
        let Some(group) = project_groups.get(&normalize_project(&request.project)) else {
            continue;
        };
        if !grouped.contains_key(group)
            && !settings.group_order.contains(group)
            && !extra_order.contains(group)
        {
            extra_order.push(group.clone());
        }
        grouped.entry(group.clone()).or_default().push(request);
        included.push(request);
    }

    let groups = settings
        .group_order
        .iter()
        .chain(extra_order.iter())
        .map(|key| ReportGroup {
            key: key.clone(),
            label: group_label(key),
            lines: grouped
                .get(key)
                .map(|requests| {
                    requests
                        .iter()
                        .map(|r| ReportLine {
                            title: r.display_title(),
                            done: r.status == ReviewStatus::Merged,
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect();

    let summary = ReportSummary {
        window: window.label(),
        pending: included
            .iter()
            .filter(|r| PENDING_STATUSES.contains(&r.status))
            .count(),
        merged: included
            .iter()
            .filter(|r| r.status == ReviewStatus::Merged)
            .count(),
        total: included.len(),
    };

    ReportDigest {
        window,
        summary,
        groups,
        fetched: requests.len(),
        ignored: requests.len() - included.len(),
    }
}

impl ReviewDesk {
    /// Publish the weekly report; returns `None` when reporting is off
    pub async fn run_weekly_report(
        &self,
        settings: &ReportSettings,
        now: DateTime<Utc>,
    ) -> Result<Option<ReportDigest>> {
        if !settings.enabled {
            info!("Weekly report disabled");
            return Ok(None);
        }

        let Some(channel) = settings.channel.as_deref() else {
            warn!("Weekly report skipped: no report channel configured");
            return Ok(None);
        };

        let window = ReportWindow::ending_at(now);
        let requests = self
            .repository()
            .find_created_between(window.start, window.end, &settings.projects)
            .await?;

        let digest = build_digest(&requests, window, settings);

        let summary = self
            .gateway()
            .publish(
                channel,
                &MessageContent::ReportSummary(digest.summary.clone()),
                None,
            )
            .await?;

        for group in &digest.groups {
            if let Err(e) = self
                .gateway()
                .publish(
                    channel,
                    &MessageContent::ReportGroup(group.clone()),
                    Some(&summary.handle),
                )
                .await
            {
                warn!(group = %group.key, error = %e, "Failed to publish report group");
            }
        }

        if digest.ignored > 0 {
            warn!(
                ignored = digest.ignored,
                "Weekly report ignored pull request(s) with no project group mapping"
            );
        }

        info!(
            total = digest.summary.total,
            merged = digest.summary.merged,
            pending = digest.summary.pending,
            fetched = digest.fetched,
            "Weekly report published"
        );

        Ok(Some(digest))
    }
}
