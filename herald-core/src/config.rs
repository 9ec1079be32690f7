//! Configuration management for Herald
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (HERALD_*)
//! 3. Config file (~/.config/herald/config.toml)
//! 4. Default values

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default group order for the weekly report
pub const DEFAULT_GROUP_ORDER: [&str; 3] = ["frontend", "mobile", "backend"];

/// Slack workspace configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SlackConfig {
    /// Channel review requests are published to
    pub channel: Option<String>,
}

/// Reminder sweep configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// How far back a request stays in the reminder rotation
    #[serde(with = "humantime_serde")]
    pub lookback: Duration,

    /// User tagged once a request has been reminded too often
    pub escalation_contact: Option<String>,

    /// When the sweep runs (e.g. `mon-fri 11:00,16:30`)
    pub schedule: String,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::from_secs(7 * 24 * 60 * 60),
            escalation_contact: None,
            schedule: "mon-fri 11:00,16:30".to_string(),
        }
    }
}

/// Weekly report configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    pub enabled: bool,

    /// Channel the report goes to; falls back to the review channel
    pub channel: Option<String>,

    /// Only these projects are fetched when non-empty
    pub projects: Vec<String>,

    /// Base order of groups in the report
    pub group_order: Vec<String>,

    /// Group name to the projects it covers
    pub groups: BTreeMap<String, Vec<String>>,

    /// When the report runs (e.g. `thu 15:00`)
    pub schedule: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel: None,
            projects: Vec::new(),
            group_order: DEFAULT_GROUP_ORDER.iter().map(|g| g.to_string()).collect(),
            groups: BTreeMap::new(),
            schedule: "thu 15:00".to_string(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; defaults to `~/.cache/herald/herald.db`
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    /// Resolve the database path, falling back to the cache directory
    pub fn resolved_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        dirs::cache_dir()
            .map(|p| p.join("herald").join("herald.db"))
            .ok_or_else(|| Error::Config("Could not determine cache directory".to_string()))
    }
}

/// Webhook server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub slack: SlackConfig,
    pub reminders: ReminderConfig,
    pub report: ReportConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if let Some(path) = config_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/herald/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("herald").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - HERALD_CHANNEL: review channel id
    /// - HERALD_ESCALATION_CONTACT: user tagged on escalated reminders
    /// - HERALD_REMINDER_SCHEDULE / HERALD_REPORT_SCHEDULE
    /// - HERALD_REPORT_ENABLED: truthy flag (1, true, yes, y, on)
    /// - HERALD_REPORT_CHANNEL: report channel id
    /// - HERALD_REPORT_PROJECTS: comma-separated allow-list
    /// - HERALD_REPORT_GROUPS: `group:proj|proj;group:proj`
    /// - HERALD_REPORT_GROUP_ORDER: comma-separated group names
    /// - HERALD_DATABASE: SQLite file path
    /// - HERALD_PORT: webhook port
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn with_overrides_from<F>(mut self, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(channel) = var("HERALD_CHANNEL") {
            self.slack.channel = Some(channel.trim().to_string());
        }
        if let Some(contact) = var("HERALD_ESCALATION_CONTACT") {
            self.reminders.escalation_contact = Some(contact.trim().to_string());
        }
        if let Some(schedule) = var("HERALD_REMINDER_SCHEDULE") {
            self.reminders.schedule = schedule;
        }
        if let Some(enabled) = var("HERALD_REPORT_ENABLED") {
            self.report.enabled = is_truthy(&enabled);
        }
        if let Some(channel) = var("HERALD_REPORT_CHANNEL") {
            self.report.channel = Some(channel.trim().to_string());
        }
        if let Some(projects) = var("HERALD_REPORT_PROJECTS") {
            self.report.projects = split_list(&projects, ',');
        }
        if let Some(groups) = var("HERALD_REPORT_GROUPS") {
            self.report.groups = parse_project_groups(&groups);
        }
        if let Some(order) = var("HERALD_REPORT_GROUP_ORDER") {
            self.report.group_order = split_list(&order, ',');
        }
        if let Some(schedule) = var("HERALD_REPORT_SCHEDULE") {
            self.report.schedule = schedule;
        }
        if let Some(path) = var("HERALD_DATABASE") {
            self.database.path = Some(PathBuf::from(path));
        }
        if let Some(port) = var("HERALD_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("Invalid HERALD_PORT: {}", port)))?;
        }

        Ok(self)
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(
        mut self,
        channel: Option<String>,
        database: Option<PathBuf>,
        port: Option<u16>,
    ) -> Self {
        if let Some(channel) = channel {
            self.slack.channel = Some(channel);
        }

        if let Some(path) = database {
            self.database.path = Some(path);
        }

        if let Some(port) = port {
            self.server.port = port;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(
        channel: Option<String>,
        database: Option<PathBuf>,
        port: Option<u16>,
    ) -> Result<Self> {
        let config = Self::load()?
            .with_env_overrides()?
            .with_cli_overrides(channel, database, port);
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot be applied unambiguously
    ///
    /// A project may belong to only one report group.
    pub fn validate(&self) -> Result<()> {
        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        for (group, projects) in &self.report.groups {
            let group = normalize_project(group);
            for project in projects {
                let project = normalize_project(project);
                match owners.get(&project) {
                    Some(owner) if *owner != group => {
                        return Err(Error::Config(format!(
                            "Project '{}' is mapped to both report groups '{}' and '{}'",
                            project, owner, group
                        )));
                    }
                    Some(_) => {}
                    None => {
                        owners.insert(project, group.clone());
                    }
                }
            }
        }
        Ok(())
    }

    /// Channel the weekly report is published to
    pub fn report_channel(&self) -> Option<&str> {
        self.report
            .channel
            .as_deref()
            .or(self.slack.channel.as_deref())
    }
}

/// Interpret a flag value the way shell users write it
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

/// Normalize a project name for group lookups
pub fn normalize_project(project: &str) -> String {
    project.trim().to_lowercase()
}

fn split_list(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse the compact `group:proj|proj;group:proj` form
///
/// Names are trimmed and lower-cased; malformed entries are skipped.
pub fn parse_project_groups(value: &str) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for entry in value.split(';') {
        let Some((group, projects)) = entry.split_once(':') else {
            continue;
        };
        let group = normalize_project(group);
        if group.is_empty() {
            continue;
        }
        let projects: Vec<String> = projects
            .split('|')
            .map(normalize_project)
            .filter(|p| !p.is_empty())
            .collect();
        if projects.is_empty() {
            continue;
        }
        groups.entry(group).or_default().extend(projects);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.slack.channel.is_none());
        assert_eq!(config.reminders.lookback, Duration::from_secs(604_800));
        assert_eq!(config.reminders.schedule, "mon-fri 11:00,16:30");
        assert!(!config.report.enabled);
        assert_eq!(config.report.group_order, vec!["frontend", "mobile", "backend"]);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default().with_cli_overrides(
            Some("C123".to_string()),
            Some(PathBuf::from("/tmp/h.db")),
            Some(8080),
        );

        assert_eq!(config.slack.channel.as_deref(), Some("C123"));
        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/h.db")));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[slack]
channel = "C0REVIEWS"

[reminders]
lookback = "3days"
escalation_contact = "U0SCRUM"

[report]
enabled = true
projects = ["web", "api"]

[report.groups]
frontend = ["web"]
backend = ["api", "worker"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.slack.channel.as_deref(), Some("C0REVIEWS"));
        assert_eq!(config.reminders.lookback, Duration::from_secs(3 * 86_400));
        assert_eq!(config.reminders.escalation_contact.as_deref(), Some("U0SCRUM"));
        assert!(config.report.enabled);
        assert_eq!(config.report.groups["backend"], vec!["api", "worker"]);
        // untouched sections keep defaults
        assert_eq!(config.report.schedule, "thu 15:00");
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("HERALD_CHANNEL", " C1 "),
            ("HERALD_REPORT_ENABLED", "Yes"),
            ("HERALD_REPORT_PROJECTS", "web, api,,"),
            ("HERALD_REPORT_GROUPS", "Frontend: Web | Admin ;backend:api"),
            ("HERALD_PORT", "4000"),
        ]
        .into_iter()
        .collect();

        let config = Config::default()
            .with_overrides_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.slack.channel.as_deref(), Some("C1"));
        assert!(config.report.enabled);
        assert_eq!(config.report.projects, vec!["web", "api"]);
        assert_eq!(config.report.groups["frontend"], vec!["web", "admin"]);
        assert_eq!(config.report.groups["backend"], vec!["api"]);
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    fn test_invalid_port_rejected() {
        let result = Config::default().with_overrides_from(|k| {
            (k == "HERALD_PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_truthy_values() {
        for value in ["1", "true", "YES", "y", " on "] {
            assert!(is_truthy(value), "{value}");
        }
        for value in ["0", "false", "no", "off", ""] {
            assert!(!is_truthy(value), "{value}");
        }
    }

    #[test]
    fn test_parse_project_groups_skips_malformed() {
        let groups = parse_project_groups("mobile:ios|android;garbage;:web;qa:");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups["mobile"], vec!["ios", "android"]);
    }

    #[test]
    fn test_project_in_two_groups_is_rejected() {
        let vars: HashMap<&str, &str> =
            HashMap::from([("HERALD_REPORT_GROUPS", "frontend:web|shared;backend:api|Shared ")]);
        let config = Config::default()
            .with_overrides_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'shared'"));
    }

    #[test]
    fn test_repeated_project_in_one_group_is_accepted() {
        let mut config = Config::default();
        config.report.groups.insert(
            "frontend".to_string(),
            vec!["web".to_string(), "Web".to_string()],
        );
        config
            .report
            .groups
            .insert("backend".to_string(), vec!["api".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_report_channel_falls_back() {
        let mut config = Config::default();
        config.slack.channel = Some("C1".to_string());
        assert_eq!(config.report_channel(), Some("C1"));

        config.report.channel = Some("C2".to_string());
        assert_eq!(config.report_channel(), Some("C2"));
    }
}
