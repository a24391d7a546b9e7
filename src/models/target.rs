//! Targets (posts and taxonomy terms) and their notification configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of object being visited
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Post,
    Term,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Post => "post",
            TargetKind::Term => "term",
        }
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "post" => Ok(TargetKind::Post),
            "term" | "tax" | "taxonomy" => Ok(TargetKind::Term),
            other => Err(format!("unknown target kind '{other}'")),
        }
    }
}

/// Discriminated identifier of a post or term
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetId {
    pub kind: TargetKind,
    pub id: u64,
}

impl TargetId {
    /// Largest id any store can hold (SQLite integers are signed)
    pub const MAX_ID: u64 = i64::MAX as u64;

    pub fn post(id: u64) -> Self {
        Self {
            kind: TargetKind::Post,
            id,
        }
    }

    pub fn term(id: u64) -> Self {
        Self {
            kind: TargetKind::Term,
            id,
        }
    }

    /// Key used for locks and storage rows, e.g. `post:12`
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.id)
    }

    /// Only posts own their own grace-period map.
    pub fn supports_target_scope(&self) -> bool {
        self.kind == TargetKind::Post
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.kind.as_str(), self.id)
    }
}

impl FromStr for TargetId {
    type Err = String;

    /// Parses `post:12` or `term:7`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <kind>:<id>, got '{s}'"))?;
        let kind = kind.parse::<TargetKind>()?;
        let id = id
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid target id '{id}': {e}"))?;
        if id > Self::MAX_ID {
            return Err(format!("target id {id} is out of range"));
        }
        Ok(Self { kind, id })
    }
}

/// When notifications for a target are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Schedule {
    #[default]
    #[serde(rename = "visit")]
    OnVisit,
    #[serde(rename = "hourly")]
    Hourly,
    #[serde(rename = "daily")]
    Daily,
}

impl Schedule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Schedule::OnVisit => "visit",
            Schedule::Hourly => "hourly",
            Schedule::Daily => "daily",
        }
    }

    /// Strict parse of a stored value; `None` for anything outside the set
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "visit" | "on_visit" => Some(Schedule::OnVisit),
            "hourly" => Some(Schedule::Hourly),
            "daily" => Some(Schedule::Daily),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Schedule::OnVisit => "Visit",
            Schedule::Hourly => "Hourly",
            Schedule::Daily => "Daily",
        }
    }

    /// The batching frequency, if this schedule batches at all
    pub fn frequency(&self) -> Option<Frequency> {
        match self {
            Schedule::OnVisit => None,
            Schedule::Hourly => Some(Frequency::Hourly),
            Schedule::Daily => Some(Frequency::Daily),
        }
    }
}

/// Cadence of a scheduler tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Hourly,
    Daily,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
        }
    }

    pub fn schedule(&self) -> Schedule {
        match self {
            Frequency::Hourly => Schedule::Hourly,
            Frequency::Daily => Schedule::Daily,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" => Ok(Frequency::Hourly),
            "daily" => Ok(Frequency::Daily),
            other => Err(format!("unknown frequency '{other}', expected hourly or daily")),
        }
    }
}

/// Per-target override of the global logged-in users setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggedInOverride {
    #[default]
    Global,
    On,
    Off,
}

impl LoggedInOverride {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoggedInOverride::Global => "global",
            LoggedInOverride::On => "on",
            LoggedInOverride::Off => "off",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "global" => Some(LoggedInOverride::Global),
            "on" => Some(LoggedInOverride::On),
            "off" => Some(LoggedInOverride::Off),
            _ => None,
        }
    }

    /// Effective policy given the global `enable_logged_in_users` setting
    pub fn resolve(&self, global: bool) -> bool {
        match self {
            LoggedInOverride::On => true,
            LoggedInOverride::Off => false,
            LoggedInOverride::Global => global,
        }
    }
}

/// Notification configuration owned by a target
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    pub enabled: bool,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub logged_in: LoggedInOverride,
    /// Human readable name used in notification subjects
    #[serde(default)]
    pub title: Option<String>,
}

impl TargetConfig {
    /// Label shown in listings, e.g. `Enabled (Hourly)`
    pub fn status_label(&self) -> String {
        if self.enabled {
            format!("Enabled ({})", self.schedule.label())
        } else {
            "Disabled".to_string()
        }
    }
}

/// Bulk edits applied to many targets at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BulkAction {
    EnableVisit,
    EnableHourly,
    Disable,
}

impl BulkAction {
    /// Disabling keeps the previous schedule so re-enabling restores it.
    pub fn apply(&self, config: &mut TargetConfig) {
        match self {
            BulkAction::EnableVisit => {
                config.enabled = true;
                config.schedule = Schedule::OnVisit;
            }
            BulkAction::EnableHourly => {
                config.enabled = true;
                config.schedule = Schedule::Hourly;
            }
            BulkAction::Disable => config.enabled = false,
        }
    }
}
