//! Process-wide plugin settings

use serde::{Deserialize, Serialize};

/// Where grace-period entries are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraceContext {
    /// One map shared by the whole site
    #[default]
    Site,
    /// One map per visited post
    Post,
}

impl GraceContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraceContext::Site => "site",
            GraceContext::Post => "post",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "site" => Some(GraceContext::Site),
            "post" => Some(GraceContext::Post),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub enable_notifications: bool,
    pub enable_logged_in_users: bool,
    pub disable_crawlers: bool,
    pub ip_grace_period: bool,
    /// `None` when the stored context was not recognised; the grace period
    /// check is then skipped.
    pub ip_grace_period_context: Option<GraceContext>,
    /// Seconds
    pub ip_grace_period_duration: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_notifications: true,
            enable_logged_in_users: true,
            disable_crawlers: true,
            ip_grace_period: false,
            ip_grace_period_context: Some(GraceContext::Site),
            ip_grace_period_duration: 60 * 5,
        }
    }
}
