//! Visit request context and the record kept for each allowed visit

use serde::{Deserialize, Serialize};

use super::target::TargetId;

/// What kind of page the request rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    Singular,
    Archive,
    Other,
}

/// Everything the gate needs to know about one page view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitContext {
    /// Resolved target; `None` when the host could not resolve the object
    #[serde(default)]
    pub target: Option<TargetId>,
    #[serde(default)]
    pub is_admin_context: bool,
    pub page_kind: PageKind,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default)]
    pub is_logged_in: bool,
    #[serde(default)]
    pub raw_ip: Option<String>,
}

impl VisitContext {
    /// A plain anonymous view of a singular page
    pub fn singular(target: TargetId) -> Self {
        Self {
            target: Some(target),
            is_admin_context: false,
            page_kind: PageKind::Singular,
            user_agent: None,
            referer: None,
            is_logged_in: false,
            raw_ip: None,
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.raw_ip = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// One recorded visit. Field names match the persisted visitor list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitRecord {
    /// Unix timestamp of the visit
    #[serde(rename = "time")]
    pub timestamp: i64,
    pub user_agent: String,
    pub referer: String,
    #[serde(rename = "ip_addr", default, skip_serializing_if = "Option::is_none")]
    pub anonymized_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}
