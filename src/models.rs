use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

// ============ Domain Models ============

/// Lifecycle status of a lead.
///
/// The conventional progression is `new → contacted → converted`; whether
/// updates must follow it is decided by [`TransitionPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    New,
    Contacted,
    Converted,
}

impl LeadStatus {
    /// Every accepted status, in lifecycle order.
    pub const ALL: [LeadStatus; 3] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Converted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Converted => "converted",
        }
    }

    /// Comma-separated list of accepted values, used in validation messages.
    pub fn allowed_values() -> String {
        Self::ALL
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Position in the lifecycle (`new` = 0).
    fn rank(&self) -> u8 {
        match self {
            LeadStatus::New => 0,
            LeadStatus::Contacted => 1,
            LeadStatus::Converted => 2,
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of the accepted statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError(pub String);

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid lead status '{}' (allowed: {})",
            self.0,
            LeadStatus::allowed_values()
        )
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for LeadStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "new" => Ok(LeadStatus::New),
            "contacted" => Ok(LeadStatus::Contacted),
            "converted" => Ok(LeadStatus::Converted),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Which status changes the update operation accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Any status may move to any other, including backwards.
    #[default]
    Any,
    /// A status may stay the same or move later in the lifecycle.
    Linear,
}

impl TransitionPolicy {
    pub fn allows(&self, from: LeadStatus, to: LeadStatus) -> bool {
        match self {
            TransitionPolicy::Any => true,
            TransitionPolicy::Linear => to.rank() >= from.rank(),
        }
    }
}

impl FromStr for TransitionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(TransitionPolicy::Any),
            "linear" => Ok(TransitionPolicy::Linear),
            other => Err(format!(
                "unknown transition policy '{}' (expected 'any' or 'linear')",
                other
            )),
        }
    }
}

/// A prospective-student contact captured from a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    /// Unique identifier, `LEAD_<YYYYMMDD>_<seq>`.
    pub id: String,
    /// Session the lead was captured in (soft reference).
    pub session_id: String,
    /// Contact name.
    pub name: String,
    /// Program/major the contact is interested in.
    pub major: String,
    /// Phone number as entered.
    pub phone: String,
    /// Phone number in E.164 form (or digits only when it does not validate).
    #[serde(default)]
    pub phone_normalized: String,
    /// Acquisition channel (e.g. "Zalo", "Phone call", "Email").
    pub channel: String,
    /// Preferred contact timeslot, free text.
    #[serde(default)]
    pub timeslot: String,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    /// Checks the `LEAD_<YYYYMMDD>_<seq>` identifier format.
    pub fn is_well_formed_id(id: &str) -> bool {
        static LEAD_ID: OnceLock<Regex> = OnceLock::new();
        LEAD_ID
            .get_or_init(|| Regex::new(r"^LEAD_\d{8}_\d+$").expect("static lead id regex"))
            .is_match(id)
    }
}

/// A single conversational interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

// ============ API Request/Response Models ============

/// Raw query string of `GET /leads`.
///
/// Every field is kept as a string so malformed values surface as
/// validation errors in the standard envelope instead of extractor rejections.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadQueryParams {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub status: Option<String>,
    pub limit: Option<String>,
    pub page: Option<String>,
    pub export: Option<String>,
}

/// Body of `PUT /leads/{id}/status`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
}

/// Success envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: Some(message.into()),
        }
    }
}

/// Session-level figures of the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStats {
    pub total: usize,
    pub completed: usize,
    /// Percentage of completed sessions, two decimals.
    pub completion_rate: f64,
    pub today: usize,
    pub this_week: usize,
}

/// Lead-level figures of the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadStats {
    pub total: usize,
    pub today: usize,
    pub this_week: usize,
    /// Only statuses that occur in the collection are present.
    pub status_breakdown: BTreeMap<LeadStatus, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MajorCount {
    pub name: String,
    pub count: usize,
}

/// Payload of `GET /stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub conversations: ConversationStats,
    pub leads: LeadStats,
    /// Sorted by count descending; ties keep first-seen order.
    pub popular_majors: Vec<MajorCount>,
    pub channel_preferences: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// Paginated payload of `GET /leads`.
#[derive(Debug, Serialize)]
pub struct LeadPage {
    pub leads: Vec<Lead>,
    pub pagination: Pagination,
}

/// Filters echoed back in an export.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFilters {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub status: Option<LeadStatus>,
}

/// Unpaginated payload of `GET /leads?export=json`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadExport {
    pub exported_at: DateTime<Utc>,
    pub filters: AppliedFilters,
    pub total_leads: usize,
    pub leads: Vec<Lead>,
}

/// Payload of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
