//! Pure lead-directory logic: filtering, ordering, pagination and dashboard
//! aggregation.
//!
//! Every function takes immutable inputs and returns new values, so handlers
//! and repositories stay free of business rules and the rules themselves can
//! be tested without an HTTP harness.

use crate::errors::AppError;
use crate::models::{
    AppliedFilters, ConversationStats, DashboardStats, Lead, LeadQueryParams, LeadStats,
    LeadStatus, MajorCount, Pagination, Session,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 100;

/// Inclusive creation-time window. An absent bound is unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Window from the start of `from` through 23:59:59 of `to` (UTC days).
    pub fn from_days(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        Self {
            from: from.map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN))),
            to: to.map(|d| Utc.from_utc_datetime(&d.and_time(end_of_day))),
        }
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| *ts >= from) && self.to.map_or(true, |to| *ts <= to)
    }
}

/// Filters applied to a lead listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadFilter {
    pub range: DateRange,
    pub status: Option<LeadStatus>,
}

/// Page number (1-based) and page size, already clamped to valid values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Clamps `page` to at least 1 and `limit` to `1..=MAX_PAGE_SIZE`.
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.unwrap_or(1).max(1) as usize;
        let limit = limit
            .unwrap_or(DEFAULT_PAGE_SIZE as i64)
            .clamp(1, MAX_PAGE_SIZE as i64) as usize;
        Self { page, limit }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// Parsed form of the `GET /leads` query string.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadQuery {
    pub filter: LeadFilter,
    pub page: PageRequest,
    pub export: bool,
    /// Filters as the caller supplied them, echoed back in exports.
    pub applied: AppliedFilters,
}

impl LeadQuery {
    pub fn parse(params: &LeadQueryParams) -> Result<Self, AppError> {
        let date_from = non_empty(&params.date_from);
        let date_to = non_empty(&params.date_to);

        let from_day = date_from.map(parse_day).transpose()?;
        let to_day = date_to.map(parse_day).transpose()?;

        let status = non_empty(&params.status)
            .map(|raw| {
                raw.parse::<LeadStatus>().map_err(|_| {
                    AppError::Validation(format!(
                        "Trạng thái không hợp lệ. Các giá trị hợp lệ: {}",
                        LeadStatus::allowed_values()
                    ))
                })
            })
            .transpose()?;

        let page = non_empty(&params.page)
            .map(|raw| parse_integer("page", raw))
            .transpose()?;
        let limit = non_empty(&params.limit)
            .map(|raw| parse_integer("limit", raw))
            .transpose()?;

        let export = non_empty(&params.export)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "json" | "true"))
            .unwrap_or(false);

        Ok(Self {
            filter: LeadFilter {
                range: DateRange::from_days(from_day, to_day),
                status,
            },
            page: PageRequest::new(page, limit),
            export,
            applied: AppliedFilters {
                date_from: date_from.map(str::to_string),
                date_to: date_to.map(str::to_string),
                status,
            },
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Parses `YYYY-MM-DD`, or an RFC 3339 timestamp reduced to its UTC date.
pub fn parse_day(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc).date_naive()))
        .map_err(|_| {
            AppError::Validation(format!(
                "Ngày không hợp lệ: '{}' (định dạng YYYY-MM-DD)",
                raw
            ))
        })
}

fn parse_integer(name: &str, raw: &str) -> Result<i64, AppError> {
    raw.parse::<i64>()
        .map_err(|_| AppError::Validation(format!("Tham số '{}' phải là số nguyên", name)))
}

/// Leads created inside `range`, in input order.
pub fn filter_by_date(leads: &[Lead], range: &DateRange) -> Vec<Lead> {
    leads
        .iter()
        .filter(|lead| range.contains(&lead.created_at))
        .cloned()
        .collect()
}

/// Leads with the given status; `None` keeps every lead.
pub fn filter_by_status(leads: &[Lead], status: Option<LeadStatus>) -> Vec<Lead> {
    match status {
        Some(status) => leads
            .iter()
            .filter(|lead| lead.status == status)
            .cloned()
            .collect(),
        None => leads.to_vec(),
    }
}

/// Most recent first. Equal timestamps keep their input order.
pub fn sort_recent_first(mut leads: Vec<Lead>) -> Vec<Lead> {
    leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    leads
}

/// Date filter, then status filter, then newest-first ordering.
pub fn apply_filter(leads: &[Lead], filter: &LeadFilter) -> Vec<Lead> {
    let in_range = filter_by_date(leads, &filter.range);
    sort_recent_first(filter_by_status(&in_range, filter.status))
}

/// Slice of `leads` for `request`, plus the totals describing every page.
pub fn paginate(leads: &[Lead], request: PageRequest) -> (Vec<Lead>, Pagination) {
    let total = leads.len();
    let items = leads
        .iter()
        .skip(request.offset())
        .take(request.limit)
        .cloned()
        .collect();

    let pagination = Pagination {
        page: request.page,
        limit: request.limit,
        total,
        total_pages: total.div_ceil(request.limit),
    };

    (items, pagination)
}

/// Completed sessions as a percentage of all sessions, rounded to two
/// decimals. Zero when there are no sessions.
pub fn completion_rate(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(completed as f64 / total as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Builds the dashboard figures as seen at `now`.
///
/// "Today" is the calendar day of `now` in its own time zone, half-open
/// `[midnight, next midnight)`. "This week" is everything created at or after
/// `now - 7 days`.
pub fn compute_stats<Tz: TimeZone>(
    leads: &[Lead],
    sessions: &[Session],
    now: &DateTime<Tz>,
) -> DashboardStats {
    let now_utc = now.with_timezone(&Utc);
    let today_start = local_midnight(now);
    let today_end = today_start + Duration::days(1);
    let week_ago = now_utc - Duration::days(7);

    let is_today = |ts: &DateTime<Utc>| *ts >= today_start && *ts < today_end;
    let in_week = |ts: &DateTime<Utc>| *ts >= week_ago;

    let completed = sessions.iter().filter(|s| s.completed).count();

    let conversations = ConversationStats {
        total: sessions.len(),
        completed,
        completion_rate: completion_rate(completed, sessions.len()),
        today: sessions.iter().filter(|s| is_today(&s.created_at)).count(),
        this_week: sessions.iter().filter(|s| in_week(&s.created_at)).count(),
    };

    let mut status_breakdown = BTreeMap::new();
    for lead in leads {
        *status_breakdown.entry(lead.status).or_insert(0) += 1;
    }

    let lead_stats = LeadStats {
        total: leads.len(),
        today: leads.iter().filter(|l| is_today(&l.created_at)).count(),
        this_week: leads.iter().filter(|l| in_week(&l.created_at)).count(),
        status_breakdown,
    };

    let mut channel_preferences = BTreeMap::new();
    for lead in leads {
        *channel_preferences.entry(lead.channel.clone()).or_insert(0) += 1;
    }

    DashboardStats {
        conversations,
        leads: lead_stats,
        popular_majors: popular_majors(leads),
        channel_preferences,
    }
}

/// Count per major, most popular first. Ties keep first-seen order.
pub fn popular_majors(leads: &[Lead]) -> Vec<MajorCount> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<MajorCount> = Vec::new();

    for lead in leads {
        match index.get(lead.major.as_str()) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(lead.major.as_str(), counts.len());
                counts.push(MajorCount {
                    name: lead.major.clone(),
                    count: 1,
                });
            }
        }
    }

    // sort_by is stable
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

fn local_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    match now.timezone().from_local_datetime(&midnight).earliest() {
        Some(ts) => ts.with_timezone(&Utc),
        // Midnight skipped by a DST change; fall back to the UTC reading.
        None => Utc.from_utc_datetime(&midnight),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn lead(id: &str, major: &str, channel: &str, status: LeadStatus, created: &str) -> Lead {
        Lead {
            id: id.to_string(),
            session_id: format!("session_{}", id),
            name: "Test".to_string(),
            major: major.to_string(),
            phone: "0901234567".to_string(),
            phone_normalized: "+84901234567".to_string(),
            channel: channel.to_string(),
            timeslot: "Buổi sáng".to_string(),
            status,
            created_at: ts(created),
        }
    }

    fn session(id: &str, completed: bool, created: &str) -> Session {
        Session {
            id: id.to_string(),
            completed,
            created_at: ts(created),
        }
    }

    fn five_leads() -> Vec<Lead> {
        vec![
            lead("LEAD_20241014_001", "CNTT", "Zalo", LeadStatus::New, "2024-10-14T09:00:00Z"),
            lead("LEAD_20241014_002", "Kinh tế", "Email", LeadStatus::Contacted, "2024-10-14T15:00:00Z"),
            lead("LEAD_20241015_001", "CNTT", "Zalo", LeadStatus::Converted, "2024-10-15T08:00:00Z"),
            lead("LEAD_20241015_002", "Ngôn ngữ Anh", "Phone call", LeadStatus::New, "2024-10-15T10:00:00Z"),
            lead("LEAD_20241015_003", "CNTT", "Zalo", LeadStatus::Contacted, "2024-10-15T23:59:59Z"),
        ]
    }

    #[test]
    fn test_date_range_includes_end_of_day() {
        let range = DateRange::from_days(
            Some(NaiveDate::from_ymd_opt(2024, 10, 15).unwrap()),
            Some(NaiveDate::from_ymd_opt(2024, 10, 15).unwrap()),
        );
        assert!(range.contains(&ts("2024-10-15T00:00:00Z")));
        assert!(range.contains(&ts("2024-10-15T23:59:59Z")));
        assert!(!range.contains(&ts("2024-10-14T23:59:59Z")));
        assert!(!range.contains(&ts("2024-10-16T00:00:00Z")));
    }

    #[test]
    fn test_filter_by_date_open_ended() {
        let leads = five_leads();
        let range = DateRange::from_days(Some(NaiveDate::from_ymd_opt(2024, 10, 15).unwrap()), None);
        let filtered = filter_by_date(&leads, &range);
        assert_eq!(filtered.len(), 3);
        assert!(filtered.iter().all(|l| l.id.starts_with("LEAD_20241015")));
    }

    #[test]
    fn test_filter_by_status() {
        let leads = five_leads();
        let contacted = filter_by_status(&leads, Some(LeadStatus::Contacted));
        assert_eq!(contacted.len(), 2);
        assert_eq!(filter_by_status(&leads, None), leads);
    }

    #[test]
    fn test_sort_recent_first_is_stable() {
        let mut leads = five_leads();
        leads[0].created_at = ts("2024-10-15T10:00:00Z");
        let sorted = sort_recent_first(leads);
        let ids: Vec<&str> = sorted.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "LEAD_20241015_003",
                "LEAD_20241014_001",
                "LEAD_20241015_002",
                "LEAD_20241015_001",
                "LEAD_20241014_002",
            ]
        );
    }

    #[test]
    fn test_paginate_offsets_and_totals() {
        let leads = sort_recent_first(five_leads());
        let (page, meta) = paginate(&leads, PageRequest::new(Some(2), Some(2)));
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, leads[2].id);
        assert_eq!(meta.total, 5);
        assert_eq!(meta.total_pages, 3);

        let (last, _) = paginate(&leads, PageRequest::new(Some(3), Some(2)));
        assert_eq!(last.len(), 1);

        let (past_end, meta) = paginate(&leads, PageRequest::new(Some(9), Some(2)));
        assert!(past_end.is_empty());
        assert_eq!(meta.total, 5);
    }

    #[test]
    fn test_page_request_clamps() {
        assert_eq!(PageRequest::new(None, None), PageRequest { page: 1, limit: 50 });
        assert_eq!(PageRequest::new(Some(0), Some(500)), PageRequest { page: 1, limit: 100 });
        assert_eq!(PageRequest::new(Some(-3), Some(0)), PageRequest { page: 1, limit: 1 });
    }

    #[test]
    fn test_empty_collection_has_zero_pages() {
        let (items, meta) = paginate(&[], PageRequest::default());
        assert!(items.is_empty());
        assert_eq!(meta.total_pages, 0);
    }

    #[test]
    fn test_completion_rate() {
        assert_eq!(completion_rate(0, 0), 0.0);
        assert_eq!(completion_rate(1, 3), 33.33);
        assert_eq!(completion_rate(2, 3), 66.67);
        assert_eq!(completion_rate(4, 4), 100.0);
    }

    #[test]
    fn test_stats_scenario() {
        let leads = five_leads();
        let sessions = vec![
            session("s1", true, "2024-10-14T09:00:00Z"),
            session("s2", false, "2024-10-15T08:00:00Z"),
            session("s3", true, "2024-10-15T12:00:00Z"),
        ];
        let now = ts("2024-10-15T18:00:00Z");

        let stats = compute_stats(&leads, &sessions, &now);

        assert_eq!(stats.conversations.total, 3);
        assert_eq!(stats.conversations.completed, 2);
        assert_eq!(stats.conversations.completion_rate, 66.67);
        assert_eq!(stats.conversations.today, 2);
        assert_eq!(stats.conversations.this_week, 3);

        assert_eq!(stats.leads.total, 5);
        assert_eq!(stats.leads.today, 3);
        assert_eq!(stats.leads.status_breakdown.get(&LeadStatus::New), Some(&2));
        assert_eq!(stats.leads.status_breakdown.get(&LeadStatus::Contacted), Some(&2));
        assert_eq!(stats.leads.status_breakdown.get(&LeadStatus::Converted), Some(&1));

        assert_eq!(stats.popular_majors[0].name, "CNTT");
        assert_eq!(stats.popular_majors[0].count, 3);
        assert_eq!(stats.channel_preferences.get("Zalo"), Some(&3));
        assert_eq!(stats.channel_preferences.get("Email"), Some(&1));
    }

    #[test]
    fn test_status_breakdown_omits_unobserved() {
        let leads = vec![lead("LEAD_20241015_001", "CNTT", "Zalo", LeadStatus::New, "2024-10-15T08:00:00Z")];
        let stats = compute_stats(&leads, &[], &ts("2024-10-15T09:00:00Z"));
        assert_eq!(stats.leads.status_breakdown.len(), 1);
        assert_eq!(stats.conversations.completion_rate, 0.0);
    }

    #[test]
    fn test_popular_majors_ties_keep_first_seen_order() {
        let leads = vec![
            lead("LEAD_20241015_001", "Luật", "Zalo", LeadStatus::New, "2024-10-15T08:00:00Z"),
            lead("LEAD_20241015_002", "Y khoa", "Zalo", LeadStatus::New, "2024-10-15T08:00:00Z"),
            lead("LEAD_20241015_003", "Dược", "Zalo", LeadStatus::New, "2024-10-15T08:00:00Z"),
            lead("LEAD_20241015_004", "Dược", "Zalo", LeadStatus::New, "2024-10-15T08:00:00Z"),
        ];
        let names: Vec<String> = popular_majors(&leads).into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["Dược", "Luật", "Y khoa"]);
    }

    #[test]
    fn test_today_follows_local_calendar_day() {
        // 2024-10-15 01:00 at UTC+7 is 2024-10-14 18:00 UTC; local midnight
        // is 2024-10-14 17:00 UTC.
        let tz = FixedOffset::east_opt(7 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 10, 15, 1, 0, 0).unwrap();
        let leads = vec![
            lead("LEAD_20241014_001", "CNTT", "Zalo", LeadStatus::New, "2024-10-14T16:59:59Z"),
            lead("LEAD_20241014_002", "CNTT", "Zalo", LeadStatus::New, "2024-10-14T17:00:00Z"),
        ];
        let stats = compute_stats(&leads, &[], &now);
        assert_eq!(stats.leads.today, 1);
        assert_eq!(stats.leads.this_week, 2);
    }

    #[test]
    fn test_query_parse_defaults() {
        let query = LeadQuery::parse(&LeadQueryParams::default()).unwrap();
        assert_eq!(query.filter, LeadFilter::default());
        assert_eq!(query.page, PageRequest::default());
        assert!(!query.export);
    }

    #[test]
    fn test_query_parse_full() {
        let params = LeadQueryParams {
            date_from: Some("2024-10-01".to_string()),
            date_to: Some("2024-10-15T10:00:00+07:00".to_string()),
            status: Some("contacted".to_string()),
            limit: Some("20".to_string()),
            page: Some("3".to_string()),
            export: Some("json".to_string()),
        };
        let query = LeadQuery::parse(&params).unwrap();
        assert_eq!(query.filter.status, Some(LeadStatus::Contacted));
        assert_eq!(query.filter.range.to, Some(ts("2024-10-15T23:59:59Z")));
        assert_eq!(query.page, PageRequest { page: 3, limit: 20 });
        assert!(query.export);
        assert_eq!(query.applied.date_from.as_deref(), Some("2024-10-01"));
    }

    #[test]
    fn test_query_parse_rejects_bad_input() {
        let bad_date = LeadQueryParams {
            date_from: Some("15/10/2024".to_string()),
            ..Default::default()
        };
        assert!(matches!(LeadQuery::parse(&bad_date), Err(AppError::Validation(_))));

        let bad_status = LeadQueryParams {
            status: Some("lost".to_string()),
            ..Default::default()
        };
        assert!(matches!(LeadQuery::parse(&bad_status), Err(AppError::Validation(_))));

        let bad_limit = LeadQueryParams {
            limit: Some("ten".to_string()),
            ..Default::default()
        };
        assert!(matches!(LeadQuery::parse(&bad_limit), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_blank_params_are_ignored() {
        let params = LeadQueryParams {
            status: Some("".to_string()),
            date_from: Some("  ".to_string()),
            ..Default::default()
        };
        let query = LeadQuery::parse(&params).unwrap();
        assert_eq!(query.filter, LeadFilter::default());
    }
}
