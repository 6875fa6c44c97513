/// Seed data for the in-memory directory
///
/// Leads and sessions are created upstream by the conversation flow. When no
/// database is configured the service starts from either a JSON seed file or
/// the built-in demo dataset below. Both go through `SeedData::prepare`, which
/// normalizes phones and enforces the identifier invariants.
use crate::models::{Lead, LeadStatus, Session};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Validate and normalize a Vietnamese phone number
///
/// Uses the phonenumber library (port of Google's libphonenumber) to parse
/// the number with the Vietnamese region and format it as E.164
/// (+84901234567). Numbers that do not validate fall back to their digits.
///
/// Returns: (is_valid, normalized_phone)
pub fn normalize_vn_phone(raw: &str) -> (bool, String) {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() < 8 {
        return (false, digits);
    }

    match phonenumber::parse(Some(CountryId::VN), raw) {
        Ok(number) if phonenumber::is_valid(&number) => {
            let formatted = number.format().mode(Mode::E164).to_string();
            tracing::debug!("Valid VN phone: {} → {}", raw, formatted);
            (true, formatted)
        }
        Ok(_) => {
            tracing::warn!("Invalid VN phone number: {}", raw);
            (false, digits)
        }
        Err(e) => {
            tracing::warn!("Failed to parse VN phone '{}': {:?}", raw, e);
            (false, digits)
        }
    }
}

/// Lead and session collections loaded at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub leads: Vec<Lead>,
    #[serde(default)]
    pub sessions: Vec<Session>,
}

impl SeedData {
    /// Reads a `{ "leads": [...], "sessions": [...] }` JSON document.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read seed file {}", path.display()))?;
        let data: SeedData = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse seed file {}", path.display()))?;
        data.prepare()
    }

    /// Fills in missing normalized phones and checks lead identifiers are
    /// well formed and unique.
    pub fn prepare(mut self) -> anyhow::Result<Self> {
        let mut seen = HashSet::new();

        for lead in &mut self.leads {
            if !Lead::is_well_formed_id(&lead.id) {
                anyhow::bail!(
                    "lead id '{}' does not match LEAD_<YYYYMMDD>_<seq>",
                    lead.id
                );
            }
            if !seen.insert(lead.id.clone()) {
                anyhow::bail!("duplicate lead id '{}'", lead.id);
            }
            if lead.phone_normalized.trim().is_empty() {
                lead.phone_normalized = normalize_vn_phone(&lead.phone).1;
            }
        }

        let mut session_ids = HashSet::new();
        for session in &self.sessions {
            if !session_ids.insert(session.id.as_str()) {
                anyhow::bail!("duplicate session id '{}'", session.id);
            }
        }

        Ok(self)
    }

    /// Demo dataset spread over the last two weeks relative to `now`.
    pub fn demo(now: DateTime<Utc>) -> anyhow::Result<Self> {
        // (name, major, phone, channel, timeslot, status, hours ago)
        let rows: [(&str, &str, &str, &str, &str, LeadStatus, i64); 12] = [
            ("Nguyễn Văn An", "Công nghệ thông tin", "0901234567", "Zalo", "Buổi sáng (8h-11h)", LeadStatus::New, 1),
            ("Trần Thị Bình", "Quản trị kinh doanh", "0912345678", "Phone call", "Buổi chiều (14h-17h)", LeadStatus::Contacted, 3),
            ("Lê Hoàng Cường", "Công nghệ thông tin", "0987654321", "Email", "Buổi tối (19h-21h)", LeadStatus::New, 20),
            ("Phạm Minh Đức", "Ngôn ngữ Anh", "0903 456 789", "Zalo", "Cuối tuần", LeadStatus::Converted, 30),
            ("Hoàng Thị Em", "Marketing", "+84 93 456 7890", "Zalo", "Buổi sáng (8h-11h)", LeadStatus::Contacted, 50),
            ("Vũ Quốc Phong", "Công nghệ thông tin", "0978123456", "Phone call", "Bất kỳ lúc nào", LeadStatus::New, 75),
            ("Đặng Thu Giang", "Thiết kế đồ họa", "0934567890", "Email", "Buổi chiều (14h-17h)", LeadStatus::Converted, 100),
            ("Bùi Văn Hải", "Quản trị kinh doanh", "0945678901", "Zalo", "Buổi tối (19h-21h)", LeadStatus::New, 140),
            ("Đỗ Thị Hương", "Ngôn ngữ Anh", "0356789012", "Phone call", "Buổi sáng (8h-11h)", LeadStatus::Contacted, 170),
            ("Ngô Minh Khoa", "Công nghệ thông tin", "0867890123", "Zalo", "Cuối tuần", LeadStatus::New, 200),
            ("Dương Thị Lan", "Marketing", "0398901234", "Email", "Bất kỳ lúc nào", LeadStatus::Converted, 260),
            ("Lý Văn Minh", "Kế toán", "0909012345", "Zalo", "Buổi chiều (14h-17h)", LeadStatus::New, 320),
        ];

        let mut leads = Vec::with_capacity(rows.len());
        let mut sessions = Vec::new();
        let mut per_day: std::collections::HashMap<String, u32> = Default::default();

        for (i, (name, major, phone, channel, timeslot, status, hours_ago)) in
            rows.into_iter().enumerate()
        {
            let created_at = now - Duration::hours(hours_ago);
            let day = created_at.format("%Y%m%d").to_string();
            let seq = per_day.entry(day.clone()).or_insert(0);
            *seq += 1;

            let session_id = format!("session_{:03}", i + 1);
            sessions.push(Session {
                id: session_id.clone(),
                completed: true,
                created_at: created_at - Duration::minutes(10),
            });

            leads.push(Lead {
                id: format!("LEAD_{}_{:03}", day, seq),
                session_id,
                name: name.to_string(),
                major: major.to_string(),
                phone: phone.to_string(),
                phone_normalized: String::new(),
                channel: channel.to_string(),
                timeslot: timeslot.to_string(),
                status,
                created_at,
            });
        }

        // Conversations that ended without leaving contact details.
        for (i, hours_ago) in [2i64, 26, 90, 180].into_iter().enumerate() {
            sessions.push(Session {
                id: format!("session_{:03}", rows.len() + i + 1),
                completed: false,
                created_at: now - Duration::hours(hours_ago),
            });
        }

        SeedData { leads, sessions }.prepare()
    }
}
