use crate::errors::AppError;
use crate::models::{Lead, LeadStatus, Session};
use crate::seed::SeedData;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

/// Storage seam for leads and sessions.
///
/// Filtering and aggregation live in [`crate::directory`] and only rely on
/// these operations, so backends can be swapped without touching them.
#[async_trait]
pub trait LeadRepository: Send + Sync {
    /// All leads, in storage order.
    async fn list_leads(&self) -> Result<Vec<Lead>, AppError>;

    /// All sessions, in storage order.
    async fn list_sessions(&self) -> Result<Vec<Session>, AppError>;

    async fn find_lead(&self, id: &str) -> Result<Option<Lead>, AppError>;

    /// Sets the status of one lead and returns the updated record, or `None`
    /// when no lead has that id. No other field changes.
    async fn update_status(&self, id: &str, status: LeadStatus)
        -> Result<Option<Lead>, AppError>;
}

// ============ In-memory backend ============

/// Directory held in process memory.
///
/// Reads clone a snapshot under the shared lock. Concurrent updates to the
/// same lead are last-write-wins.
pub struct InMemoryLeadRepository {
    leads: RwLock<Vec<Lead>>,
    sessions: RwLock<Vec<Session>>,
}

impl InMemoryLeadRepository {
    pub fn new(data: SeedData) -> Self {
        Self {
            leads: RwLock::new(data.leads),
            sessions: RwLock::new(data.sessions),
        }
    }
}

#[async_trait]
impl LeadRepository for InMemoryLeadRepository {
    async fn list_leads(&self) -> Result<Vec<Lead>, AppError> {
        Ok(self.leads.read().await.clone())
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, AppError> {
        Ok(self.sessions.read().await.clone())
    }

    async fn find_lead(&self, id: &str) -> Result<Option<Lead>, AppError> {
        Ok(self.leads.read().await.iter().find(|l| l.id == id).cloned())
    }

    async fn update_status(
        &self,
        id: &str,
        status: LeadStatus,
    ) -> Result<Option<Lead>, AppError> {
        let mut leads = self.leads.write().await;
        Ok(leads.iter_mut().find(|l| l.id == id).map(|lead| {
            lead.status = status;
            lead.clone()
        }))
    }
}

// ============ Postgres backend ============

#[derive(Debug, FromRow)]
struct LeadRow {
    id: String,
    session_id: String,
    name: String,
    major: String,
    phone: String,
    phone_normalized: String,
    channel: String,
    timeslot: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<LeadRow> for Lead {
    type Error = AppError;

    fn try_from(row: LeadRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<LeadStatus>().map_err(|e| {
            AppError::InternalError(format!("lead {} has corrupt status: {}", row.id, e))
        })?;

        Ok(Lead {
            id: row.id,
            session_id: row.session_id,
            name: row.name,
            major: row.major,
            phone: row.phone,
            phone_normalized: row.phone_normalized,
            channel: row.channel,
            timeslot: row.timeslot,
            status,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    id: String,
    completed: bool,
    created_at: DateTime<Utc>,
}

const LEAD_COLUMNS: &str =
    "id, session_id, name, major, phone, phone_normalized, channel, timeslot, status, created_at";

/// Directory backed by the `leads` and `sessions` tables.
///
/// Storage order is insertion order (`seq`), matching the in-memory backend.
pub struct PgLeadRepository {
    pool: PgPool,
}

impl PgLeadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts seed records, skipping ids that already exist.
    pub async fn import(&self, data: &SeedData) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for session in &data.sessions {
            inserted += sqlx::query(
                "INSERT INTO sessions (id, completed, created_at) VALUES ($1, $2, $3)
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(&session.id)
            .bind(session.completed)
            .bind(session.created_at)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        for lead in &data.leads {
            inserted += sqlx::query(&format!(
                "INSERT INTO leads ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                 ON CONFLICT (id) DO NOTHING",
                LEAD_COLUMNS
            ))
            .bind(&lead.id)
            .bind(&lead.session_id)
            .bind(&lead.name)
            .bind(&lead.major)
            .bind(&lead.phone)
            .bind(&lead.phone_normalized)
            .bind(&lead.channel)
            .bind(&lead.timeslot)
            .bind(lead.status.as_str())
            .bind(lead.created_at)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }
}

#[async_trait]
impl LeadRepository for PgLeadRepository {
    async fn list_leads(&self) -> Result<Vec<Lead>, AppError> {
        let rows = sqlx::query_as::<_, LeadRow>(&format!(
            "SELECT {} FROM leads ORDER BY seq ASC",
            LEAD_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Lead::try_from).collect()
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, AppError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT id, completed, created_at FROM sessions ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Session {
                id: row.id,
                completed: row.completed,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn find_lead(&self, id: &str) -> Result<Option<Lead>, AppError> {
        sqlx::query_as::<_, LeadRow>(&format!(
            "SELECT {} FROM leads WHERE id = $1",
            LEAD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Lead::try_from)
        .transpose()
    }

    async fn update_status(
        &self,
        id: &str,
        status: LeadStatus,
    ) -> Result<Option<Lead>, AppError> {
        sqlx::query_as::<_, LeadRow>(&format!(
            "UPDATE leads SET status = $1 WHERE id = $2 RETURNING {}",
            LEAD_COLUMNS
        ))
        .bind(status.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Lead::try_from)
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> InMemoryLeadRepository {
        InMemoryLeadRepository::new(SeedData::demo(Utc::now()).unwrap())
    }

    #[tokio::test]
    async fn test_update_changes_only_status() {
        let repo = repo();
        let before = repo.list_leads().await.unwrap()[0].clone();
        let target = if before.status == LeadStatus::Converted {
            LeadStatus::New
        } else {
            LeadStatus::Converted
        };

        let updated = repo.update_status(&before.id, target).await.unwrap().unwrap();

        assert_eq!(updated.status, target);
        assert_eq!(Lead { status: before.status, ..updated.clone() }, before);
        assert_eq!(repo.find_lead(&before.id).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn test_update_unknown_id_returns_none() {
        let repo = repo();
        let result = repo
            .update_status("LEAD_19990101_001", LeadStatus::Contacted)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_update_leaves_other_leads_untouched() {
        let repo = repo();
        let before = repo.list_leads().await.unwrap();
        repo.update_status(&before[1].id, LeadStatus::Converted)
            .await
            .unwrap();
        let after = repo.list_leads().await.unwrap();

        for (old, new) in before.iter().zip(after.iter()).filter(|(o, _)| o.id != before[1].id) {
            assert_eq!(old, new);
        }
    }

    #[test]
    fn test_corrupt_status_row_is_internal_error() {
        let row = LeadRow {
            id: "LEAD_20241015_001".to_string(),
            session_id: "session_1".to_string(),
            name: "A".to_string(),
            major: "B".to_string(),
            phone: "0901234567".to_string(),
            phone_normalized: "+84901234567".to_string(),
            channel: "Zalo".to_string(),
            timeslot: String::new(),
            status: "archived".to_string(),
            created_at: Utc::now(),
        };
        assert!(matches!(Lead::try_from(row), Err(AppError::InternalError(_))));
    }
}
