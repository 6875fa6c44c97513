use sqlx::{postgres::PgPoolOptions, PgPool};

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;

        Ok(db)
    }

    /// Creates the `sessions` and `leads` tables if they do not exist.
    ///
    /// `seq` preserves insertion order, which listings use as their stable
    /// tie-break.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                seq         BIGSERIAL,
                id          TEXT PRIMARY KEY,
                completed   BOOLEAN NOT NULL DEFAULT FALSE,
                created_at  TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS leads (
                seq               BIGSERIAL,
                id                TEXT PRIMARY KEY,
                session_id        TEXT NOT NULL,
                name              TEXT NOT NULL,
                major             TEXT NOT NULL,
                phone             TEXT NOT NULL,
                phone_normalized  TEXT NOT NULL DEFAULT '',
                channel           TEXT NOT NULL,
                timeslot          TEXT NOT NULL DEFAULT '',
                status            TEXT NOT NULL DEFAULT 'new'
                                  CHECK (status IN ('new', 'contacted', 'converted')),
                created_at        TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS leads_created_at_idx ON leads (created_at DESC)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
