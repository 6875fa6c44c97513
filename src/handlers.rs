use crate::config::Config;
use crate::directory::{self, LeadQuery};
use crate::errors::{AppError, ResultExt, LEADS_ERROR, STATS_ERROR, UPDATE_ERROR};
use crate::models::*;
use crate::repository::LeadRepository;
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Local, Utc};
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Lead and session storage.
    pub repo: Arc<dyn LeadRepository>,
    /// Application configuration.
    pub config: Config,
    /// Dashboard stats keyed by directory generation.
    /// `None` when `STATS_CACHE_TTL_SECS` is 0.
    pub stats_cache: Option<Cache<u64, DashboardStats>>,
    /// Bumped after every successful status update. Stats computed from a
    /// snapshot are only ever served under the generation read before it.
    pub generation: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(repo: Arc<dyn LeadRepository>, config: Config) -> Self {
        let stats_cache = (config.stats_cache_ttl_secs > 0).then(|| {
            Cache::builder()
                .time_to_live(Duration::from_secs(config.stats_cache_ttl_secs))
                .max_capacity(4)
                .build()
        });

        Self {
            repo,
            config,
            stats_cache,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats, AppError> {
        // Read before the snapshot: a reader racing an update files its
        // figures under the old generation, which later readers never look up.
        let generation = self.generation.load(Ordering::SeqCst);

        if let Some(cache) = &self.stats_cache {
            if let Some(stats) = cache.get(&generation).await {
                tracing::debug!("Stats cache HIT (generation {})", generation);
                return Ok(stats);
            }
        }

        let leads = self.repo.list_leads().await?;
        let sessions = self.repo.list_sessions().await?;
        let stats = directory::compute_stats(&leads, &sessions, &Local::now());

        if let Some(cache) = &self.stats_cache {
            cache.insert(generation, stats.clone()).await;
        }

        Ok(stats)
    }

    /// Marks every cached stats entry as outdated.
    async fn invalidate_stats(&self) {
        let previous = self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(cache) = &self.stats_cache {
            cache.invalidate(&previous).await;
        }
    }
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: "Admin API đang hoạt động".to_string(),
        timestamp: Utc::now(),
    })
}

/// GET /stats
///
/// Dashboard figures: session completion, lead volume today and over the
/// last 7 days, status breakdown, popular majors and channel preferences.
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<DashboardStats>>, AppError> {
    tracing::info!("GET /stats");

    let stats = state.dashboard_stats().await.error_code(STATS_ERROR)?;

    tracing::debug!(
        "Stats computed: {} leads, {} sessions",
        stats.leads.total,
        stats.conversations.total
    );

    Ok(Json(ApiResponse::ok(stats)))
}

/// GET /leads?dateFrom&dateTo&status&limit&page&export
///
/// Filtered leads, newest first. Paginated by default; `export=json` returns
/// the whole filtered set as a download and ignores `page`/`limit`.
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    query: Result<Query<LeadQueryParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = query.map_err(|rejection| {
        AppError::Validation(format!(
            "Tham số truy vấn không hợp lệ: {}",
            rejection.body_text()
        ))
    })?;
    tracing::info!("GET /leads - params: {:?}", params);

    let query = LeadQuery::parse(&params)?;
    let leads = state.repo.list_leads().await.error_code(LEADS_ERROR)?;
    let filtered = directory::apply_filter(&leads, &query.filter);

    if query.export {
        let exported_at = Utc::now();
        let filename = format!(
            "attachment; filename=\"leads-export-{}.json\"",
            exported_at.format("%Y-%m-%d")
        );

        tracing::info!("Exporting {} lead(s)", filtered.len());

        let export = LeadExport {
            exported_at,
            filters: query.applied,
            total_leads: filtered.len(),
            leads: filtered,
        };

        return Ok((
            [(header::CONTENT_DISPOSITION, filename)],
            Json(ApiResponse::ok(export)),
        )
            .into_response());
    }

    let (page, pagination) = directory::paginate(&filtered, query.page);

    tracing::debug!(
        "Returning page {}/{} ({} of {} lead(s))",
        pagination.page,
        pagination.total_pages,
        page.len(),
        pagination.total
    );

    Ok(Json(ApiResponse::ok(LeadPage {
        leads: page,
        pagination,
    }))
    .into_response())
}

/// PUT /leads/{id}/status
///
/// Sets the status of one lead. Body: `{"status": "new" | "contacted" | "converted"}`.
pub async fn update_lead_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<UpdateStatusRequest>>,
) -> Result<Json<ApiResponse<Lead>>, AppError> {
    tracing::info!("PUT /leads/{}/status", id);

    let requested = body
        .and_then(|Json(req)| req.status)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("Trạng thái là bắt buộc".to_string()))?;

    let status = requested.parse::<LeadStatus>().map_err(|_| {
        AppError::Validation(format!(
            "Trạng thái không hợp lệ. Các giá trị hợp lệ: {}",
            LeadStatus::allowed_values()
        ))
    })?;

    let updated = apply_status_update(&state, &id, status)
        .await
        .error_code(UPDATE_ERROR)?;

    state.invalidate_stats().await;

    tracing::info!("Lead {} status set to {}", updated.id, updated.status);

    Ok(Json(ApiResponse::with_message(
        updated,
        "Cập nhật trạng thái thành công",
    )))
}

async fn apply_status_update(
    state: &AppState,
    id: &str,
    status: LeadStatus,
) -> Result<Lead, AppError> {
    let not_found = || AppError::NotFound(format!("Không tìm thấy lead với ID {}", id));

    let policy = state.config.status_transitions;
    if policy != TransitionPolicy::Any {
        let current = state.repo.find_lead(id).await?.ok_or_else(not_found)?;
        if !policy.allows(current.status, status) {
            tracing::warn!(
                "Rejected status transition for {}: {} -> {}",
                id,
                current.status,
                status
            );
            return Err(AppError::Validation(format!(
                "Không thể chuyển trạng thái từ '{}' sang '{}'",
                current.status, status
            )));
        }
    }

    state
        .repo
        .update_status(id, status)
        .await?
        .ok_or_else(not_found)
}
