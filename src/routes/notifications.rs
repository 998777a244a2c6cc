use anyhow::Context;
use axum::{
    Extension,
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::CurrentUser,
    middleware,
    models::NotificationEntity,
    schema::notifications,
};

/// In-app notification feed, shared by every role.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/notifications",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_notifications))
            .routes(utoipa_axum::routes!(get_unread_count))
            .routes(utoipa_axum::routes!(mark_read))
            .route_layer(axum::middleware::from_fn(middleware::users_authorization)),
    )
}

#[derive(Deserialize)]
pub struct NotificationsQuery {
    pub limit: Option<i64>,
}

/// Fetch the newest notifications for the authenticated user.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Notifications"],
    security(("bearerAuth" = [])),
    params(
        ("limit" = Option<i64>, Query, description = "How many to return, between 1 and 100 (default 20)")
    ),
    responses(
        (status = 200, description = "My notifications", body = StdResponse<Vec<NotificationEntity>, String>)
    )
)]
async fn get_notifications(
    Query(params): Query<NotificationsQuery>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(20);
    if !(1..=100).contains(&limit) {
        return Err(AppError::ValidationError(
            "limit must be between 1 and 100".into(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let rows: Vec<NotificationEntity> = notifications::table
        .filter(notifications::user_id.eq(user.id))
        .order_by(notifications::created_at.desc())
        .limit(limit)
        .get_results(conn)
        .await
        .context("Failed to get notifications")?;

    Ok(StdResponse {
        data: Some(rows),
        message: Some("Get notifications successfully"),
    })
}

#[derive(Serialize, ToSchema)]
pub struct UnreadCountRes {
    pub unread_count: i64,
}

/// How many notifications are still unread. Clients poll this for the badge.
#[utoipa::path(
    get,
    path = "/unread-count",
    tags = ["Notifications"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Unread count", body = StdResponse<UnreadCountRes, String>)
    )
)]
async fn get_unread_count(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let unread_count: i64 = notifications::table
        .filter(notifications::user_id.eq(user.id))
        .filter(notifications::is_read.eq(false))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count unread notifications")?;

    Ok(StdResponse {
        data: Some(UnreadCountRes { unread_count }),
        message: Some("Get unread count successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct MarkReadReq {
    /// Specific notification IDs to mark; leave out to mark everything.
    pub ids: Option<Vec<i32>>,
}

#[derive(Serialize, ToSchema)]
pub struct MarkReadRes {
    pub updated: usize,
}

/// Mark notifications as read, either a given set or all unread ones.
/// Marking is idempotent; already-read rows are left alone.
#[utoipa::path(
    post,
    path = "/mark-read",
    tags = ["Notifications"],
    security(("bearerAuth" = [])),
    request_body = MarkReadReq,
    responses(
        (status = 200, description = "Notifications marked read", body = StdResponse<MarkReadRes, String>)
    )
)]
async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<MarkReadReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let updated = match body.ids.filter(|ids| !ids.is_empty()) {
        Some(ids) => {
            diesel::update(
                notifications::table
                    .filter(notifications::user_id.eq(user.id))
                    .filter(notifications::is_read.eq(false))
                    .filter(notifications::id.eq_any(ids)),
            )
            .set((
                notifications::is_read.eq(true),
                notifications::read_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .await
        }
        None => {
            diesel::update(
                notifications::table
                    .filter(notifications::user_id.eq(user.id))
                    .filter(notifications::is_read.eq(false)),
            )
            .set((
                notifications::is_read.eq(true),
                notifications::read_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .await
        }
    }
    .context("Failed to mark notifications read")?;

    Ok(StdResponse {
        data: Some(MarkReadRes { updated }),
        message: Some("Marked notifications read successfully"),
    })
}
