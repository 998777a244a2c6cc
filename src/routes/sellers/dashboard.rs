use anyhow::Context;
use axum::{Extension, extract::State, response::IntoResponse};
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::CurrentUser,
    middleware,
    models::LOW_STOCK_THRESHOLD,
    orders::OrderStatus,
    schema::{medicines, orders},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/sellers/dashboard",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_dashboard))
            .route_layer(axum::middleware::from_fn(middleware::sellers_authorization)),
    )
}

#[derive(Serialize, ToSchema)]
pub struct SellerDashboardRes {
    pub total_medicines: i64,
    pub low_stock_count: i64,
    pub pending_order_count: i64,
}

/// At-a-glance counts for the seller: listings, listings running low and
/// orders waiting on payment confirmation.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Seller Dashboard"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Dashboard counts", body = StdResponse<SellerDashboardRes, String>)
    )
)]
async fn get_dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let total_medicines: i64 = medicines::table
        .filter(medicines::seller_id.eq(user.id))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count medicines")?;

    let low_stock_count: i64 = medicines::table
        .filter(medicines::seller_id.eq(user.id))
        .filter(medicines::stock_quantity.le(LOW_STOCK_THRESHOLD))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count low stock medicines")?;

    let pending_order_count: i64 = orders::table
        .filter(orders::pharmacy_id.eq(user.id))
        .filter(orders::status.eq(OrderStatus::Pending.as_str()))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count pending orders")?;

    Ok(StdResponse {
        data: Some(SellerDashboardRes {
            total_medicines,
            low_stock_count,
            pending_order_count,
        }),
        message: Some("Get dashboard successfully"),
    })
}
