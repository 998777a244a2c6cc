use std::collections::HashMap;

use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    aliases::DieselError,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::CurrentUser,
    middleware,
    models::{OrderEntity, OrderEventEntity, OrderItemEntity, ReceiptEntity},
    orders::{self, OrderStatus},
    schema::{order_events, order_items, orders as orders_table, receipts},
};

/// Incoming orders from the pharmacy's point of view. Confirming payment is
/// the step that deducts stock; cancelling releases the order without ever
/// touching it.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/sellers/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_incoming_orders))
            .routes(utoipa_axum::routes!(get_order))
            .routes(utoipa_axum::routes!(confirm_payment))
            .routes(utoipa_axum::routes!(cancel_order))
            .route_layer(axum::middleware::from_fn(middleware::sellers_authorization)),
    )
}

#[derive(Deserialize)]
pub struct IncomingOrdersQuery {
    pub status: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PharmacyOrderRes {
    pub order: OrderEntity,
    pub items: Vec<OrderItemEntity>,
}

#[derive(Serialize, ToSchema)]
pub struct PharmacyOrderDetailRes {
    pub order: OrderEntity,
    pub items: Vec<OrderItemEntity>,
    pub receipts: Vec<ReceiptEntity>,
    pub events: Vec<OrderEventEntity>,
}

/// List orders placed with this pharmacy, optionally narrowed to one status.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Seller Orders"],
    security(("bearerAuth" = [])),
    params(
        ("status" = Option<String>, Query, description = "Only orders in this status (PENDING, PAID or CANCELLED)")
    ),
    responses(
        (status = 200, description = "Incoming orders", body = StdResponse<Vec<PharmacyOrderRes>, String>)
    )
)]
async fn get_incoming_orders(
    Query(params): Query<IncomingOrdersQuery>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let status = match params.status.as_deref() {
        Some(raw) => Some(OrderStatus::parse(raw).ok_or_else(|| {
            AppError::ValidationError(format!("Unknown status '{raw}'"))
        })?),
        None => None,
    };

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let mut query = orders_table::table
        .filter(orders_table::pharmacy_id.eq(user.id))
        .into_boxed();
    if let Some(status) = status {
        query = query.filter(orders_table::status.eq(status.as_str()));
    }
    let incoming: Vec<OrderEntity> = query
        .order_by(orders_table::updated_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get incoming orders")?;

    let order_ids: Vec<i32> = incoming.iter().map(|order| order.id).collect();
    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq_any(&order_ids))
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let mut group: HashMap<i32, Vec<OrderItemEntity>> = HashMap::new();
    for item in items {
        group.entry(item.order_id).or_default().push(item);
    }

    let orders_with_items: Vec<PharmacyOrderRes> = incoming
        .into_iter()
        .map(|order| PharmacyOrderRes {
            items: group.remove(&order.id).unwrap_or_default(),
            order,
        })
        .collect();

    Ok(StdResponse {
        data: Some(orders_with_items),
        message: Some("Get incoming orders successfully"),
    })
}

/// Fetch one incoming order with its receipts and event history.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Seller Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to fetch")
    ),
    responses(
        (status = 200, description = "Order found", body = StdResponse<PharmacyOrderDetailRes, String>)
    )
)]
async fn get_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order: OrderEntity = match orders_table::table
        .find(id)
        .filter(orders_table::pharmacy_id.eq(user.id))
        .get_result(conn)
        .await
    {
        Ok(order) => order,
        Err(DieselError::NotFound) => return Err(AppError::OrderNotFound(id)),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq(order.id))
        .order(order_items::medicine_id.asc())
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let order_receipts: Vec<ReceiptEntity> = receipts::table
        .filter(receipts::order_id.eq(order.id))
        .order(receipts::created_at.asc())
        .get_results(conn)
        .await
        .context("Failed to get receipts")?;

    let events: Vec<OrderEventEntity> = order_events::table
        .filter(order_events::order_id.eq(order.id))
        .order(order_events::id.asc())
        .get_results(conn)
        .await
        .context("Failed to get order events")?;

    Ok(StdResponse {
        data: Some(PharmacyOrderDetailRes {
            order,
            items,
            receipts: order_receipts,
            events,
        }),
        message: Some("Get order successfully"),
    })
}

/// Confirm that payment arrived. Flips the order to PAID and deducts stock
/// for every line; succeeds at most once per order.
#[utoipa::path(
    post,
    path = "/{id}/confirm-payment",
    tags = ["Seller Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to confirm")
    ),
    responses(
        (status = 200, description = "Payment confirmed", body = StdResponse<OrderEntity, String>)
    )
)]
async fn confirm_payment(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order = orders::confirm_payment(conn, id, user.id).await?;

    Ok(StdResponse {
        data: Some(order),
        message: Some("Payment confirmed successfully"),
    })
}

/// Cancel a pending order, for example when the medicine cannot be supplied
/// after all.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Seller Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to cancel")
    ),
    responses(
        (status = 200, description = "Order cancelled", body = StdResponse<OrderEntity, String>)
    )
)]
async fn cancel_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order = orders::cancel(conn, id, user).await?;

    Ok(StdResponse {
        data: Some(order),
        message: Some("Cancelled order successfully"),
    })
}
