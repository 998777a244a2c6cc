use std::collections::HashMap;

use anyhow::Context;
use axum::{
    Extension,
    Json,
    extract::{Path, State},
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
    orders,
    schema::{order_events, order_items, orders as orders_table, receipts},
};

/// Buyer-side order routes: listing, inspection, cancellation and payment
/// proof upload. Orders are created through cart checkout, not here.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/buyers/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_my_orders))
            .routes(utoipa_axum::routes!(get_order))
            .routes(utoipa_axum::routes!(cancel_order))
            .routes(utoipa_axum::routes!(attach_receipt))
            .route_layer(axum::middleware::from_fn(middleware::buyers_authorization)),
    )
}

#[derive(Serialize, ToSchema)]
pub struct GetOrderRes {
    pub order: OrderEntity,
    pub items: Vec<OrderItemEntity>,
}

#[derive(Serialize, ToSchema)]
pub struct OrderDetailRes {
    pub order: OrderEntity,
    pub items: Vec<OrderItemEntity>,
    pub receipts: Vec<ReceiptEntity>,
    pub events: Vec<OrderEventEntity>,
}

/// Fetch all orders belonging to the authenticated buyer.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Buyer Orders"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List my orders", body = StdResponse<Vec<GetOrderRes>, String>)
    )
)]
async fn get_my_orders(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let my_orders: Vec<OrderEntity> = orders_table::table
        .filter(orders_table::buyer_id.eq(user.id))
        .order_by(orders_table::updated_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get my orders")?;

    let order_ids: Vec<i32> = my_orders.iter().map(|order| order.id).collect();
    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq_any(&order_ids))
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let mut group: HashMap<i32, Vec<OrderItemEntity>> = HashMap::new();
    for item in items {
        group.entry(item.order_id).or_default().push(item);
    }

    let orders_with_items: Vec<GetOrderRes> = my_orders
        .into_iter()
        .map(|order| GetOrderRes {
            items: group.remove(&order.id).unwrap_or_default(),
            order,
        })
        .collect();

    Ok(StdResponse {
        data: Some(orders_with_items),
        message: Some("Get my orders successfully"),
    })
}

/// Fetch one order with its line items, receipts and event trail.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Buyer Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to fetch")
    ),
    responses(
        (status = 200, description = "Get order successfully", body = StdResponse<OrderDetailRes, String>)
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
        .filter(orders_table::buyer_id.eq(user.id))
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
        data: Some(OrderDetailRes {
            order,
            items,
            receipts: order_receipts,
            events,
        }),
        message: Some("Get order successfully"),
    })
}

/// Cancel a pending order. Paid and already-cancelled orders refuse.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Buyer Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to cancel")
    ),
    responses(
        (status = 200, description = "Cancelled order successfully", body = StdResponse<OrderEntity, String>)
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

    let cancelled_order = orders::cancel(conn, id, user).await?;

    Ok(StdResponse {
        data: Some(cancelled_order),
        message: Some("Cancelled order successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct AttachReceiptReq {
    /// Stable reference to the uploaded proof in whatever store holds it.
    pub file_reference: String,
    pub payment_reference: Option<String>,
}

/// Attach a payment proof to a pending order. The pharmacy is notified and
/// can then confirm the payment.
#[utoipa::path(
    post,
    path = "/{id}/receipts",
    tags = ["Buyer Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to attach the receipt to")
    ),
    request_body = AttachReceiptReq,
    responses(
        (status = 200, description = "Receipt attached", body = StdResponse<ReceiptEntity, String>)
    )
)]
async fn attach_receipt(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<AttachReceiptReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let receipt =
        orders::attach_receipt(conn, id, user.id, body.file_reference, body.payment_reference)
            .await?;

    Ok(StdResponse {
        data: Some(receipt),
        message: Some("Receipt attached successfully"),
    })
}
