use std::fmt;

use anyhow::Context;
use chrono::Utc;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    aliases::DieselError,
    app_error::AppError,
    auth::{CurrentUser, Role},
    inventory,
    models::{
        CreateOrderEntity, CreateOrderEventEntity, CreateOrderItemEntity, CreateReceiptEntity,
        MedicineEntity, OrderEntity, OrderItemEntity, ReceiptEntity,
    },
    notifications,
    schema::{cart_items, carts, medicines, order_events, order_items, orders, receipts},
};

/// Order lifecycle. `Pending` is the only state with exits; `Paid` and
/// `Cancelled` are terminal.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<OrderStatus> {
        match value {
            "PENDING" => Some(OrderStatus::Pending),
            "PAID" => Some(OrderStatus::Paid),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Paid)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of an order an actor is on. Ownership filters and
/// notification targets both derive from this.
#[derive(Debug, Clone, Copy)]
enum OrderOwner {
    Buyer(Uuid),
    Pharmacy(Uuid),
}

/// Turns a buyer's cart into a `PENDING` order.
///
/// Validates ownership, a non-empty cart and, for every line, that the
/// medicine still exists, is not expired and currently covers the quantity.
/// The stock check is non-binding: nothing is reserved, the payment commit
/// re-validates. Name and unit price are snapshotted into the line items so
/// later catalog edits cannot change what was ordered. The cart is consumed.
pub async fn create_from_cart(
    conn: &mut AsyncPgConnection,
    buyer_id: Uuid,
    cart_id: i32,
) -> Result<(OrderEntity, Vec<OrderItemEntity>), AppError> {
    conn.transaction(move |conn| {
        Box::pin(async move {
            let cart_pharmacy_id: Uuid = match carts::table
                .find(cart_id)
                .filter(carts::buyer_id.eq(buyer_id))
                .select(carts::pharmacy_id)
                .get_result(conn)
                .await
            {
                Ok(pharmacy_id) => pharmacy_id,
                Err(DieselError::NotFound) => return Err(AppError::NotFound),
                Err(err) => return Err(AppError::Other(err.into())),
            };

            let lines: Vec<(i32, i32)> = cart_items::table
                .filter(cart_items::cart_id.eq(cart_id))
                .order(cart_items::medicine_id.asc())
                .select((cart_items::medicine_id, cart_items::quantity))
                .get_results(conn)
                .await
                .context("Failed to get cart items")?;

            if lines.is_empty() {
                return Err(AppError::ValidationError(
                    "Cannot check out an empty cart".into(),
                ));
            }

            let now = Utc::now();
            let mut total_amount = 0.0_f32;
            let mut snapshots: Vec<(MedicineEntity, i32)> = Vec::with_capacity(lines.len());
            for (medicine_id, quantity) in lines {
                let medicine: MedicineEntity =
                    match medicines::table.find(medicine_id).get_result(conn).await {
                        Ok(medicine) => medicine,
                        Err(DieselError::NotFound) => {
                            return Err(AppError::ValidationError(format!(
                                "Medicine {medicine_id} is no longer offered"
                            )));
                        }
                        Err(err) => return Err(AppError::Other(err.into())),
                    };
                inventory::ensure_orderable(&medicine, quantity, now)?;
                total_amount += medicine.price * quantity as f32;
                snapshots.push((medicine, quantity));
            }

            let order: OrderEntity = diesel::insert_into(orders::table)
                .values(CreateOrderEntity {
                    buyer_id,
                    pharmacy_id: cart_pharmacy_id,
                    status: OrderStatus::Pending.as_str().to_string(),
                    total_amount,
                })
                .returning(OrderEntity::as_returning())
                .get_result(conn)
                .await
                .context("Failed to create order")?;

            let item_rows: Vec<CreateOrderItemEntity> = snapshots
                .into_iter()
                .map(|(medicine, quantity)| CreateOrderItemEntity {
                    order_id: order.id,
                    medicine_id: medicine.id,
                    medicine_name: medicine.name,
                    quantity,
                    unit_price: medicine.price,
                })
                .collect();

            let items: Vec<OrderItemEntity> = diesel::insert_into(order_items::table)
                .values(item_rows)
                .returning(OrderItemEntity::as_returning())
                .get_results(conn)
                .await
                .context("Failed to create order items")?;

            diesel::delete(carts::table.find(cart_id))
                .execute(conn)
                .await
                .context("Failed to consume the cart")?;

            record_event(
                conn,
                order.id,
                Role::Buyer.as_str(),
                "created",
                Some(json!({ "total_amount": order.total_amount, "item_count": items.len() })),
            )
            .await?;
            notifications::notify(
                conn,
                order.pharmacy_id,
                notifications::ORDER_PLACED,
                Some(order.id),
                format!("New order #{} is awaiting payment", order.id),
            )
            .await?;

            Ok((order, items))
        })
    })
    .await
}

/// Seller-side payment commit: flips `PENDING` to `PAID` and deducts stock,
/// all inside one transaction.
///
/// The status flip is a guarded update, so of two racing confirmations only
/// one proceeds to the deduction step. Any stock shortfall fails the whole
/// transaction and the order stays `PENDING` with stock untouched; the buyer
/// can retry later or cancel. A second confirmation of the same order fails
/// with `InvalidTransition` and never deducts twice.
pub async fn confirm_payment(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    pharmacy_id: Uuid,
) -> Result<OrderEntity, AppError> {
    conn.transaction(move |conn| {
        Box::pin(async move {
            let updated: Option<OrderEntity> = diesel::update(
                orders::table
                    .find(order_id)
                    .filter(orders::pharmacy_id.eq(pharmacy_id))
                    .filter(orders::status.eq(OrderStatus::Pending.as_str())),
            )
            .set((
                orders::status.eq(OrderStatus::Paid.as_str()),
                orders::updated_at.eq(diesel::dsl::now),
            ))
            .returning(OrderEntity::as_returning())
            .get_result(conn)
            .await
            .optional()
            .context("Failed to update order status")?;

            let Some(order) = updated else {
                return Err(transition_refusal(
                    conn,
                    order_id,
                    OrderOwner::Pharmacy(pharmacy_id),
                    OrderStatus::Paid,
                )
                .await);
            };

            let items: Vec<OrderItemEntity> = order_items::table
                .filter(order_items::order_id.eq(order.id))
                .order(order_items::medicine_id.asc())
                .get_results(conn)
                .await
                .context("Failed to get order items")?;

            for item in &items {
                inventory::decrement(conn, item.medicine_id, item.quantity).await?;
            }

            record_event(
                conn,
                order.id,
                Role::Seller.as_str(),
                "payment_confirmed",
                Some(json!({ "total_amount": order.total_amount })),
            )
            .await?;
            notifications::notify(
                conn,
                order.buyer_id,
                notifications::ORDER_PAID,
                Some(order.id),
                format!("Order #{} has been confirmed as paid", order.id),
            )
            .await?;

            Ok(order)
        })
    })
    .await
}

/// Cancels a `PENDING` order. Allowed to the owning buyer and the order's
/// pharmacy; no stock moves because none was deducted while pending.
pub async fn cancel(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    actor: CurrentUser,
) -> Result<OrderEntity, AppError> {
    let owner = match actor.role {
        Role::Buyer => OrderOwner::Buyer(actor.id),
        Role::Seller => OrderOwner::Pharmacy(actor.id),
        Role::Admin => {
            return Err(AppError::Forbidden(
                "Only the buyer or the pharmacy can cancel an order".into(),
            ));
        }
    };

    conn.transaction(move |conn| {
        Box::pin(async move {
            let updated: Option<OrderEntity> = match owner {
                OrderOwner::Buyer(id) => {
                    diesel::update(
                        orders::table
                            .find(order_id)
                            .filter(orders::buyer_id.eq(id))
                            .filter(orders::status.eq(OrderStatus::Pending.as_str())),
                    )
                    .set((
                        orders::status.eq(OrderStatus::Cancelled.as_str()),
                        orders::updated_at.eq(diesel::dsl::now),
                    ))
                    .returning(OrderEntity::as_returning())
                    .get_result(conn)
                    .await
                }
                OrderOwner::Pharmacy(id) => {
                    diesel::update(
                        orders::table
                            .find(order_id)
                            .filter(orders::pharmacy_id.eq(id))
                            .filter(orders::status.eq(OrderStatus::Pending.as_str())),
                    )
                    .set((
                        orders::status.eq(OrderStatus::Cancelled.as_str()),
                        orders::updated_at.eq(diesel::dsl::now),
                    ))
                    .returning(OrderEntity::as_returning())
                    .get_result(conn)
                    .await
                }
            }
            .optional()
            .context("Failed to update order status")?;

            let Some(order) = updated else {
                return Err(
                    transition_refusal(conn, order_id, owner, OrderStatus::Cancelled).await,
                );
            };

            record_event(conn, order.id, actor.role.as_str(), "cancelled", None).await?;

            let counterparty = match owner {
                OrderOwner::Buyer(_) => order.pharmacy_id,
                OrderOwner::Pharmacy(_) => order.buyer_id,
            };
            notifications::notify(
                conn,
                counterparty,
                notifications::ORDER_CANCELLED,
                Some(order.id),
                format!("Order #{} was cancelled", order.id),
            )
            .await?;

            Ok(order)
        })
    })
    .await
}

/// Records a payment proof against a `PENDING` order. Only the stable
/// references are stored; the file bytes live elsewhere.
pub async fn attach_receipt(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    buyer_id: Uuid,
    file_reference: String,
    payment_reference: Option<String>,
) -> Result<ReceiptEntity, AppError> {
    let file_reference = file_reference.trim().to_string();
    if file_reference.is_empty() {
        return Err(AppError::ValidationError("A file reference is required".into()));
    }

    conn.transaction(move |conn| {
        Box::pin(async move {
            let order: OrderEntity = match orders::table
                .find(order_id)
                .filter(orders::buyer_id.eq(buyer_id))
                .get_result(conn)
                .await
            {
                Ok(order) => order,
                Err(DieselError::NotFound) => return Err(AppError::OrderNotFound(order_id)),
                Err(err) => return Err(AppError::Other(err.into())),
            };

            if order.status != OrderStatus::Pending.as_str() {
                return Err(AppError::Conflict(format!(
                    "Receipts can only be attached while an order is pending, order #{} is {}",
                    order.id, order.status
                )));
            }

            let receipt: ReceiptEntity = diesel::insert_into(receipts::table)
                .values(CreateReceiptEntity {
                    order_id: order.id,
                    uploaded_by: buyer_id,
                    payment_reference,
                    file_reference,
                })
                .returning(ReceiptEntity::as_returning())
                .get_result(conn)
                .await
                .context("Failed to store receipt")?;

            record_event(
                conn,
                order.id,
                Role::Buyer.as_str(),
                "receipt_attached",
                Some(json!({ "receipt_id": receipt.id })),
            )
            .await?;
            notifications::notify(
                conn,
                order.pharmacy_id,
                notifications::RECEIPT_ATTACHED,
                Some(order.id),
                format!("A payment receipt was attached to order #{}", order.id),
            )
            .await?;

            Ok(receipt)
        })
    })
    .await
}

/// Appends to the per-order audit trail.
pub async fn record_event(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    actor: &str,
    action: &str,
    detail: Option<Value>,
) -> Result<(), AppError> {
    diesel::insert_into(order_events::table)
        .values(CreateOrderEventEntity {
            order_id,
            actor: actor.to_string(),
            action: action.to_string(),
            detail,
        })
        .execute(conn)
        .await
        .context("Failed to record order event")?;
    Ok(())
}

/// Works out which refusal to report after a guarded status update matched
/// nothing: the order does not exist for this owner, or it is no longer
/// pending.
async fn transition_refusal(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    owner: OrderOwner,
    attempted: OrderStatus,
) -> AppError {
    let lookup = match owner {
        OrderOwner::Buyer(id) => {
            orders::table
                .find(order_id)
                .filter(orders::buyer_id.eq(id))
                .select(orders::status)
                .get_result::<String>(conn)
                .await
        }
        OrderOwner::Pharmacy(id) => {
            orders::table
                .find(order_id)
                .filter(orders::pharmacy_id.eq(id))
                .select(orders::status)
                .get_result::<String>(conn)
                .await
        }
    };

    match lookup.optional() {
        Ok(Some(current)) => AppError::InvalidTransition {
            from: current,
            attempted: attempted.as_str().to_string(),
        },
        Ok(None) => AppError::OrderNotFound(order_id),
        Err(err) => AppError::Other(err.into()),
    }
}
