use anyhow::Context;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::{app_error::AppError, models::CreateNotificationEntity, schema::notifications};

pub const ORDER_PLACED: &str = "order_placed";
pub const RECEIPT_ATTACHED: &str = "receipt_attached";
pub const ORDER_PAID: &str = "order_paid";
pub const ORDER_CANCELLED: &str = "order_cancelled";

/// Records an in-app notification. Called inside the same transaction as the
/// change it announces, so a rolled-back order change never leaves a stray
/// notification behind.
pub async fn notify(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    kind: &str,
    order_id: Option<i32>,
    message: String,
) -> Result<(), AppError> {
    diesel::insert_into(notifications::table)
        .values(CreateNotificationEntity {
            user_id,
            kind: kind.to_string(),
            order_id,
            message,
        })
        .execute(conn)
        .await
        .context("Failed to insert notification")?;
    Ok(())
}
