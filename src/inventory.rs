use anyhow::Context;
use chrono::{DateTime, Utc};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::{app_error::AppError, models::MedicineEntity, schema::medicines};

/// Non-binding pre-check used when items enter a cart or an order is placed.
/// Nothing is reserved; the payment commit re-validates through
/// [`decrement`].
pub fn ensure_orderable(
    medicine: &MedicineEntity,
    quantity: i32,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if quantity <= 0 {
        return Err(AppError::ValidationError(format!(
            "Quantity must be positive, got {quantity}"
        )));
    }
    if medicine.is_expired_at(now) {
        return Err(AppError::ValidationError(format!(
            "{} is past its expiry date",
            medicine.name
        )));
    }
    if medicine.stock_quantity < quantity {
        return Err(AppError::InsufficientStock {
            medicine_id: medicine.id,
            requested: quantity,
            available: medicine.stock_quantity,
        });
    }
    Ok(())
}

/// Deducts stock with a guarded update. The `stock_quantity >= quantity`
/// filter makes the deduction a compare-and-swap: of two racing commits the
/// slower one matches zero rows, so the count can never go negative.
///
/// Only the payment commit in the order flow calls this; no route handler
/// touches `stock_quantity` directly. A medicine that has been deleted in
/// the meantime counts as zero stock.
pub async fn decrement(
    conn: &mut AsyncPgConnection,
    medicine_id: i32,
    quantity: i32,
) -> Result<(), AppError> {
    if quantity <= 0 {
        return Err(AppError::ValidationError(format!(
            "Quantity must be positive, got {quantity}"
        )));
    }

    let affected = diesel::update(
        medicines::table
            .find(medicine_id)
            .filter(medicines::stock_quantity.ge(quantity)),
    )
    .set((
        medicines::stock_quantity.eq(medicines::stock_quantity - quantity),
        medicines::updated_at.eq(diesel::dsl::now),
    ))
    .execute(conn)
    .await
    .context("Failed to decrement stock")?;

    if affected == 0 {
        let available: Option<i32> = medicines::table
            .find(medicine_id)
            .select(medicines::stock_quantity)
            .get_result(conn)
            .await
            .optional()
            .context("Failed to read stock after a failed decrement")?;
        return Err(AppError::InsufficientStock {
            medicine_id,
            requested: quantity,
            available: available.unwrap_or(0),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use uuid::Uuid;

    use super::*;

    fn medicine(stock: i32, expires_at: Option<DateTime<Utc>>) -> MedicineEntity {
        let now = Utc::now();
        MedicineEntity {
            id: 1,
            seller_id: Uuid::new_v4(),
            name: "Paracetamol".to_string(),
            description: None,
            price: 12.5,
            stock_quantity: stock,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn sufficient_stock_passes() {
        let med = medicine(5, None);
        assert!(ensure_orderable(&med, 3, Utc::now()).is_ok());
        assert!(ensure_orderable(&med, 5, Utc::now()).is_ok());
    }

    #[test]
    fn shortfall_reports_requested_and_available() {
        let med = medicine(2, None);
        match ensure_orderable(&med, 3, Utc::now()) {
            Err(AppError::InsufficientStock {
                medicine_id,
                requested,
                available,
            }) => {
                assert_eq!(medicine_id, 1);
                assert_eq!(requested, 3);
                assert_eq!(available, 2);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn expired_medicine_is_rejected() {
        let now = Utc::now();
        let med = medicine(5, Some(now - Duration::days(1)));
        assert!(matches!(
            ensure_orderable(&med, 1, now),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn future_expiry_is_fine() {
        let now = Utc::now();
        let med = medicine(5, Some(now + Duration::days(30)));
        assert!(ensure_orderable(&med, 1, now).is_ok());
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let med = medicine(5, None);
        assert!(matches!(
            ensure_orderable(&med, 0, Utc::now()),
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            ensure_orderable(&med, -2, Utc::now()),
            Err(AppError::ValidationError(_))
        ));
    }
}
