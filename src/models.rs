use chrono::{DateTime, Utc};
use diesel::{
    Selectable,
    prelude::{Identifiable, Insertable, Queryable},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

/// Medicines at or below this stock level are flagged as running low.
pub const LOW_STOCK_THRESHOLD: i32 = 10;

// Users

/// Full user row including the bcrypt hash. Never serialized into responses;
/// use [`UserPublicEntity`] for anything client-facing.
#[derive(Queryable, Selectable, Identifiable, Debug)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserEntity {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub is_profile_complete: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserPublicEntity {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    pub is_profile_complete: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::users)]
pub struct CreateUserEntity {
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub is_profile_complete: bool,
}

// Profiles

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::buyer_profiles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BuyerProfileEntity {
    pub id: i32,
    pub user_id: Uuid,
    pub name: String,
    pub age: i32,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::buyer_profiles)]
pub struct CreateBuyerProfileEntity {
    pub user_id: Uuid,
    pub name: String,
    pub age: i32,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::pharmacy_profiles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PharmacyProfileEntity {
    pub id: i32,
    pub user_id: Uuid,
    pub pharmacy_name: String,
    pub license_number: String,
    pub contact_info: String,
    pub address: String,
    pub operating_hours: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::pharmacy_profiles)]
pub struct CreatePharmacyProfileEntity {
    pub user_id: Uuid,
    pub pharmacy_name: String,
    pub license_number: String,
    pub contact_info: String,
    pub address: String,
    pub operating_hours: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

// Medicines

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::medicines)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MedicineEntity {
    pub id: i32,
    pub seller_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: f32,
    pub stock_quantity: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MedicineEntity {
    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= LOW_STOCK_THRESHOLD
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::medicines)]
pub struct CreateMedicineEntity {
    pub seller_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: f32,
    pub stock_quantity: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

// Carts

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::carts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartEntity {
    pub id: i32,
    pub buyer_id: Uuid,
    pub pharmacy_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::carts)]
pub struct CreateCartEntity {
    pub buyer_id: Uuid,
    pub pharmacy_id: Uuid,
}

#[derive(Queryable, Selectable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::cart_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartItemEntity {
    pub cart_id: i32,
    pub medicine_id: i32,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = crate::schema::cart_items)]
pub struct CreateCartItemEntity {
    pub cart_id: i32,
    pub medicine_id: i32,
    pub quantity: i32,
}

// Orders

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderEntity {
    pub id: i32,
    pub buyer_id: Uuid,
    pub pharmacy_id: Uuid,
    pub status: String,
    pub total_amount: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::orders)]
pub struct CreateOrderEntity {
    pub buyer_id: Uuid,
    pub pharmacy_id: Uuid,
    pub status: String,
    pub total_amount: f32,
}

/// Line item with the medicine name and unit price frozen at order time.
#[derive(Queryable, Selectable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemEntity {
    pub order_id: i32,
    pub medicine_id: i32,
    pub medicine_name: String,
    pub quantity: i32,
    pub unit_price: f32,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::order_items)]
pub struct CreateOrderItemEntity {
    pub order_id: i32,
    pub medicine_id: i32,
    pub medicine_name: String,
    pub quantity: i32,
    pub unit_price: f32,
}

// Receipts

#[derive(Queryable, Selectable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::receipts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReceiptEntity {
    pub id: Uuid,
    pub order_id: i32,
    pub uploaded_by: Uuid,
    pub payment_reference: Option<String>,
    pub file_reference: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::receipts)]
pub struct CreateReceiptEntity {
    pub order_id: i32,
    pub uploaded_by: Uuid,
    pub payment_reference: Option<String>,
    pub file_reference: String,
}

// Notifications

#[derive(Queryable, Selectable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NotificationEntity {
    pub id: i32,
    pub user_id: Uuid,
    pub kind: String,
    pub order_id: Option<i32>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::notifications)]
pub struct CreateNotificationEntity {
    pub user_id: Uuid,
    pub kind: String,
    pub order_id: Option<i32>,
    pub message: String,
}

// Order events

#[derive(Queryable, Selectable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::order_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderEventEntity {
    pub id: i32,
    pub order_id: i32,
    pub actor: String,
    pub action: String,
    pub detail: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::order_events)]
pub struct CreateOrderEventEntity {
    pub order_id: i32,
    pub actor: String,
    pub action: String,
    pub detail: Option<Value>,
}
