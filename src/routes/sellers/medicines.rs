use anyhow::Context;
use axum::{
    Extension,
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
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
    models::{CreateMedicineEntity, MedicineEntity},
    routes::non_empty,
    schema::medicines,
    search,
};

/// Seller inventory management. Stock levels are set at creation and then
/// only move through order payments; edits to a listing never touch the
/// remaining stock.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/sellers/medicines",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_my_medicines))
            .routes(utoipa_axum::routes!(create_medicine))
            .routes(utoipa_axum::routes!(get_medicine))
            .routes(utoipa_axum::routes!(update_medicine))
            .routes(utoipa_axum::routes!(delete_medicine))
            .route_layer(axum::middleware::from_fn(middleware::sellers_authorization)),
    )
}

#[derive(Deserialize)]
pub struct InventoryQuery {
    pub search: Option<String>,
}

/// One inventory row with its restock hint.
#[derive(Serialize, ToSchema)]
pub struct InventoryMedicine {
    pub medicine: MedicineEntity,
    pub is_low_stock: bool,
}

fn validate_price(price: f32) -> Result<(), AppError> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::ValidationError(
            "price must be zero or greater".into(),
        ));
    }
    Ok(())
}

fn validate_expiry(expires_at: Option<DateTime<Utc>>) -> Result<(), AppError> {
    if let Some(expires_at) = expires_at {
        if expires_at <= Utc::now() {
            return Err(AppError::ValidationError(
                "expires_at must be in the future".into(),
            ));
        }
    }
    Ok(())
}

/// List the seller's own listings, including expired and out-of-stock ones.
/// Each row carries a low-stock flag so the client can highlight what needs
/// restocking.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Seller Medicines"],
    security(("bearerAuth" = [])),
    params(
        ("search" = Option<String>, Query, description = "Match against medicine names and descriptions")
    ),
    responses(
        (status = 200, description = "My medicines", body = StdResponse<Vec<InventoryMedicine>, String>)
    )
)]
async fn get_my_medicines(
    Query(params): Query<InventoryQuery>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let rows: Vec<MedicineEntity> = medicines::table
        .filter(medicines::seller_id.eq(user.id))
        .order(medicines::id.asc())
        .get_results(conn)
        .await
        .context("Failed to get my medicines")?;
    let rows: Vec<InventoryMedicine> =
        search::filter_medicines(rows, params.search.as_deref().unwrap_or(""))
            .into_iter()
            .map(|medicine| InventoryMedicine {
                is_low_stock: medicine.is_low_stock(),
                medicine,
            })
            .collect();

    Ok(StdResponse {
        data: Some(rows),
        message: Some("Get my medicines successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct CreateMedicineReq {
    pub name: String,
    pub description: Option<String>,
    pub price: f32,
    pub stock_quantity: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Add a medicine to the seller's inventory.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Seller Medicines"],
    security(("bearerAuth" = [])),
    request_body = CreateMedicineReq,
    responses(
        (status = 200, description = "Medicine created", body = StdResponse<MedicineEntity, String>)
    )
)]
async fn create_medicine(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateMedicineReq>,
) -> Result<impl IntoResponse, AppError> {
    let name = non_empty("name", &body.name)?;
    validate_price(body.price)?;
    if body.stock_quantity < 0 {
        return Err(AppError::ValidationError(
            "stock_quantity must be zero or greater".into(),
        ));
    }
    validate_expiry(body.expires_at)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let medicine: MedicineEntity = diesel::insert_into(medicines::table)
        .values(CreateMedicineEntity {
            seller_id: user.id,
            name,
            description: body.description,
            price: body.price,
            stock_quantity: body.stock_quantity,
            expires_at: body.expires_at,
        })
        .returning(MedicineEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create medicine")?;

    Ok(StdResponse {
        data: Some(medicine),
        message: Some("Medicine created successfully"),
    })
}

/// Fetch one of the seller's own listings.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Seller Medicines"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Medicine ID to fetch")
    ),
    responses(
        (status = 200, description = "Medicine found", body = StdResponse<MedicineEntity, String>)
    )
)]
async fn get_medicine(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let medicine: MedicineEntity = match medicines::table
        .find(id)
        .filter(medicines::seller_id.eq(user.id))
        .get_result(conn)
        .await
    {
        Ok(medicine) => medicine,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    Ok(StdResponse {
        data: Some(medicine),
        message: Some("Get medicine successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateMedicineReq {
    pub name: String,
    pub description: Option<String>,
    pub price: f32,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Edit a listing's details. Stock is deliberately absent from the request
/// body; it only changes when orders are paid.
#[utoipa::path(
    put,
    path = "/{id}",
    tags = ["Seller Medicines"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Medicine ID to update")
    ),
    request_body = UpdateMedicineReq,
    responses(
        (status = 200, description = "Medicine updated", body = StdResponse<MedicineEntity, String>)
    )
)]
async fn update_medicine(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<UpdateMedicineReq>,
) -> Result<impl IntoResponse, AppError> {
    let name = non_empty("name", &body.name)?;
    validate_price(body.price)?;
    validate_expiry(body.expires_at)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let medicine = diesel::update(medicines::table.find(id))
        .filter(medicines::seller_id.eq(user.id))
        .set((
            medicines::name.eq(name),
            medicines::description.eq(body.description),
            medicines::price.eq(body.price),
            medicines::expires_at.eq(body.expires_at),
            medicines::updated_at.eq(diesel::dsl::now),
        ))
        .returning(MedicineEntity::as_returning())
        .get_result(conn)
        .await;

    match medicine {
        Ok(medicine) => Ok(StdResponse {
            data: Some(medicine),
            message: Some("Medicine updated successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

/// Remove a listing. Past order lines keep their snapshots, so history
/// survives the deletion.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Seller Medicines"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Medicine ID to delete")
    ),
    responses(
        (status = 200, description = "Medicine deleted", body = StdResponse<MedicineEntity, String>)
    )
)]
async fn delete_medicine(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let medicine = diesel::delete(medicines::table.find(id))
        .filter(medicines::seller_id.eq(user.id))
        .returning(MedicineEntity::as_returning())
        .get_result(conn)
        .await;

    match medicine {
        Ok(medicine) => Ok(StdResponse {
            data: Some(medicine),
            message: Some("Medicine deleted successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn negative_and_non_finite_prices_are_rejected() {
        assert!(validate_price(0.0).is_ok());
        assert!(validate_price(12.5).is_ok());
        assert!(validate_price(-0.01).is_err());
        assert!(validate_price(f32::NAN).is_err());
        assert!(validate_price(f32::INFINITY).is_err());
    }

    #[test]
    fn expiry_must_be_in_the_future() {
        assert!(validate_expiry(None).is_ok());
        assert!(validate_expiry(Some(Utc::now() + Duration::days(30))).is_ok());
        assert!(validate_expiry(Some(Utc::now() - Duration::days(1))).is_err());
    }
}
