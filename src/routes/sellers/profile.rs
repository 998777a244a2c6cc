use anyhow::Context;
use axum::{Extension, Json, extract::State, response::IntoResponse};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    aliases::DieselError,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::CurrentUser,
    middleware,
    models::PharmacyProfileEntity,
    routes::{non_empty, validate_coordinates},
    schema::pharmacy_profiles,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/sellers/profile",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_profile))
            .routes(utoipa_axum::routes!(update_profile))
            .route_layer(axum::middleware::from_fn(middleware::sellers_authorization)),
    )
}

/// Fetch the authenticated seller's pharmacy profile.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Seller Profile"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Pharmacy profile", body = StdResponse<PharmacyProfileEntity, String>)
    )
)]
async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let profile: PharmacyProfileEntity = match pharmacy_profiles::table
        .filter(pharmacy_profiles::user_id.eq(user.id))
        .get_result(conn)
        .await
    {
        Ok(profile) => profile,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    Ok(StdResponse {
        data: Some(profile),
        message: Some("Get profile successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct UpdatePharmacyProfileReq {
    pub pharmacy_name: String,
    pub contact_info: String,
    pub address: String,
    pub operating_hours: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Replace the pharmacy profile. The license number is fixed at
/// registration and cannot be edited here.
#[utoipa::path(
    put,
    path = "/",
    tags = ["Seller Profile"],
    security(("bearerAuth" = [])),
    request_body = UpdatePharmacyProfileReq,
    responses(
        (status = 200, description = "Profile updated", body = StdResponse<PharmacyProfileEntity, String>)
    )
)]
async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<UpdatePharmacyProfileReq>,
) -> Result<impl IntoResponse, AppError> {
    let pharmacy_name = non_empty("pharmacy_name", &body.pharmacy_name)?;
    let contact_info = non_empty("contact_info", &body.contact_info)?;
    let address = non_empty("address", &body.address)?;
    let operating_hours = non_empty("operating_hours", &body.operating_hours)?;
    validate_coordinates(body.latitude, body.longitude)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let profile = diesel::update(pharmacy_profiles::table)
        .filter(pharmacy_profiles::user_id.eq(user.id))
        .set((
            pharmacy_profiles::pharmacy_name.eq(pharmacy_name),
            pharmacy_profiles::contact_info.eq(contact_info),
            pharmacy_profiles::address.eq(address),
            pharmacy_profiles::operating_hours.eq(operating_hours),
            pharmacy_profiles::latitude.eq(body.latitude),
            pharmacy_profiles::longitude.eq(body.longitude),
            pharmacy_profiles::updated_at.eq(diesel::dsl::now),
        ))
        .returning(PharmacyProfileEntity::as_returning())
        .get_result(conn)
        .await;

    match profile {
        Ok(profile) => Ok(StdResponse {
            data: Some(profile),
            message: Some("Profile updated successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}
