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
    models::BuyerProfileEntity,
    routes::{non_empty, validate_coordinates},
    schema::buyer_profiles,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/buyers/profile",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_profile))
            .routes(utoipa_axum::routes!(update_profile))
            .route_layer(axum::middleware::from_fn(middleware::buyers_authorization)),
    )
}

/// Fetch the authenticated buyer's profile.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Buyer Profile"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Buyer profile", body = StdResponse<BuyerProfileEntity, String>)
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

    let profile: BuyerProfileEntity = match buyer_profiles::table
        .filter(buyer_profiles::user_id.eq(user.id))
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
pub struct UpdateBuyerProfileReq {
    pub name: String,
    pub age: i32,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Replace the buyer's profile. Coordinates are optional but must come as a
/// pair; dropping them removes the stored location.
#[utoipa::path(
    put,
    path = "/",
    tags = ["Buyer Profile"],
    security(("bearerAuth" = [])),
    request_body = UpdateBuyerProfileReq,
    responses(
        (status = 200, description = "Profile updated", body = StdResponse<BuyerProfileEntity, String>)
    )
)]
async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<UpdateBuyerProfileReq>,
) -> Result<impl IntoResponse, AppError> {
    let name = non_empty("name", &body.name)?;
    let address = non_empty("address", &body.address)?;
    if !(1..=150).contains(&body.age) {
        return Err(AppError::ValidationError(
            "age must be between 1 and 150".into(),
        ));
    }
    validate_coordinates(body.latitude, body.longitude)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let profile = diesel::update(buyer_profiles::table)
        .filter(buyer_profiles::user_id.eq(user.id))
        .set((
            buyer_profiles::name.eq(name),
            buyer_profiles::age.eq(body.age),
            buyer_profiles::address.eq(address),
            buyer_profiles::latitude.eq(body.latitude),
            buyer_profiles::longitude.eq(body.longitude),
            buyer_profiles::updated_at.eq(diesel::dsl::now),
        ))
        .returning(BuyerProfileEntity::as_returning())
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
