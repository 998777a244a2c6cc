use std::sync::Arc;

use anyhow::Context;
use axum::{Extension, Json, extract::State, response::IntoResponse};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper, result::DatabaseErrorKind};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    aliases::DieselError,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::{CurrentUser, Role, password, token::TokenService},
    middleware,
    models::{
        BuyerProfileEntity, CreateBuyerProfileEntity, CreatePharmacyProfileEntity,
        CreateUserEntity, PharmacyProfileEntity, UserEntity, UserPublicEntity,
    },
    schema::{buyer_profiles, pharmacy_profiles, users},
};

use super::{non_empty, validate_coordinates};

/// Account registration, login and identity routes. Registration and login
/// are the only unauthenticated endpoints in the service.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    let public = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(register_buyer))
        .routes(utoipa_axum::routes!(register_seller))
        .routes(utoipa_axum::routes!(login));
    let protected = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(me))
        .routes(utoipa_axum::routes!(logout))
        .route_layer(axum::middleware::from_fn(middleware::users_authorization));
    OpenApiRouter::new().nest("/auth", public.merge(protected))
}

fn conflict_on_unique(message: &'static str) -> impl Fn(DieselError) -> AppError {
    move |err| match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            AppError::Conflict(message.into())
        }
        other => AppError::Other(other.into()),
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterBuyerReq {
    pub username: String,
    pub password: String,
    pub name: String,
    pub age: i32,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Serialize, ToSchema)]
pub struct RegisterBuyerRes {
    pub user: UserPublicEntity,
    pub profile: BuyerProfileEntity,
}

/// Register a buyer account together with its profile.
#[utoipa::path(
    post,
    path = "/register/buyer",
    tags = ["Auth"],
    request_body = RegisterBuyerReq,
    responses(
        (status = 200, description = "Buyer account created", body = StdResponse<RegisterBuyerRes, String>)
    )
)]
async fn register_buyer(
    State(state): State<AppState>,
    Json(body): Json<RegisterBuyerReq>,
) -> Result<impl IntoResponse, AppError> {
    let RegisterBuyerReq {
        username,
        password,
        name,
        age,
        address,
        latitude,
        longitude,
    } = body;

    let username = non_empty("username", &username)?;
    if password.is_empty() {
        return Err(AppError::ValidationError("password must not be empty".into()));
    }
    let name = non_empty("name", &name)?;
    let address = non_empty("address", &address)?;
    if !(1..=150).contains(&age) {
        return Err(AppError::ValidationError(
            "age must be between 1 and 150".into(),
        ));
    }
    validate_coordinates(latitude, longitude)?;

    let password_hash = password::hash_password(&password)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let (user, profile) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let taken: i64 = users::table
                    .filter(users::username.eq(&username))
                    .count()
                    .get_result(conn)
                    .await
                    .context("Failed to check username availability")?;
                if taken > 0 {
                    return Err(AppError::Conflict("Username is already taken".into()));
                }

                let user: UserPublicEntity = diesel::insert_into(users::table)
                    .values(CreateUserEntity {
                        username,
                        password_hash,
                        role: Role::Buyer.as_str().to_string(),
                        is_profile_complete: true,
                    })
                    .returning(UserPublicEntity::as_returning())
                    .get_result(conn)
                    .await
                    .map_err(conflict_on_unique("Username is already taken"))?;

                let profile: BuyerProfileEntity = diesel::insert_into(buyer_profiles::table)
                    .values(CreateBuyerProfileEntity {
                        user_id: user.id,
                        name,
                        age,
                        address,
                        latitude,
                        longitude,
                    })
                    .returning(BuyerProfileEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create buyer profile")?;

                Ok::<(UserPublicEntity, BuyerProfileEntity), AppError>((user, profile))
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(RegisterBuyerRes { user, profile }),
        message: Some("Buyer account created successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterSellerReq {
    pub username: String,
    pub password: String,
    pub pharmacy_name: String,
    pub license_number: String,
    pub contact_info: String,
    pub address: String,
    pub operating_hours: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Serialize, ToSchema)]
pub struct RegisterSellerRes {
    pub user: UserPublicEntity,
    pub profile: PharmacyProfileEntity,
}

/// Register a seller account together with its pharmacy profile. License
/// numbers are unique across pharmacies.
#[utoipa::path(
    post,
    path = "/register/seller",
    tags = ["Auth"],
    request_body = RegisterSellerReq,
    responses(
        (status = 200, description = "Seller account created", body = StdResponse<RegisterSellerRes, String>)
    )
)]
async fn register_seller(
    State(state): State<AppState>,
    Json(body): Json<RegisterSellerReq>,
) -> Result<impl IntoResponse, AppError> {
    let RegisterSellerReq {
        username,
        password,
        pharmacy_name,
        license_number,
        contact_info,
        address,
        operating_hours,
        latitude,
        longitude,
    } = body;

    let username = non_empty("username", &username)?;
    if password.is_empty() {
        return Err(AppError::ValidationError("password must not be empty".into()));
    }
    let pharmacy_name = non_empty("pharmacy_name", &pharmacy_name)?;
    let license_number = non_empty("license_number", &license_number)?;
    let contact_info = non_empty("contact_info", &contact_info)?;
    let address = non_empty("address", &address)?;
    let operating_hours = non_empty("operating_hours", &operating_hours)?;
    validate_coordinates(latitude, longitude)?;

    let password_hash = password::hash_password(&password)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let (user, profile) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let taken: i64 = users::table
                    .filter(users::username.eq(&username))
                    .count()
                    .get_result(conn)
                    .await
                    .context("Failed to check username availability")?;
                if taken > 0 {
                    return Err(AppError::Conflict("Username is already taken".into()));
                }

                let licensed: i64 = pharmacy_profiles::table
                    .filter(pharmacy_profiles::license_number.eq(&license_number))
                    .count()
                    .get_result(conn)
                    .await
                    .context("Failed to check license availability")?;
                if licensed > 0 {
                    return Err(AppError::Conflict(
                        "License number is already registered".into(),
                    ));
                }

                let user: UserPublicEntity = diesel::insert_into(users::table)
                    .values(CreateUserEntity {
                        username,
                        password_hash,
                        role: Role::Seller.as_str().to_string(),
                        is_profile_complete: true,
                    })
                    .returning(UserPublicEntity::as_returning())
                    .get_result(conn)
                    .await
                    .map_err(conflict_on_unique("Username is already taken"))?;

                let profile: PharmacyProfileEntity =
                    diesel::insert_into(pharmacy_profiles::table)
                        .values(CreatePharmacyProfileEntity {
                            user_id: user.id,
                            pharmacy_name,
                            license_number,
                            contact_info,
                            address,
                            operating_hours,
                            latitude,
                            longitude,
                        })
                        .returning(PharmacyProfileEntity::as_returning())
                        .get_result(conn)
                        .await
                        .map_err(conflict_on_unique("License number is already registered"))?;

                Ok::<(UserPublicEntity, PharmacyProfileEntity), AppError>((user, profile))
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(RegisterSellerRes { user, profile }),
        message: Some("Seller account created successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct LoginReq {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginRes {
    pub token: String,
    pub user_id: Uuid,
    pub role: Role,
    pub is_profile_complete: bool,
}

/// Exchange credentials for a bearer token. Unknown usernames and wrong
/// passwords get the same refusal.
#[utoipa::path(
    post,
    path = "/login",
    tags = ["Auth"],
    request_body = LoginReq,
    responses(
        (status = 200, description = "Logged in", body = StdResponse<LoginRes, String>),
        (status = 401, description = "Invalid credentials")
    )
)]
async fn login(
    State(state): State<AppState>,
    Extension(tokens): Extension<Arc<TokenService>>,
    Json(body): Json<LoginReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user: UserEntity = match users::table
        .filter(users::username.eq(body.username.trim()))
        .get_result(conn)
        .await
    {
        Ok(user) => user,
        Err(DieselError::NotFound) => return Err(AppError::InvalidCredentials),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    if !password::verify_password(&body.password, &user.password_hash)? {
        return Err(AppError::InvalidCredentials);
    }

    let role = Role::parse(&user.role).ok_or_else(|| {
        AppError::Other(anyhow::anyhow!(
            "User {} has unknown role '{}'",
            user.id,
            user.role
        ))
    })?;
    let token = tokens.issue(user.id, role)?;

    Ok(StdResponse {
        data: Some(LoginRes {
            token,
            user_id: user.id,
            role,
            is_profile_complete: user.is_profile_complete,
        }),
        message: Some("Logged in successfully"),
    })
}

/// Who am I. Clients use the role to pick which dashboard to load.
#[utoipa::path(
    get,
    path = "/me",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Authenticated identity", body = StdResponse<UserPublicEntity, String>)
    )
)]
async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let row: UserPublicEntity = match users::table
        .find(user.id)
        .select(UserPublicEntity::as_select())
        .get_result(conn)
        .await
    {
        Ok(row) => row,
        // A token can outlive its account; treat it as no longer valid.
        Err(DieselError::NotFound) => return Err(AppError::InvalidToken),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    Ok(StdResponse {
        data: Some(row),
        message: Some("Fetched identity successfully"),
    })
}

/// Tokens are stateless, so logout is an acknowledgement; the client drops
/// the token.
#[utoipa::path(
    post,
    path = "/logout",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Logged out", body = StdResponse<String, String>)
    )
)]
async fn logout(Extension(user): Extension<CurrentUser>) -> Result<impl IntoResponse, AppError> {
    tracing::debug!("User {} logged out", user.id);
    Ok(StdResponse::<String, _> {
        data: None,
        message: Some("Logged out successfully"),
    })
}
