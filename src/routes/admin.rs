use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper, dsl::count_star};
use diesel_async::RunQueryDsl;
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    aliases::DieselError,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::{CurrentUser, Role},
    middleware,
    models::{BuyerProfileEntity, PharmacyProfileEntity, UserPublicEntity},
    schema::{buyer_profiles, pharmacy_profiles, users},
};

/// Administration surface: an overview of every account and the ability to
/// remove one. Removal cascades to the user's profile, carts and
/// notifications; orders and their snapshots stay.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/admin",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_dashboard))
            .routes(utoipa_axum::routes!(remove_user))
            .route_layer(axum::middleware::from_fn(middleware::admins_authorization)),
    )
}

#[derive(Serialize, ToSchema)]
pub struct RoleCounts {
    pub admins: i64,
    pub sellers: i64,
    pub buyers: i64,
}

#[derive(Serialize, ToSchema)]
pub struct AdminDashboardRes {
    pub users: Vec<UserPublicEntity>,
    pub role_counts: RoleCounts,
    pub pharmacies: Vec<PharmacyProfileEntity>,
    pub buyers: Vec<BuyerProfileEntity>,
}

/// Everything an administrator sees at once: all accounts, per-role counts
/// and both profile directories.
#[utoipa::path(
    get,
    path = "/dashboard",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Admin dashboard", body = StdResponse<AdminDashboardRes, String>)
    )
)]
async fn get_dashboard(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let all_users: Vec<UserPublicEntity> = users::table
        .select(UserPublicEntity::as_select())
        .order(users::created_at.asc())
        .get_results(conn)
        .await
        .context("Failed to get users")?;

    let counted: Vec<(String, i64)> = users::table
        .group_by(users::role)
        .select((users::role, count_star()))
        .get_results(conn)
        .await
        .context("Failed to count users per role")?;
    let mut role_counts = RoleCounts {
        admins: 0,
        sellers: 0,
        buyers: 0,
    };
    for (role, count) in counted {
        match Role::parse(&role) {
            Some(Role::Admin) => role_counts.admins = count,
            Some(Role::Seller) => role_counts.sellers = count,
            Some(Role::Buyer) => role_counts.buyers = count,
            None => tracing::warn!("Skipping unknown role '{}' in dashboard counts", role),
        }
    }

    let pharmacies: Vec<PharmacyProfileEntity> = pharmacy_profiles::table
        .order(pharmacy_profiles::pharmacy_name.asc())
        .get_results(conn)
        .await
        .context("Failed to get pharmacy profiles")?;

    let buyers: Vec<BuyerProfileEntity> = buyer_profiles::table
        .order(buyer_profiles::name.asc())
        .get_results(conn)
        .await
        .context("Failed to get buyer profiles")?;

    Ok(StdResponse {
        data: Some(AdminDashboardRes {
            users: all_users,
            role_counts,
            pharmacies,
            buyers,
        }),
        message: Some("Get dashboard successfully"),
    })
}

/// Remove an account. Admins cannot remove themselves, so the system always
/// keeps at least the acting admin.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = Uuid, Path, description = "User ID to remove")
    ),
    responses(
        (status = 200, description = "User removed", body = StdResponse<UserPublicEntity, String>)
    )
)]
async fn remove_user(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    if id == user.id {
        return Err(AppError::Conflict(
            "Admins cannot remove their own account".into(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let removed = diesel::delete(users::table.find(id))
        .returning(UserPublicEntity::as_returning())
        .get_result(conn)
        .await;

    match removed {
        Ok(removed) => {
            tracing::info!("Admin {} removed user {}", user.id, removed.id);
            Ok(StdResponse {
                data: Some(removed),
                message: Some("User removed successfully"),
            })
        }
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}
