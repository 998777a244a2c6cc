use std::collections::HashMap;

use anyhow::Context;
use axum::{
    Extension,
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use diesel::{BoolExpressionMethods, ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware,
    models::MedicineEntity,
    schema::{medicines, pharmacy_profiles},
    search,
};

/// The buyer-facing catalog. Only medicines that can actually be ordered
/// show up here: in stock and not past their expiry date.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/buyers/medicines",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(browse_catalog))
            .route_layer(axum::middleware::from_fn(middleware::buyers_authorization)),
    )
}

#[derive(Deserialize)]
pub struct CatalogQuery {
    pub search: Option<String>,
    pub pharmacy_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct CatalogMedicine {
    pub medicine: MedicineEntity,
    pub pharmacy_name: String,
}

/// Browse available medicines across all pharmacies, optionally narrowed to
/// one pharmacy or matched against a search term.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Buyer Catalog"],
    security(("bearerAuth" = [])),
    params(
        ("search" = Option<String>, Query, description = "Match against medicine names and descriptions"),
        ("pharmacy_id" = Option<Uuid>, Query, description = "Limit results to a single pharmacy")
    ),
    responses(
        (status = 200, description = "Available medicines", body = StdResponse<Vec<CatalogMedicine>, String>)
    )
)]
async fn browse_catalog(
    Query(params): Query<CatalogQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let now = Utc::now();
    let mut query = medicines::table
        .filter(medicines::stock_quantity.gt(0))
        .filter(
            medicines::expires_at
                .is_null()
                .or(medicines::expires_at.gt(now)),
        )
        .into_boxed();
    if let Some(pharmacy_id) = params.pharmacy_id {
        query = query.filter(medicines::seller_id.eq(pharmacy_id));
    }

    let rows: Vec<MedicineEntity> = query
        .order(medicines::id.asc())
        .get_results(conn)
        .await
        .context("Failed to get catalog medicines")?;
    let rows = search::filter_medicines(rows, params.search.as_deref().unwrap_or(""));

    let pharmacy_names: HashMap<Uuid, String> = pharmacy_profiles::table
        .select((pharmacy_profiles::user_id, pharmacy_profiles::pharmacy_name))
        .get_results::<(Uuid, String)>(conn)
        .await
        .context("Failed to get pharmacy names")?
        .into_iter()
        .collect();

    let catalog: Vec<CatalogMedicine> = rows
        .into_iter()
        .map(|medicine| {
            let pharmacy_name = pharmacy_names
                .get(&medicine.seller_id)
                .cloned()
                .unwrap_or_else(|| "(unknown pharmacy)".to_string());
            CatalogMedicine {
                medicine,
                pharmacy_name,
            }
        })
        .collect();

    Ok(StdResponse {
        data: Some(catalog),
        message: Some("Get medicines successfully"),
    })
}
