use std::{cmp::Ordering, collections::HashMap};

use anyhow::Context;
use axum::{
    Extension,
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use diesel::{
    BoolExpressionMethods, ExpressionMethods, OptionalExtension, QueryDsl, dsl::count_star,
};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::CurrentUser,
    geo, middleware,
    models::PharmacyProfileEntity,
    schema::{buyer_profiles, medicines, pharmacy_profiles},
};

/// Pharmacy directory for buyers. Entries carry how many medicines the
/// pharmacy currently offers and, when both sides have shared coordinates,
/// the distance to the buyer.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/buyers/pharmacies",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(list_pharmacies))
            .route_layer(axum::middleware::from_fn(middleware::buyers_authorization)),
    )
}

#[derive(Deserialize)]
pub struct DirectoryQuery {
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PharmacyDirectoryEntry {
    pub profile: PharmacyProfileEntity,
    pub medicine_count: i64,
    pub distance_km: Option<f64>,
}

/// Nearest pharmacies first; ones without coordinates trail in name order.
fn sort_entries(entries: &mut [PharmacyDirectoryEntry]) {
    entries.sort_by(|a, b| match (a.distance_km, b.distance_km) {
        (Some(a_km), Some(b_km)) => a_km.partial_cmp(&b_km).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.profile.pharmacy_name.cmp(&b.profile.pharmacy_name),
    });
}

/// List registered pharmacies, sorted by distance to the buyer when known.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Buyer Catalog"],
    security(("bearerAuth" = [])),
    params(
        ("search" = Option<String>, Query, description = "Match against pharmacy names and addresses")
    ),
    responses(
        (status = 200, description = "Pharmacy directory", body = StdResponse<Vec<PharmacyDirectoryEntry>, String>)
    )
)]
async fn list_pharmacies(
    Query(params): Query<DirectoryQuery>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let profiles: Vec<PharmacyProfileEntity> = pharmacy_profiles::table
        .order(pharmacy_profiles::pharmacy_name.asc())
        .get_results(conn)
        .await
        .context("Failed to get pharmacy profiles")?;

    let counts: HashMap<Uuid, i64> = medicines::table
        .filter(medicines::stock_quantity.gt(0))
        .filter(
            medicines::expires_at
                .is_null()
                .or(medicines::expires_at.gt(Utc::now())),
        )
        .group_by(medicines::seller_id)
        .select((medicines::seller_id, count_star()))
        .get_results::<(Uuid, i64)>(conn)
        .await
        .context("Failed to count medicines per pharmacy")?
        .into_iter()
        .collect();

    let buyer_coords: Option<(f64, f64)> = match buyer_profiles::table
        .filter(buyer_profiles::user_id.eq(user.id))
        .select((buyer_profiles::latitude, buyer_profiles::longitude))
        .get_result::<(Option<f64>, Option<f64>)>(conn)
        .await
        .optional()
        .context("Failed to get buyer coordinates")?
    {
        Some((Some(lat), Some(lng))) => Some((lat, lng)),
        _ => None,
    };

    let needle = params
        .search
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_lowercase();
    let mut entries: Vec<PharmacyDirectoryEntry> = profiles
        .into_iter()
        .filter(|profile| {
            needle.is_empty()
                || profile.pharmacy_name.to_lowercase().contains(&needle)
                || profile.address.to_lowercase().contains(&needle)
        })
        .map(|profile| {
            let medicine_count = counts.get(&profile.user_id).copied().unwrap_or(0);
            let distance_km = match (buyer_coords, profile.latitude, profile.longitude) {
                (Some((buyer_lat, buyer_lng)), Some(lat), Some(lng)) => {
                    Some(geo::equirectangular_distance_km(
                        buyer_lat, buyer_lng, lat, lng,
                    ))
                }
                _ => None,
            };
            PharmacyDirectoryEntry {
                profile,
                medicine_count,
                distance_km,
            }
        })
        .collect();
    sort_entries(&mut entries);

    Ok(StdResponse {
        data: Some(entries),
        message: Some("Get pharmacies successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, distance_km: Option<f64>) -> PharmacyDirectoryEntry {
        let now = Utc::now();
        PharmacyDirectoryEntry {
            profile: PharmacyProfileEntity {
                id: 1,
                user_id: Uuid::new_v4(),
                pharmacy_name: name.to_string(),
                license_number: format!("LIC-{name}"),
                contact_info: "02-000-0000".to_string(),
                address: "Bangkok".to_string(),
                operating_hours: "9:00-18:00".to_string(),
                latitude: None,
                longitude: None,
                created_at: now,
                updated_at: now,
            },
            medicine_count: 0,
            distance_km,
        }
    }

    fn names(entries: &[PharmacyDirectoryEntry]) -> Vec<&str> {
        entries
            .iter()
            .map(|e| e.profile.pharmacy_name.as_str())
            .collect()
    }

    #[test]
    fn nearest_pharmacy_sorts_first() {
        let mut entries = vec![
            entry("Far", Some(12.5)),
            entry("Near", Some(0.7)),
            entry("Middle", Some(3.1)),
        ];
        sort_entries(&mut entries);
        assert_eq!(names(&entries), vec!["Near", "Middle", "Far"]);
    }

    #[test]
    fn unknown_distance_trails_in_name_order() {
        let mut entries = vec![
            entry("Zeta", None),
            entry("Near", Some(0.7)),
            entry("Alpha", None),
        ];
        sort_entries(&mut entries);
        assert_eq!(names(&entries), vec!["Near", "Alpha", "Zeta"]);
    }
}
