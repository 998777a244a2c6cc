use std::sync::Arc;

use anyhow::Result;
use axum::{Extension, Router};
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use pharmatrack::{
    app_state::AppState,
    auth::token::TokenService,
    bootstrap::{self, bootstrap},
    config, db, routes, seed, swagger,
};

/// Migrations are embedded into the binary so a container image can run them
/// at startup without shipping the migration files separately.
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_tracing();
    bootstrap::init_env();

    let config = config::load()?;

    let routes = routes::auth::routes_with_openapi()
        .merge(routes::buyers::medicines::routes_with_openapi())
        .merge(routes::buyers::pharmacies::routes_with_openapi())
        .merge(routes::buyers::carts::routes_with_openapi())
        .merge(routes::buyers::orders::routes_with_openapi())
        .merge(routes::buyers::profile::routes_with_openapi())
        .merge(routes::sellers::medicines::routes_with_openapi())
        .merge(routes::sellers::orders::routes_with_openapi())
        .merge(routes::sellers::dashboard::routes_with_openapi())
        .merge(routes::sellers::profile::routes_with_openapi())
        .merge(routes::notifications::routes_with_openapi())
        .merge(routes::admin::routes_with_openapi());

    let mut openapi = routes.get_openapi().clone();
    openapi.info = utoipa::openapi::InfoBuilder::new()
        .title("PharmaTrack API")
        .version("1.0.0")
        .build();
    let swagger_ui = swagger::create_swagger_ui(openapi)?;

    let tokens = Arc::new(TokenService::new(
        &config.auth.jwt_secret,
        config.auth.token_ttl_hours,
    ));
    let app = Router::new()
        .merge(routes)
        .merge(swagger_ui)
        .layer(Extension(tokens));

    tracing::info!("Running migrations...");
    let migrations_count = db::run_migrations_blocking(MIGRATIONS, &config.database.url).await?;
    tracing::info!("Run {} new migrations successfully", migrations_count);

    let db_pool = db::connect_db(&config.database.url).await?;
    seed::ensure_admin(&db_pool, &config.seed).await?;
    let state = AppState { db_pool };

    tracing::info!("Bootstrapping...");
    bootstrap("PharmaTrack", app, state, config.server.port).await?;
    Ok(())
}
