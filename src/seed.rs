use anyhow::{Context, Result, bail};
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;

use crate::{
    aliases::DbPool,
    auth::{Role, password},
    config::SeedConfig,
    models::CreateUserEntity,
    schema::users,
};

/// Makes sure the configured admin account exists. Admin accounts are never
/// self-registered, so a fresh database gets exactly one from here. Requires
/// `ADMIN_PASSWORD` on first run; afterwards the variable can be dropped.
pub async fn ensure_admin(pool: &DbPool, seed: &SeedConfig) -> Result<()> {
    let conn = &mut pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let existing: i64 = users::table
        .filter(users::username.eq(&seed.admin_username))
        .count()
        .get_result(conn)
        .await
        .context("Failed to look up the admin account")?;
    if existing > 0 {
        tracing::debug!("Admin account '{}' already present", seed.admin_username);
        return Ok(());
    }

    let Some(admin_password) = seed.admin_password.as_deref() else {
        bail!(
            "No '{}' account exists and ADMIN_PASSWORD is not set; refusing to start without an admin",
            seed.admin_username
        );
    };

    let password_hash = password::hash_password(admin_password)?;
    diesel::insert_into(users::table)
        .values(CreateUserEntity {
            username: seed.admin_username.clone(),
            password_hash,
            role: Role::Admin.as_str().to_string(),
            is_profile_complete: true,
        })
        .execute(conn)
        .await
        .context("Failed to seed the admin account")?;

    tracing::info!("Seeded admin account '{}'", seed.admin_username);
    Ok(())
}
