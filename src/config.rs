use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub seed: SeedConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

/// Seed credentials for the initial admin account. The password is optional
/// so that an already-seeded deployment can drop it from the environment.
#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub admin_username: String,
    pub admin_password: Option<String>,
}

/// Reads the full service configuration from the environment.
pub fn load() -> Result<Config> {
    Ok(Config {
        server: ServerConfig {
            port: var_or("PORT", "3000")
                .parse()
                .context("PORT must be a valid port number")?,
        },
        database: DatabaseConfig {
            url: required_var("DATABASE_URL")?,
        },
        auth: AuthConfig {
            jwt_secret: required_var("JWT_SECRET")?,
            token_ttl_hours: var_or("TOKEN_TTL_HOURS", "24")
                .parse()
                .context("TOKEN_TTL_HOURS must be an integer")?,
        },
        seed: SeedConfig {
            admin_username: var_or("ADMIN_USERNAME", "admin"),
            admin_password: std::env::var("ADMIN_PASSWORD").ok(),
        },
    })
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("Missing required environment variable {name}"))
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
