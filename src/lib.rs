pub mod aliases;
pub mod app_error;
pub mod app_state;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod geo;
pub mod inventory;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod orders;
pub mod routes;
pub mod schema;
pub mod search;
pub mod seed;
pub mod swagger;
