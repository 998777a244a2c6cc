use crate::aliases::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
}
