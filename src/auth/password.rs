use bcrypt::{DEFAULT_COST, hash, verify};

use crate::app_error::AppError;

pub fn hash_password(plain: &str) -> Result<String, AppError> {
    hash(plain, DEFAULT_COST).map_err(|err| AppError::Other(err.into()))
}

/// Returns whether `plain` matches the stored bcrypt hash. Callers map a
/// mismatch to the same error as an unknown username so login failures do
/// not reveal which part was wrong.
pub fn verify_password(plain: &str, hashed: &str) -> Result<bool, AppError> {
    verify(plain, hashed).map_err(|err| AppError::Other(err.into()))
}
