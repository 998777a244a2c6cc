use crate::app_error::AppError;

pub mod admin;
pub mod auth;
pub mod buyers;
pub mod notifications;
pub mod sellers;

pub(crate) fn non_empty(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::ValidationError(format!(
            "{field} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn validate_coordinates(
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<(), AppError> {
    if latitude.is_some() != longitude.is_some() {
        return Err(AppError::ValidationError(
            "latitude and longitude must be provided together".into(),
        ));
    }
    if let Some(latitude) = latitude {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(AppError::ValidationError(
                "latitude must be between -90 and 90".into(),
            ));
        }
    }
    if let Some(longitude) = longitude {
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(AppError::ValidationError(
                "longitude must be between -180 and 180".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_trims_and_rejects_blank() {
        assert_eq!(non_empty("username", "  alice  ").unwrap(), "alice");
        assert!(matches!(
            non_empty("username", "   "),
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            non_empty("username", ""),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn coordinates_must_come_in_pairs() {
        assert!(validate_coordinates(None, None).is_ok());
        assert!(validate_coordinates(Some(13.75), Some(100.5)).is_ok());
        assert!(validate_coordinates(Some(13.75), None).is_err());
        assert!(validate_coordinates(None, Some(100.5)).is_err());
    }

    #[test]
    fn coordinates_must_be_in_range() {
        assert!(validate_coordinates(Some(91.0), Some(0.0)).is_err());
        assert!(validate_coordinates(Some(-91.0), Some(0.0)).is_err());
        assert!(validate_coordinates(Some(0.0), Some(181.0)).is_err());
        assert!(validate_coordinates(Some(0.0), Some(-181.0)).is_err());
        assert!(validate_coordinates(Some(90.0), Some(180.0)).is_ok());
    }
}
