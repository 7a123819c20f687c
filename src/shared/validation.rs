//! Validation Utilities

use validator::{ValidationError, ValidationErrors};

use super::error::AppError;

/// Convert validation errors to AppError
pub fn validation_error(errors: ValidationErrors) -> AppError {
    let message = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let msg = e.message.clone().map(|m| m.to_string()).unwrap_or_default();
                format!("{}: {}", field, msg)
            })
        })
        .next()
        .unwrap_or_else(|| "Validation failed".into());

    AppError::Validation(message)
}

/// Validator for the user ID lists carried by inbound frames
pub fn validate_user_ids(ids: &[String]) -> Result<(), ValidationError> {
    if ids.iter().any(|id| id.is_empty() || id.len() > 31) {
        let mut err = ValidationError::new("user_id");
        err.message = Some("user IDs must be 1 to 31 characters".into());
        return Err(err);
    }
    Ok(())
}

/// Validator for chat themes: valid JSON, at most 4095 bytes
pub fn validate_theme(theme: &str) -> Result<(), ValidationError> {
    if theme.len() > 4095 || serde_json::from_str::<serde_json::Value>(theme).is_err() {
        let mut err = ValidationError::new("theme");
        err.message = Some("theme must be a JSON document of at most 4095 bytes".into());
        return Err(err);
    }
    Ok(())
}
