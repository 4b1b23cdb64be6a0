//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::state::simulation::ACCESS_CODE_LEN;

/// Validates a `#RRGGBB` colour.
///
/// # Examples
///
/// ```ignore
/// validate_color_hex("#1a2B3c") // Ok
/// validate_color_hex("1a2b3c")  // Err - missing '#'
/// validate_color_hex("#abc")    // Err - short form
/// ```
pub fn validate_color_hex(value: &str) -> Result<(), ValidationError> {
    let Some(digits) = value.strip_prefix('#') else {
        let mut err = ValidationError::new("color_hex_prefix");
        err.message = Some("Colour must start with '#'".into());
        return Err(err);
    };

    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        let mut err = ValidationError::new("color_hex_format");
        err.message = Some(format!("Colour must be #RRGGBB (got {value})").into());
        return Err(err);
    }

    Ok(())
}

/// Validates an emblem or avatar reference.
///
/// Only `http(s)` links and site-relative paths are accepted; inline `data:`
/// payloads are refused because assets are not uploaded through this API.
pub fn validate_asset_url(value: &str) -> Result<(), ValidationError> {
    let lower = value.trim().to_ascii_lowercase();
    if lower.starts_with("data:") {
        let mut err = ValidationError::new("asset_url_inline");
        err.message = Some("Inline data URLs are not accepted".into());
        return Err(err);
    }

    if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with('/') {
        Ok(())
    } else {
        let mut err = ValidationError::new("asset_url_scheme");
        err.message = Some("Asset URL must be http(s) or start with '/'".into());
        Err(err)
    }
}

/// Validates a participant access code (8 letters or digits, any case).
pub fn validate_access_code(code: &str) -> Result<(), ValidationError> {
    let code = code.trim();
    if code.len() != ACCESS_CODE_LEN || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("access_code_format");
        err.message = Some(
            format!("Access code must be {ACCESS_CODE_LEN} letters or digits").into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Rejects strings made only of whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}
