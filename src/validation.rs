// Validation utilities module
// Provides custom validation functions for booking request DTOs

use validator::ValidationError;

/// Longest coupon code accepted from a customer
const MAX_COUPON_CODE_LEN: usize = 64;

/// Validates that a typed coupon code is non-blank and of sane length
pub fn validate_coupon_code(code: &str) -> Result<(), ValidationError> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("coupon_code_blank"));
    }
    if trimmed.len() > MAX_COUPON_CODE_LEN {
        return Err(ValidationError::new("coupon_code_too_long"));
    }
    Ok(())
}

/// Validates that an auth code is made of ASCII letters and digits only
pub fn validate_auth_code(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        Err(ValidationError::new("auth_code_not_alphanumeric"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_coupon_code() {
        assert!(validate_coupon_code("SPRING20").is_ok());
        assert!(validate_coupon_code("").is_err());
        assert!(validate_coupon_code("  ").is_err());
        assert!(validate_coupon_code(&"X".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_auth_code() {
        assert!(validate_auth_code("AB12CD34").is_ok());
        assert!(validate_auth_code("AB12-CD34").is_err());
        assert!(validate_auth_code("").is_err());
    }
}
