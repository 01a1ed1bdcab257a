// src/auth/validators.rs

use super::models::RegisterRequest;
use crate::common::{ValidationResult, Validator};

// ============================================================================
// Registration Validator
// ============================================================================

pub struct RegisterValidator;

impl Validator<RegisterRequest> for RegisterValidator {
    fn validate(&self, data: &RegisterRequest) -> ValidationResult {
        let mut result = ValidationResult::new();

        // Validate username
        if data.username.trim().is_empty() {
            result.add_error("username", "Username is required");
        } else if data.username.len() > 255 {
            result.add_error("username", "Username must be less than 255 characters");
        }

        // Validate email
        if data.email.trim().is_empty() {
            result.add_error("email", "Email is required");
        } else if !data.email.contains('@') {
            result.add_error("email", "Email must be a valid address");
        }

        // Validate password
        if data.password.is_empty() {
            result.add_error("password", "Password is required");
        }

        result
    }
}
