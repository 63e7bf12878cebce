//! Solver listener validation
//!
//! Checks that the HTTP-01 solver address can actually be bound.

use super::{ErrorCategory, ValidationError, ValidationResult};
use crate::Config;
use tokio::net::TcpListener;

/// Try to bind the solver address and release it again
pub async fn validate_solver_address(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    if let Err(e) = TcpListener::bind(&config.solver.address).await {
        result.add_error(ValidationError::new(
            ErrorCategory::Network,
            format!(
                "Solver address '{}' cannot be bound: {}",
                config.solver.address, e
            ),
        ));
    }

    result
}
