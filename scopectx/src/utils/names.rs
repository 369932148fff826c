//! Identifier helpers.

use uuid::Uuid;

/// Generates a new UUID v4.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Returns `"{prefix}-{uuid}"`, a name that will not collide with other
/// scopes in the same registry.
#[must_use]
pub fn generate_scope_name(prefix: &str) -> String {
    format!("{prefix}-{}", generate_uuid())
}
