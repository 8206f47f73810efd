// # Domain Handlers
//
// The collaborative application's entities. Every handler here is a thin
// consumer of the write pipeline: it performs its SQL inside the pipeline's
// transaction, describes the post-state in journal drafts, and returns the
// canonical entity. The sync engine itself knows nothing about these
// tables; payloads are opaque to it.

pub mod cards;
pub mod columns;
pub mod orders;
pub mod products;
pub mod projects;

/// Server-owned timestamp for created_at/updated_at columns.
pub(crate) fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Reject empty or whitespace-only required text fields.
pub(crate) fn require_text(value: &str, field: &str) -> crate::error::Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(crate::error::SyncError::InvalidInput(format!(
            "{field} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}
