/// Domain-level error shared by every crate in the workspace.
///
/// Transport layers map each variant onto their own status codes; see
/// `emoti_api::error::AppError`.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}
