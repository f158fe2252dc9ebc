//! Template and Item services: validation and orchestration sitting atop
//! the storage contract, keeping field validation and transactional
//! branching (content-only update vs. pattern change, plain edit vs.
//! exception protocol) out of the repository layer itself.

pub mod item_service;
pub mod template_service;

pub use item_service::ItemService;
pub use template_service::TemplateService;

use crate::error::CoreError;

pub(crate) fn validate_title(title: &str) -> Result<String, CoreError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(CoreError::invalid("title must not be empty"));
    }
    if trimmed.chars().count() > 255 {
        return Err(CoreError::invalid("title must be at most 255 characters"));
    }
    Ok(trimmed.to_string())
}
