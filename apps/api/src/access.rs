use std::collections::HashSet;

use uuid::Uuid;

use crate::errors::AppError;

/// Grants beyond a user's own data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Read any user's doses and adherence summaries.
    ViewAnyUser,
}

/// Capability grants injected from configuration (`ADMIN_USER_IDS`).
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    admins: HashSet<Uuid>,
}

impl AccessPolicy {
    pub fn new(admins: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }

    pub fn has(&self, user_id: Uuid, capability: Capability) -> bool {
        match capability {
            Capability::ViewAnyUser => self.admins.contains(&user_id),
        }
    }

    /// Allows `caller` to read `subject`'s data.
    pub fn authorize_read(&self, caller: Uuid, subject: Uuid) -> Result<(), AppError> {
        if caller == subject || self.has(caller, Capability::ViewAnyUser) {
            Ok(())
        } else {
            tracing::warn!("User {caller} denied read access to user {subject}");
            Err(AppError::Forbidden)
        }
    }
}
