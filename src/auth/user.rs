use serde::Serialize;

use super::{Permission, Role};
use crate::error::AppError;
use crate::models::{Worker, WorkerId};

/// The worker on whose behalf a request runs, as asserted by the upstream identity system.
#[derive(Debug, Serialize, Clone)]
pub struct Caller {
    pub id: WorkerId,
    pub display_name: String,
    pub role: Role,
}

impl From<Worker> for Caller {
    fn from(worker: Worker) -> Self {
        Self {
            id: worker.id,
            display_name: worker.display_name,
            role: worker.role,
        }
    }
}

impl Caller {
    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                caller_id = %self.id,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::Authorization(format!(
                "{} role may not perform this action",
                self.role
            )))
        }
    }
}
