use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    SubmitOwnAvailability,
    ViewOwnSchedule,

    ManageWorkers,
    ManageShifts,
    ViewAllAvailability,
    GenerateSchedules,
    PublishSchedules,
    DeleteSchedules,
    ViewDraftSchedules,
    ViewReports,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Worker,
    Admin,
}

static WORKER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::SubmitOwnAvailability);
    permissions.insert(Permission::ViewOwnSchedule);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(WORKER_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageWorkers);
    permissions.insert(Permission::ManageShifts);
    permissions.insert(Permission::ViewAllAvailability);
    permissions.insert(Permission::GenerateSchedules);
    permissions.insert(Permission::PublishSchedules);
    permissions.insert(Permission::DeleteSchedules);
    permissions.insert(Permission::ViewDraftSchedules);
    permissions.insert(Permission::ViewReports);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Worker => &WORKER_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Worker => "worker",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, AppError> {
        match s {
            "worker" => Ok(Role::Worker),
            "admin" => Ok(Role::Admin),
            _ => Err(AppError::Validation(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
