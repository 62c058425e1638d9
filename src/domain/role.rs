use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{OrganizationId, UserId, ValidationError};

/// Actor role, fixed for the lifetime of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Supplier,
    Ff,
    Driver,
    Warehouse,
    Admin,
    Owner,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Supplier,
        Role::Ff,
        Role::Driver,
        Role::Warehouse,
        Role::Admin,
        Role::Owner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Supplier => "supplier",
            Role::Ff => "ff",
            Role::Driver => "driver",
            Role::Warehouse => "warehouse",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    /// Roles allowed to edit shipment contents through the aggregate editor.
    pub fn can_edit_contents(&self) -> bool {
        matches!(self, Role::Supplier | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownRole(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    pub organization_id: OrganizationId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("manager".parse::<Role>().is_err());
    }

    #[test]
    fn test_only_supplier_and_admin_edit_contents() {
        let editors: Vec<Role> = Role::ALL.into_iter().filter(Role::can_edit_contents).collect();
        assert_eq!(editors, vec![Role::Supplier, Role::Admin]);
    }
}
