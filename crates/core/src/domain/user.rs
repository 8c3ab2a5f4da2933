use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompanyId(pub String);

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Employee,
    Manager,
    Admin,
}

impl Role {
    /// Managers and admins form the approver roster of a company.
    pub fn can_approve(self) -> bool {
        matches!(self, Self::Manager | Self::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "employee" => Ok(Self::Employee),
            "manager" => Ok(Self::Manager),
            "admin" => Ok(Self::Admin),
            other => Err(DomainError::InvariantViolation(format!("unknown role `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub company_id: CompanyId,
    pub full_name: String,
    pub role: Role,
    pub manager_id: Option<UserId>,
}

impl User {
    pub fn is_approver(&self) -> bool {
        self.role.can_approve()
    }
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn only_managers_and_admins_can_approve() {
        assert!(!Role::Employee.can_approve());
        assert!(Role::Manager.can_approve());
        assert!(Role::Admin.can_approve());
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!(" Manager ".parse::<Role>().expect("role"), Role::Manager);
        assert!("cfo".parse::<Role>().is_err());
    }
}
