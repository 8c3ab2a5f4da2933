use thiserror::Error;

use crate::domain::decision::Verdict;
use crate::domain::expense::{ExpenseId, ExpenseStatus};
use crate::domain::rule::{RuleConfigError, RuleId};
use crate::domain::user::{CompanyId, UserId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid expense transition from {from:?} to {to:?}")]
    InvalidExpenseTransition { from: ExpenseStatus, to: ExpenseStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failures surfaced by the approval workflow. Every variant is a caller-visible outcome of a
/// single request; none of them is retried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("invalid approval rule: {0}")]
    InvalidRuleConfig(#[from] RuleConfigError),
    #[error("approver `{approver_id}` already decided on expense `{expense_id}`")]
    DuplicateDecision { expense_id: ExpenseId, approver_id: UserId, existing: Verdict },
    #[error("approver `{approver_id}` is not eligible for expense `{expense_id}`: {reason}")]
    IneligibleApprover { expense_id: ExpenseId, approver_id: UserId, reason: String },
    #[error("expense `{expense_id}` is already {status:?}")]
    ExpenseAlreadyFinalized { expense_id: ExpenseId, status: ExpenseStatus },
    #[error("company `{company_id}` has no managers or admins to approve expenses")]
    NoEligibleApprovers { company_id: CompanyId },
    #[error("expense `{0}` was not found")]
    ExpenseNotFound(ExpenseId),
    #[error("user `{0}` was not found")]
    UnknownUser(UserId),
    #[error("approval rule `{0}` was not found")]
    RuleNotFound(RuleId),
    #[error("invalid expense: {0}")]
    InvalidExpense(String),
    #[error("`{actor_id}` may not change `{user_id}`: {reason}")]
    NotAuthorized { actor_id: UserId, user_id: UserId, reason: String },
    #[error("invalid user update for `{user_id}`: {reason}")]
    InvalidUserUpdate { user_id: UserId, reason: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl WorkflowError {
    /// Stable machine-readable code for the failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRuleConfig(_) => "invalid_rule_config",
            Self::DuplicateDecision { .. } => "duplicate_decision",
            Self::IneligibleApprover { .. } => "ineligible_approver",
            Self::ExpenseAlreadyFinalized { .. } => "expense_already_finalized",
            Self::NoEligibleApprovers { .. } => "no_eligible_approvers",
            Self::ExpenseNotFound(_) => "expense_not_found",
            Self::UnknownUser(_) => "unknown_user",
            Self::RuleNotFound(_) => "rule_not_found",
            Self::InvalidExpense(_) => "invalid_expense",
            Self::NotAuthorized { .. } => "not_authorized",
            Self::InvalidUserUpdate { .. } => "invalid_user_update",
            Self::Domain(_) => "invariant_violation",
            Self::Persistence(_) => "persistence",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Workflow(WorkflowError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<WorkflowError> for ApplicationError {
    fn from(value: WorkflowError) -> Self {
        match value {
            WorkflowError::Domain(error) => Self::Domain(error),
            WorkflowError::Persistence(message) => Self::Persistence(message),
            other => Self::Workflow(other),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { code: &'static str, message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { code: &'static str, message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Conflict { .. } => "The expense has changed state. Refresh and try again.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Workflow(
                error @ (WorkflowError::DuplicateDecision { .. }
                | WorkflowError::ExpenseAlreadyFinalized { .. }),
            ) => Self::Conflict {
                code: error.code(),
                message: error.to_string(),
                correlation_id: unassigned(),
            },
            ApplicationError::Workflow(error) => Self::BadRequest {
                code: error.code(),
                message: error.to_string(),
                correlation_id: unassigned(),
            },
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Domain(error) => {
                Self::Internal { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::decision::Verdict;
    use crate::domain::expense::{ExpenseId, ExpenseStatus};
    use crate::domain::user::{CompanyId, UserId};
    use crate::errors::{ApplicationError, DomainError, InterfaceError, WorkflowError};

    #[test]
    fn duplicate_decision_maps_to_conflict_interface_error() {
        let interface = ApplicationError::from(WorkflowError::DuplicateDecision {
            expense_id: ExpenseId("EXP-1".to_owned()),
            approver_id: UserId("u-mgr".to_owned()),
            existing: Verdict::Approved,
        })
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::Conflict {
                code: "duplicate_decision",
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn ineligible_approver_is_a_bad_request_with_user_safe_message() {
        let interface = ApplicationError::from(WorkflowError::IneligibleApprover {
            expense_id: ExpenseId("EXP-2".to_owned()),
            approver_id: UserId("u-emp".to_owned()),
            reason: "role `employee` cannot approve expenses".to_owned(),
        })
        .into_interface("req-2");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { code: "ineligible_approver", .. }
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::from(WorkflowError::Persistence(
            "database lock timeout".to_owned(),
        ))
        .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn invariant_violation_maps_to_internal() {
        let interface = ApplicationError::from(WorkflowError::Domain(
            DomainError::InvariantViolation("duplicate ledger entry".to_owned()),
        ))
        .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            WorkflowError::ExpenseAlreadyFinalized {
                expense_id: ExpenseId("EXP-5".to_owned()),
                status: ExpenseStatus::Approved,
            }
            .code(),
            "expense_already_finalized"
        );
        assert_eq!(
            WorkflowError::NoEligibleApprovers { company_id: CompanyId("acme".to_owned()) }.code(),
            "no_eligible_approvers"
        );
        assert_eq!(
            WorkflowError::NotAuthorized {
                actor_id: UserId("u-mgr".to_owned()),
                user_id: UserId("u-emp".to_owned()),
                reason: "only admins manage users".to_owned(),
            }
            .code(),
            "not_authorized"
        );
    }
}
