use serde::{Deserialize, Serialize};

use crate::domain::user::{CompanyId, Role, User, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EligibilityFailure {
    RoleCannotApprove { approver_id: UserId, role: Role },
    DifferentCompany {
        approver_id: UserId,
        approver_company: CompanyId,
        expense_company: CompanyId,
    },
    SelfApproval { approver_id: UserId },
}

impl EligibilityFailure {
    pub fn reason(&self) -> String {
        match self {
            Self::RoleCannotApprove { approver_id, role } => {
                let role = role.as_str();
                format!("`{approver_id}` has role `{role}` which cannot approve expenses")
            }
            Self::DifferentCompany { approver_id, approver_company, expense_company } => {
                format!(
                    "`{approver_id}` belongs to company `{approver_company}`, \
                     expense belongs to `{expense_company}`"
                )
            }
            Self::SelfApproval { approver_id } => {
                format!("`{approver_id}` submitted this expense and cannot decide on it")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityResult {
    pub allowed: bool,
    pub reason: String,
    pub failure: Option<EligibilityFailure>,
}

impl EligibilityResult {
    fn allow(reason: impl Into<String>) -> Self {
        Self { allowed: true, reason: reason.into(), failure: None }
    }

    fn deny(failure: EligibilityFailure) -> Self {
        Self { allowed: false, reason: failure.reason(), failure: Some(failure) }
    }
}

/// Decides whether a user may cast a decision on an expense at all. Sequential gating is not
/// checked here: out-of-order decisions are accepted and only counted once the gate opens.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApproverEligibility;

impl ApproverEligibility {
    pub fn check(&self, submitter: &User, approver: &User) -> EligibilityResult {
        if !approver.is_approver() {
            return EligibilityResult::deny(EligibilityFailure::RoleCannotApprove {
                approver_id: approver.id.clone(),
                role: approver.role,
            });
        }

        if approver.company_id != submitter.company_id {
            return EligibilityResult::deny(EligibilityFailure::DifferentCompany {
                approver_id: approver.id.clone(),
                approver_company: approver.company_id.clone(),
                expense_company: submitter.company_id.clone(),
            });
        }

        if approver.id == submitter.id {
            return EligibilityResult::deny(EligibilityFailure::SelfApproval {
                approver_id: approver.id.clone(),
            });
        }

        EligibilityResult::allow(format!(
            "`{}` ({}) may decide on expenses submitted by `{}`",
            approver.id,
            approver.role.as_str(),
            submitter.id
        ))
    }
}
