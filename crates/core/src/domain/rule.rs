use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::user::{CompanyId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Percentage,
    SpecificApprover,
    Hybrid,
}

impl RuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::SpecificApprover => "specific_approver",
            Self::Hybrid => "hybrid",
        }
    }
}

impl FromStr for RuleType {
    type Err = RuleConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "percentage" => Ok(Self::Percentage),
            "specific_approver" | "specific" => Ok(Self::SpecificApprover),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(RuleConfigError::UnknownRuleType(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RuleConfigError {
    #[error("unknown rule type `{0}` (expected percentage|specific_approver|hybrid)")]
    UnknownRuleType(String),
    #[error("{rule_type:?} rule requires a threshold percentage")]
    MissingThreshold { rule_type: RuleType },
    #[error("{rule_type:?} rule requires a specific approver")]
    MissingApprover { rule_type: RuleType },
    #[error("threshold percentage {threshold_pct} is outside 0..=100")]
    ThresholdOutOfRange { threshold_pct: Decimal },
    #[error("specific approver `{approver_id}` does not exist")]
    UnknownApprover { approver_id: UserId },
    #[error("specific approver `{approver_id}` is not a manager or admin of `{company_id}`")]
    ApproverNotEligible { approver_id: UserId, company_id: CompanyId },
}

/// What must happen for a rule to be satisfied. Each variant carries exactly the fields its
/// rule type needs, so a constructed policy is always well formed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RulePolicy {
    Percentage { threshold_pct: Decimal },
    SpecificApprover { approver_id: UserId },
    Hybrid { threshold_pct: Decimal, approver_id: UserId },
}

impl RulePolicy {
    /// Builds a policy from the loose column/form shape. Fields the rule type does not use are
    /// ignored.
    pub fn from_parts(
        rule_type: RuleType,
        threshold_pct: Option<Decimal>,
        approver_id: Option<UserId>,
    ) -> Result<Self, RuleConfigError> {
        let threshold = || -> Result<Decimal, RuleConfigError> {
            let threshold_pct =
                threshold_pct.ok_or(RuleConfigError::MissingThreshold { rule_type })?;
            if threshold_pct < Decimal::ZERO || threshold_pct > Decimal::ONE_HUNDRED {
                return Err(RuleConfigError::ThresholdOutOfRange { threshold_pct });
            }
            Ok(threshold_pct)
        };
        let approver = || -> Result<UserId, RuleConfigError> {
            approver_id
                .clone()
                .filter(|id| !id.0.trim().is_empty())
                .ok_or(RuleConfigError::MissingApprover { rule_type })
        };

        match rule_type {
            RuleType::Percentage => Ok(Self::Percentage { threshold_pct: threshold()? }),
            RuleType::SpecificApprover => Ok(Self::SpecificApprover { approver_id: approver()? }),
            RuleType::Hybrid => {
                Ok(Self::Hybrid { threshold_pct: threshold()?, approver_id: approver()? })
            }
        }
    }

    pub fn rule_type(&self) -> RuleType {
        match self {
            Self::Percentage { .. } => RuleType::Percentage,
            Self::SpecificApprover { .. } => RuleType::SpecificApprover,
            Self::Hybrid { .. } => RuleType::Hybrid,
        }
    }

    pub fn threshold_pct(&self) -> Option<Decimal> {
        match self {
            Self::Percentage { threshold_pct } | Self::Hybrid { threshold_pct, .. } => {
                Some(*threshold_pct)
            }
            Self::SpecificApprover { .. } => None,
        }
    }

    pub fn specific_approver(&self) -> Option<&UserId> {
        match self {
            Self::SpecificApprover { approver_id } | Self::Hybrid { approver_id, .. } => {
                Some(approver_id)
            }
            Self::Percentage { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRule {
    pub id: RuleId,
    pub company_id: CompanyId,
    pub policy: RulePolicy,
    /// When set, the submitter's direct manager must decide before anyone else counts.
    pub is_sequential: bool,
    pub position: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApprovalRule {
    pub company_id: CompanyId,
    pub rule_type: RuleType,
    pub threshold_pct: Option<Decimal>,
    pub specific_approver_id: Option<UserId>,
    pub is_sequential: bool,
}

impl NewApprovalRule {
    pub fn policy(&self) -> Result<RulePolicy, RuleConfigError> {
        RulePolicy::from_parts(
            self.rule_type,
            self.threshold_pct,
            self.specific_approver_id.clone(),
        )
    }
}
