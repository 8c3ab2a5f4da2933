use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::user::{CompanyId, UserId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExpenseId(pub String);

impl fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Pending,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for ExpenseStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown expense status `{other}`")))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub company_id: CompanyId,
    pub submitter_id: UserId,
    pub description: String,
    pub category: String,
    /// Amount in the company's default currency.
    pub amount: Decimal,
    pub currency: String,
    /// Amount as entered by the submitter, before conversion.
    pub original_amount: Decimal,
    pub original_currency: String,
    pub expense_date: NaiveDate,
    pub status: ExpenseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    pub fn can_transition_to(&self, next: ExpenseStatus) -> bool {
        matches!(
            (self.status, next),
            (ExpenseStatus::Pending, ExpenseStatus::Approved)
                | (ExpenseStatus::Pending, ExpenseStatus::Rejected)
        )
    }

    pub fn transition_to(
        &mut self,
        next: ExpenseStatus,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            self.updated_at = at;
            return Ok(());
        }

        Err(DomainError::InvalidExpenseTransition { from: self.status, to: next })
    }
}

/// An expense claim as submitted, before it is assigned an id and opened for approval.
/// Conversion into the company currency happens upstream; `original_*` default to the
/// converted values when the claim was made in the company currency.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
    pub submitter_id: UserId,
    pub description: String,
    pub category: String,
    pub amount: Decimal,
    pub currency: String,
    pub original_amount: Option<Decimal>,
    pub original_currency: Option<String>,
    pub expense_date: NaiveDate,
}

impl NewExpense {
    pub fn validate(&self) -> Result<(), String> {
        if self.description.trim().is_empty() {
            return Err("description is required".to_string());
        }
        if self.category.trim().is_empty() {
            return Err("category is required".to_string());
        }
        if self.amount <= Decimal::ZERO {
            return Err(format!("amount must be positive, got {}", self.amount));
        }
        if !is_currency_code(&self.currency) {
            return Err(format!("currency `{}` is not a 3-letter code", self.currency));
        }
        if let Some(original_currency) = &self.original_currency {
            if !is_currency_code(original_currency) {
                return Err(format!("currency `{original_currency}` is not a 3-letter code"));
            }
        }
        Ok(())
    }

    pub fn into_expense(
        self,
        id: ExpenseId,
        company_id: CompanyId,
        now: DateTime<Utc>,
    ) -> Expense {
        let currency = self.currency.trim().to_ascii_uppercase();
        Expense {
            id,
            company_id,
            submitter_id: self.submitter_id,
            description: self.description.trim().to_string(),
            category: self.category.trim().to_string(),
            amount: self.amount,
            original_amount: self.original_amount.unwrap_or(self.amount),
            original_currency: self
                .original_currency
                .map(|code| code.trim().to_ascii_uppercase())
                .unwrap_or_else(|| currency.clone()),
            currency,
            expense_date: self.expense_date,
            status: ExpenseStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

fn is_currency_code(raw: &str) -> bool {
    let code = raw.trim();
    code.len() == 3 && code.chars().all(|ch| ch.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{ExpenseId, ExpenseStatus, NewExpense};
    use crate::domain::user::{CompanyId, UserId};
    use crate::errors::DomainError;

    fn new_expense() -> NewExpense {
        NewExpense {
            submitter_id: UserId("u-emp".to_string()),
            description: "Client dinner".to_string(),
            category: "meals".to_string(),
            amount: Decimal::new(12_550, 2),
            currency: "usd".to_string(),
            original_amount: Some(Decimal::new(11_500, 2)),
            original_currency: Some("eur".to_string()),
            expense_date: NaiveDate::from_ymd_opt(2026, 3, 14).expect("date"),
        }
    }

    #[test]
    fn opened_expense_starts_pending_with_normalized_currency() {
        let expense = new_expense().into_expense(
            ExpenseId("EXP-1".to_string()),
            CompanyId("acme".to_string()),
            Utc::now(),
        );

        assert_eq!(expense.status, ExpenseStatus::Pending);
        assert_eq!(expense.currency, "USD");
        assert_eq!(expense.original_currency, "EUR");
        assert_eq!(expense.original_amount, Decimal::new(11_500, 2));
    }

    #[test]
    fn pending_expense_finalizes_exactly_once() {
        let mut expense = new_expense().into_expense(
            ExpenseId("EXP-2".to_string()),
            CompanyId("acme".to_string()),
            Utc::now(),
        );

        expense.transition_to(ExpenseStatus::Approved, Utc::now()).expect("pending->approved");
        let error = expense
            .transition_to(ExpenseStatus::Rejected, Utc::now())
            .expect_err("approved->rejected should fail");

        assert!(matches!(error, DomainError::InvalidExpenseTransition { .. }));
        assert_eq!(expense.status, ExpenseStatus::Approved);
    }

    #[test]
    fn validation_rejects_non_positive_amounts() {
        let mut claim = new_expense();
        claim.amount = Decimal::ZERO;

        let message = claim.validate().expect_err("zero amount should fail");
        assert!(message.contains("amount must be positive"));
    }

    #[test]
    fn validation_rejects_malformed_currency() {
        let mut claim = new_expense();
        claim.currency = "US$".to_string();

        assert!(claim.validate().is_err());
    }
}
