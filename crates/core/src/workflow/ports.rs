//! Storage seams the workflow reads and writes through. Implementations live in `outlay-db`.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::domain::decision::Decision;
use crate::domain::expense::{Expense, ExpenseId};
use crate::domain::rule::{ApprovalRule, RuleId};
use crate::domain::user::{CompanyId, User, UserId};
use crate::errors::WorkflowError;

#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, WorkflowError>;

    /// The submitter's direct manager, if one is assigned.
    async fn manager_of(&self, id: &UserId) -> Result<Option<UserId>, WorkflowError>;

    /// Every manager and admin in the company.
    async fn approver_roster(
        &self,
        company_id: &CompanyId,
    ) -> Result<BTreeSet<UserId>, WorkflowError>;

    /// Everyone in the company, ordered by id.
    async fn users_in_company(&self, company_id: &CompanyId) -> Result<Vec<User>, WorkflowError>;

    async fn save_user(&self, user: User) -> Result<(), WorkflowError>;
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Rules in evaluation order (ascending `position`).
    async fn rules_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ApprovalRule>, WorkflowError>;

    async fn find_rule(&self, id: &RuleId) -> Result<Option<ApprovalRule>, WorkflowError>;

    async fn create_rule(&self, rule: ApprovalRule) -> Result<(), WorkflowError>;

    async fn delete_rule(&self, id: &RuleId) -> Result<bool, WorkflowError>;
}

#[async_trait]
pub trait DecisionRepository: Send + Sync {
    /// Ledger entries for one expense, ordered by sequence.
    async fn decisions_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<Decision>, WorkflowError>;

    /// Appends one ledger entry. When the entry settles the expense, `settled` carries the
    /// expense in its terminal state and is stored in the same unit of work: either both writes
    /// land or neither does. Storing `settled` fails if the stored expense is no longer pending.
    async fn append(
        &self,
        decision: Decision,
        settled: Option<Expense>,
    ) -> Result<(), WorkflowError>;
}

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    async fn find(&self, id: &ExpenseId) -> Result<Option<Expense>, WorkflowError>;

    async fn save(&self, expense: Expense) -> Result<(), WorkflowError>;

    /// Pending expenses of the company, oldest first.
    async fn pending_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Expense>, WorkflowError>;

    /// Every expense the user submitted, newest first.
    async fn submitted_by(&self, submitter_id: &UserId) -> Result<Vec<Expense>, WorkflowError>;
}
