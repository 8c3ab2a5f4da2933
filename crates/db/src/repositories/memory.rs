use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use outlay_core::domain::decision::Decision;
use outlay_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use outlay_core::domain::rule::{ApprovalRule, RuleId};
use outlay_core::domain::user::{CompanyId, User, UserId};
use outlay_core::errors::WorkflowError;
use outlay_core::workflow::ports::{
    DecisionRepository, DirectoryRepository, ExpenseRepository, RuleRepository,
};
use outlay_core::workflow::WorkflowPorts;

use super::RepositoryError;

#[derive(Default)]
pub struct InMemoryDirectoryRepository {
    users: RwLock<HashMap<String, User>>,
}

#[async_trait::async_trait]
impl DirectoryRepository for InMemoryDirectoryRepository {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, WorkflowError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn manager_of(&self, id: &UserId) -> Result<Option<UserId>, WorkflowError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).and_then(|user| user.manager_id.clone()))
    }

    async fn approver_roster(
        &self,
        company_id: &CompanyId,
    ) -> Result<BTreeSet<UserId>, WorkflowError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .filter(|user| user.company_id == *company_id && user.is_approver())
            .map(|user| user.id.clone())
            .collect())
    }

    async fn users_in_company(&self, company_id: &CompanyId) -> Result<Vec<User>, WorkflowError> {
        let users = self.users.read().await;
        let mut members: Vec<User> =
            users.values().filter(|user| user.company_id == *company_id).cloned().collect();
        members.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(members)
    }

    async fn save_user(&self, user: User) -> Result<(), WorkflowError> {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRuleRepository {
    rules: RwLock<Vec<ApprovalRule>>,
}

#[async_trait::async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn rules_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ApprovalRule>, WorkflowError> {
        let rules = self.rules.read().await;
        let mut matching: Vec<ApprovalRule> =
            rules.iter().filter(|rule| rule.company_id == *company_id).cloned().collect();
        matching.sort_by(|left, right| {
            left.position.cmp(&right.position).then_with(|| left.id.cmp(&right.id))
        });
        Ok(matching)
    }

    async fn find_rule(&self, id: &RuleId) -> Result<Option<ApprovalRule>, WorkflowError> {
        let rules = self.rules.read().await;
        Ok(rules.iter().find(|rule| rule.id == *id).cloned())
    }

    async fn create_rule(&self, rule: ApprovalRule) -> Result<(), WorkflowError> {
        let mut rules = self.rules.write().await;
        if rules.iter().any(|existing| existing.id == rule.id) {
            return Err(RepositoryError::Conflict(format!("rule `{}` already exists", rule.id))
                .into());
        }
        rules.push(rule);
        Ok(())
    }

    async fn delete_rule(&self, id: &RuleId) -> Result<bool, WorkflowError> {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|rule| rule.id != *id);
        Ok(rules.len() != before)
    }
}

/// Mirrors the `(expense_id, approver_id)` and `(expense_id, sequence)` uniqueness of the
/// `expense_decisions` table. Settling appends write through to the shared expense store.
#[derive(Default)]
pub struct InMemoryDecisionRepository {
    decisions: RwLock<HashMap<String, Vec<Decision>>>,
    expenses: Arc<InMemoryExpenseRepository>,
}

impl InMemoryDecisionRepository {
    pub fn new(expenses: Arc<InMemoryExpenseRepository>) -> Self {
        Self { decisions: RwLock::default(), expenses }
    }
}

#[async_trait::async_trait]
impl DecisionRepository for InMemoryDecisionRepository {
    async fn decisions_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<Decision>, WorkflowError> {
        let decisions = self.decisions.read().await;
        let mut entries = decisions.get(&expense_id.0).cloned().unwrap_or_default();
        entries.sort_by_key(|entry| entry.sequence);
        Ok(entries)
    }

    async fn append(
        &self,
        decision: Decision,
        settled: Option<Expense>,
    ) -> Result<(), WorkflowError> {
        let mut decisions = self.decisions.write().await;
        let mut expenses = self.expenses.expenses.write().await;

        let entries = decisions.entry(decision.expense_id.0.clone()).or_default();
        if entries.iter().any(|entry| {
            entry.approver_id == decision.approver_id || entry.sequence == decision.sequence
        }) {
            return Err(RepositoryError::Conflict(format!(
                "expense `{}` already has a decision from `{}` or at sequence {}",
                decision.expense_id, decision.approver_id, decision.sequence
            ))
            .into());
        }
        if let Some(expense) = settled {
            let stored = expenses.get(&expense.id.0).map(|stored| stored.status);
            if stored != Some(ExpenseStatus::Pending) {
                return Err(RepositoryError::Conflict(format!(
                    "expense `{}` is no longer pending",
                    expense.id
                ))
                .into());
            }
            expenses.insert(expense.id.0.clone(), expense);
        }
        entries.push(decision);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryExpenseRepository {
    expenses: RwLock<HashMap<String, Expense>>,
}

#[async_trait::async_trait]
impl ExpenseRepository for InMemoryExpenseRepository {
    async fn find(&self, id: &ExpenseId) -> Result<Option<Expense>, WorkflowError> {
        let expenses = self.expenses.read().await;
        Ok(expenses.get(&id.0).cloned())
    }

    async fn save(&self, expense: Expense) -> Result<(), WorkflowError> {
        let mut expenses = self.expenses.write().await;
        expenses.insert(expense.id.0.clone(), expense);
        Ok(())
    }

    async fn pending_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Expense>, WorkflowError> {
        let expenses = self.expenses.read().await;
        let mut pending: Vec<Expense> = expenses
            .values()
            .filter(|expense| {
                expense.company_id == *company_id && expense.status == ExpenseStatus::Pending
            })
            .cloned()
            .collect();
        pending.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(pending)
    }

    async fn submitted_by(&self, submitter_id: &UserId) -> Result<Vec<Expense>, WorkflowError> {
        let expenses = self.expenses.read().await;
        let mut submitted: Vec<Expense> = expenses
            .values()
            .filter(|expense| expense.submitter_id == *submitter_id)
            .cloned()
            .collect();
        submitted.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| right.id.cmp(&left.id))
        });
        Ok(submitted)
    }
}

/// Fresh in-memory ports, one store per concern, for tests and dry runs.
pub fn in_memory_ports() -> WorkflowPorts {
    let expenses = Arc::new(InMemoryExpenseRepository::default());
    WorkflowPorts {
        directory: Arc::new(InMemoryDirectoryRepository::default()),
        rules: Arc::new(InMemoryRuleRepository::default()),
        decisions: Arc::new(InMemoryDecisionRepository::new(Arc::clone(&expenses))),
        expenses,
    }
}
