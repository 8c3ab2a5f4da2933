use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ports::{DecisionRepository, DirectoryRepository, ExpenseRepository, RuleRepository};
use super::WorkflowPorts;
use crate::domain::decision::Decision;
use crate::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use crate::domain::rule::{ApprovalRule, RuleId};
use crate::domain::user::{CompanyId, User, UserId};
use crate::errors::WorkflowError;

/// Single store behind every port, for controller tests.
#[derive(Default)]
pub(super) struct FakeStore {
    users: RwLock<HashMap<UserId, User>>,
    rules: RwLock<Vec<ApprovalRule>>,
    decisions: RwLock<Vec<Decision>>,
    expenses: RwLock<HashMap<ExpenseId, Expense>>,
    refuse_settlement: AtomicBool,
}

impl FakeStore {
    pub(super) fn ports(self: &Arc<Self>) -> WorkflowPorts {
        WorkflowPorts {
            directory: self.clone(),
            rules: self.clone(),
            decisions: self.clone(),
            expenses: self.clone(),
        }
    }

    pub(super) async fn decision_count(&self, expense_id: &ExpenseId) -> usize {
        self.decisions.read().await.iter().filter(|entry| entry.expense_id == *expense_id).count()
    }

    /// While set, any append that would also settle its expense fails without writing.
    pub(super) fn refuse_settlement(&self, refuse: bool) {
        self.refuse_settlement.store(refuse, Ordering::SeqCst);
    }

    pub(super) async fn tamper(&self, edit: impl FnOnce(&mut Decision)) {
        if let Some(entry) = self.decisions.write().await.first_mut() {
            edit(entry);
        }
    }
}

#[async_trait]
impl DirectoryRepository for FakeStore {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, WorkflowError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn manager_of(&self, id: &UserId) -> Result<Option<UserId>, WorkflowError> {
        Ok(self.users.read().await.get(id).and_then(|user| user.manager_id.clone()))
    }

    async fn approver_roster(
        &self,
        company_id: &CompanyId,
    ) -> Result<BTreeSet<UserId>, WorkflowError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .filter(|user| user.company_id == *company_id && user.is_approver())
            .map(|user| user.id.clone())
            .collect())
    }

    async fn users_in_company(&self, company_id: &CompanyId) -> Result<Vec<User>, WorkflowError> {
        let mut users: Vec<User> = self
            .users
            .read()
            .await
            .values()
            .filter(|user| user.company_id == *company_id)
            .cloned()
            .collect();
        users.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(users)
    }

    async fn save_user(&self, user: User) -> Result<(), WorkflowError> {
        self.users.write().await.insert(user.id.clone(), user);
        Ok(())
    }
}

#[async_trait]
impl RuleRepository for FakeStore {
    async fn rules_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ApprovalRule>, WorkflowError> {
        let mut rules: Vec<ApprovalRule> = self
            .rules
            .read()
            .await
            .iter()
            .filter(|rule| rule.company_id == *company_id)
            .cloned()
            .collect();
        rules.sort_by_key(|rule| rule.position);
        Ok(rules)
    }

    async fn find_rule(&self, id: &RuleId) -> Result<Option<ApprovalRule>, WorkflowError> {
        Ok(self.rules.read().await.iter().find(|rule| rule.id == *id).cloned())
    }

    async fn create_rule(&self, rule: ApprovalRule) -> Result<(), WorkflowError> {
        self.rules.write().await.push(rule);
        Ok(())
    }

    async fn delete_rule(&self, id: &RuleId) -> Result<bool, WorkflowError> {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|rule| rule.id != *id);
        Ok(rules.len() != before)
    }
}

#[async_trait]
impl DecisionRepository for FakeStore {
    async fn decisions_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<Decision>, WorkflowError> {
        let mut decisions: Vec<Decision> = self
            .decisions
            .read()
            .await
            .iter()
            .filter(|entry| entry.expense_id == *expense_id)
            .cloned()
            .collect();
        decisions.sort_by_key(|entry| entry.sequence);
        Ok(decisions)
    }

    async fn append(
        &self,
        decision: Decision,
        settled: Option<Expense>,
    ) -> Result<(), WorkflowError> {
        let mut decisions = self.decisions.write().await;
        let mut expenses = self.expenses.write().await;

        if let Some(expense) = settled {
            if self.refuse_settlement.load(Ordering::SeqCst) {
                return Err(WorkflowError::Persistence("expense store unavailable".to_owned()));
            }
            let stored = expenses.get(&expense.id).map(|stored| stored.status);
            if stored != Some(ExpenseStatus::Pending) {
                return Err(WorkflowError::Persistence(format!(
                    "expense `{}` is no longer pending",
                    expense.id
                )));
            }
            expenses.insert(expense.id.clone(), expense);
        }
        decisions.push(decision);
        Ok(())
    }
}

#[async_trait]
impl ExpenseRepository for FakeStore {
    async fn find(&self, id: &ExpenseId) -> Result<Option<Expense>, WorkflowError> {
        Ok(self.expenses.read().await.get(id).cloned())
    }

    async fn save(&self, expense: Expense) -> Result<(), WorkflowError> {
        self.expenses.write().await.insert(expense.id.clone(), expense);
        Ok(())
    }

    async fn pending_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Expense>, WorkflowError> {
        let mut pending: Vec<Expense> = self
            .expenses
            .read()
            .await
            .values()
            .filter(|expense| {
                expense.company_id == *company_id && expense.status == ExpenseStatus::Pending
            })
            .cloned()
            .collect();
        pending.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(pending)
    }

    async fn submitted_by(&self, submitter_id: &UserId) -> Result<Vec<Expense>, WorkflowError> {
        let mut submitted: Vec<Expense> = self
            .expenses
            .read()
            .await
            .values()
            .filter(|expense| expense.submitter_id == *submitter_id)
            .cloned()
            .collect();
        submitted.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| right.id.0.cmp(&left.id.0))
        });
        Ok(submitted)
    }
}
