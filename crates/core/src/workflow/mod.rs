//! Expense approval workflow: turns decisions into ledger entries and expense state.

pub mod locks;
pub mod ports;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::approvals::{Evaluation, EvaluationSnapshot, RuleEvaluation, RuleEvaluator};
use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink, NoopAuditSink};
use crate::domain::decision::{Decision, Verdict};
use crate::domain::expense::{Expense, ExpenseId, ExpenseStatus, NewExpense};
use crate::domain::rule::{ApprovalRule, NewApprovalRule, RuleConfigError, RuleId};
use crate::domain::user::{CompanyId, Role, User, UserId};
use crate::errors::WorkflowError;
use crate::ledger::{DecisionLedger, DecisionRequest, VerificationResult};

pub use locks::ExpenseLocks;
pub use ports::{DecisionRepository, DirectoryRepository, ExpenseRepository, RuleRepository};

#[derive(Clone)]
pub struct WorkflowPorts {
    pub directory: Arc<dyn DirectoryRepository>,
    pub rules: Arc<dyn RuleRepository>,
    pub decisions: Arc<dyn DecisionRepository>,
    pub expenses: Arc<dyn ExpenseRepository>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionCommand {
    pub expense_id: ExpenseId,
    pub approver_id: UserId,
    pub verdict: Verdict,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionReceipt {
    pub expense_id: ExpenseId,
    pub status: ExpenseStatus,
    pub decision: Decision,
    pub evaluation: Evaluation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub expense_id: ExpenseId,
    pub status: ExpenseStatus,
    pub eligible_next_approvers: Vec<UserId>,
    pub rules: Vec<RuleEvaluation>,
    pub decisions: Vec<Decision>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub expense: Expense,
    pub submitter_name: String,
    pub state: WorkflowState,
}

/// An expense as its submitter sees it, with the approval progress so far.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmittedExpense {
    pub expense: Expense,
    pub approvals: usize,
    pub rejections: usize,
    /// "Pending initial review" until someone decides, then "N approval(s)".
    pub progress: String,
    pub state: WorkflowState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleAssignment {
    pub actor_id: UserId,
    pub user_id: UserId,
    pub role: Role,
}

/// `manager_id: None` clears the user's manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerAssignment {
    pub actor_id: UserId,
    pub user_id: UserId,
    pub manager_id: Option<UserId>,
}

/// One expense read under its lock and brought in line with its current evaluation.
struct Settled {
    expense: Expense,
    decisions: Vec<Decision>,
    evaluation: Evaluation,
}

impl Settled {
    fn into_state(self) -> WorkflowState {
        let eligible_next_approvers = if self.expense.status.is_terminal() {
            Vec::new()
        } else {
            self.evaluation.eligible_next_approvers.into_iter().collect()
        };

        WorkflowState {
            expense_id: self.expense.id,
            status: self.expense.status,
            eligible_next_approvers,
            rules: self.evaluation.rules,
            decisions: self.decisions,
        }
    }
}

/// Serializes decisions per expense and drives each expense from `Pending` to a terminal state.
pub struct WorkflowController {
    ports: WorkflowPorts,
    ledger: DecisionLedger,
    evaluator: RuleEvaluator,
    audit: Arc<dyn AuditSink>,
    locks: ExpenseLocks,
}

impl WorkflowController {
    pub fn new(ports: WorkflowPorts, ledger: DecisionLedger) -> Self {
        Self {
            ports,
            ledger,
            evaluator: RuleEvaluator,
            audit: Arc::new(NoopAuditSink),
            locks: ExpenseLocks::default(),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub async fn open_expense(&self, new_expense: NewExpense) -> Result<Expense, WorkflowError> {
        new_expense.validate().map_err(WorkflowError::InvalidExpense)?;
        let submitter = self.user(&new_expense.submitter_id).await?;

        let expense_id = ExpenseId(format!("EXP-{}", Uuid::new_v4().simple()));
        let mut expense =
            new_expense.into_expense(expense_id, submitter.company_id.clone(), Utc::now());

        // Some rule sets resolve before anyone decides, e.g. a 0% threshold.
        let evaluation = self.evaluate(&expense, Vec::new()).await?;
        if evaluation.is_terminal() {
            expense.transition_to(evaluation.outcome, expense.created_at)?;
        }
        self.ports.expenses.save(expense.clone()).await?;

        let correlation_id = Uuid::new_v4().to_string();
        info!(
            event_name = "workflow.expense_opened",
            correlation_id = %correlation_id,
            expense_id = %expense.id,
            company_id = %expense.company_id,
            submitter_id = %expense.submitter_id,
            amount = %expense.amount,
            currency = %expense.currency,
            "expense submitted for approval"
        );
        self.audit.emit(
            AuditContext::new(
                Some(expense.id.clone()),
                correlation_id.clone(),
                submitter.id.0.clone(),
            )
            .event("expense.opened", AuditCategory::Submission, AuditOutcome::Success)
            .with_metadata("amount", expense.amount.to_string())
            .with_metadata("currency", expense.currency.clone()),
        );
        if expense.status.is_terminal() {
            self.record_finalized(&expense, &correlation_id, "submission");
        }

        Ok(expense)
    }

    /// Records one approver's verdict and re-evaluates the expense. The evaluation runs before
    /// anything is written; the ledger entry and any status transition are then stored as one
    /// unit, all under the expense's lock.
    pub async fn submit_decision(
        &self,
        command: DecisionCommand,
    ) -> Result<DecisionReceipt, WorkflowError> {
        let correlation_id = Uuid::new_v4().to_string();
        let audit = AuditContext::new(
            Some(command.expense_id.clone()),
            correlation_id.clone(),
            command.approver_id.0.clone(),
        );

        let result = self.submit_decision_locked(&command, &correlation_id).await;
        match &result {
            Ok(receipt) => {
                info!(
                    event_name = "workflow.decision_recorded",
                    correlation_id = %correlation_id,
                    expense_id = %receipt.expense_id,
                    approver_id = %command.approver_id,
                    verdict = receipt.decision.verdict.as_str(),
                    sequence = receipt.decision.sequence,
                    status = receipt.status.as_str(),
                    "approval decision recorded"
                );
                self.audit.emit(
                    audit
                        .event("decision.recorded", AuditCategory::Decision, AuditOutcome::Success)
                        .with_metadata("verdict", receipt.decision.verdict.as_str())
                        .with_metadata("status", receipt.status.as_str())
                        .with_metadata("entry_hash", receipt.decision.entry_hash.clone()),
                );
            }
            Err(error) => {
                warn!(
                    event_name = "workflow.decision_refused",
                    correlation_id = %correlation_id,
                    expense_id = %command.expense_id,
                    approver_id = %command.approver_id,
                    error_code = error.code(),
                    error = %error,
                    "approval decision refused"
                );
                let outcome = match error {
                    WorkflowError::Persistence(_) | WorkflowError::Domain(_) => {
                        AuditOutcome::Failed
                    }
                    _ => AuditOutcome::Rejected,
                };
                self.audit.emit(
                    audit
                        .event("decision.refused", AuditCategory::Decision, outcome)
                        .with_metadata("error_code", error.code()),
                );
            }
        }

        result
    }

    async fn submit_decision_locked(
        &self,
        command: &DecisionCommand,
        correlation_id: &str,
    ) -> Result<DecisionReceipt, WorkflowError> {
        let _guard = self.locks.acquire(&command.expense_id).await;

        let mut expense = self.expense(&command.expense_id).await?;
        if expense.status.is_terminal() {
            return Err(WorkflowError::ExpenseAlreadyFinalized {
                expense_id: expense.id,
                status: expense.status,
            });
        }

        let submitter = self.user(&expense.submitter_id).await?;
        let approver = self.user(&command.approver_id).await?;
        let mut decisions = self.ports.decisions.decisions_for_expense(&expense.id).await?;

        let now = Utc::now();
        let decision = self.ledger.record(
            DecisionRequest {
                expense: &expense,
                submitter: &submitter,
                approver: &approver,
                verdict: command.verdict,
                comment: command.comment.clone(),
            },
            &decisions,
            now,
        )?;
        decisions.push(decision.clone());

        let evaluation = self.evaluate(&expense, decisions).await?;
        let settled = if evaluation.is_terminal() {
            expense.transition_to(evaluation.outcome, now)?;
            Some(expense.clone())
        } else {
            None
        };
        self.ports.decisions.append(decision.clone(), settled).await?;
        if expense.status.is_terminal() {
            self.record_finalized(&expense, correlation_id, "decision");
        }

        Ok(DecisionReceipt { expense_id: expense.id, status: expense.status, decision, evaluation })
    }

    pub async fn workflow_state(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<WorkflowState, WorkflowError> {
        Ok(self.settle(expense_id, "read").await?.into_state())
    }

    /// Expenses in the approver's company that are waiting on that approver.
    pub async fn pending_for_approver(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<PendingApproval>, WorkflowError> {
        let approver = self.user(approver_id).await?;
        if !approver.is_approver() {
            return Ok(Vec::new());
        }

        let mut inbox = Vec::new();
        for pending in self.ports.expenses.pending_for_company(&approver.company_id).await? {
            let settled = self.settle(&pending.id, "read").await?;
            let expense = settled.expense.clone();
            let state = settled.into_state();
            if !state.eligible_next_approvers.contains(approver_id) {
                continue;
            }
            let submitter_name = self
                .ports
                .directory
                .find_user(&expense.submitter_id)
                .await?
                .map(|user| user.full_name)
                .unwrap_or_else(|| expense.submitter_id.0.clone());
            inbox.push(PendingApproval { expense, submitter_name, state });
        }

        Ok(inbox)
    }

    /// The submitter's own expenses, newest first, with approval progress.
    pub async fn expenses_submitted_by(
        &self,
        submitter_id: &UserId,
    ) -> Result<Vec<SubmittedExpense>, WorkflowError> {
        let submitter = self.user(submitter_id).await?;

        let mut history = Vec::new();
        for submitted in self.ports.expenses.submitted_by(&submitter.id).await? {
            let settled = self.settle(&submitted.id, "read").await?;
            let approvals = settled
                .decisions
                .iter()
                .filter(|decision| decision.verdict == Verdict::Approved)
                .count();
            let rejections = settled.decisions.len() - approvals;
            let progress = if settled.decisions.is_empty() {
                "Pending initial review".to_string()
            } else {
                format!("{approvals} approval(s)")
            };
            let expense = settled.expense.clone();
            history.push(SubmittedExpense {
                expense,
                approvals,
                rejections,
                progress,
                state: settled.into_state(),
            });
        }

        Ok(history)
    }

    pub async fn configure_rule(
        &self,
        new_rule: NewApprovalRule,
    ) -> Result<ApprovalRule, WorkflowError> {
        let policy = new_rule.policy()?;

        if let Some(approver_id) = policy.specific_approver() {
            let approver = self.ports.directory.find_user(approver_id).await?.ok_or_else(|| {
                RuleConfigError::UnknownApprover { approver_id: approver_id.clone() }
            })?;
            if approver.company_id != new_rule.company_id || !approver.is_approver() {
                return Err(RuleConfigError::ApproverNotEligible {
                    approver_id: approver.id,
                    company_id: new_rule.company_id,
                }
                .into());
            }
        }

        if policy.threshold_pct().is_some() {
            let roster = self.ports.directory.approver_roster(&new_rule.company_id).await?;
            if roster.is_empty() {
                return Err(WorkflowError::NoEligibleApprovers {
                    company_id: new_rule.company_id,
                });
            }
        }

        let existing = self.ports.rules.rules_for_company(&new_rule.company_id).await?;
        let position =
            existing.iter().map(|rule| rule.position.saturating_add(1)).max().unwrap_or(0);
        let rule = ApprovalRule {
            id: RuleId(format!("RULE-{}", Uuid::new_v4().simple())),
            company_id: new_rule.company_id,
            policy,
            is_sequential: new_rule.is_sequential,
            position,
            created_at: Utc::now(),
        };
        self.ports.rules.create_rule(rule.clone()).await?;

        info!(
            event_name = "workflow.rule_configured",
            rule_id = %rule.id,
            company_id = %rule.company_id,
            rule_type = rule.policy.rule_type().as_str(),
            is_sequential = rule.is_sequential,
            "approval rule configured"
        );
        self.audit.emit(
            AuditContext::new(None, Uuid::new_v4().to_string(), "rules")
                .event("rule.configured", AuditCategory::Rules, AuditOutcome::Success)
                .with_metadata("rule_id", rule.id.0.clone())
                .with_metadata("company_id", rule.company_id.0.clone()),
        );
        self.settle_company(&rule.company_id, "rule_change").await;

        Ok(rule)
    }

    pub async fn remove_rule(&self, rule_id: &RuleId) -> Result<ApprovalRule, WorkflowError> {
        let rule = self
            .ports
            .rules
            .find_rule(rule_id)
            .await?
            .ok_or_else(|| WorkflowError::RuleNotFound(rule_id.clone()))?;
        if !self.ports.rules.delete_rule(rule_id).await? {
            return Err(WorkflowError::RuleNotFound(rule_id.clone()));
        }

        info!(
            event_name = "workflow.rule_removed",
            rule_id = %rule.id,
            company_id = %rule.company_id,
            "approval rule removed"
        );
        self.audit.emit(
            AuditContext::new(None, Uuid::new_v4().to_string(), "rules")
                .event("rule.removed", AuditCategory::Rules, AuditOutcome::Success)
                .with_metadata("rule_id", rule.id.0.clone()),
        );
        self.settle_company(&rule.company_id, "rule_change").await;

        Ok(rule)
    }

    pub async fn list_rules(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ApprovalRule>, WorkflowError> {
        self.ports.rules.rules_for_company(company_id).await
    }

    pub async fn list_users(&self, company_id: &CompanyId) -> Result<Vec<User>, WorkflowError> {
        self.ports.directory.users_in_company(company_id).await
    }

    /// Changes a user's role. Only an admin of the same company may do so, never on their own
    /// account. An approver named by a rule keeps an approving role.
    pub async fn assign_role(&self, assignment: RoleAssignment) -> Result<User, WorkflowError> {
        let (actor, mut user) =
            self.administered(&assignment.actor_id, &assignment.user_id).await?;
        if actor.id == user.id {
            return Err(WorkflowError::NotAuthorized {
                actor_id: actor.id,
                user_id: user.id,
                reason: "admins cannot change their own role".to_string(),
            });
        }
        if user.role.can_approve() && !assignment.role.can_approve() {
            self.ensure_can_step_down(&user).await?;
        }

        let previous = user.role;
        user.role = assignment.role;
        self.ports.directory.save_user(user.clone()).await?;

        info!(
            event_name = "workflow.role_assigned",
            actor_id = %actor.id,
            user_id = %user.id,
            company_id = %user.company_id,
            previous_role = previous.as_str(),
            role = user.role.as_str(),
            "user role changed"
        );
        self.audit.emit(
            AuditContext::new(None, Uuid::new_v4().to_string(), actor.id.0.clone())
                .event("user.role_assigned", AuditCategory::Directory, AuditOutcome::Success)
                .with_metadata("user_id", user.id.0.clone())
                .with_metadata("previous_role", previous.as_str())
                .with_metadata("role", user.role.as_str()),
        );
        self.settle_company(&user.company_id, "directory_change").await;

        Ok(user)
    }

    /// Sets or clears the manager the hierarchy resolver returns for a user. The manager must
    /// be a manager or admin of the same company.
    pub async fn assign_manager(
        &self,
        assignment: ManagerAssignment,
    ) -> Result<User, WorkflowError> {
        let (actor, mut user) =
            self.administered(&assignment.actor_id, &assignment.user_id).await?;

        if let Some(manager_id) = &assignment.manager_id {
            if *manager_id == user.id {
                return Err(WorkflowError::InvalidUserUpdate {
                    user_id: user.id,
                    reason: "a user cannot be their own manager".to_string(),
                });
            }
            let manager = self.user(manager_id).await?;
            if manager.company_id != user.company_id || !manager.is_approver() {
                return Err(WorkflowError::InvalidUserUpdate {
                    user_id: user.id,
                    reason: format!(
                        "`{manager_id}` is not a manager or admin of company `{}`",
                        user.company_id
                    ),
                });
            }
        }

        user.manager_id = assignment.manager_id;
        self.ports.directory.save_user(user.clone()).await?;

        let manager = user.manager_id.as_ref().map(|id| id.0.clone()).unwrap_or_default();
        info!(
            event_name = "workflow.manager_assigned",
            actor_id = %actor.id,
            user_id = %user.id,
            company_id = %user.company_id,
            manager_id = %manager,
            "user manager changed"
        );
        self.audit.emit(
            AuditContext::new(None, Uuid::new_v4().to_string(), actor.id.0.clone())
                .event("user.manager_assigned", AuditCategory::Directory, AuditOutcome::Success)
                .with_metadata("user_id", user.id.0.clone())
                .with_metadata("manager_id", manager),
        );
        self.settle_company(&user.company_id, "directory_change").await;

        Ok(user)
    }

    pub async fn verify_ledger(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<VerificationResult, WorkflowError> {
        let expense = self.expense(expense_id).await?;
        let decisions = self.ports.decisions.decisions_for_expense(&expense.id).await?;
        let result = self.ledger.verify_chain(&expense.id, &decisions);

        if !result.valid {
            warn!(
                event_name = "workflow.ledger_verification_failed",
                expense_id = %expense.id,
                verified_entries = result.verified_entries,
                reason = result.failure_reason.as_deref().unwrap_or("unknown"),
                "decision ledger failed verification"
            );
            let context =
                AuditContext::new(Some(expense.id.clone()), Uuid::new_v4().to_string(), "ledger");
            let event = context.event(
                "ledger.verification_failed",
                AuditCategory::Ledger,
                AuditOutcome::Failed,
            );
            self.audit.emit(
                event.with_metadata("reason", result.failure_reason.clone().unwrap_or_default()),
            );
        }

        Ok(result)
    }

    /// Reads an expense under its lock and finalizes it when its evaluation has become
    /// terminal without a new decision, e.g. after a rule or directory change.
    async fn settle(
        &self,
        expense_id: &ExpenseId,
        trigger: &'static str,
    ) -> Result<Settled, WorkflowError> {
        let _guard = self.locks.acquire(expense_id).await;

        let mut expense = self.expense(expense_id).await?;
        let decisions = self.ports.decisions.decisions_for_expense(&expense.id).await?;
        let evaluation = self.evaluate(&expense, decisions.clone()).await?;
        if expense.status == ExpenseStatus::Pending && evaluation.is_terminal() {
            expense.transition_to(evaluation.outcome, Utc::now())?;
            self.ports.expenses.save(expense.clone()).await?;
            self.record_finalized(&expense, &Uuid::new_v4().to_string(), trigger);
        }

        Ok(Settled { expense, decisions, evaluation })
    }

    /// Re-evaluates every pending expense of the company. The change that triggered this has
    /// already been stored, so failures are logged and left for the next read to settle.
    async fn settle_company(&self, company_id: &CompanyId, trigger: &'static str) {
        let pending = match self.ports.expenses.pending_for_company(company_id).await {
            Ok(pending) => pending,
            Err(error) => {
                warn!(
                    event_name = "workflow.settle_failed",
                    company_id = %company_id,
                    error = %error,
                    "pending expenses could not be listed for re-evaluation"
                );
                return;
            }
        };

        for expense in pending {
            if let Err(error) = self.settle(&expense.id, trigger).await {
                warn!(
                    event_name = "workflow.settle_failed",
                    expense_id = %expense.id,
                    error_code = error.code(),
                    error = %error,
                    "pending expense could not be re-evaluated"
                );
            }
        }
    }

    fn record_finalized(&self, expense: &Expense, correlation_id: &str, trigger: &'static str) {
        info!(
            event_name = "workflow.expense_finalized",
            correlation_id = %correlation_id,
            expense_id = %expense.id,
            status = expense.status.as_str(),
            trigger,
            "expense reached a terminal state"
        );
        self.audit.emit(
            AuditContext::new(Some(expense.id.clone()), correlation_id, "workflow")
                .event("expense.finalized", AuditCategory::Decision, AuditOutcome::Success)
                .with_metadata("status", expense.status.as_str())
                .with_metadata("trigger", trigger),
        );
    }

    /// Both users, once the actor is known to be an admin of the user's company.
    async fn administered(
        &self,
        actor_id: &UserId,
        user_id: &UserId,
    ) -> Result<(User, User), WorkflowError> {
        let actor = self.user(actor_id).await?;
        let user = self.user(user_id).await?;

        if actor.role != Role::Admin {
            return Err(WorkflowError::NotAuthorized {
                actor_id: actor.id,
                user_id: user.id,
                reason: "only admins manage users".to_string(),
            });
        }
        if actor.company_id != user.company_id {
            return Err(WorkflowError::NotAuthorized {
                actor_id: actor.id,
                user_id: user.id,
                reason: "the user belongs to another company".to_string(),
            });
        }

        Ok((actor, user))
    }

    /// The acting admin stays in the roster, so only named approvers need guarding here.
    async fn ensure_can_step_down(&self, user: &User) -> Result<(), WorkflowError> {
        let rules = self.ports.rules.rules_for_company(&user.company_id).await?;
        if let Some(rule) =
            rules.iter().find(|rule| rule.policy.specific_approver() == Some(&user.id))
        {
            return Err(WorkflowError::InvalidUserUpdate {
                user_id: user.id.clone(),
                reason: format!("`{}` is the named approver of rule `{}`", user.id, rule.id),
            });
        }

        Ok(())
    }

    async fn evaluate(
        &self,
        expense: &Expense,
        decisions: Vec<Decision>,
    ) -> Result<Evaluation, WorkflowError> {
        let snapshot = EvaluationSnapshot {
            submitter_id: expense.submitter_id.clone(),
            direct_manager: self.ports.directory.manager_of(&expense.submitter_id).await?,
            roster: self.ports.directory.approver_roster(&expense.company_id).await?,
            decisions,
        };
        let rules = self.ports.rules.rules_for_company(&expense.company_id).await?;
        Ok(self.evaluator.evaluate(&rules, &snapshot)?)
    }

    async fn expense(&self, expense_id: &ExpenseId) -> Result<Expense, WorkflowError> {
        self.ports
            .expenses
            .find(expense_id)
            .await?
            .ok_or_else(|| WorkflowError::ExpenseNotFound(expense_id.clone()))
    }

    async fn user(&self, user_id: &UserId) -> Result<User, WorkflowError> {
        self.ports
            .directory
            .find_user(user_id)
            .await?
            .ok_or_else(|| WorkflowError::UnknownUser(user_id.clone()))
    }
}
