pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ledger;
pub mod workflow;

pub use approvals::{
    ApproverEligibility, EligibilityFailure, EligibilityResult, Evaluation, EvaluationSnapshot,
    GateState, RuleEvaluation, RuleEvaluator, RuleOutcome,
};
pub use domain::decision::{Decision, DecisionId, Verdict};
pub use domain::expense::{Expense, ExpenseId, ExpenseStatus, NewExpense};
pub use domain::rule::{
    ApprovalRule, NewApprovalRule, RuleConfigError, RuleId, RulePolicy, RuleType,
};
pub use domain::user::{CompanyId, Role, User, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError, WorkflowError};
pub use ledger::{DecisionLedger, DecisionRequest, VerificationResult};
pub use workflow::{
    DecisionCommand, DecisionReceipt, ManagerAssignment, PendingApproval, RoleAssignment,
    SubmittedExpense, WorkflowController, WorkflowPorts, WorkflowState,
};
