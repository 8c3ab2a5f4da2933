pub mod eligibility;
pub mod evaluator;

pub use eligibility::{ApproverEligibility, EligibilityFailure, EligibilityResult};
pub use evaluator::{
    Evaluation, EvaluationSnapshot, GateState, RuleEvaluation, RuleEvaluator, RuleOutcome,
};
