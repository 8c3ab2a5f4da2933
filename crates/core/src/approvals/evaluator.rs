use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::decision::{Decision, Verdict};
use crate::domain::expense::ExpenseStatus;
use crate::domain::rule::{ApprovalRule, RuleId, RulePolicy, RuleType};
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Satisfied,
    Failed,
    Pending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// The rule is not sequential, or the submitter has no direct manager on the roster.
    NotRequired,
    /// Waiting on the direct manager; other decisions are held uncounted.
    Closed,
    Opened,
    /// The direct manager rejected.
    Vetoed,
}

/// Everything one evaluation reads, captured once so that roster and ledger cannot drift
/// apart between steps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationSnapshot {
    pub submitter_id: UserId,
    pub direct_manager: Option<UserId>,
    /// Managers and admins of the submitter's company.
    pub roster: BTreeSet<UserId>,
    pub decisions: Vec<Decision>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub rule_id: RuleId,
    pub rule_type: RuleType,
    pub gate: GateState,
    pub outcome: RuleOutcome,
    pub approvals: usize,
    pub rejections: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub outcome: ExpenseStatus,
    pub rules: Vec<RuleEvaluation>,
    pub eligible_next_approvers: BTreeSet<UserId>,
}

impl Evaluation {
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_terminal()
    }
}

/// Pure evaluation of a company's rule set against one expense's ledger.
///
/// Every rule resolves to [`RuleOutcome`] independently; the expense is rejected as soon as
/// any rule fails and approved once every rule is satisfied. With no rules configured the
/// first counted decision decides the expense.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleEvaluator;

impl RuleEvaluator {
    pub fn evaluate(
        &self,
        rules: &[ApprovalRule],
        snapshot: &EvaluationSnapshot,
    ) -> Result<Evaluation, DomainError> {
        let tally = Tally::build(snapshot)?;

        if rules.is_empty() {
            return Ok(single_approval(&tally));
        }

        let evaluations = rules
            .iter()
            .map(|rule| evaluate_rule(rule, &tally))
            .collect::<Result<Vec<_>, _>>()?;

        let outcome = aggregate(evaluations.iter().map(|evaluation| evaluation.outcome));
        let eligible_next_approvers = if outcome.is_terminal() {
            BTreeSet::new()
        } else {
            rules
                .iter()
                .zip(&evaluations)
                .filter(|(_, evaluation)| evaluation.outcome == RuleOutcome::Pending)
                .flat_map(|(rule, evaluation)| tally.next_approvers(rule, evaluation.gate))
                .collect()
        };

        Ok(Evaluation { outcome, rules: evaluations, eligible_next_approvers })
    }
}

fn evaluate_rule(rule: &ApprovalRule, tally: &Tally<'_>) -> Result<RuleEvaluation, DomainError> {
    let gate = tally.gate_for(rule);
    let outcome = match gate {
        GateState::Closed => RuleOutcome::Pending,
        GateState::Vetoed => RuleOutcome::Failed,
        GateState::NotRequired | GateState::Opened => policy_outcome(&rule.policy, tally)?,
    };

    Ok(RuleEvaluation {
        rule_id: rule.id.clone(),
        rule_type: rule.policy.rule_type(),
        gate,
        outcome,
        approvals: tally.approvals,
        rejections: tally.rejections,
    })
}

fn policy_outcome(policy: &RulePolicy, tally: &Tally<'_>) -> Result<RuleOutcome, DomainError> {
    match policy {
        RulePolicy::Percentage { threshold_pct } => percentage_outcome(*threshold_pct, tally),
        RulePolicy::SpecificApprover { approver_id } => Ok(specific_outcome(approver_id, tally)),
        RulePolicy::Hybrid { threshold_pct, approver_id } => {
            let by_share = percentage_outcome(*threshold_pct, tally)?;
            let by_authority = specific_outcome(approver_id, tally);
            Ok(match (by_share, by_authority) {
                (RuleOutcome::Satisfied, _) | (_, RuleOutcome::Satisfied) => RuleOutcome::Satisfied,
                (RuleOutcome::Failed, RuleOutcome::Failed) => RuleOutcome::Failed,
                _ => RuleOutcome::Pending,
            })
        }
    }
}

/// The whole roster is the denominator, not just those who voted. A rule fails only once the
/// threshold is out of reach even if every undecided approver approves.
fn percentage_outcome(
    threshold_pct: Decimal,
    tally: &Tally<'_>,
) -> Result<RuleOutcome, DomainError> {
    if threshold_pct < Decimal::ZERO || threshold_pct > Decimal::ONE_HUNDRED {
        return Err(DomainError::InvariantViolation(format!(
            "percentage threshold {threshold_pct} escaped creation-time validation"
        )));
    }

    let roster_size = tally.roster.len();
    if roster_size == 0 {
        return Ok(RuleOutcome::Pending);
    }

    // A zero threshold is met before anyone decides.
    let required = threshold_pct * Decimal::from(roster_size as u64);
    let approved = Decimal::from(tally.approvals as u64) * Decimal::ONE_HUNDRED;
    if approved >= required {
        return Ok(RuleOutcome::Satisfied);
    }

    let reachable = Decimal::from(roster_size.saturating_sub(tally.rejections) as u64)
        * Decimal::ONE_HUNDRED;
    if reachable < required {
        return Ok(RuleOutcome::Failed);
    }

    Ok(RuleOutcome::Pending)
}

/// A named approver cannot decide on their own expense, so their submission stands in for
/// their approval.
fn specific_outcome(approver_id: &UserId, tally: &Tally<'_>) -> RuleOutcome {
    if approver_id == tally.submitter {
        return RuleOutcome::Satisfied;
    }

    match tally.verdict_of(approver_id) {
        Some(Verdict::Approved) => RuleOutcome::Satisfied,
        Some(Verdict::Rejected) => RuleOutcome::Failed,
        None => RuleOutcome::Pending,
    }
}

fn aggregate(outcomes: impl IntoIterator<Item = RuleOutcome>) -> ExpenseStatus {
    let mut all_satisfied = true;
    for outcome in outcomes {
        match outcome {
            RuleOutcome::Failed => return ExpenseStatus::Rejected,
            RuleOutcome::Pending => all_satisfied = false,
            RuleOutcome::Satisfied => {}
        }
    }

    if all_satisfied {
        ExpenseStatus::Approved
    } else {
        ExpenseStatus::Pending
    }
}

fn single_approval(tally: &Tally<'_>) -> Evaluation {
    match tally.first_counted {
        Some(decision) => Evaluation {
            outcome: match decision.verdict {
                Verdict::Approved => ExpenseStatus::Approved,
                Verdict::Rejected => ExpenseStatus::Rejected,
            },
            rules: Vec::new(),
            eligible_next_approvers: BTreeSet::new(),
        },
        None => Evaluation {
            outcome: ExpenseStatus::Pending,
            rules: Vec::new(),
            eligible_next_approvers: tally.undecided().cloned().collect(),
        },
    }
}

/// The ledger partitioned by approver. Counts only include roster members other than the
/// submitter; `verdicts` keeps every recorded decision.
struct Tally<'a> {
    submitter: &'a UserId,
    roster: BTreeSet<&'a UserId>,
    verdicts: BTreeMap<&'a UserId, Verdict>,
    direct_manager: Option<&'a UserId>,
    first_counted: Option<&'a Decision>,
    approvals: usize,
    rejections: usize,
}

impl<'a> Tally<'a> {
    fn build(snapshot: &'a EvaluationSnapshot) -> Result<Self, DomainError> {
        let roster: BTreeSet<&UserId> =
            snapshot.roster.iter().filter(|id| **id != snapshot.submitter_id).collect();

        let mut ordered: Vec<&Decision> = snapshot.decisions.iter().collect();
        ordered.sort_by(|left, right| {
            left.sequence.cmp(&right.sequence).then_with(|| left.decided_at.cmp(&right.decided_at))
        });

        let mut verdicts = BTreeMap::new();
        for decision in ordered.iter().copied() {
            if verdicts.insert(&decision.approver_id, decision.verdict).is_some() {
                return Err(DomainError::InvariantViolation(format!(
                    "approver `{}` has more than one decision on expense `{}`",
                    decision.approver_id, decision.expense_id
                )));
            }
        }

        let counted = |verdict: Verdict| {
            verdicts
                .iter()
                .filter(|(approver_id, cast)| roster.contains(**approver_id) && **cast == verdict)
                .count()
        };
        let approvals = counted(Verdict::Approved);
        let rejections = counted(Verdict::Rejected);

        let first_counted =
            ordered.iter().copied().find(|decision| roster.contains(&decision.approver_id));
        let direct_manager =
            snapshot.direct_manager.as_ref().filter(|manager_id| roster.contains(*manager_id));

        Ok(Self {
            submitter: &snapshot.submitter_id,
            roster,
            verdicts,
            direct_manager,
            first_counted,
            approvals,
            rejections,
        })
    }

    fn verdict_of(&self, user_id: &UserId) -> Option<Verdict> {
        self.verdicts.get(user_id).copied()
    }

    fn undecided(&self) -> impl Iterator<Item = &'a UserId> + '_ {
        self.roster.iter().copied().filter(|id| !self.verdicts.contains_key(*id))
    }

    fn gate_for(&self, rule: &ApprovalRule) -> GateState {
        if !rule.is_sequential {
            return GateState::NotRequired;
        }

        match self.direct_manager {
            None => GateState::NotRequired,
            Some(manager_id) => match self.verdict_of(manager_id) {
                None => GateState::Closed,
                Some(Verdict::Approved) => GateState::Opened,
                Some(Verdict::Rejected) => GateState::Vetoed,
            },
        }
    }

    fn next_approvers(&self, rule: &ApprovalRule, gate: GateState) -> Vec<UserId> {
        if gate == GateState::Closed {
            return self.direct_manager.into_iter().cloned().collect();
        }

        let mut next: Vec<UserId> = match &rule.policy {
            RulePolicy::SpecificApprover { .. } => Vec::new(),
            RulePolicy::Percentage { .. } | RulePolicy::Hybrid { .. } => {
                self.undecided().cloned().collect()
            }
        };
        if let Some(approver_id) = rule.policy.specific_approver() {
            if approver_id != self.submitter && self.verdict_of(approver_id).is_none() {
                next.push(approver_id.clone());
            }
        }
        next
    }
}
