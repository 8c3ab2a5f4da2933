use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::approvals::ApproverEligibility;
use crate::domain::decision::{Decision, DecisionId, Verdict};
use crate::domain::expense::{Expense, ExpenseId};
use crate::domain::user::User;
use crate::errors::WorkflowError;

type HmacSha256 = Hmac<Sha256>;

/// A candidate decision, before the ledger has accepted it.
#[derive(Clone, Debug)]
pub struct DecisionRequest<'a> {
    pub expense: &'a Expense,
    pub submitter: &'a User,
    pub approver: &'a User,
    pub verdict: Verdict,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub expense_id: ExpenseId,
    pub valid: bool,
    pub verified_entries: usize,
    pub latest_hash: Option<String>,
    pub failure_reason: Option<String>,
}

/// Append-only decision ledger rules. Each accepted decision is chained to its predecessor by
/// hash and signed, so edits to stored decisions show up in [`DecisionLedger::verify_chain`].
#[derive(Clone)]
pub struct DecisionLedger {
    signing_key: Vec<u8>,
    eligibility: ApproverEligibility,
}

impl std::fmt::Debug for DecisionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionLedger").field("signing_key", &"<redacted>").finish()
    }
}

impl DecisionLedger {
    pub fn new(signing_key: impl AsRef<[u8]>) -> Self {
        Self { signing_key: signing_key.as_ref().to_vec(), eligibility: ApproverEligibility }
    }

    /// Validates `request` against the expense's existing ledger and builds the next entry.
    /// The caller persists it.
    pub fn record(
        &self,
        request: DecisionRequest<'_>,
        existing: &[Decision],
        decided_at: DateTime<Utc>,
    ) -> Result<Decision, WorkflowError> {
        let expense_id = &request.expense.id;
        let approver_id = &request.approver.id;

        let eligibility = self.eligibility.check(request.submitter, request.approver);
        if !eligibility.allowed {
            return Err(WorkflowError::IneligibleApprover {
                expense_id: expense_id.clone(),
                approver_id: approver_id.clone(),
                reason: eligibility.reason,
            });
        }

        let previous = existing.iter().find(|decision| decision.approver_id == *approver_id);
        if let Some(previous) = previous {
            return Err(WorkflowError::DuplicateDecision {
                expense_id: expense_id.clone(),
                approver_id: approver_id.clone(),
                existing: previous.verdict,
            });
        }

        let tip = existing.iter().max_by_key(|decision| decision.sequence);
        let sequence = tip.map(|decision| decision.sequence).unwrap_or(0).saturating_add(1);
        let prev_hash = tip.map(|decision| decision.entry_hash.clone());
        let comment = request
            .comment
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        let entry_hash = hash_entry_material(&EntryMaterial {
            expense_id,
            sequence,
            approver_id: &approver_id.0,
            verdict: request.verdict,
            comment: comment.as_deref(),
            prev_hash: prev_hash.as_deref(),
            decided_at,
        });
        let signature = hmac_hex(&self.signing_key, entry_hash.as_bytes());

        Ok(Decision {
            id: DecisionId(Uuid::new_v4().to_string()),
            expense_id: expense_id.clone(),
            approver_id: approver_id.clone(),
            verdict: request.verdict,
            comment,
            decided_at,
            sequence,
            prev_hash,
            entry_hash,
            signature,
        })
    }

    pub fn verify_chain(&self, expense_id: &ExpenseId, entries: &[Decision]) -> VerificationResult {
        let mut ordered: Vec<&Decision> = entries.iter().collect();
        ordered.sort_by_key(|decision| decision.sequence);

        let failure = |index: usize, latest_hash: Option<String>, reason: String| {
            VerificationResult {
                expense_id: expense_id.clone(),
                valid: false,
                verified_entries: index,
                latest_hash,
                failure_reason: Some(reason),
            }
        };

        let mut previous_hash: Option<String> = None;
        for (index, entry) in ordered.iter().enumerate() {
            if entry.expense_id != *expense_id {
                return failure(
                    index,
                    previous_hash,
                    format!("entry {} belongs to expense {}", entry.id, entry.expense_id),
                );
            }

            let expected_sequence = u32::try_from(index).unwrap_or(u32::MAX).saturating_add(1);
            if entry.sequence != expected_sequence {
                return failure(
                    index,
                    previous_hash,
                    format!(
                        "sequence mismatch at entry {}: expected {}, found {}",
                        entry.id, expected_sequence, entry.sequence
                    ),
                );
            }

            if entry.prev_hash != previous_hash {
                return failure(
                    index,
                    previous_hash,
                    format!("previous hash mismatch at entry {}", entry.id),
                );
            }

            let computed_entry_hash = hash_entry_material(&EntryMaterial {
                expense_id: &entry.expense_id,
                sequence: entry.sequence,
                approver_id: &entry.approver_id.0,
                verdict: entry.verdict,
                comment: entry.comment.as_deref(),
                prev_hash: entry.prev_hash.as_deref(),
                decided_at: entry.decided_at,
            });
            if computed_entry_hash != entry.entry_hash {
                return failure(
                    index,
                    previous_hash,
                    format!("entry hash mismatch at entry {}", entry.id),
                );
            }

            let expected_signature = hmac_hex(&self.signing_key, entry.entry_hash.as_bytes());
            if expected_signature != entry.signature {
                return failure(
                    index,
                    previous_hash,
                    format!("signature mismatch at entry {}", entry.id),
                );
            }

            previous_hash = Some(entry.entry_hash.clone());
        }

        VerificationResult {
            expense_id: expense_id.clone(),
            valid: true,
            verified_entries: ordered.len(),
            latest_hash: previous_hash,
            failure_reason: None,
        }
    }
}

/// Timestamps are hashed and stored at microsecond precision so that entries survive a storage
/// round trip unchanged.
pub fn canonical_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

struct EntryMaterial<'a> {
    expense_id: &'a ExpenseId,
    sequence: u32,
    approver_id: &'a str,
    verdict: Verdict,
    comment: Option<&'a str>,
    prev_hash: Option<&'a str>,
    decided_at: DateTime<Utc>,
}

fn hash_entry_material(material: &EntryMaterial<'_>) -> String {
    let payload = format!(
        "{}|{}|{}|{}|{}|{}|{}",
        material.expense_id.0,
        material.sequence,
        material.approver_id,
        material.verdict.as_str(),
        material.comment.unwrap_or(""),
        material.prev_hash.unwrap_or(""),
        canonical_timestamp(material.decided_at),
    );
    sha256_hex(payload.as_bytes())
}

fn hmac_hex(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return sha256_hex(payload),
    };
    mac.update(payload);
    encode_hex(mac.finalize().into_bytes().as_slice())
}

fn sha256_hex(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    encode_hex(digest.as_slice())
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{DecisionLedger, DecisionRequest};
    use crate::domain::decision::{Decision, Verdict};
    use crate::domain::expense::{Expense, ExpenseId, ExpenseStatus};
    use crate::domain::user::{CompanyId, Role, User, UserId};
    use crate::errors::WorkflowError;

    fn user(id: &str, role: Role) -> User {
        User {
            id: UserId(id.to_string()),
            company_id: CompanyId("acme".to_string()),
            full_name: id.to_string(),
            role,
            manager_id: None,
        }
    }

    fn expense() -> Expense {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).single().expect("timestamp");
        Expense {
            id: ExpenseId("EXP-ledger-1".to_string()),
            company_id: CompanyId("acme".to_string()),
            submitter_id: UserId("u-emp".to_string()),
            description: "Train tickets".to_string(),
            category: "travel".to_string(),
            amount: Decimal::new(8_900, 2),
            currency: "EUR".to_string(),
            original_amount: Decimal::new(8_900, 2),
            original_currency: "EUR".to_string(),
            expense_date: NaiveDate::from_ymd_opt(2026, 5, 30).expect("date"),
            status: ExpenseStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    fn record(
        ledger: &DecisionLedger,
        chain: &[Decision],
        approver: &str,
        verdict: Verdict,
    ) -> Result<Decision, WorkflowError> {
        let expense = expense();
        let submitter = user("u-emp", Role::Employee);
        let approver = user(approver, Role::Manager);
        let at = expense.created_at + Duration::minutes(chain.len() as i64 + 1);
        ledger.record(
            DecisionRequest {
                expense: &expense,
                submitter: &submitter,
                approver: &approver,
                verdict,
                comment: Some(" looks fine ".to_string()),
            },
            chain,
            at,
        )
    }

    #[test]
    fn record_links_previous_hash_chain() {
        let ledger = DecisionLedger::new("secret-key");
        let first = record(&ledger, &[], "u-mgr-1", Verdict::Approved).expect("first");
        let second = record(&ledger, std::slice::from_ref(&first), "u-mgr-2", Verdict::Rejected)
            .expect("second");

        assert_eq!(first.sequence, 1);
        assert_eq!(first.prev_hash, None);
        assert_eq!(first.comment.as_deref(), Some("looks fine"));
        assert_eq!(second.sequence, 2);
        assert_eq!(second.prev_hash, Some(first.entry_hash));
    }

    #[test]
    fn second_decision_by_same_approver_is_a_duplicate() {
        let ledger = DecisionLedger::new("secret-key");
        let first = record(&ledger, &[], "u-mgr-1", Verdict::Approved).expect("first");

        let error = record(&ledger, &[first], "u-mgr-1", Verdict::Rejected)
            .expect_err("duplicate should fail");
        assert!(matches!(
            error,
            WorkflowError::DuplicateDecision { existing: Verdict::Approved, .. }
        ));
    }

    #[test]
    fn employees_are_ineligible() {
        let ledger = DecisionLedger::new("secret-key");
        let expense = expense();
        let submitter = user("u-emp", Role::Employee);
        let peer = user("u-peer", Role::Employee);

        let error = ledger
            .record(
                DecisionRequest {
                    expense: &expense,
                    submitter: &submitter,
                    approver: &peer,
                    verdict: Verdict::Approved,
                    comment: None,
                },
                &[],
                Utc::now(),
            )
            .expect_err("employee should be ineligible");
        assert!(matches!(error, WorkflowError::IneligibleApprover { .. }));
    }

    #[test]
    fn verify_chain_succeeds_for_untampered_entries() {
        let ledger = DecisionLedger::new("secret-key");
        let mut chain = Vec::new();
        for approver in ["u-mgr-1", "u-mgr-2", "u-mgr-3"] {
            let entry = record(&ledger, &chain, approver, Verdict::Approved).expect("record");
            chain.push(entry);
        }

        let result = ledger.verify_chain(&ExpenseId("EXP-ledger-1".to_string()), &chain);
        assert!(result.valid);
        assert_eq!(result.verified_entries, 3);
        assert_eq!(result.latest_hash, chain.last().map(|entry| entry.entry_hash.clone()));
    }

    #[test]
    fn verify_chain_detects_rewritten_verdicts() {
        let ledger = DecisionLedger::new("secret-key");
        let first = record(&ledger, &[], "u-mgr-1", Verdict::Rejected).expect("first");
        let second = record(&ledger, std::slice::from_ref(&first), "u-mgr-2", Verdict::Approved)
            .expect("second");
        let mut chain = vec![first, second];
        chain[0].verdict = Verdict::Approved;

        let result = ledger.verify_chain(&ExpenseId("EXP-ledger-1".to_string()), &chain);
        assert!(!result.valid);
        assert_eq!(result.verified_entries, 0);
        assert!(result.failure_reason.unwrap_or_default().contains("entry hash mismatch"));
    }

    #[test]
    fn verify_chain_rejects_foreign_signing_key() {
        let ledger = DecisionLedger::new("secret-key");
        let first = record(&ledger, &[], "u-mgr-1", Verdict::Approved).expect("first");

        let result = DecisionLedger::new("other-key")
            .verify_chain(&ExpenseId("EXP-ledger-1".to_string()), &[first]);
        assert!(!result.valid);
        assert!(result.failure_reason.unwrap_or_default().contains("signature mismatch"));
    }
}
