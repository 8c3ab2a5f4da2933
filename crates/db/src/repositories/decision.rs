use sqlx::sqlite::SqliteRow;

use outlay_core::domain::decision::{Decision, DecisionId, Verdict};
use outlay_core::domain::expense::{Expense, ExpenseId};
use outlay_core::domain::user::UserId;
use outlay_core::errors::WorkflowError;
use outlay_core::ledger::canonical_timestamp;
use outlay_core::workflow::ports::DecisionRepository;

use super::{column, decode_error, is_unique_violation, parse_timestamp, to_u32, RepositoryError};
use crate::DbPool;

/// Append-only: decision rows are inserted and read, never updated.
pub struct SqlDecisionRepository {
    pool: DbPool,
}

impl SqlDecisionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<Decision>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, expense_id, approver_id, verdict, comment, sequence, prev_hash,
                    entry_hash, signature, decided_at
             FROM expense_decisions
             WHERE expense_id = ?
             ORDER BY sequence ASC",
        )
        .bind(&expense_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_decision).collect()
    }

    /// Inserts the entry and, when it settles the expense, moves the still-pending expense to
    /// its terminal status in the same transaction.
    async fn insert(
        &self,
        decision: &Decision,
        settled: Option<&Expense>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO expense_decisions (id, expense_id, approver_id, verdict, comment,
                                            sequence, prev_hash, entry_hash, signature,
                                            decided_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&decision.id.0)
        .bind(&decision.expense_id.0)
        .bind(&decision.approver_id.0)
        .bind(decision.verdict.as_str())
        .bind(decision.comment.as_deref())
        .bind(i64::from(decision.sequence))
        .bind(decision.prev_hash.as_deref())
        .bind(&decision.entry_hash)
        .bind(&decision.signature)
        .bind(canonical_timestamp(decision.decided_at))
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {}
            Err(error) if is_unique_violation(&error) => {
                return Err(RepositoryError::Conflict(format!(
                    "expense `{}` already has a decision from `{}` or at sequence {}",
                    decision.expense_id, decision.approver_id, decision.sequence
                )));
            }
            Err(error) => return Err(error.into()),
        }

        if let Some(expense) = settled {
            let updated = sqlx::query(
                "UPDATE expenses SET status = ?, updated_at = ?
                 WHERE id = ? AND status = 'pending'",
            )
            .bind(expense.status.as_str())
            .bind(canonical_timestamp(expense.updated_at))
            .bind(&expense.id.0)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() != 1 {
                return Err(RepositoryError::Conflict(format!(
                    "expense `{}` is no longer pending",
                    expense.id
                )));
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

fn row_to_decision(row: &SqliteRow) -> Result<Decision, RepositoryError> {
    let verdict: String = column(row, "verdict")?;
    let sequence: i64 = column(row, "sequence")?;
    let decided_at: String = column(row, "decided_at")?;

    Ok(Decision {
        id: DecisionId(column(row, "id")?),
        expense_id: ExpenseId(column(row, "expense_id")?),
        approver_id: UserId(column(row, "approver_id")?),
        verdict: verdict.parse::<Verdict>().map_err(decode_error)?,
        comment: column(row, "comment")?,
        decided_at: parse_timestamp("decided_at", &decided_at)?,
        sequence: to_u32("sequence", sequence)?,
        prev_hash: column(row, "prev_hash")?,
        entry_hash: column(row, "entry_hash")?,
        signature: column(row, "signature")?,
    })
}

#[async_trait::async_trait]
impl DecisionRepository for SqlDecisionRepository {
    async fn decisions_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<Decision>, WorkflowError> {
        Ok(self.fetch_for_expense(expense_id).await?)
    }

    async fn append(
        &self,
        decision: Decision,
        settled: Option<Expense>,
    ) -> Result<(), WorkflowError> {
        Ok(self.insert(&decision, settled.as_ref()).await?)
    }
}
