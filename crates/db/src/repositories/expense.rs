use sqlx::sqlite::SqliteRow;

use outlay_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use outlay_core::domain::user::{CompanyId, UserId};
use outlay_core::errors::WorkflowError;
use outlay_core::ledger::canonical_timestamp;
use outlay_core::workflow::ports::ExpenseRepository;

use super::{column, decode_error, parse_date, parse_decimal, parse_timestamp, RepositoryError};
use crate::DbPool;

const EXPENSE_COLUMNS: &str = "id, company_id, submitter_id, description, category, amount, \
     currency, original_amount, original_currency, expense_date, status, created_at, updated_at";

pub struct SqlExpenseRepository {
    pool: DbPool,
}

impl SqlExpenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_expense).transpose()
    }

    async fn upsert(&self, expense: &Expense) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO expenses (id, company_id, submitter_id, description, category, amount,
                                   currency, original_amount, original_currency, expense_date,
                                   status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 description = excluded.description,
                 category = excluded.category,
                 amount = excluded.amount,
                 currency = excluded.currency,
                 original_amount = excluded.original_amount,
                 original_currency = excluded.original_currency,
                 expense_date = excluded.expense_date,
                 status = excluded.status,
                 updated_at = excluded.updated_at",
        )
        .bind(&expense.id.0)
        .bind(&expense.company_id.0)
        .bind(&expense.submitter_id.0)
        .bind(&expense.description)
        .bind(&expense.category)
        .bind(expense.amount.to_string())
        .bind(&expense.currency)
        .bind(expense.original_amount.to_string())
        .bind(&expense.original_currency)
        .bind(expense.expense_date.format("%Y-%m-%d").to_string())
        .bind(expense.status.as_str())
        .bind(canonical_timestamp(expense.created_at))
        .bind(canonical_timestamp(expense.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_pending(&self, company_id: &CompanyId) -> Result<Vec<Expense>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses
             WHERE company_id = ? AND status = 'pending'
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_expense).collect()
    }

    async fn fetch_submitted_by(
        &self,
        submitter_id: &UserId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses
             WHERE submitter_id = ?
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(&submitter_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_expense).collect()
    }
}

fn row_to_expense(row: &SqliteRow) -> Result<Expense, RepositoryError> {
    let amount: String = column(row, "amount")?;
    let original_amount: String = column(row, "original_amount")?;
    let expense_date: String = column(row, "expense_date")?;
    let status: String = column(row, "status")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;

    Ok(Expense {
        id: ExpenseId(column(row, "id")?),
        company_id: CompanyId(column(row, "company_id")?),
        submitter_id: UserId(column(row, "submitter_id")?),
        description: column(row, "description")?,
        category: column(row, "category")?,
        amount: parse_decimal("amount", &amount)?,
        currency: column(row, "currency")?,
        original_amount: parse_decimal("original_amount", &original_amount)?,
        original_currency: column(row, "original_currency")?,
        expense_date: parse_date("expense_date", &expense_date)?,
        status: status.parse::<ExpenseStatus>().map_err(decode_error)?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl ExpenseRepository for SqlExpenseRepository {
    async fn find(&self, id: &ExpenseId) -> Result<Option<Expense>, WorkflowError> {
        Ok(self.fetch(id).await?)
    }

    async fn save(&self, expense: Expense) -> Result<(), WorkflowError> {
        Ok(self.upsert(&expense).await?)
    }

    async fn pending_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Expense>, WorkflowError> {
        Ok(self.fetch_pending(company_id).await?)
    }

    async fn submitted_by(&self, submitter_id: &UserId) -> Result<Vec<Expense>, WorkflowError> {
        Ok(self.fetch_submitted_by(submitter_id).await?)
    }
}
