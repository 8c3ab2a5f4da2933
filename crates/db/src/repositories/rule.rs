use sqlx::sqlite::SqliteRow;

use outlay_core::domain::rule::{ApprovalRule, RuleId, RulePolicy, RuleType};
use outlay_core::domain::user::{CompanyId, UserId};
use outlay_core::errors::WorkflowError;
use outlay_core::ledger::canonical_timestamp;
use outlay_core::workflow::ports::RuleRepository;

use super::{column, decode_error, parse_decimal, parse_timestamp, to_u32, RepositoryError};
use crate::DbPool;

const RULE_COLUMNS: &str =
    "id, company_id, rule_type, threshold_pct, specific_approver_id, is_sequential, position, \
     created_at";

pub struct SqlRuleRepository {
    pool: DbPool,
}

impl SqlRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ApprovalRule>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM approval_rules WHERE company_id = ? ORDER BY position, id"
        ))
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_rule).collect()
    }

    async fn fetch(&self, id: &RuleId) -> Result<Option<ApprovalRule>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {RULE_COLUMNS} FROM approval_rules WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.as_ref().map(row_to_rule).transpose()
    }

    async fn insert(&self, rule: &ApprovalRule) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO approval_rules (id, company_id, rule_type, threshold_pct,
                                         specific_approver_id, is_sequential, position,
                                         created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&rule.id.0)
        .bind(&rule.company_id.0)
        .bind(rule.policy.rule_type().as_str())
        .bind(rule.policy.threshold_pct().map(|threshold| threshold.to_string()))
        .bind(rule.policy.specific_approver().map(|approver_id| approver_id.0.clone()))
        .bind(rule.is_sequential)
        .bind(i64::from(rule.position))
        .bind(canonical_timestamp(rule.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &RuleId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM approval_rules WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_rule(row: &SqliteRow) -> Result<ApprovalRule, RepositoryError> {
    let rule_type: String = column(row, "rule_type")?;
    let threshold_pct: Option<String> = column(row, "threshold_pct")?;
    let specific_approver_id: Option<String> = column(row, "specific_approver_id")?;
    let position: i64 = column(row, "position")?;
    let created_at: String = column(row, "created_at")?;

    let threshold_pct = threshold_pct
        .map(|threshold| parse_decimal("threshold_pct", &threshold))
        .transpose()?;
    let policy = RulePolicy::from_parts(
        rule_type.parse::<RuleType>().map_err(decode_error)?,
        threshold_pct,
        specific_approver_id.map(UserId),
    )
    .map_err(decode_error)?;

    Ok(ApprovalRule {
        id: RuleId(column(row, "id")?),
        company_id: CompanyId(column(row, "company_id")?),
        policy,
        is_sequential: column(row, "is_sequential")?,
        position: to_u32("position", position)?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl RuleRepository for SqlRuleRepository {
    async fn rules_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ApprovalRule>, WorkflowError> {
        Ok(self.fetch_for_company(company_id).await?)
    }

    async fn find_rule(&self, id: &RuleId) -> Result<Option<ApprovalRule>, WorkflowError> {
        Ok(self.fetch(id).await?)
    }

    async fn create_rule(&self, rule: ApprovalRule) -> Result<(), WorkflowError> {
        Ok(self.insert(&rule).await?)
    }

    async fn delete_rule(&self, id: &RuleId) -> Result<bool, WorkflowError> {
        Ok(self.delete(id).await?)
    }
}
