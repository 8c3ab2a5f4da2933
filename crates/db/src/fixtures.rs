use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// What the demo seed must leave behind, per company.
const SEED_COMPANIES: &[SeedCompanyContract] = &[
    SeedCompanyContract {
        company_id: "northwind",
        approver_ids: &["nw-admin", "nw-mgr-finance", "nw-mgr-ops", "nw-mgr-sales"],
        employee_ids: &["nw-emp-ana", "nw-emp-ben"],
        rule_ids: &["rule-nw-majority", "rule-nw-cfo"],
        expense_ids: &["exp-nw-0001", "exp-nw-0002"],
        description: "sequential majority rule with a finance hybrid shortcut",
    },
    SeedCompanyContract {
        company_id: "contoso",
        approver_ids: &["ct-admin"],
        employee_ids: &["ct-emp-raj"],
        rule_ids: &[],
        expense_ids: &["exp-ct-0001"],
        description: "no rules, first decision settles",
    },
];

/// Demo directory, approval rules and open expenses for two companies.
///
/// Loading is idempotent: every row is inserted with `INSERT OR IGNORE`, so re-seeding never
/// resets an expense that has already been decided.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(Self::SQL).execute(&mut *tx).await?;
        tx.commit().await?;

        let companies_seeded = SEED_COMPANIES
            .iter()
            .map(|company| CompanySeedInfo {
                company_id: company.company_id,
                expense_ids: company.expense_ids,
                description: company.description,
            })
            .collect();

        Ok(SeedResult { companies_seeded })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for company in SEED_COMPANIES {
            let approvers: Vec<String> = sqlx::query_scalar(
                "SELECT id FROM users
                 WHERE company_id = ?1 AND role IN ('manager', 'admin')
                 ORDER BY id",
            )
            .bind(company.company_id)
            .fetch_all(pool)
            .await?;
            checks.push((
                format!("{}-approvers", company.company_id),
                string_list_matches(&approvers, company.approver_ids),
            ));

            let employees: Vec<String> = sqlx::query_scalar(
                "SELECT id FROM users WHERE company_id = ?1 AND role = 'employee' ORDER BY id",
            )
            .bind(company.company_id)
            .fetch_all(pool)
            .await?;
            checks.push((
                format!("{}-employees", company.company_id),
                string_list_matches(&employees, company.employee_ids),
            ));

            let rules: Vec<String> = sqlx::query_scalar(
                "SELECT id FROM approval_rules WHERE company_id = ?1 ORDER BY position, id",
            )
            .bind(company.company_id)
            .fetch_all(pool)
            .await?;
            checks.push((
                format!("{}-rules", company.company_id),
                string_list_matches(&rules, company.rule_ids),
            ));

            for expense_id in company.expense_ids {
                let exists: i64 = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM expenses WHERE id = ?1 AND company_id = ?2)",
                )
                .bind(*expense_id)
                .bind(company.company_id)
                .fetch_one(pool)
                .await?;
                checks.push((format!("expense-{expense_id}"), exists == 1));
            }
        }

        let hybrid_approver: i64 = sqlx::query_scalar(
            "SELECT EXISTS(
                 SELECT 1 FROM approval_rules r
                 JOIN users u ON u.id = r.specific_approver_id
                 WHERE r.id = 'rule-nw-cfo' AND u.company_id = r.company_id
                   AND u.role IN ('manager', 'admin'))",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("rule-nw-cfo-approver".to_string(), hybrid_approver == 1));

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes every seeded row, including decisions recorded against seeded expenses.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let expense_ids = sql_array_from_ids(
            SEED_COMPANIES.iter().flat_map(|company| company.expense_ids.iter().copied()),
        );
        let rule_ids = sql_array_from_ids(
            SEED_COMPANIES.iter().flat_map(|company| company.rule_ids.iter().copied()),
        );
        let user_ids = sql_array_from_ids(SEED_COMPANIES.iter().flat_map(|company| {
            company.approver_ids.iter().chain(company.employee_ids.iter()).copied()
        }));

        let mut tx = pool.begin().await?;
        sqlx::query(&format!("DELETE FROM expense_decisions WHERE expense_id IN {expense_ids}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM expenses WHERE id IN {expense_ids}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM approval_rules WHERE id IN {rule_ids}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM users WHERE id IN {user_ids}"))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedCompanyContract {
    company_id: &'static str,
    approver_ids: &'static [&'static str],
    employee_ids: &'static [&'static str],
    rule_ids: &'static [&'static str],
    expense_ids: &'static [&'static str],
    description: &'static str,
}

fn string_list_matches(actual: &[String], expected: &[&str]) -> bool {
    actual.len() == expected.len() && actual.iter().zip(expected).all(|(a, b)| a == b)
}

fn sql_array_from_ids<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let quoted = ids.map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub companies_seeded: Vec<CompanySeedInfo>,
}

#[derive(Debug)]
pub struct CompanySeedInfo {
    pub company_id: &'static str,
    pub expense_ids: &'static [&'static str],
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}
