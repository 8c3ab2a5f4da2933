use std::collections::BTreeSet;

use sqlx::sqlite::SqliteRow;

use outlay_core::domain::user::{CompanyId, Role, User, UserId};
use outlay_core::errors::WorkflowError;
use outlay_core::workflow::ports::DirectoryRepository;

use super::{column, decode_error, RepositoryError};
use crate::DbPool;

pub struct SqlDirectoryRepository {
    pool: DbPool,
}

impl SqlDirectoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, company_id, full_name, role, manager_id FROM users WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn fetch_manager(&self, id: &UserId) -> Result<Option<UserId>, RepositoryError> {
        let manager_id: Option<Option<String>> =
            sqlx::query_scalar("SELECT manager_id FROM users WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(manager_id.flatten().map(UserId))
    }

    async fn fetch_roster(
        &self,
        company_id: &CompanyId,
    ) -> Result<BTreeSet<UserId>, RepositoryError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM users
             WHERE company_id = ? AND role IN ('manager', 'admin')
             ORDER BY id",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(UserId).collect())
    }

    async fn fetch_company_users(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, company_id, full_name, role, manager_id FROM users
             WHERE company_id = ?
             ORDER BY id",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect()
    }

    async fn upsert_user(&self, user: &User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO users (id, company_id, full_name, role, manager_id)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 company_id = excluded.company_id,
                 full_name = excluded.full_name,
                 role = excluded.role,
                 manager_id = excluded.manager_id",
        )
        .bind(&user.id.0)
        .bind(&user.company_id.0)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .bind(user.manager_id.as_ref().map(|manager_id| manager_id.0.as_str()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_user(row: &SqliteRow) -> Result<User, RepositoryError> {
    let role: String = column(row, "role")?;
    let manager_id: Option<String> = column(row, "manager_id")?;

    Ok(User {
        id: UserId(column(row, "id")?),
        company_id: CompanyId(column(row, "company_id")?),
        full_name: column(row, "full_name")?,
        role: role.parse::<Role>().map_err(decode_error)?,
        manager_id: manager_id.map(UserId),
    })
}

#[async_trait::async_trait]
impl DirectoryRepository for SqlDirectoryRepository {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, WorkflowError> {
        Ok(self.fetch_user(id).await?)
    }

    async fn manager_of(&self, id: &UserId) -> Result<Option<UserId>, WorkflowError> {
        Ok(self.fetch_manager(id).await?)
    }

    async fn approver_roster(
        &self,
        company_id: &CompanyId,
    ) -> Result<BTreeSet<UserId>, WorkflowError> {
        Ok(self.fetch_roster(company_id).await?)
    }

    async fn users_in_company(&self, company_id: &CompanyId) -> Result<Vec<User>, WorkflowError> {
        Ok(self.fetch_company_users(company_id).await?)
    }

    async fn save_user(&self, user: User) -> Result<(), WorkflowError> {
        Ok(self.upsert_user(&user).await?)
    }
}

#[cfg(test)]
mod tests {
    use outlay_core::domain::user::{CompanyId, Role, User, UserId};
    use outlay_core::workflow::ports::DirectoryRepository;

    use super::SqlDirectoryRepository;
    use crate::{connect_with_settings, migrations};

    fn user(id: &str, role: Role, manager: Option<&str>) -> User {
        User {
            id: UserId(id.to_string()),
            company_id: CompanyId("acme".to_string()),
            full_name: format!("User {id}"),
            role,
            manager_id: manager.map(|manager_id| UserId(manager_id.to_string())),
        }
    }

    #[tokio::test]
    async fn sql_directory_resolves_managers_and_roster() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlDirectoryRepository::new(pool);

        for user in [
            user("admin", Role::Admin, None),
            user("mgr", Role::Manager, Some("admin")),
            user("emp", Role::Employee, Some("mgr")),
        ] {
            repo.save_user(user).await.expect("save user");
        }

        let found = repo.find_user(&UserId("emp".to_string())).await.expect("find");
        assert_eq!(found, Some(user("emp", Role::Employee, Some("mgr"))));
        assert_eq!(
            repo.manager_of(&UserId("emp".to_string())).await.expect("manager"),
            Some(UserId("mgr".to_string()))
        );
        assert_eq!(repo.manager_of(&UserId("admin".to_string())).await.expect("manager"), None);
        assert_eq!(repo.manager_of(&UserId("ghost".to_string())).await.expect("manager"), None);

        let roster =
            repo.approver_roster(&CompanyId("acme".to_string())).await.expect("roster");
        assert_eq!(
            roster.into_iter().collect::<Vec<_>>(),
            vec![UserId("admin".to_string()), UserId("mgr".to_string())]
        );
    }

    #[tokio::test]
    async fn promoting_a_user_updates_the_roster() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlDirectoryRepository::new(pool);

        let acme = CompanyId("acme".to_string());

        repo.save_user(user("emp", Role::Employee, None)).await.expect("save");
        assert!(repo.approver_roster(&acme).await.expect("roster").is_empty());

        repo.save_user(user("emp", Role::Manager, None)).await.expect("promote");
        assert_eq!(repo.approver_roster(&acme).await.expect("roster").len(), 1);
    }

    #[tokio::test]
    async fn company_users_are_listed_by_id_within_one_company() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlDirectoryRepository::new(pool);

        repo.save_user(user("mgr", Role::Manager, None)).await.expect("save");
        repo.save_user(user("emp", Role::Employee, Some("mgr"))).await.expect("save");
        repo.save_user(User {
            company_id: CompanyId("globex".to_string()),
            ..user("outsider", Role::Admin, None)
        })
        .await
        .expect("save");

        let members =
            repo.users_in_company(&CompanyId("acme".to_string())).await.expect("members");
        assert_eq!(
            members.into_iter().map(|member| member.id.0).collect::<Vec<_>>(),
            vec!["emp".to_string(), "mgr".to_string()]
        );
    }
}
