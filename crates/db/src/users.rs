use async_trait::async_trait;
use sqlx::Row;

use signoff_core::{DirectoryUser, StoreError, UserDirectory, UserId};

use crate::DbPool;

pub struct SqlUserDirectory {
    pool: DbPool,
}

impl SqlUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save_user(&self, user: &DirectoryUser) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO app_user (id, username, display_name, email, active)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 username = excluded.username,
                 display_name = excluded.display_name,
                 email = excluded.email,
                 active = excluded.active",
        )
        .bind(user.id.0)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(user.active)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<DirectoryUser, StoreError> {
    Ok(DirectoryUser {
        id: UserId(row.try_get("id").map_err(backend)?),
        username: row.try_get("username").map_err(backend)?,
        display_name: row.try_get("display_name").map_err(backend)?,
        email: row.try_get("email").map_err(backend)?,
        active: row.try_get("active").map_err(backend)?,
    })
}

#[async_trait]
impl UserDirectory for SqlUserDirectory {
    async fn find_user(&self, id: UserId) -> Result<Option<DirectoryUser>, StoreError> {
        let row = sqlx::query(
            "SELECT id, username, display_name, email, active FROM app_user WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_active_ids_by_username(
        &self,
        usernames: &[String],
    ) -> Result<Vec<UserId>, StoreError> {
        if usernames.is_empty() {
            return Ok(Vec::new());
        }

        // The directory is small; filter in memory rather than building a
        // dynamic IN clause.
        let rows = sqlx::query("SELECT id, username FROM app_user WHERE active = 1")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        let mut ids = Vec::new();
        for row in &rows {
            let username: String = row.try_get("username").map_err(backend)?;
            if usernames.iter().any(|name| name == &username) {
                ids.push(UserId(row.try_get("id").map_err(backend)?));
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn list_active_users(&self) -> Result<Vec<DirectoryUser>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, username, display_name, email, active
             FROM app_user WHERE active = 1 ORDER BY username ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_user).collect()
    }
}
