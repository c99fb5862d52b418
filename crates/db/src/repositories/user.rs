use async_trait::async_trait;
use sqlx::Row;

use taxcase_core::domain::user::{StaffDirectory, UserId, UserProfile, UserRole};
use taxcase_core::errors::CoreError;

use crate::DbPool;

/// Role/activity lookups over the `app_user` table. Account management is
/// owned elsewhere; this is the read slice the core needs.
pub struct SqlStaffDirectory {
    pool: DbPool,
}

impl SqlStaffDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Fixture/bootstrap helper; real account provisioning lives outside
    /// this system.
    pub async fn upsert_user(&self, profile: &UserProfile) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO app_user (id, role, active) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET role = excluded.role, active = excluded.active",
        )
        .bind(&profile.id.0)
        .bind(profile.role.as_str())
        .bind(i64::from(profile.active))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl StaffDirectory for SqlStaffDirectory {
    async fn find(&self, id: &UserId) -> Result<Option<UserProfile>, CoreError> {
        let row = sqlx::query("SELECT id, role, active FROM app_user WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let role_str: String =
            row.try_get("role").map_err(|e| CoreError::Storage(e.to_string()))?;
        let role = UserRole::parse(&role_str)
            .ok_or_else(|| CoreError::Storage(format!("unknown user role `{role_str}`")))?;
        let active: i64 = row.try_get("active").map_err(|e| CoreError::Storage(e.to_string()))?;

        Ok(Some(UserProfile {
            id: UserId(row.try_get("id").map_err(|e| CoreError::Storage(e.to_string()))?),
            role,
            active: active != 0,
        }))
    }
}
