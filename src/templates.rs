use sqlx::SqlitePool;
use tracing::debug;

use crate::models::{generate_id, ExecutionKind, RegistrationTemplate};
use crate::platforms::Platform;
use crate::utils::error::{AppError, Result};

/// Registration template storage. Selection is deterministic: active
/// templates only, lowest priority value first, name as the tiebreak.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    pool: SqlitePool,
}

impl TemplateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        platform: Platform,
        name: &str,
        data: &serde_json::Value,
        kind: ExecutionKind,
        priority: i32,
    ) -> Result<RegistrationTemplate> {
        let id = generate_id();
        let now = chrono::Utc::now();
        sqlx::query(
            r#"
            INSERT INTO registration_templates
                (id, platform, template_name, template_data, template_kind, is_active, priority, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(platform)
        .bind(name)
        .bind(data.to_string())
        .bind(kind)
        .bind(priority)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(%platform, template = name, priority, "template registered");
        self.get(&id).await
    }

    pub async fn get(&self, id: &str) -> Result<RegistrationTemplate> {
        sqlx::query_as::<_, RegistrationTemplate>(
            "SELECT * FROM registration_templates WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: format!("template {}", id),
        })
    }

    /// The template the execution paths will actually use for this platform
    /// and kind. `NoTemplateAvailable` when nothing active matches.
    pub async fn select(
        &self,
        platform: Platform,
        kind: ExecutionKind,
    ) -> Result<RegistrationTemplate> {
        sqlx::query_as::<_, RegistrationTemplate>(
            r#"
            SELECT * FROM registration_templates
            WHERE platform = ? AND template_kind = ? AND is_active = 1
            ORDER BY priority ASC, template_name ASC
            LIMIT 1
            "#,
        )
        .bind(platform)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NoTemplateAvailable {
            platform: platform.to_string(),
            kind: kind.as_str().to_string(),
        })
    }

    pub async fn deactivate(&self, id: &str) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE registration_templates SET is_active = 0, updated_at = ? WHERE id = ?",
        )
        .bind(chrono::Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(AppError::NotFound {
                resource: format!("template {}", id),
            });
        }
        Ok(())
    }
}
