use serde_json::Value;
use uuid::Uuid;

use crate::{db::DbPool, error::AppResult};

/// One audit trail entry. Inserts are best-effort: callers log failures and
/// carry on with the request.
pub struct AuditEntry<'a> {
    pub user_id: Option<Uuid>,
    pub action: &'a str,
    pub resource: Option<&'a str>,
    pub metadata: Option<Value>,
}

pub async fn record(pool: &DbPool, entry: AuditEntry<'_>) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (user_id, action, resource, metadata)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.action)
    .bind(entry.resource)
    .bind(entry.metadata)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fire-and-forget variant used on request paths.
pub async fn record_or_warn(pool: &DbPool, entry: AuditEntry<'_>) {
    let action = entry.action;
    if let Err(err) = record(pool, entry).await {
        tracing::warn!(error = %err, action, "audit log failed");
    }
}
