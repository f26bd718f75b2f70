//! SQLite Audit Log

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::DbPool;
use crate::application::ports::{AuditEntry, AuditError, AuditLogPort};
use crate::domain::segment_classifier::SegmentTag;
use crate::domain::translation::SegmentStatus;
use crate::domain::volume::VolumeId;

/// SQLite Audit Log
pub struct SqliteAuditLog {
    pool: DbPool,
}

impl SqliteAuditLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct AuditRow {
    id: String,
    volume_id: String,
    chapter: i64,
    segment_index: i64,
    tag: String,
    consulted: String,
    flags: String,
    reasoning: Option<String>,
    status: String,
    error_message: Option<String>,
    attempts: i64,
    recorded_at: String,
}

fn serialization(e: impl std::fmt::Display) -> AuditError {
    AuditError::SerializationError(e.to_string())
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = AuditError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditEntry {
            id: row.id,
            volume_id: VolumeId::new(row.volume_id).map_err(serialization)?,
            chapter: usize::try_from(row.chapter).map_err(serialization)?,
            index: usize::try_from(row.segment_index).map_err(serialization)?,
            tag: SegmentTag::from_str(&row.tag)
                .ok_or_else(|| serialization(format!("unknown tag: {}", row.tag)))?,
            consulted: serde_json::from_str(&row.consulted).map_err(serialization)?,
            flags: serde_json::from_str(&row.flags).map_err(serialization)?,
            reasoning: row.reasoning,
            status: SegmentStatus::from_str(&row.status)
                .ok_or_else(|| serialization(format!("unknown status: {}", row.status)))?,
            error: row.error_message,
            attempts: u32::try_from(row.attempts).map_err(serialization)?,
            recorded_at: DateTime::parse_from_rfc3339(&row.recorded_at)
                .map_err(serialization)?
                .with_timezone(&Utc),
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, volume_id, chapter, segment_index, tag, consulted, flags, \
     reasoning, status, error_message, attempts, recorded_at FROM audit_entries";

#[async_trait]
impl AuditLogPort for SqliteAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let consulted = serde_json::to_string(&entry.consulted).map_err(serialization)?;
        let flags = serde_json::to_string(&entry.flags).map_err(serialization)?;

        sqlx::query(
            r#"
            INSERT INTO audit_entries (
                id, volume_id, chapter, segment_index, tag, consulted, flags,
                reasoning, status, error_message, attempts, recorded_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.volume_id.as_str())
        .bind(entry.chapter as i64)
        .bind(entry.index as i64)
        .bind(entry.tag.as_str())
        .bind(consulted)
        .bind(flags)
        .bind(&entry.reasoning)
        .bind(entry.status.as_str())
        .bind(&entry.error)
        .bind(i64::from(entry.attempts))
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn entries(
        &self,
        volume_id: &VolumeId,
        chapter: Option<usize>,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let rows: Vec<AuditRow> = match chapter {
            Some(chapter) => {
                sqlx::query_as(&format!(
                    "{} WHERE volume_id = ? AND chapter = ? ORDER BY chapter, segment_index, recorded_at",
                    SELECT_COLUMNS
                ))
                .bind(volume_id.as_str())
                .bind(chapter as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(&format!(
                    "{} WHERE volume_id = ? ORDER BY chapter, segment_index, recorded_at",
                    SELECT_COLUMNS
                ))
                .bind(volume_id.as_str())
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| AuditError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(AuditEntry::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::CacheKey;
    use crate::domain::translation::GuardFlag;
    use crate::domain::volume::Fingerprint;
    use crate::infrastructure::persistence::sqlite::{create_pool, run_migrations, DatabaseConfig};

    async fn audit_log() -> SqliteAuditLog {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteAuditLog::new(pool)
    }

    fn entry(chapter: usize, index: usize) -> AuditEntry {
        AuditEntry {
            id: uuid::Uuid::new_v4().to_string(),
            volume_id: VolumeId::new("vol-01").unwrap(),
            chapter,
            index,
            tag: SegmentTag::Direct,
            consulted: vec![CacheKey::new(
                Fingerprint::of_bytes(b"img"),
                Fingerprint::of_text("prompt"),
                "vision-1",
            )],
            flags: vec![GuardFlag::SafetyFallbackContext],
            reasoning: Some("checked the illustration tone".to_string()),
            status: SegmentStatus::Ok,
            error: None,
            attempts: 1,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_record_and_list_by_chapter() {
        let log = audit_log().await;
        let volume = VolumeId::new("vol-01").unwrap();

        log.record(entry(2, 1)).await.unwrap();
        log.record(entry(1, 4)).await.unwrap();
        log.record(entry(1, 0)).await.unwrap();

        let all = log.entries(&volume, None).await.unwrap();
        let order: Vec<_> = all.iter().map(|e| (e.chapter, e.index)).collect();
        assert_eq!(order, vec![(1, 0), (1, 4), (2, 1)]);

        let first = log.entries(&volume, Some(1)).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].flags, vec![GuardFlag::SafetyFallbackContext]);
        assert_eq!(first[0].consulted[0].model_version, "vision-1");
        assert_eq!(first[0].tag, SegmentTag::Direct);
    }

    #[tokio::test]
    async fn test_other_volume_is_isolated() {
        let log = audit_log().await;
        log.record(entry(1, 0)).await.unwrap();

        let other = VolumeId::new("vol-02").unwrap();
        assert!(log.entries(&other, None).await.unwrap().is_empty());
    }
}
