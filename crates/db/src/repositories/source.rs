use async_trait::async_trait;
use chrono::Utc;
use mailquote_core::domain::analysis::SourceId;
use mailquote_core::ports::{SourceDocument, SourceDocuments, StoreError};
use sqlx::Row;

use super::RepositoryError;
use crate::DbPool;

/// Locally ingested source documents.
pub struct SqlSourceRepository {
    pool: DbPool,
}

impl SqlSourceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces the document stored under its source id.
    pub async fn save(&self, document: &SourceDocument) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO source_document (source_id, body, attachment_text, received_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(source_id) DO UPDATE SET
                body = excluded.body,
                attachment_text = excluded.attachment_text,
                received_at = excluded.received_at
            "#,
        )
        .bind(document.source_id.as_str())
        .bind(&document.body)
        .bind(document.attachment_text.as_deref())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find(
        &self,
        source_id: &SourceId,
    ) -> Result<Option<SourceDocument>, RepositoryError> {
        let row = sqlx::query(
            "SELECT source_id, body, attachment_text FROM source_document WHERE source_id = ?",
        )
        .bind(source_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<SourceDocument, RepositoryError> {
            Ok(SourceDocument {
                source_id: SourceId(row.try_get("source_id")?),
                body: row.try_get("body")?,
                attachment_text: row.try_get("attachment_text")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl SourceDocuments for SqlSourceRepository {
    async fn fetch(&self, source_id: &SourceId) -> Result<Option<SourceDocument>, StoreError> {
        Ok(self.find(source_id).await?)
    }
}
