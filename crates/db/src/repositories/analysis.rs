use async_trait::async_trait;
use mailquote_core::domain::analysis::{AnalysisResult, SourceId};
use mailquote_core::ports::{AnalysisStore, StoreError};
use sqlx::Row;

use super::RepositoryError;
use crate::DbPool;

/// Cached machine results, one row per source id. The full result is stored as JSON;
/// the scalar columns are kept for listing and inspection.
pub struct SqlAnalysisRepository {
    pool: DbPool,
}

impl SqlAnalysisRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find(
        &self,
        source_id: &SourceId,
    ) -> Result<Option<AnalysisResult>, RepositoryError> {
        let row = sqlx::query("SELECT payload_json FROM analysis_result WHERE source_id = ?")
            .bind(source_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<AnalysisResult, RepositoryError> {
            let payload: String = row.try_get("payload_json")?;
            serde_json::from_str(&payload).map_err(|error| {
                RepositoryError::Decode(format!("invalid analysis payload `{source_id}`: {error}"))
            })
        })
        .transpose()
    }

    pub async fn save(&self, result: &AnalysisResult) -> Result<(), RepositoryError> {
        let payload = serde_json::to_string(result)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO analysis_result (
                source_id, classification, requires_user_choice, payload_json, analyzed_at, priced_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_id) DO UPDATE SET
                classification = excluded.classification,
                requires_user_choice = excluded.requires_user_choice,
                payload_json = excluded.payload_json,
                analyzed_at = excluded.analyzed_at,
                priced_at = excluded.priced_at
            "#,
        )
        .bind(result.source_id.as_str())
        .bind(result.classification.as_str())
        .bind(result.requires_user_choice)
        .bind(payload)
        .bind(result.analyzed_at.to_rfc3339())
        .bind(result.priced_at.map(|ts| ts.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AnalysisStore for SqlAnalysisRepository {
    async fn load(&self, source_id: &SourceId) -> Result<Option<AnalysisResult>, StoreError> {
        Ok(self.find(source_id).await?)
    }

    async fn store(&self, result: &AnalysisResult) -> Result<(), StoreError> {
        Ok(self.save(result).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mailquote_core::domain::analysis::{AnalysisResult, SourceId};
    use mailquote_core::domain::request::{ActionType, DeliveryHints, ExtractedRequest};
    use mailquote_core::ports::{AnalysisStore, StoreError};
    use sqlx::Row;

    use super::SqlAnalysisRepository;
    use crate::repositories::setup_pool;

    fn result(source_id: &str, confidence: u8) -> AnalysisResult {
        let request = ExtractedRequest {
            raw_text: "infos client Edge".to_string(),
            detected_action_type: ActionType::ClientInfo,
            customer_name_guess: Some("Edge".to_string()),
            customer_email_guess: None,
            line_items: Vec::new(),
            delivery: DeliveryHints::default(),
            confidence,
        };
        AnalysisResult {
            source_id: SourceId(source_id.to_string()),
            classification: ActionType::ClientInfo,
            confidence,
            requires_user_choice: true,
            reasoning: vec!["classified as CLIENT_INFO".to_string()],
            delivery: DeliveryHints::default(),
            request,
            customer: None,
            lines: Vec::new(),
            dropped_lines: Vec::new(),
            analyzed_at: Utc::now(),
            priced_at: None,
        }
    }

    #[tokio::test]
    async fn stored_result_round_trips_and_is_replaced() {
        let pool = setup_pool().await;
        let repo = SqlAnalysisRepository::new(pool.clone());
        let source_id = SourceId("mail-1".to_string());

        repo.store(&result("mail-1", 60)).await.expect("store first");
        repo.store(&result("mail-1", 75)).await.expect("store second");

        let loaded = repo.load(&source_id).await.expect("load").expect("present");
        assert_eq!(loaded, result_with_time(&loaded, 75));

        let classification = sqlx::query(
            "SELECT classification FROM analysis_result WHERE source_id = 'mail-1'",
        )
        .fetch_one(&pool)
        .await
        .expect("read classification")
        .get::<String, _>("classification");
        assert_eq!(classification, "CLIENT_INFO");
    }

    #[tokio::test]
    async fn results_are_keyed_by_source() {
        let repo = SqlAnalysisRepository::new(setup_pool().await);
        repo.store(&result("mail-1", 60)).await.expect("store mail-1");
        repo.store(&result("mail-2", 80)).await.expect("store mail-2");

        let first = repo.load(&SourceId("mail-1".to_string())).await.expect("load 1");
        let second = repo.load(&SourceId("mail-2".to_string())).await.expect("load 2");
        assert_eq!(first.map(|result| result.confidence), Some(60));
        assert_eq!(second.map(|result| result.confidence), Some(80));
        assert!(repo.load(&SourceId("mail-3".to_string())).await.expect("load 3").is_none());
    }

    #[tokio::test]
    async fn corrupt_payload_is_a_decode_error() {
        let pool = setup_pool().await;
        sqlx::query(
            "INSERT INTO analysis_result
                (source_id, classification, requires_user_choice, payload_json, analyzed_at)
             VALUES ('mail-9', 'QUOTE', 0, '{not json', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert corrupt row");

        let error = SqlAnalysisRepository::new(pool).load(&SourceId("mail-9".to_string())).await;
        assert!(matches!(error, Err(StoreError::Decode(_))));
    }

    fn result_with_time(loaded: &AnalysisResult, confidence: u8) -> AnalysisResult {
        let mut expected = result("mail-1", confidence);
        expected.analyzed_at = loaded.analyzed_at;
        expected
    }
}
