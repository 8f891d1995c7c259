use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use mailquote_core::domain::analysis::SourceId;
use mailquote_core::domain::correction::{
    CorrectionOverlay, CorrectionPatch, CorrectionTarget, PriceCorrection,
};
use mailquote_core::ports::{CorrectionStore, StoreError};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use super::{parse_timestamp, RepositoryError};
use crate::DbPool;

/// Correction overlays (one merged patch per target) and the append-only price trail.
pub struct SqlCorrectionRepository {
    pool: DbPool,
}

impl SqlCorrectionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn merge_overlay(
        &self,
        source_id: &SourceId,
        target: CorrectionTarget,
        patch: CorrectionPatch,
        author: &str,
    ) -> Result<CorrectionOverlay, RepositoryError> {
        let target_key = target.to_string();
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            "SELECT patch_json FROM correction_overlay WHERE source_id = ? AND target = ?",
        )
        .bind(source_id.as_str())
        .bind(&target_key)
        .fetch_optional(&mut *tx)
        .await?;

        let mut merged = match existing {
            Some(row) => decode_patch(&row.try_get::<String, _>("patch_json")?)?,
            None => CorrectionPatch::new(),
        };
        merged.extend(patch);
        let patch_json = serde_json::to_string(&merged)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        let updated_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO correction_overlay (source_id, target, patch_json, author, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(source_id, target) DO UPDATE SET
                patch_json = excluded.patch_json,
                author = excluded.author,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(source_id.as_str())
        .bind(&target_key)
        .bind(patch_json)
        .bind(author)
        .bind(updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(CorrectionOverlay {
            source_id: source_id.clone(),
            target,
            patch: merged,
            author: author.to_string(),
            updated_at,
        })
    }

    pub async fn list_overlays(
        &self,
        source_id: &SourceId,
    ) -> Result<Vec<CorrectionOverlay>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT source_id, target, patch_json, author, updated_at
            FROM correction_overlay
            WHERE source_id = ?
            ORDER BY updated_at ASC, target ASC
            "#,
        )
        .bind(source_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(overlay_from_row).collect()
    }

    pub async fn insert_price(&self, entry: &PriceCorrection) -> Result<(), RepositoryError> {
        let line_index = i64::try_from(entry.line_index)
            .map_err(|_| RepositoryError::Decode("line index out of range".to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO price_correction (id, source_id, line_index, unit_price, author, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.source_id.as_str())
        .bind(line_index)
        .bind(entry.unit_price.to_string())
        .bind(&entry.author)
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_prices(
        &self,
        source_id: &SourceId,
        line_index: Option<usize>,
    ) -> Result<Vec<PriceCorrection>, RepositoryError> {
        let line_filter = line_index.and_then(|index| i64::try_from(index).ok());
        let rows = sqlx::query(
            r#"
            SELECT id, source_id, line_index, unit_price, author, recorded_at
            FROM price_correction
            WHERE source_id = ? AND (? IS NULL OR line_index = ?)
            ORDER BY seq ASC
            "#,
        )
        .bind(source_id.as_str())
        .bind(line_filter)
        .bind(line_filter)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(price_from_row).collect()
    }
}

#[async_trait]
impl CorrectionStore for SqlCorrectionRepository {
    async fn upsert_overlay(
        &self,
        source_id: &SourceId,
        target: CorrectionTarget,
        patch: CorrectionPatch,
        author: &str,
    ) -> Result<CorrectionOverlay, StoreError> {
        Ok(self.merge_overlay(source_id, target, patch, author).await?)
    }

    async fn overlays(&self, source_id: &SourceId) -> Result<Vec<CorrectionOverlay>, StoreError> {
        Ok(self.list_overlays(source_id).await?)
    }

    async fn append_price_correction(&self, entry: &PriceCorrection) -> Result<(), StoreError> {
        Ok(self.insert_price(entry).await?)
    }

    async fn price_history(
        &self,
        source_id: &SourceId,
        line_index: Option<usize>,
    ) -> Result<Vec<PriceCorrection>, StoreError> {
        Ok(self.list_prices(source_id, line_index).await?)
    }
}

fn decode_patch(raw: &str) -> Result<CorrectionPatch, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid patch_json: {error}")))
}

fn overlay_from_row(row: &SqliteRow) -> Result<CorrectionOverlay, RepositoryError> {
    let target: String = row.try_get("target")?;
    let patch_json: String = row.try_get("patch_json")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(CorrectionOverlay {
        source_id: SourceId(row.try_get("source_id")?),
        target: CorrectionTarget::from_str(&target).map_err(RepositoryError::Decode)?,
        patch: decode_patch(&patch_json)?,
        author: row.try_get("author")?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn price_from_row(row: &SqliteRow) -> Result<PriceCorrection, RepositoryError> {
    let line_index: i64 = row.try_get("line_index")?;
    let unit_price: String = row.try_get("unit_price")?;
    let recorded_at: String = row.try_get("recorded_at")?;

    Ok(PriceCorrection {
        id: row.try_get("id")?,
        source_id: SourceId(row.try_get("source_id")?),
        line_index: usize::try_from(line_index)
            .map_err(|_| RepositoryError::Decode(format!("invalid line_index: {line_index}")))?,
        unit_price: Decimal::from_str(&unit_price)
            .map_err(|error| RepositoryError::Decode(format!("invalid unit_price: {error}")))?,
        author: row.try_get("author")?,
        recorded_at: parse_timestamp("recorded_at", &recorded_at)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mailquote_core::domain::analysis::SourceId;
    use mailquote_core::domain::correction::{CorrectionPatch, CorrectionTarget, PriceCorrection};
    use mailquote_core::ports::CorrectionStore;
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::SqlCorrectionRepository;
    use crate::repositories::setup_pool;

    fn patch(value: serde_json::Value) -> CorrectionPatch {
        serde_json::from_value(value).expect("patch object")
    }

    fn price(id: &str, line_index: usize, cents: i64) -> PriceCorrection {
        PriceCorrection {
            id: id.to_string(),
            source_id: SourceId("mail-1".to_string()),
            line_index,
            unit_price: Decimal::new(cents, 2),
            author: "alice".to_string(),
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn overlays_merge_field_by_field_per_target() {
        let repo = SqlCorrectionRepository::new(setup_pool().await);
        let source_id = SourceId("mail-1".to_string());

        let line = CorrectionTarget::Line(0);
        repo.upsert_overlay(&source_id, line, patch(json!({"quantity": 10})), "alice")
            .await
            .expect("first patch");
        let merged = repo
            .upsert_overlay(&source_id, line, patch(json!({"unit": "m", "quantity": 12})), "bob")
            .await
            .expect("second patch");
        let delivery = CorrectionTarget::Delivery;
        repo.upsert_overlay(&source_id, delivery, patch(json!({"notes": "quai 3"})), "bob")
            .await
            .expect("delivery patch");

        assert_eq!(merged.patch.get("quantity"), Some(&json!(12)));
        assert_eq!(merged.patch.get("unit"), Some(&json!("m")));
        assert_eq!(merged.author, "bob");

        let overlays = repo.overlays(&source_id).await.expect("list overlays");
        assert_eq!(overlays.len(), 2);
        assert!(overlays.iter().any(|overlay| overlay.target == CorrectionTarget::Delivery));
        assert!(repo.overlays(&SourceId("other".to_string())).await.expect("other").is_empty());
    }

    #[tokio::test]
    async fn price_history_is_append_only_and_ordered() {
        let repo = SqlCorrectionRepository::new(setup_pool().await);
        let source_id = SourceId("mail-1".to_string());

        repo.append_price_correction(&price("p1", 0, 1_050)).await.expect("p1");
        repo.append_price_correction(&price("p2", 1, 990)).await.expect("p2");
        repo.append_price_correction(&price("p3", 0, 1_000)).await.expect("p3");

        let all = repo.price_history(&source_id, None).await.expect("all");
        let ids: Vec<&str> = all.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);

        let line_zero = repo.price_history(&source_id, Some(0)).await.expect("line 0");
        let prices: Vec<Decimal> = line_zero.iter().map(|entry| entry.unit_price).collect();
        assert_eq!(prices, vec![Decimal::new(1_050, 2), Decimal::new(1_000, 2)]);

        assert!(repo.append_price_correction(&price("p1", 0, 1)).await.is_err());
    }
}
