use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use mailquote_core::domain::analysis::{AnalysisResult, SourceId};
use mailquote_core::domain::correction::{
    CorrectionOverlay, CorrectionPatch, CorrectionTarget, PriceCorrection,
};
use mailquote_core::ports::{
    AnalysisStore, CorrectionStore, SourceDocument, SourceDocuments, StoreError,
};

#[derive(Default)]
pub struct InMemorySourceRepository {
    documents: RwLock<HashMap<SourceId, SourceDocument>>,
}

impl InMemorySourceRepository {
    pub async fn save(&self, document: SourceDocument) {
        let mut documents = self.documents.write().await;
        documents.insert(document.source_id.clone(), document);
    }
}

#[async_trait]
impl SourceDocuments for InMemorySourceRepository {
    async fn fetch(&self, source_id: &SourceId) -> Result<Option<SourceDocument>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents.get(source_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryAnalysisRepository {
    results: RwLock<HashMap<SourceId, AnalysisResult>>,
}

#[async_trait]
impl AnalysisStore for InMemoryAnalysisRepository {
    async fn load(&self, source_id: &SourceId) -> Result<Option<AnalysisResult>, StoreError> {
        let results = self.results.read().await;
        Ok(results.get(source_id).cloned())
    }

    async fn store(&self, result: &AnalysisResult) -> Result<(), StoreError> {
        let mut results = self.results.write().await;
        results.insert(result.source_id.clone(), result.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCorrectionRepository {
    overlays: RwLock<Vec<CorrectionOverlay>>,
    prices: RwLock<Vec<PriceCorrection>>,
}

#[async_trait]
impl CorrectionStore for InMemoryCorrectionRepository {
    async fn upsert_overlay(
        &self,
        source_id: &SourceId,
        target: CorrectionTarget,
        patch: CorrectionPatch,
        author: &str,
    ) -> Result<CorrectionOverlay, StoreError> {
        let mut overlays = self.overlays.write().await;
        let updated_at = Utc::now();
        let existing = overlays
            .iter_mut()
            .find(|overlay| &overlay.source_id == source_id && overlay.target == target);

        let merged = match existing {
            Some(overlay) => {
                overlay.patch.extend(patch);
                overlay.author = author.to_string();
                overlay.updated_at = updated_at;
                overlay.clone()
            }
            None => {
                let overlay = CorrectionOverlay {
                    source_id: source_id.clone(),
                    target,
                    patch,
                    author: author.to_string(),
                    updated_at,
                };
                overlays.push(overlay.clone());
                overlay
            }
        };
        Ok(merged)
    }

    async fn overlays(&self, source_id: &SourceId) -> Result<Vec<CorrectionOverlay>, StoreError> {
        let overlays = self.overlays.read().await;
        Ok(overlays.iter().filter(|overlay| &overlay.source_id == source_id).cloned().collect())
    }

    async fn append_price_correction(&self, entry: &PriceCorrection) -> Result<(), StoreError> {
        let mut prices = self.prices.write().await;
        if prices.iter().any(|existing| existing.id == entry.id) {
            return Err(StoreError::Backend(format!("duplicate price correction id `{}`", entry.id)));
        }
        prices.push(entry.clone());
        Ok(())
    }

    async fn price_history(
        &self,
        source_id: &SourceId,
        line_index: Option<usize>,
    ) -> Result<Vec<PriceCorrection>, StoreError> {
        let prices = self.prices.read().await;
        Ok(prices
            .iter()
            .filter(|entry| &entry.source_id == source_id)
            .filter(|entry| line_index.map_or(true, |index| entry.line_index == index))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mailquote_core::domain::analysis::SourceId;
    use mailquote_core::domain::correction::{CorrectionTarget, PriceCorrection};
    use mailquote_core::ports::{CorrectionStore, SourceDocument, SourceDocuments};
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{InMemoryCorrectionRepository, InMemorySourceRepository};

    #[tokio::test]
    async fn in_memory_sources_round_trip() {
        let repo = InMemorySourceRepository::default();
        let source_id = SourceId("mail-3".to_string());
        repo.save(SourceDocument {
            source_id: source_id.clone(),
            body: "stock A00002 ?".to_string(),
            attachment_text: None,
        })
        .await;

        let fetched = repo.fetch(&source_id).await.expect("fetch");
        assert_eq!(fetched.map(|document| document.body), Some("stock A00002 ?".to_string()));
    }

    #[tokio::test]
    async fn in_memory_corrections_match_sql_semantics() {
        let repo = InMemoryCorrectionRepository::default();
        let source_id = SourceId("mail-3".to_string());
        let first = serde_json::from_value(json!({"display_name": "Edge"})).expect("patch");
        let second = serde_json::from_value(json!({"external_code": "C20000"})).expect("patch");

        repo.upsert_overlay(&source_id, CorrectionTarget::Customer, first, "alice")
            .await
            .expect("first");
        let merged = repo
            .upsert_overlay(&source_id, CorrectionTarget::Customer, second, "bob")
            .await
            .expect("second");
        assert_eq!(merged.patch.len(), 2);

        let entry = PriceCorrection {
            id: "p1".to_string(),
            source_id: source_id.clone(),
            line_index: 0,
            unit_price: Decimal::new(995, 2),
            author: "bob".to_string(),
            recorded_at: Utc::now(),
        };
        repo.append_price_correction(&entry).await.expect("append");
        assert!(repo.append_price_correction(&entry).await.is_err());
        assert_eq!(repo.price_history(&source_id, Some(1)).await.expect("history").len(), 0);
        assert_eq!(repo.price_history(&source_id, None).await.expect("history").len(), 1);
    }
}
