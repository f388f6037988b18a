use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::chunk_embedding::{ChunkEmbedding, ScoredChunk},
    },
    utils::embedding::EmbeddingProvider,
};
use tracing::debug;

/// Lesson chunk vectors stored in SurrealDB, keyed by `lesson-{id}-chunk-{index}`.
#[derive(Clone)]
pub struct LessonVectorIndex {
    db: Arc<SurrealDbClient>,
    embeddings: Arc<EmbeddingProvider>,
}

impl LessonVectorIndex {
    pub fn new(db: Arc<SurrealDbClient>, embeddings: Arc<EmbeddingProvider>) -> Self {
        Self { db, embeddings }
    }

    /// Embeds all chunks in one batch and writes one record per chunk. Existing records
    /// with the same id are overwritten. Returns the chunk ids in input order.
    pub async fn index(&self, lesson_id: &str, chunks: &[String]) -> Result<Vec<String>, AppError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.embeddings.embed_batch(chunks.to_vec()).await?;

        let mut ids = Vec::with_capacity(chunks.len());
        for (position, (chunk, vector)) in chunks.iter().zip(vectors).enumerate() {
            let chunk_index = u32::try_from(position)
                .map_err(|_| AppError::Validation("too many chunks for one lesson".into()))?;
            let record =
                ChunkEmbedding::new(lesson_id.to_owned(), chunk_index, chunk.clone(), vector);
            ids.push(record.id.clone());
            self.db.upsert_item(record).await?;
        }

        debug!(lesson_id, chunk_count = ids.len(), "lesson chunks indexed");
        Ok(ids)
    }

    /// Drops every vector belonging to the lesson.
    pub async fn purge(&self, lesson_id: &str) -> Result<(), AppError> {
        ChunkEmbedding::delete_for_lesson(lesson_id, &self.db).await
    }

    /// Embeds the question once and returns up to `top_k` chunks, closest first.
    pub async fn query(
        &self,
        lesson_id: Option<&str>,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        let embedding = self.embeddings.embed(question).await?;
        ChunkEmbedding::nearest(lesson_id, embedding, top_k, &self.db).await
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    async fn index() -> LessonVectorIndex {
        let database = Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("test_ns", &database)
            .await
            .expect("Failed to start in-memory surrealdb");
        LessonVectorIndex::new(Arc::new(db), Arc::new(EmbeddingProvider::new_hashed(64)))
    }

    fn chunks() -> Vec<String> {
        vec![
            "Photosynthesis converts light into chemical energy.".into(),
            "Mitochondria release energy through respiration.".into(),
            "The French revolution began in 1789.".into(),
        ]
    }

    #[tokio::test]
    async fn indexing_returns_stable_ids() {
        let index = index().await;
        let ids = index.index("42", &chunks()).await.expect("index");
        assert_eq!(
            ids,
            vec!["lesson-42-chunk-0", "lesson-42-chunk-1", "lesson-42-chunk-2"]
        );
    }

    #[tokio::test]
    async fn empty_chunk_list_is_a_noop() {
        let index = index().await;
        assert!(index.index("42", &[]).await.expect("index").is_empty());
        assert!(index
            .query(Some("42"), "anything", 3)
            .await
            .expect("query")
            .is_empty());
    }

    #[tokio::test]
    async fn querying_with_a_chunk_returns_that_chunk_first() {
        let index = index().await;
        let chunks = chunks();
        index.index("42", &chunks).await.expect("index");
        index
            .index("7", &["Photosynthesis happens in leaves.".to_string()])
            .await
            .expect("index other lesson");

        let results = index
            .query(Some("42"), &chunks[1], 2)
            .await
            .expect("query");

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document, chunks[1]);
        assert_eq!(results[0].id, "lesson-42-chunk-1");
        assert!(results[0].distance < 1e-6);
        assert!(results.iter().all(|r| r.lesson_id == "42"));
    }

    #[tokio::test]
    async fn purge_removes_only_that_lesson() {
        let index = index().await;
        index.index("42", &chunks()).await.expect("index");
        index
            .index("7", &["Other lesson text.".to_string()])
            .await
            .expect("index other");

        index.purge("42").await.expect("purge");

        let remaining = index.query(None, "lesson", 10).await.expect("query");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].lesson_id, "7");
    }
}
