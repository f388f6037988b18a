use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::lesson_chunk::chunk_id;

stored_object!(ChunkEmbedding, "lesson_chunk_embedding", {
    lesson_id: String,
    chunk_index: u32,
    document: String,
    embedding: Vec<f32>
});

/// A stored chunk together with its distance to a query vector.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ScoredChunk {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub lesson_id: String,
    pub chunk_index: u32,
    pub document: String,
    pub distance: f64,
}

impl ChunkEmbedding {
    pub fn new(lesson_id: String, chunk_index: u32, document: String, embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id: chunk_id(&lesson_id, chunk_index),
            created_at: now,
            updated_at: now,
            lesson_id,
            chunk_index,
            document,
            embedding,
        }
    }

    pub async fn delete_for_lesson(lesson_id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        db.client
            .query("DELETE type::table($table) WHERE lesson_id = $lesson_id")
            .bind(("table", Self::table_name()))
            .bind(("lesson_id", lesson_id.to_owned()))
            .await?
            .check()?;

        Ok(())
    }

    /// Nearest stored chunks by euclidean distance, closest first. Scoped to one lesson
    /// when `lesson_id` is given, across every lesson otherwise.
    pub async fn nearest(
        lesson_id: Option<&str>,
        embedding: Vec<f32>,
        top_k: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let scope = if lesson_id.is_some() {
            "WHERE lesson_id = $lesson_id"
        } else {
            ""
        };
        let query = format!(
            "SELECT id, lesson_id, chunk_index, document, \
             vector::distance::euclidean(embedding, $embedding) AS distance \
             FROM type::table($table) {scope} ORDER BY distance ASC LIMIT {top_k}"
        );

        let mut request = db
            .client
            .query(query)
            .bind(("table", Self::table_name()))
            .bind(("embedding", embedding));
        if let Some(lesson_id) = lesson_id {
            request = request.bind(("lesson_id", lesson_id.to_owned()));
        }

        let scored: Vec<ScoredChunk> = request.await?.take(0)?;
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn setup_db() -> SurrealDbClient {
        let database = Uuid::new_v4().to_string();
        SurrealDbClient::memory("test_ns", &database)
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    async fn seed(db: &SurrealDbClient) {
        let records = vec![
            ChunkEmbedding::new("a".into(), 0, "near".into(), vec![1.0, 0.0, 0.0]),
            ChunkEmbedding::new("a".into(), 1, "far".into(), vec![0.0, 0.0, 1.0]),
            ChunkEmbedding::new("b".into(), 0, "other".into(), vec![0.9, 0.1, 0.0]),
        ];
        for record in records {
            db.upsert_item(record).await.expect("store embedding");
        }
    }

    #[tokio::test]
    async fn nearest_is_scoped_and_sorted() {
        let db = setup_db().await;
        seed(&db).await;

        let results = ChunkEmbedding::nearest(Some("a"), vec![1.0, 0.0, 0.0], 5, &db)
            .await
            .expect("query");

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "lesson-a-chunk-0");
        assert_eq!(results[0].document, "near");
        assert!(results[0].distance <= results[1].distance);
        assert!(results.iter().all(|r| r.lesson_id == "a"));
    }

    #[tokio::test]
    async fn nearest_without_lesson_searches_everything() {
        let db = setup_db().await;
        seed(&db).await;

        let results = ChunkEmbedding::nearest(None, vec![1.0, 0.0, 0.0], 2, &db)
            .await
            .expect("query");

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document, "near");
        assert_eq!(results[1].document, "other");
    }

    #[tokio::test]
    async fn same_id_overwrites_and_delete_clears_lesson() {
        let db = setup_db().await;
        seed(&db).await;

        db.upsert_item(ChunkEmbedding::new(
            "a".into(),
            0,
            "replaced".into(),
            vec![1.0, 0.0, 0.0],
        ))
        .await
        .expect("overwrite");

        let all = db
            .get_all_stored_items::<ChunkEmbedding>()
            .await
            .expect("all");
        assert_eq!(all.len(), 3);

        ChunkEmbedding::delete_for_lesson("a", &db)
            .await
            .expect("delete");
        let remaining = ChunkEmbedding::nearest(None, vec![1.0, 0.0, 0.0], 10, &db)
            .await
            .expect("query");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].lesson_id, "b");
    }

    #[tokio::test]
    async fn zero_top_k_returns_nothing() {
        let db = setup_db().await;
        seed(&db).await;
        let results = ChunkEmbedding::nearest(Some("a"), vec![1.0, 0.0, 0.0], 0, &db)
            .await
            .expect("query");
        assert!(results.is_empty());
    }
}
