use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(LessonChunk, "lesson_chunk", {
    lesson_id: String,
    chunk_index: u32,
    content: String
});

/// Stable identifier shared by a chunk row and its embedding record.
pub fn chunk_id(lesson_id: &str, chunk_index: u32) -> String {
    format!("lesson-{lesson_id}-chunk-{chunk_index}")
}

impl LessonChunk {
    pub fn new(lesson_id: String, chunk_index: u32, content: String) -> Self {
        let now = Utc::now();
        Self {
            id: chunk_id(&lesson_id, chunk_index),
            created_at: now,
            updated_at: now,
            lesson_id,
            chunk_index,
            content,
        }
    }

    /// Chunks of a lesson in sequence order.
    pub async fn list_for_lesson(
        lesson_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let chunks: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table) WHERE lesson_id = $lesson_id ORDER BY chunk_index ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("lesson_id", lesson_id.to_owned()))
            .await?
            .take(0)?;

        Ok(chunks)
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

    pub async fn store_all(chunks: Vec<Self>, db: &SurrealDbClient) -> Result<(), AppError> {
        for chunk in chunks {
            db.upsert_item(chunk).await?;
        }
        Ok(())
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

    #[test]
    fn chunk_ids_are_stable() {
        assert_eq!(chunk_id("42", 0), "lesson-42-chunk-0");
        let chunk = LessonChunk::new("42".into(), 3, "text".into());
        assert_eq!(chunk.id, "lesson-42-chunk-3");
    }

    #[tokio::test]
    async fn list_is_scoped_and_ordered() {
        let db = setup_db().await;

        LessonChunk::store_all(
            vec![
                LessonChunk::new("a".into(), 1, "second".into()),
                LessonChunk::new("a".into(), 0, "first".into()),
                LessonChunk::new("b".into(), 0, "other lesson".into()),
            ],
            &db,
        )
        .await
        .expect("store chunks");

        let chunks = LessonChunk::list_for_lesson("a", &db)
            .await
            .expect("list chunks");
        let contents: Vec<_> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn delete_only_touches_one_lesson() {
        let db = setup_db().await;

        LessonChunk::store_all(
            vec![
                LessonChunk::new("a".into(), 0, "one".into()),
                LessonChunk::new("a".into(), 1, "two".into()),
                LessonChunk::new("b".into(), 0, "keep".into()),
            ],
            &db,
        )
        .await
        .expect("store chunks");

        LessonChunk::delete_for_lesson("a", &db)
            .await
            .expect("delete chunks");

        assert!(LessonChunk::list_for_lesson("a", &db)
            .await
            .expect("list a")
            .is_empty());
        assert_eq!(
            LessonChunk::list_for_lesson("b", &db)
                .await
                .expect("list b")
                .len(),
            1
        );
    }
}
