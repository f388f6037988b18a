use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// In-process locks that serialize pipeline runs for the same lesson.
#[derive(Default)]
pub struct LessonLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LessonLocks {
    /// Waits until no other run holds the lesson. The lock is released when the guard drops.
    pub async fn acquire(&self, lesson_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries nobody holds or waits on only have the map's reference left.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                locks
                    .entry(lesson_id.to_owned())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };

        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_lesson_waits_for_the_holder() {
        let locks = Arc::new(LessonLocks::default());
        let first = locks.acquire("a").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("a").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished(), "second run must wait");

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .expect("task should not panic");
    }

    #[tokio::test]
    async fn different_lessons_do_not_block() {
        let locks = LessonLocks::default();
        let _a = locks.acquire("a").await;
        tokio::time::timeout(Duration::from_secs(1), locks.acquire("b"))
            .await
            .expect("other lesson should not wait");
    }
}
