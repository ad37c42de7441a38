//! The durable store a player's final position is written to on
//! disconnect.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use wayfarer_protocol::{PlayerId, PositionRecord};
use wayfarer_session::MemoryAccounts;

use crate::MapError;

/// Persists where a player was when they left.
///
/// Called once per authenticated disconnect, and awaited (under a
/// timeout) before the teardown finishes.
pub trait PositionStore: Send + Sync + 'static {
    fn persist_last_position(
        &self,
        record: &PositionRecord,
    ) -> impl Future<Output = Result<(), MapError>> + Send;
}

impl<T: PositionStore> PositionStore for Arc<T> {
    fn persist_last_position(
        &self,
        record: &PositionRecord,
    ) -> impl Future<Output = Result<(), MapError>> + Send {
        (**self).persist_last_position(record)
    }
}

/// Writes straight back into the development account list, so the next
/// login starts where the player left off.
impl PositionStore for MemoryAccounts {
    async fn persist_last_position(&self, record: &PositionRecord) -> Result<(), MapError> {
        self.record_last_position(record.clone()).await;
        Ok(())
    }
}

/// A [`PositionStore`] that keeps everything in a map.
#[derive(Debug, Default)]
pub struct MemoryPositionStore {
    records: Mutex<HashMap<PlayerId, PositionRecord>>,
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, player_id: &PlayerId) -> Option<PositionRecord> {
        self.records.lock().await.get(player_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

impl PositionStore for MemoryPositionStore {
    async fn persist_last_position(&self, record: &PositionRecord) -> Result<(), MapError> {
        self.records
            .lock()
            .await
            .insert(record.player_id.clone(), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_session::{Authenticator, Credentials};

    #[tokio::test]
    async fn test_persist_overwrites_previous_record() {
        let store = MemoryPositionStore::new();

        store
            .persist_last_position(&PositionRecord::at("ash".into(), 1.0, 1.0))
            .await
            .unwrap();
        store
            .persist_last_position(&PositionRecord::at("ash".into(), 9.0, 9.0))
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&"ash".into()).await.map(|r| r.x), Some(9.0));
    }

    #[tokio::test]
    async fn test_memory_accounts_login_resumes_persisted_position() {
        let accounts = Arc::new(MemoryAccounts::new());
        accounts.insert_verified("ash@pallet.town", "pikachu", "ash").await;

        accounts
            .persist_last_position(&PositionRecord::at("ash".into(), 40.0, 2.0))
            .await
            .unwrap();
        let grant = accounts
            .login(&Credentials {
                email: "ash@pallet.town".into(),
                password: "pikachu".into(),
            })
            .await
            .unwrap();

        assert_eq!((grant.last_position.x, grant.last_position.y), (40.0, 2.0));
    }
}
