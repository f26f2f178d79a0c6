//! SessionPersistence - the two durable records of a session

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use sessionstore::{KeyValueStore, validate_key};
use tracing::{debug, warn};

use super::error::SessionResult;
use super::log::ConversationLog;
use crate::domain::StructuredPlan;

const HISTORY_RECORD: &str = "chat_history";
const PLAN_RECORD: &str = "project_plan";

/// Reads and writes one session's log and plan through a key-value store
#[derive(Clone)]
pub struct SessionPersistence {
    store: Arc<dyn KeyValueStore>,
    session_id: String,
}

impl SessionPersistence {
    pub fn new(store: Arc<dyn KeyValueStore>, session_id: impl Into<String>) -> SessionResult<Self> {
        let session_id = session_id.into();
        validate_key(&session_id)?;
        Ok(Self { store, session_id })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn history_key(&self) -> String {
        format!("{}/{}", self.session_id, HISTORY_RECORD)
    }

    pub fn plan_key(&self) -> String {
        format!("{}/{}", self.session_id, PLAN_RECORD)
    }

    /// Stored log, or `None` to start fresh
    pub async fn load_log(&self) -> SessionResult<Option<ConversationLog>> {
        self.load(&self.history_key()).await
    }

    /// Stored plan, normalized like a fresh synthesis payload
    pub async fn load_plan(&self) -> SessionResult<Option<StructuredPlan>> {
        let key = self.plan_key();
        let Some(payload) = self.load::<serde_json::Value>(&key).await? else {
            return Ok(None);
        };
        let plan = StructuredPlan::from_payload(payload);
        if plan.is_none() {
            warn!(%key, "Discarding plan record with the wrong shape");
        }
        Ok(plan)
    }

    pub async fn save_log(&self, log: &ConversationLog) -> SessionResult<()> {
        self.save(&self.history_key(), log).await
    }

    /// Write the plan, or remove the record when there is none
    pub async fn save_plan(&self, plan: Option<&StructuredPlan>) -> SessionResult<()> {
        match plan {
            Some(plan) => self.save(&self.plan_key(), plan).await,
            None => Ok(self.store.remove(&self.plan_key()).await?),
        }
    }

    /// Remove both records
    pub async fn clear(&self) -> SessionResult<()> {
        debug!(session_id = %self.session_id, "clear: called");
        self.store.remove(&self.history_key()).await?;
        self.store.remove(&self.plan_key()).await?;
        Ok(())
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> SessionResult<Option<T>> {
        debug!(%key, "load: called");
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(%key, error = %e, "Discarding unreadable session record");
                Ok(None)
            }
        }
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T) -> SessionResult<()> {
        debug!(%key, "save: called");
        let raw = serde_json::to_string_pretty(value)?;
        self.store.put(key, &raw).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Turn;
    use sessionstore::MemoryStore;

    fn persistence() -> (Arc<MemoryStore>, SessionPersistence) {
        let store = Arc::new(MemoryStore::new());
        let persistence = SessionPersistence::new(store.clone(), "shed").unwrap();
        (store, persistence)
    }

    #[tokio::test]
    async fn test_missing_records_start_fresh() {
        let (_, persistence) = persistence();
        assert!(persistence.load_log().await.unwrap().is_none());
        assert!(persistence.load_plan().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_log_and_plan_roundtrip() {
        let (store, persistence) = persistence();
        let log = ConversationLog::from_turns(vec![Turn::assistant("Hello"), Turn::user("A shed")]);
        let plan = StructuredPlan {
            title: "Shed".to_string(),
            ..Default::default()
        };

        persistence.save_log(&log).await.unwrap();
        persistence.save_plan(Some(&plan)).await.unwrap();

        assert_eq!(persistence.load_log().await.unwrap(), Some(log));
        assert_eq!(persistence.load_plan().await.unwrap(), Some(plan));
        assert_eq!(
            store.keys().await.unwrap(),
            vec!["shed/chat_history".to_string(), "shed/project_plan".to_string()]
        );
    }

    #[tokio::test]
    async fn test_corrupt_record_is_treated_as_missing() {
        let (store, persistence) = persistence();
        store.put("shed/project_plan", "{ not json").await.unwrap();

        assert!(persistence.load_plan().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_plan_record_with_nulls_loads_as_defaults() {
        let (store, persistence) = persistence();
        store
            .put(
                "shed/project_plan",
                r#"{"title":"Garden Shed","overview":null,"nextSteps":["Buy lumber",null],"risks":[{"risk":"Rain","mitigation":null}]}"#,
            )
            .await
            .unwrap();

        let plan = persistence.load_plan().await.unwrap().unwrap();
        assert_eq!(plan.title, "Garden Shed");
        assert!(plan.overview.objectives.is_empty());
        assert_eq!(plan.next_steps, vec!["Buy lumber".to_string()]);
        assert_eq!(plan.risks[0].mitigation, None);
    }

    #[tokio::test]
    async fn test_plan_record_with_wrong_shape_is_treated_as_missing() {
        let (store, persistence) = persistence();
        store.put("shed/project_plan", r#"["not","a","plan"]"#).await.unwrap();

        assert!(persistence.load_plan().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_none_removes_plan_and_clear_removes_all() {
        let (store, persistence) = persistence();
        persistence.save_plan(Some(&StructuredPlan::default())).await.unwrap();
        persistence.save_plan(None).await.unwrap();
        assert!(store.get("shed/project_plan").await.unwrap().is_none());

        persistence.save_log(&ConversationLog::new()).await.unwrap();
        persistence.clear().await.unwrap();
        assert!(store.is_empty().await);
    }

    #[test]
    fn test_rejects_bad_session_id() {
        let store = Arc::new(MemoryStore::new());
        assert!(SessionPersistence::new(store, "../escape").is_err());
    }
}
