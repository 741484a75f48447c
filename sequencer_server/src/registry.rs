//! Registry of live session actors, keyed by session id. Generalizes the
//! `Mutex<HashMap<String, Arc<Mutex<DocState>>>>` lazy-doc-registry pattern
//! to one spawned actor task per key instead of one shared mutex per key.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};

use crate::actor::{self, ActorCommand, ActorHandle};
use crate::error::{AppError, PersistenceError};
use crate::persistence::{ColdStore, HotStore, SessionRecord};

pub struct SessionRegistry {
    actors: Mutex<HashMap<String, ActorHandle>>,
    hot: Arc<dyn HotStore>,
    cold: Arc<dyn ColdStore>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(hot: Arc<dyn HotStore>, cold: Arc<dyn ColdStore>, idle_timeout: Duration) -> SessionRegistry {
        SessionRegistry {
            actors: Mutex::new(HashMap::new()),
            hot,
            cold,
            idle_timeout,
        }
    }

    /// Create a brand new session record in the cold store and spawn its
    /// actor. Fails if `id` already exists.
    pub async fn create(&self, id: &str) -> Result<SessionRecord, AppError> {
        if self.cold.exists(id)? {
            return Err(AppError::BadRequest(format!("session {id} already exists")));
        }
        let record = SessionRecord::new(id);
        self.cold.save(&record)?;
        let handle = actor::spawn(record.clone(), self.hot.clone(), self.cold.clone(), self.idle_timeout);
        self.actors.lock().await.insert(id.to_string(), handle);
        Ok(record)
    }

    /// Get a live handle for `id`, loading it from cold storage and
    /// spawning an actor if it is not already live. Errors if no record
    /// exists anywhere.
    pub async fn get_or_spawn(&self, id: &str) -> Result<ActorHandle, AppError> {
        let mut actors = self.actors.lock().await;
        if let Some(handle) = actors.get(id) {
            return Ok(handle.clone());
        }
        let record = self
            .cold
            .load(id)?
            .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))?;
        let handle = actor::spawn(record, self.hot.clone(), self.cold.clone(), self.idle_timeout);
        actors.insert(id.to_string(), handle.clone());
        Ok(handle)
    }

    pub async fn record(&self, id: &str) -> Result<SessionRecord, AppError> {
        if let Ok(handle) = self.get_or_spawn(id).await {
            let (tx, rx) = oneshot::channel();
            handle
                .tx
                .send(ActorCommand::GetRecord { reply: tx })
                .await
                .map_err(|_| AppError::Internal("actor channel closed".to_string()))?;
            return rx
                .await
                .map_err(|_| AppError::Internal("actor dropped reply".to_string()));
        }
        self.cold
            .load(id)?
            .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))
    }

    pub async fn exists(&self, id: &str) -> Result<bool, PersistenceError> {
        self.cold.exists(id)
    }
}
