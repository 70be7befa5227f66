//! Per-study rooms and the registry that owns them.
//!
//! A room serializes every mutation of its study behind one mutex: actions,
//! connects and disconnects run one at a time, to completion, which is what
//! prevents lost updates when two members edit the same chapter concurrently.
//! Rooms for different studies share nothing and run fully in parallel.

use crate::engine::StudySync;
use crate::error::ActionError;
use crate::protocol::{Action, ReloadData, ServerEvent};
use crate::study::{Member, Visibility};
use crate::chapter::ChapterData;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

/// Registry of all live studies in this process.
#[derive(Default)]
pub struct StudyHub {
    studies: RwLock<HashMap<Uuid, Arc<StudyRoom>>>,
}

impl StudyHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(
        &self,
        name: impl Into<String>,
        owner: Member,
        visibility: Visibility,
        first_chapter: ChapterData,
    ) -> Arc<StudyRoom> {
        let sync = StudySync::new(name, owner, visibility, first_chapter);
        let id = sync.study().id;
        let room = Arc::new(StudyRoom {
            id,
            state: Mutex::new(sync),
            conns: Mutex::new(HashMap::new()),
        });
        self.studies.write().await.insert(id, room.clone());
        tracing::info!(study = %id, "study created");
        room
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<StudyRoom>> {
        self.studies.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.studies.read().await.len()
    }
}

/// One study's state plus its connected sockets.
pub struct StudyRoom {
    id: Uuid,
    state: Mutex<StudySync>,
    conns: Mutex<HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>>,
}

impl StudyRoom {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Register a connection and hand back the initial full projection.
    pub async fn connect(
        &self,
        socket_id: Uuid,
        user_id: &str,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<ReloadData, ActionError> {
        let mut state = self.state.lock().await;
        let data = state.connect(socket_id, user_id)?;
        self.conns.lock().await.insert(socket_id, tx);
        Ok(data)
    }

    /// Remove the connection. Runs under the same lock as actions, so an
    /// in-flight action by this member has already completed as a unit.
    pub async fn disconnect(&self, socket_id: Uuid, user_id: &str) {
        let mut state = self.state.lock().await;
        state.disconnect(socket_id, user_id);
        self.conns.lock().await.remove(&socket_id);
    }

    /// Apply one action and deliver its outbound events. Delivery targets are
    /// the connection snapshot at commit time; a member who disconnected
    /// mid-broadcast simply misses the now-meaningless event.
    pub async fn apply(&self, user_id: &str, action: Action) {
        let mut state = self.state.lock().await;
        let outbound = state.apply(user_id, action);
        let conns = self.conns.lock().await;
        drop(state);
        for out in outbound {
            if let Some(tx) = conns.get(&out.socket_id) {
                let _ = tx.send(out.event);
            }
        }
    }

    /// Point-in-time projection for the resync fallback and the HTTP surface.
    pub async fn snapshot(&self, user_id: &str) -> Result<ReloadData, ActionError> {
        self.state.lock().await.snapshot_for(user_id)
    }
}
