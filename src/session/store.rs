use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use uuid::Uuid;

use super::{LessonSession, SessionError, SessionView};

/// In-memory lesson sessions. Guards are never held across an await; flows
/// read a snapshot, call the model, then apply a transition.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, LessonSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> SessionView {
        let session = LessonSession::new();
        let view = session.view();
        self.sessions.write().insert(session.id(), session);
        view
    }

    pub fn view(&self, id: Uuid) -> Result<SessionView, SessionError> {
        self.read(id, LessonSession::view)
    }

    pub fn read<T>(&self, id: Uuid, f: impl FnOnce(&LessonSession) -> T) -> Result<T, SessionError> {
        let guard = self.sessions.read();
        guard.get(&id).map(f).ok_or(SessionError::NotFound(id))
    }

    pub fn update<T>(&self, id: Uuid, f: impl FnOnce(&mut LessonSession) -> T) -> Result<T, SessionError> {
        let mut guard = self.sessions.write();
        let session = guard.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        session.touch();
        Ok(f(session))
    }

    /// Like `update`, for transitions that can themselves fail.
    pub fn try_update<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut LessonSession) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        self.update(id, f)?
    }

    pub fn remove(&self, id: Uuid) -> bool {
        self.sessions.write().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Drops sessions idle longer than `max_idle`; returns how many were removed.
    pub fn purge_idle(&self, max_idle: Duration) -> usize {
        let mut guard = self.sessions.write();
        let before = guard.len();
        guard.retain(|_, session| session.last_active().elapsed() < max_idle);
        before - guard.len()
    }
}
