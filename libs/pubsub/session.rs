use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

/// Shared slot holding the last session UUID the server assigned
///
/// Read by the handshake signer on every connection attempt and written by
/// the handle whenever the server reports its session.
#[derive(Debug, Clone, Default)]
pub struct SessionCell {
    inner: Arc<RwLock<Option<Uuid>>>,
}

impl SessionCell {
    pub fn new(initial: Option<Uuid>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn get(&self) -> Option<Uuid> {
        *self.inner.read()
    }

    pub fn set(&self, session: Uuid) {
        *self.inner.write() = Some(session);
    }

    /// Store `session` and return what was there before
    pub fn replace(&self, session: Uuid) -> Option<Uuid> {
        self.inner.write().replace(session)
    }
}
