use stockledger_core::ActorId;

/// Authenticated actor for a request.
///
/// Inserted by the auth middleware; every protected handler can rely on it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ActorContext {
    actor_id: ActorId,
}

impl ActorContext {
    pub fn new(actor_id: ActorId) -> Self {
        Self { actor_id }
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }
}
