use rolegate_core::IdentityId;

/// Who acts on whom for one request.
///
/// The actor is already authenticated; its authority is resolved from the
/// directory per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    actor: IdentityId,
    identity: IdentityId,
}

impl RequestContext {
    pub fn new(actor: IdentityId, identity: IdentityId) -> Self {
        Self { actor, identity }
    }

    pub fn actor(&self) -> &IdentityId {
        &self.actor
    }

    /// The identity whose roles change.
    pub fn identity(&self) -> &IdentityId {
        &self.identity
    }
}
