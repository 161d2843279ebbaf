//! Nodes of the clause-exchange graph.
//!
//! A sharing entity is anything clauses can flow into: a solver engine or a
//! sharing strategy. Entities hold *weak* references to their clients, so an
//! engine that is dropped simply becomes a stale edge that traversals skip;
//! combined with engines holding strong handles only toward their parent
//! strategy, reference cycles cannot form.
//!
//! The C++ ancestor modelled this as a three-level class hierarchy; here it
//! is flattened to composition: implementors embed an [`EntityCore`] (id +
//! client list) and expose it through [`SharingEntity::entity_core`].

use crate::clause::ClauseRef;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Weak};

/// Identifier of a sharing entity, unique within the process.
pub type SharingId = i32;

/// Process-wide monotonic id source.
static NEXT_SHARING_ID: AtomicI32 = AtomicI32::new(0);

fn next_sharing_id() -> SharingId {
    NEXT_SHARING_ID.fetch_add(1, Ordering::Relaxed)
}

/// A node of the clause-exchange graph.
///
/// `import_clause` MUST be callable from any number of threads at once;
/// client-list mutation is safe against concurrent exports.
pub trait SharingEntity: Send + Sync {
    /// The embedded id + client list.
    fn entity_core(&self) -> &EntityCore;

    /// Receive one clause. Returns false when the entity rejects it
    /// (filtered, database full, ...).
    fn import_clause(&self, clause: &ClauseRef) -> bool;

    /// Receive several clauses.
    fn import_clauses(&self, clauses: &[ClauseRef]) {
        for clause in clauses {
            self.import_clause(clause);
        }
    }

    /// Unique id of this entity.
    fn sharing_id(&self) -> SharingId {
        self.entity_core().id()
    }

    /// Register a client; exported clauses will be offered to it.
    fn add_client(&self, client: Arc<dyn SharingEntity>) {
        self.entity_core().add_client(client);
    }

    /// Unregister the client with the given id.
    fn remove_client(&self, id: SharingId) {
        self.entity_core().remove_client(id);
    }

    /// Current client-list length (stale edges included).
    fn client_count(&self) -> usize {
        self.entity_core().client_count()
    }

    /// Drop every client edge.
    fn clear_clients(&self) {
        self.entity_core().clear_clients();
    }
}

/// Identity and client edges of a sharing entity.
pub struct EntityCore {
    id: SharingId,
    clients: RwLock<Vec<Weak<dyn SharingEntity>>>,
}

impl EntityCore {
    /// A fresh entity with no clients and a newly assigned id.
    pub fn new() -> Self {
        let id = next_sharing_id();
        log::debug!("new sharing entity {id}");
        EntityCore {
            id,
            clients: RwLock::new(Vec::new()),
        }
    }

    /// A fresh entity pre-wired to the given clients.
    pub fn with_clients(clients: &[Arc<dyn SharingEntity>]) -> Self {
        let core = Self::new();
        {
            let mut list = core.clients.write();
            list.extend(clients.iter().map(Arc::downgrade));
        }
        core
    }

    pub fn id(&self) -> SharingId {
        self.id
    }

    pub fn add_client(&self, client: Arc<dyn SharingEntity>) {
        let mut clients = self.clients.write();
        log::trace!("entity {}: new client {}", self.id, client.sharing_id());
        clients.push(Arc::downgrade(&client));
    }

    pub fn remove_client(&self, id: SharingId) {
        let mut clients = self.clients.write();
        clients.retain(|weak| match weak.upgrade() {
            Some(client) => client.sharing_id() != id,
            // Stale edges are left in place, exactly like live removal in
            // the original: traversals skip them anyway.
            None => true,
        });
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    pub fn clear_clients(&self) {
        self.clients.write().clear();
    }

    /// Visit every client that is still alive, under the shared lock.
    pub fn for_each_client(&self, mut visit: impl FnMut(&Arc<dyn SharingEntity>)) {
        let clients = self.clients.read();
        for weak in clients.iter() {
            if let Some(client) = weak.upgrade() {
                visit(&client);
            }
        }
    }

    /// Offer one clause to every live client through `send`. Returns true
    /// when at least one client accepted it.
    pub fn export_clause_with(
        &self,
        clause: &ClauseRef,
        send: impl Fn(&ClauseRef, &Arc<dyn SharingEntity>) -> bool,
    ) -> bool {
        let mut exported = false;
        self.for_each_client(|client| {
            if send(clause, client) {
                exported = true;
            }
        });
        exported
    }

    /// Offer a batch of clauses to every live client through `send`.
    pub fn export_clauses_with(
        &self,
        clauses: &[ClauseRef],
        send: impl Fn(&ClauseRef, &Arc<dyn SharingEntity>) -> bool,
    ) {
        let clients = self.clients.read();
        for weak in clients.iter() {
            if let Some(client) = weak.upgrade() {
                for clause in clauses {
                    send(clause, &client);
                }
            }
        }
    }

    /// Plain export: every clause to every client, no filtering. This is
    /// the path engines use toward their parent strategy.
    pub fn export_clause(&self, clause: &ClauseRef) -> bool {
        self.export_clause_with(clause, |cls, client| client.import_clause(cls))
    }

    /// Plain batch export.
    pub fn export_clauses(&self, clauses: &[ClauseRef]) {
        self.export_clauses_with(clauses, |cls, client| client.import_clause(cls));
    }
}

impl Default for EntityCore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::Clause;
    use parking_lot::Mutex;

    struct Sink {
        core: EntityCore,
        seen: Mutex<Vec<ClauseRef>>,
    }

    impl Sink {
        fn new() -> Arc<Self> {
            Arc::new(Sink {
                core: EntityCore::new(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl SharingEntity for Sink {
        fn entity_core(&self) -> &EntityCore {
            &self.core
        }

        fn import_clause(&self, clause: &ClauseRef) -> bool {
            self.seen.lock().push(clause.clone());
            true
        }
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let a = EntityCore::new();
        let b = EntityCore::new();
        assert!(b.id() > a.id());
    }

    #[test]
    fn export_reaches_live_clients_and_skips_dead_ones() {
        let source = EntityCore::new();
        let alive = Sink::new();
        let dead = Sink::new();
        source.add_client(alive.clone());
        source.add_client(dead.clone());
        drop(dead);

        let clause = Clause::from_lits(&[1, 2], 2, 0).unwrap();
        assert!(source.export_clause(&clause));
        assert_eq!(alive.seen.lock().len(), 1);
        // The stale edge still counts until removed, but is harmless.
        assert_eq!(source.client_count(), 2);
    }

    #[test]
    fn remove_client_by_id() {
        let source = EntityCore::new();
        let a = Sink::new();
        let b = Sink::new();
        source.add_client(a.clone());
        source.add_client(b.clone());
        source.remove_client(a.sharing_id());
        let clause = Clause::from_lits(&[1], 0, 0).unwrap();
        source.export_clause(&clause);
        assert!(a.seen.lock().is_empty());
        assert_eq!(b.seen.lock().len(), 1);
    }
}
