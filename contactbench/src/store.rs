//! Accumulation of created contacts between the write and the read phase.

use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

use rand::Rng;

use crate::http::Contact;

/// Contacts created during the write phase.
///
/// Write workers share the store and append to it concurrently. The lock is only held for the
/// append itself, never across a request. Once the write phase has drained, the store is turned
/// into an immutable [`Snapshot`] with [`freeze`](Self::freeze).
#[derive(Debug, Default)]
pub struct ResultStore {
    contacts: Mutex<Vec<Contact>>,
}

impl ResultStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a successfully created contact.
    pub fn push(&self, contact: Contact) {
        self.lock().push(contact);
    }

    /// Returns the number of contacts stored so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no contact has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the store, returning a read-only view of all contacts in insertion order.
    pub fn freeze(self) -> Snapshot {
        let contacts = self
            .contacts
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        Snapshot(contacts.into())
    }

    /// Freezes a shared store once every other handle to it has been dropped.
    ///
    /// Returns the store back if a writer is still holding on to it.
    pub fn try_freeze(store: Arc<Self>) -> Result<Snapshot, Arc<Self>> {
        Arc::try_unwrap(store).map(Self::freeze)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Contact>> {
        // A panic while pushing cannot leave the vector torn.
        self.contacts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An immutable, cheaply clonable view of the contacts created during the write phase.
#[derive(Clone, Debug, Default)]
pub struct Snapshot(Arc<[Contact]>);

impl Snapshot {
    /// Picks a uniformly random contact, or `None` if the snapshot is empty.
    pub fn choose(&self, rng: &mut impl Rng) -> Option<&Contact> {
        if self.0.is_empty() {
            return None;
        }
        self.0.get(rng.random_range(0..self.0.len()))
    }
}

impl Deref for Snapshot {
    type Target = [Contact];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
