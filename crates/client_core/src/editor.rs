use shared::{
    domain::CollectionKind,
    items::{generate_item_id, OrderedItem},
    protocol::CollectionData,
    validation::{validate_collection, ValidateItem},
};
use tracing::{debug, info, warn};

use crate::{
    error::{EditorError, PersistError},
    gateway::{Acknowledged, PersistenceGateway},
};

/// Snapshot of an editor's lists.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionState<T> {
    pub committed: Vec<T>,
    pub working: Vec<T>,
    pub is_editing: bool,
}

/// Payload handed to the gateway by [`OrderedCollectionEditor::begin_save`].
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSave<T> {
    pub items: Vec<T>,
    pub expected_revision: Option<i64>,
}

/// Draft editing of one ordered collection. `committed` mirrors what the
/// server last acknowledged and `working` is the draft; outside of an edit the
/// two are equal. Only [`OrderedCollectionEditor::save`] talks to the outside world.
#[derive(Debug, Clone)]
pub struct OrderedCollectionEditor<T: OrderedItem> {
    committed: Vec<T>,
    working: Vec<T>,
    is_editing: bool,
    in_flight: Option<Vec<T>>,
    revision: Option<i64>,
}

impl<T: OrderedItem> Default for OrderedCollectionEditor<T> {
    fn default() -> Self {
        Self::new(Vec::new(), None)
    }
}

impl<T: OrderedItem> OrderedCollectionEditor<T> {
    pub fn new(items: Vec<T>, revision: Option<i64>) -> Self {
        Self {
            working: items.clone(),
            committed: items,
            is_editing: false,
            in_flight: None,
            revision,
        }
    }

    pub fn from_data(data: CollectionData<T>) -> Self {
        Self::new(data.items, Some(data.revision))
    }

    pub fn kind(&self) -> CollectionKind {
        T::KIND
    }

    pub fn working(&self) -> &[T] {
        &self.working
    }

    pub fn committed(&self) -> &[T] {
        &self.committed
    }

    pub fn is_editing(&self) -> bool {
        self.is_editing
    }

    pub fn is_saving(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.working != self.committed
    }

    pub fn revision(&self) -> Option<i64> {
        self.revision
    }

    pub fn state(&self) -> CollectionState<T> {
        CollectionState {
            committed: self.committed.clone(),
            working: self.working.clone(),
            is_editing: self.is_editing,
        }
    }

    /// Enters edit mode with `working` copied from `committed`. Calling it
    /// while already editing keeps the current draft.
    pub fn start_edit(&mut self) {
        if self.is_editing {
            debug!(kind = %T::KIND, "already editing");
            return;
        }
        self.working = self.committed.clone();
        self.is_editing = true;
    }

    /// Appends `item`, assigning a fresh id when it has none. Returns the id
    /// the item was stored under.
    pub fn add(&mut self, mut item: T) -> Result<String, EditorError> {
        self.ensure_editing()?;
        let max = T::KIND.max_items();
        if self.working.len() >= max {
            info!(kind = %T::KIND, max, "add refused: collection is full");
            return Err(EditorError::LimitReached { kind: T::KIND, max });
        }

        if item.id().trim().is_empty() {
            item.set_id(generate_item_id());
        } else if self.position(item.id()).is_some() {
            warn!(kind = %T::KIND, id = item.id(), "duplicate id on add; assigning a new one");
            item.set_id(generate_item_id());
        }
        let id = item.id().to_string();
        self.working.push(item);
        Ok(id)
    }

    /// Merges `patch` into the item with `id`. Returns `false` when no item
    /// matches.
    pub fn update(&mut self, id: &str, patch: T::Patch) -> Result<bool, EditorError> {
        self.ensure_editing()?;
        match self.working.iter_mut().find(|item| item.id() == id) {
            Some(item) => {
                item.apply_patch(patch);
                Ok(true)
            }
            None => {
                warn!(kind = %T::KIND, id, "update ignored: no item with this id");
                Ok(false)
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Result<bool, EditorError> {
        self.ensure_editing()?;
        match self.position(id) {
            Some(index) => {
                self.working.remove(index);
                Ok(true)
            }
            None => {
                warn!(kind = %T::KIND, id, "remove ignored: no item with this id");
                Ok(false)
            }
        }
    }

    /// Moves the item at `from` to `to`, shifting the items in between.
    /// Out-of-range indices leave the list untouched.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<bool, EditorError> {
        self.ensure_editing()?;
        let len = self.working.len();
        if from >= len || to >= len || from == to {
            return Ok(false);
        }
        let item = self.working.remove(from);
        self.working.insert(to, item);
        Ok(true)
    }

    pub fn move_up(&mut self, index: usize) -> Result<bool, EditorError> {
        self.ensure_editing()?;
        if index == 0 || index >= self.working.len() {
            return Ok(false);
        }
        self.working.swap(index, index - 1);
        Ok(true)
    }

    pub fn move_down(&mut self, index: usize) -> Result<bool, EditorError> {
        self.ensure_editing()?;
        if index + 1 >= self.working.len() {
            return Ok(false);
        }
        self.working.swap(index, index + 1);
        Ok(true)
    }

    /// Drops the draft. Refused while a save is in flight.
    pub fn cancel(&mut self) -> Result<(), EditorError> {
        if self.in_flight.is_some() {
            return Err(EditorError::SaveInFlight);
        }
        self.working = self.committed.clone();
        self.is_editing = false;
        Ok(())
    }

    /// Replaces `committed` with freshly fetched data. An open draft is kept.
    pub fn refresh(&mut self, data: CollectionData<T>) {
        self.committed = data.items;
        self.revision = Some(data.revision);
        if !self.is_editing {
            self.working = self.committed.clone();
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.working.iter().position(|item| item.id() == id)
    }

    fn ensure_editing(&self) -> Result<(), EditorError> {
        if self.is_editing {
            Ok(())
        } else {
            Err(EditorError::NotEditing)
        }
    }
}

impl<T: OrderedItem + ValidateItem> OrderedCollectionEditor<T> {
    /// Checks the draft locally and marks a save as in flight. The returned
    /// payload must be handed to the gateway and its outcome passed to
    /// [`finish_save`](Self::finish_save).
    pub fn begin_save(&mut self) -> Result<PendingSave<T>, EditorError> {
        self.ensure_editing()?;
        if self.in_flight.is_some() {
            return Err(EditorError::SaveInFlight);
        }
        validate_collection(&self.working).map_err(EditorError::ValidationRejected)?;

        self.in_flight = Some(self.working.clone());
        Ok(PendingSave {
            items: self.working.clone(),
            expected_revision: self.revision,
        })
    }

    /// Applies the gateway outcome of the save started by `begin_save`.
    ///
    /// On success `committed` becomes what the server stored and edit mode
    /// ends, unless `working` changed while the save was in flight. On
    /// failure the draft and edit mode are left as they are.
    pub fn finish_save(
        &mut self,
        outcome: Result<Acknowledged<T>, PersistError>,
    ) -> Result<(), EditorError> {
        let Some(sent) = self.in_flight.take() else {
            warn!(kind = %T::KIND, "save outcome ignored: no save in flight");
            return Ok(());
        };

        match outcome {
            Ok(ack) => {
                self.committed = ack.items;
                self.revision = ack.revision;
                if self.working == sent {
                    self.working = self.committed.clone();
                    self.is_editing = false;
                } else {
                    info!(kind = %T::KIND, "draft changed during save; still editing");
                }
                info!(
                    kind = %T::KIND,
                    items = self.committed.len(),
                    revision = ?self.revision,
                    "collection saved"
                );
                Ok(())
            }
            Err(err) => {
                let err = EditorError::from(err);
                warn!(kind = %T::KIND, code = err.code(), error = %err, "save failed");
                Err(err)
            }
        }
    }

    /// Sends `working` through `gateway` and applies the outcome.
    pub async fn save<G: PersistenceGateway>(&mut self, gateway: &G) -> Result<(), EditorError> {
        let pending = self.begin_save()?;
        let outcome = gateway
            .replace_all(pending.items, pending.expected_revision)
            .await;
        self.finish_save(outcome)
    }
}

#[cfg(test)]
#[path = "tests/editor_tests.rs"]
mod tests;
