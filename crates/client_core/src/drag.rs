use shared::items::OrderedItem;

use crate::{editor::OrderedCollectionEditor, error::EditorError};

/// Observable drag indices. Both are `None` when idle; while dragging they
/// point at the dragged item's current position, which follows the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DragState {
    pub dragged_index: Option<usize>,
    pub drag_over_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Idle,
    Dragging(usize),
}

/// Turns pointer drag events into live reorders of an editor's draft.
///
/// Every drag-over onto a new index moves the dragged item there right away;
/// ending the drag keeps whatever moves were applied.
#[derive(Debug, Clone, Default)]
pub struct DragReorderController {
    phase: Phase,
}

impl DragReorderController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DragState {
        match self.phase {
            Phase::Idle => DragState::default(),
            Phase::Dragging(index) => DragState {
                dragged_index: Some(index),
                drag_over_index: Some(index),
            },
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, Phase::Dragging(_))
    }

    pub fn on_drag_start<T: OrderedItem>(
        &mut self,
        index: usize,
        editor: &OrderedCollectionEditor<T>,
    ) -> Result<(), EditorError> {
        if !editor.is_editing() {
            return Err(EditorError::NotEditing);
        }
        if index >= editor.working().len() {
            self.on_drag_end();
            return Ok(());
        }
        self.phase = Phase::Dragging(index);
        Ok(())
    }

    pub fn on_drag_over<T: OrderedItem>(
        &mut self,
        index: usize,
        editor: &mut OrderedCollectionEditor<T>,
    ) -> Result<(), EditorError> {
        let Phase::Dragging(dragged) = self.phase else {
            return Ok(());
        };
        if index == dragged {
            return Ok(());
        }
        if editor.reorder(dragged, index)? {
            self.phase = Phase::Dragging(index);
        }
        Ok(())
    }

    pub fn on_drag_end(&mut self) {
        self.phase = Phase::Idle;
    }
}

#[cfg(test)]
#[path = "tests/drag_tests.rs"]
mod tests;
