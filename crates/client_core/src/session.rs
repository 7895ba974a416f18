use shared::{
    domain::CollectionKind,
    items::{
        Achievement, Education, Extracurricular, Link, OrderedItem, PortfolioProject,
        WorkExperience,
    },
    protocol::{CollectionData, PublicProfile},
    validation::ValidateItem,
};

use crate::{
    drag::{DragReorderController, DragState},
    editor::OrderedCollectionEditor,
    error::EditorError,
    gateway::PersistenceGateway,
};

/// The six collections of a profile as last fetched.
#[derive(Debug, Clone)]
pub struct ProfileCollections {
    pub links: CollectionData<Link>,
    pub experiences: CollectionData<WorkExperience>,
    pub education: CollectionData<Education>,
    pub portfolio: CollectionData<PortfolioProject>,
    pub achievements: CollectionData<Achievement>,
    pub extracurriculars: CollectionData<Extracurricular>,
}

/// One editor per collection plus the shared drag controller.
///
/// Created from fetched data when editing begins and dropped when it ends.
/// Collections are saved independently of each other.
#[derive(Debug, Clone, Default)]
pub struct EditingSession {
    links: OrderedCollectionEditor<Link>,
    experiences: OrderedCollectionEditor<WorkExperience>,
    education: OrderedCollectionEditor<Education>,
    portfolio: OrderedCollectionEditor<PortfolioProject>,
    achievements: OrderedCollectionEditor<Achievement>,
    extracurriculars: OrderedCollectionEditor<Extracurricular>,
    drag: DragReorderController,
    drag_kind: Option<CollectionKind>,
}

/// Item types that have an editor inside an [`EditingSession`].
pub trait SessionItem: OrderedItem + ValidateItem {
    fn editor(session: &EditingSession) -> &OrderedCollectionEditor<Self>;
    fn editor_mut(session: &mut EditingSession) -> &mut OrderedCollectionEditor<Self>;
}

macro_rules! session_item {
    ($ty:ty, $field:ident) => {
        impl SessionItem for $ty {
            fn editor(session: &EditingSession) -> &OrderedCollectionEditor<Self> {
                &session.$field
            }

            fn editor_mut(session: &mut EditingSession) -> &mut OrderedCollectionEditor<Self> {
                &mut session.$field
            }
        }
    };
}

session_item!(Link, links);
session_item!(WorkExperience, experiences);
session_item!(Education, education);
session_item!(PortfolioProject, portfolio);
session_item!(Achievement, achievements);
session_item!(Extracurricular, extracurriculars);

impl EditingSession {
    pub fn new(collections: ProfileCollections) -> Self {
        Self {
            links: OrderedCollectionEditor::from_data(collections.links),
            experiences: OrderedCollectionEditor::from_data(collections.experiences),
            education: OrderedCollectionEditor::from_data(collections.education),
            portfolio: OrderedCollectionEditor::from_data(collections.portfolio),
            achievements: OrderedCollectionEditor::from_data(collections.achievements),
            extracurriculars: OrderedCollectionEditor::from_data(collections.extracurriculars),
            drag: DragReorderController::new(),
            drag_kind: None,
        }
    }

    /// Seeds the editors from a public profile. No revisions are known, so
    /// saves from such a session are unconditional.
    pub fn from_public_profile(profile: PublicProfile) -> Self {
        Self {
            links: OrderedCollectionEditor::new(profile.links, None),
            experiences: OrderedCollectionEditor::new(profile.experiences, None),
            education: OrderedCollectionEditor::new(profile.education, None),
            portfolio: OrderedCollectionEditor::new(profile.portfolio, None),
            achievements: OrderedCollectionEditor::new(profile.achievements, None),
            extracurriculars: OrderedCollectionEditor::new(profile.extracurriculars, None),
            drag: DragReorderController::new(),
            drag_kind: None,
        }
    }

    pub fn editor<T: SessionItem>(&self) -> &OrderedCollectionEditor<T> {
        T::editor(self)
    }

    pub fn editor_mut<T: SessionItem>(&mut self) -> &mut OrderedCollectionEditor<T> {
        T::editor_mut(self)
    }

    pub fn start_edit<T: SessionItem>(&mut self) {
        self.editor_mut::<T>().start_edit();
    }

    pub async fn save<T: SessionItem, G: PersistenceGateway>(
        &mut self,
        gateway: &G,
    ) -> Result<(), EditorError> {
        if self.drag_kind == Some(T::KIND) {
            self.drag_end();
        }
        self.editor_mut::<T>().save(gateway).await
    }

    pub fn cancel<T: SessionItem>(&mut self) -> Result<(), EditorError> {
        if self.drag_kind == Some(T::KIND) {
            self.drag_end();
        }
        self.editor_mut::<T>().cancel()
    }

    /// Kinds that currently have an open draft.
    pub fn editing_kinds(&self) -> Vec<CollectionKind> {
        let flags = [
            (CollectionKind::Links, self.links.is_editing()),
            (CollectionKind::Experience, self.experiences.is_editing()),
            (CollectionKind::Education, self.education.is_editing()),
            (CollectionKind::Portfolio, self.portfolio.is_editing()),
            (CollectionKind::Achievements, self.achievements.is_editing()),
            (CollectionKind::Extracurriculars, self.extracurriculars.is_editing()),
        ];
        flags
            .into_iter()
            .filter_map(|(kind, editing)| editing.then_some(kind))
            .collect()
    }

    pub fn drag_start<T: SessionItem>(&mut self, index: usize) -> Result<(), EditorError> {
        self.drag_end();
        let mut drag = std::mem::take(&mut self.drag);
        let started = drag.on_drag_start(index, T::editor(self));
        if drag.is_dragging() {
            self.drag_kind = Some(T::KIND);
        }
        self.drag = drag;
        started
    }

    /// Forwards a drag-over to the collection the drag started in.
    pub fn drag_over(&mut self, index: usize) -> Result<(), EditorError> {
        let Some(kind) = self.drag_kind else {
            return Ok(());
        };
        match kind {
            CollectionKind::Links => self.drag.on_drag_over(index, &mut self.links),
            CollectionKind::Experience => self.drag.on_drag_over(index, &mut self.experiences),
            CollectionKind::Education => self.drag.on_drag_over(index, &mut self.education),
            CollectionKind::Portfolio => self.drag.on_drag_over(index, &mut self.portfolio),
            CollectionKind::Achievements => self.drag.on_drag_over(index, &mut self.achievements),
            CollectionKind::Extracurriculars => {
                self.drag.on_drag_over(index, &mut self.extracurriculars)
            }
        }
    }

    pub fn drag_end(&mut self) {
        self.drag.on_drag_end();
        self.drag_kind = None;
    }

    pub fn drag_state(&self) -> (Option<CollectionKind>, DragState) {
        (self.drag_kind, self.drag.state())
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
