use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::domain::CollectionKind;

/// An element of an ordered profile collection. Its position is its index in
/// the containing array, never a separate field.
pub trait OrderedItem:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Partial update; `None` fields are left untouched.
    type Patch: Clone + fmt::Debug + Default + Serialize + DeserializeOwned + Send + Sync;

    const KIND: CollectionKind;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn apply_patch(&mut self, patch: Self::Patch);
}

macro_rules! ordered_item {
    (
        $(#[$meta:meta])*
        $name:ident, $patch:ident, $kind:expr, {
            $( $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
        pub struct $name {
            #[serde(default)]
            pub id: String,
            $(
                #[serde(default)]
                pub $field: $ty,
            )*
        }

        #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
        pub struct $patch {
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        impl OrderedItem for $name {
            type Patch = $patch;

            const KIND: CollectionKind = $kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }

            fn apply_patch(&mut self, patch: Self::Patch) {
                $(
                    if let Some(value) = patch.$field {
                        self.$field = value;
                    }
                )*
            }
        }
    };
}

ordered_item!(
    /// A link-in-bio entry.
    Link, LinkPatch, CollectionKind::Links, {
        title: String,
        url: String,
        description: Option<String>,
        icon: Option<String>,
    }
);

ordered_item!(
    WorkExperience, WorkExperiencePatch, CollectionKind::Experience, {
        company: String,
        position: String,
        location: Option<String>,
        start_date: String,
        end_date: Option<String>,
        current: bool,
        description: Option<String>,
    }
);

ordered_item!(
    Education, EducationPatch, CollectionKind::Education, {
        institution: String,
        degree: String,
        field_of_study: Option<String>,
        start_date: Option<String>,
        end_date: Option<String>,
        description: Option<String>,
    }
);

ordered_item!(
    PortfolioProject, PortfolioProjectPatch, CollectionKind::Portfolio, {
        title: String,
        description: Option<String>,
        url: Option<String>,
        image_url: Option<String>,
        technologies: Vec<String>,
    }
);

ordered_item!(
    Achievement, AchievementPatch, CollectionKind::Achievements, {
        title: String,
        issuer: Option<String>,
        date: Option<String>,
        description: Option<String>,
    }
);

ordered_item!(
    Extracurricular, ExtracurricularPatch, CollectionKind::Extracurriculars, {
        activity: String,
        organization: Option<String>,
        role: Option<String>,
        description: Option<String>,
    }
);

/// Fresh id for an item created on the client before it has been persisted.
pub fn generate_item_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl Link {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[path = "tests/items_tests.rs"]
mod tests;
