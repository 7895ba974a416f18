pub mod domain;
pub mod error;
pub mod items;
pub mod protocol;
pub mod validation;

pub use domain::{CollectionKind, Role, UserId};
pub use items::OrderedItem;
