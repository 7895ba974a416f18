use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(UserId);
id_newtype!(ActivityId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Unknown values fall back to the least privileged role.
    pub fn from_db(raw: &str) -> Self {
        match raw {
            "super_admin" => Role::SuperAdmin,
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "super_admin" | "superadmin" => Ok(Role::SuperAdmin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// The independently edited and persisted collections of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Links,
    Experience,
    Education,
    Portfolio,
    Achievements,
    Extracurriculars,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 6] = [
        CollectionKind::Links,
        CollectionKind::Experience,
        CollectionKind::Education,
        CollectionKind::Portfolio,
        CollectionKind::Achievements,
        CollectionKind::Extracurriculars,
    ];

    /// Maximum number of items a single collection may hold.
    pub fn max_items(self) -> usize {
        match self {
            CollectionKind::Links => 25,
            CollectionKind::Experience | CollectionKind::Education | CollectionKind::Portfolio => 10,
            CollectionKind::Achievements | CollectionKind::Extracurriculars => 8,
        }
    }

    /// Path segment used in collection routes and the storage `kind` column.
    pub fn as_str(self) -> &'static str {
        match self {
            CollectionKind::Links => "links",
            CollectionKind::Experience => "experience",
            CollectionKind::Education => "education",
            CollectionKind::Portfolio => "portfolio",
            CollectionKind::Achievements => "achievements",
            CollectionKind::Extracurriculars => "extracurriculars",
        }
    }

    /// Field name carrying the item array in a replace request body.
    pub fn wire_field(self) -> &'static str {
        match self {
            CollectionKind::Links => "links",
            CollectionKind::Experience => "experiences",
            CollectionKind::Education => "education",
            CollectionKind::Portfolio => "portfolio",
            CollectionKind::Achievements => "achievements",
            CollectionKind::Extracurriculars => "extracurriculars",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        CollectionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized || kind.wire_field() == normalized)
            .ok_or_else(|| format!("unknown collection '{s}'"))
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
