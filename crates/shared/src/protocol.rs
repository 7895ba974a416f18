use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{ActivityId, CollectionKind, Role, UserId},
    items::{Achievement, Education, Extracurricular, Link, PortfolioProject, WorkExperience},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: UserId,
    pub role: Role,
}

/// Success envelope: `{ "success": true, "message"?: .., "data"?: .. }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionData<T> {
    pub items: Vec<T>,
    pub revision: i64,
}

/// Body of a full-replace save. On the wire the array sits under the
/// collection's own field name (`links`, `experiences`, ...).
#[derive(Debug, Clone, Serialize)]
pub struct ReplaceCollectionRequest<T> {
    pub items: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_revision: Option<i64>,
}

impl<T: Serialize> ReplaceCollectionRequest<T> {
    /// Wire form using the collection-specific field name.
    pub fn to_wire(&self, kind: CollectionKind) -> serde_json::Result<Value> {
        let mut body = serde_json::Map::new();
        body.insert(kind.wire_field().to_string(), serde_json::to_value(&self.items)?);
        if let Some(revision) = self.expected_revision {
            body.insert("expected_revision".into(), revision.into());
        }
        Ok(Value::Object(body))
    }
}

impl<T: DeserializeOwned> ReplaceCollectionRequest<T> {
    /// Reads a body sent to the route of `kind`. The array is taken from
    /// `kind.wire_field()` or `items`; any other collection's field is refused.
    pub fn from_wire(kind: CollectionKind, body: Value) -> Result<Self, String> {
        let field = kind.wire_field();
        let Value::Object(mut body) = body else {
            return Err("request body must be a JSON object".into());
        };
        if let Some(other) = CollectionKind::ALL
            .into_iter()
            .map(CollectionKind::wire_field)
            .find(|other| *other != field && body.contains_key(*other))
        {
            return Err(format!(
                "'{other}' does not belong to the {kind} collection; send '{field}'"
            ));
        }

        let items = match (body.remove(field), body.remove("items")) {
            (Some(items), None) | (None, Some(items)) => items,
            (Some(_), Some(_)) => return Err(format!("send either '{field}' or 'items', not both")),
            (None, None) => return Err(format!("missing '{field}' array")),
        };
        let items = serde_json::from_value(items)
            .map_err(|e| format!("'{field}' must be an array of {kind} items: {e}"))?;

        let expected_revision = match body.remove("expected_revision") {
            None | Some(Value::Null) => None,
            Some(revision) => Some(
                revision
                    .as_i64()
                    .ok_or("expected_revision must be an integer")?,
            ),
        };
        Ok(Self {
            items,
            expected_revision,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub user_id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub headline: Option<String>,
    pub bio: Option<String>,
    pub is_public: bool,
    pub role: Role,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

/// Everything shown at the public profile URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicProfile {
    pub username: String,
    pub display_name: Option<String>,
    pub headline: Option<String>,
    pub bio: Option<String>,
    pub links: Vec<Link>,
    pub experiences: Vec<WorkExperience>,
    pub education: Vec<Education>,
    pub portfolio: Vec<PortfolioProject>,
    pub achievements: Vec<Achievement>,
    pub extracurriculars: Vec<Extracurricular>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUserSummary {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub activity_id: ActivityId,
    pub actor_user_id: UserId,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
