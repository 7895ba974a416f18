use serde_json::Value;
use shared::{
    domain::{CollectionKind, Role, UserId},
    error::{ApiError, ErrorCode},
    items::{
        Achievement, Education, Extracurricular, Link, OrderedItem, PortfolioProject,
        WorkExperience,
    },
    protocol::{
        ActivityEntry, AdminUserSummary, CollectionData, ProfileSummary, ProfileUpdate,
        PublicProfile, ReplaceCollectionRequest,
    },
    validation::{
        char_len, validate_collection, validate_password, validate_username, ValidateItem,
        BIO_MAX, DISPLAY_NAME_MAX, HEADLINE_MAX,
    },
};
use storage::{ProfileFields, ReplaceOutcome, Storage, StoredItem, StoredUser};
use tracing::{info, warn};

pub mod password;

use password::{hash_password, verify_password};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

/// Runs `$body` with `$item` bound to the item type stored under `$kind`.
macro_rules! with_item_type {
    ($kind:expr, $item:ident => $body:expr) => {
        match $kind {
            CollectionKind::Links => {
                type $item = Link;
                $body
            }
            CollectionKind::Experience => {
                type $item = WorkExperience;
                $body
            }
            CollectionKind::Education => {
                type $item = Education;
                $body
            }
            CollectionKind::Portfolio => {
                type $item = PortfolioProject;
                $body
            }
            CollectionKind::Achievements => {
                type $item = Achievement;
                $body
            }
            CollectionKind::Extracurriculars => {
                type $item = Extracurricular;
                $body
            }
        }
    };
}

/// Verifies the password of an existing account. An unknown username is
/// registered with the given password, which must satisfy the password rules.
/// Accounts without a stored password hash cannot log in.
pub async fn login(
    ctx: &ApiContext,
    username: &str,
    password: &str,
) -> Result<StoredUser, ApiError> {
    let username = username.trim();
    validate_username(username).map_err(ApiError::validation)?;

    if let Some(user) = ctx
        .storage
        .find_user_by_username(username)
        .await
        .map_err(internal)?
    {
        let stored = ctx
            .storage
            .password_hash(user.user_id)
            .await
            .map_err(internal)?;
        if !stored.is_some_and(|hash| verify_password(password, &hash)) {
            warn!(user_id = user.user_id.0, "login refused: bad credentials");
            return Err(invalid_credentials());
        }
        return Ok(user);
    }

    validate_password(password).map_err(ApiError::validation)?;
    let hash = hash_password(password).map_err(internal)?;
    let Some(user_id) = ctx
        .storage
        .register_user(username, &hash)
        .await
        .map_err(internal)?
    else {
        // registered concurrently under the same name
        return Err(invalid_credentials());
    };
    info!(user_id = user_id.0, username, "user registered");
    load_user(ctx, user_id).await
}

pub async fn get_profile(ctx: &ApiContext, user_id: UserId) -> Result<ProfileSummary, ApiError> {
    Ok(profile_summary(load_user(ctx, user_id).await?))
}

pub async fn update_profile(
    ctx: &ApiContext,
    user_id: UserId,
    update: ProfileUpdate,
) -> Result<ProfileSummary, ApiError> {
    let current = load_user(ctx, user_id).await?;

    let fields = ProfileFields {
        display_name: merge_text(
            update.display_name,
            current.display_name,
            "display_name",
            DISPLAY_NAME_MAX,
        )?,
        headline: merge_text(update.headline, current.headline, "headline", HEADLINE_MAX)?,
        bio: merge_text(update.bio, current.bio, "bio", BIO_MAX)?,
        is_public: update.is_public.unwrap_or(current.is_public),
    };

    ctx.storage
        .update_profile(user_id, &fields)
        .await
        .map_err(internal)?;
    get_profile(ctx, user_id).await
}

pub async fn list_collection<T: OrderedItem>(
    ctx: &ApiContext,
    user_id: UserId,
) -> Result<CollectionData<T>, ApiError> {
    let stored = ctx
        .storage
        .load_collection(user_id, T::KIND)
        .await
        .map_err(internal)?;
    let items = stored
        .items
        .iter()
        .map(|item| {
            serde_json::from_str::<T>(&item.payload).map_err(|e| {
                ApiError::new(
                    ErrorCode::Internal,
                    format!("corrupt {} item '{}': {e}", T::KIND, item.item_id),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CollectionData {
        items,
        revision: stored.revision,
    })
}

/// Validates and stores `items` as the complete new contents of the collection.
pub async fn replace_collection<T: OrderedItem + ValidateItem>(
    ctx: &ApiContext,
    user_id: UserId,
    items: Vec<T>,
    expected_revision: Option<i64>,
) -> Result<CollectionData<T>, ApiError> {
    load_user(ctx, user_id).await?;
    validate_collection(&items).map_err(ApiError::validation)?;

    let stored = items
        .iter()
        .map(|item| {
            serde_json::to_string(item)
                .map(|payload| StoredItem {
                    item_id: item.id().to_string(),
                    payload,
                })
                .map_err(|e| ApiError::new(ErrorCode::Internal, e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let outcome = ctx
        .storage
        .replace_collection(user_id, T::KIND, &stored, expected_revision)
        .await
        .map_err(internal)?;

    match outcome {
        ReplaceOutcome::Replaced { revision } => {
            info!(
                user_id = user_id.0,
                kind = %T::KIND,
                count = items.len(),
                revision,
                "collection replaced"
            );
            Ok(CollectionData { items, revision })
        }
        ReplaceOutcome::RevisionMismatch { current } => {
            warn!(
                user_id = user_id.0,
                kind = %T::KIND,
                expected = ?expected_revision,
                current,
                "rejected stale collection save"
            );
            Err(ApiError::new(
                ErrorCode::Conflict,
                format!(
                    "{} changed since it was loaded (revision {current}); reload and try again",
                    T::KIND
                ),
            ))
        }
    }
}

/// Kind-erased entry point for transports that only know the path segment.
pub async fn list_collection_value(
    ctx: &ApiContext,
    user_id: UserId,
    kind: CollectionKind,
) -> Result<CollectionData<Value>, ApiError> {
    with_item_type!(kind, Item => {
        let data = list_collection::<Item>(ctx, user_id).await?;
        erase(data)
    })
}

/// `body` is the raw request JSON; its array must sit under the field of `kind`.
pub async fn replace_collection_value(
    ctx: &ApiContext,
    user_id: UserId,
    kind: CollectionKind,
    body: Value,
) -> Result<CollectionData<Value>, ApiError> {
    let request = ReplaceCollectionRequest::<Value>::from_wire(kind, body)
        .map_err(ApiError::validation)?;
    with_item_type!(kind, Item => {
        let items = request
            .items
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                serde_json::from_value::<Item>(raw).map_err(|e| {
                    ApiError::validation(format!("{kind} item {index} is malformed: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let data = replace_collection::<Item>(ctx, user_id, items, request.expected_revision).await?;
        erase(data)
    })
}

pub async fn public_profile(ctx: &ApiContext, username: &str) -> Result<PublicProfile, ApiError> {
    let user = ctx
        .storage
        .find_user_by_username(username.trim())
        .await
        .map_err(internal)?
        .filter(|user| user.is_public)
        .ok_or_else(|| ApiError::not_found("profile not found"))?;
    let user_id = user.user_id;

    Ok(PublicProfile {
        username: user.username,
        display_name: user.display_name,
        headline: user.headline,
        bio: user.bio,
        links: list_collection::<Link>(ctx, user_id).await?.items,
        experiences: list_collection::<WorkExperience>(ctx, user_id).await?.items,
        education: list_collection::<Education>(ctx, user_id).await?.items,
        portfolio: list_collection::<PortfolioProject>(ctx, user_id).await?.items,
        achievements: list_collection::<Achievement>(ctx, user_id).await?.items,
        extracurriculars: list_collection::<Extracurricular>(ctx, user_id).await?.items,
    })
}

pub async fn list_users(
    ctx: &ApiContext,
    actor: UserId,
) -> Result<Vec<AdminUserSummary>, ApiError> {
    ensure_admin(ctx, actor).await?;
    let users = ctx.storage.list_users().await.map_err(internal)?;
    Ok(users.into_iter().map(admin_summary).collect())
}

/// Admins manage regular users; only a super admin may grant, revoke or
/// otherwise touch admin roles.
pub async fn set_role(
    ctx: &ApiContext,
    actor: UserId,
    target: UserId,
    role: Role,
) -> Result<AdminUserSummary, ApiError> {
    let actor_user = ensure_admin(ctx, actor).await?;
    if actor == target {
        return Err(ApiError::forbidden("cannot change your own role"));
    }
    let target_user = load_user(ctx, target).await?;
    let touches_admin = role.is_admin() || target_user.role.is_admin();
    if touches_admin && actor_user.role != Role::SuperAdmin {
        return Err(ApiError::forbidden("only a super admin can manage admin roles"));
    }

    ctx.storage.set_role(target, role).await.map_err(internal)?;
    let detail = format!("{} -> {}", target_user.role.as_str(), role.as_str());
    ctx.storage
        .record_activity(actor, "set_role", Some(target), Some(&detail))
        .await
        .map_err(internal)?;
    info!(actor = actor.0, target = target.0, %detail, "admin: role changed");

    Ok(admin_summary(load_user(ctx, target).await?))
}

pub async fn delete_user(ctx: &ApiContext, actor: UserId, target: UserId) -> Result<(), ApiError> {
    let actor_user = ensure_admin(ctx, actor).await?;
    if actor == target {
        return Err(ApiError::forbidden("cannot delete your own account here"));
    }
    let target_user = load_user(ctx, target).await?;
    match target_user.role {
        Role::SuperAdmin => return Err(ApiError::forbidden("super admins cannot be deleted")),
        Role::Admin if actor_user.role != Role::SuperAdmin => {
            return Err(ApiError::forbidden("only a super admin can delete an admin"))
        }
        _ => {}
    }

    ctx.storage.delete_user(target).await.map_err(internal)?;
    ctx.storage
        .record_activity(actor, "delete_user", Some(target), Some(&target_user.username))
        .await
        .map_err(internal)?;
    info!(actor = actor.0, target = target.0, "admin: user deleted");
    Ok(())
}

pub async fn list_activity(
    ctx: &ApiContext,
    actor: UserId,
    limit: u32,
) -> Result<Vec<ActivityEntry>, ApiError> {
    ensure_admin(ctx, actor).await?;
    let entries = ctx.storage.list_activity(limit).await.map_err(internal)?;
    Ok(entries
        .into_iter()
        .map(|entry| ActivityEntry {
            activity_id: entry.activity_id,
            actor_user_id: entry.actor_user_id,
            action: entry.action,
            target_user_id: entry.target_user_id,
            detail: entry.detail,
            created_at: entry.created_at,
        })
        .collect())
}

async fn load_user(ctx: &ApiContext, user_id: UserId) -> Result<StoredUser, ApiError> {
    ctx.storage
        .load_user(user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("user not found"))
}

/// Roles are re-read from storage so a revoked admin loses access before
/// their session token expires.
async fn ensure_admin(ctx: &ApiContext, actor: UserId) -> Result<StoredUser, ApiError> {
    let user = ctx
        .storage
        .load_user(actor)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "unknown user"))?;
    if !user.role.is_admin() {
        return Err(ApiError::forbidden("admin role required"));
    }
    Ok(user)
}

fn merge_text(
    update: Option<String>,
    current: Option<String>,
    field: &str,
    max: usize,
) -> Result<Option<String>, ApiError> {
    let Some(value) = update else {
        return Ok(current);
    };
    let value = value.trim();
    if char_len(value) > max {
        return Err(ApiError::validation(format!("{field} exceeds {max} characters")));
    }
    Ok((!value.is_empty()).then(|| value.to_string()))
}

fn erase<T: OrderedItem>(data: CollectionData<T>) -> Result<CollectionData<Value>, ApiError> {
    let items = data
        .items
        .into_iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::new(ErrorCode::Internal, e.to_string()))?;
    Ok(CollectionData {
        items,
        revision: data.revision,
    })
}

fn profile_summary(user: StoredUser) -> ProfileSummary {
    ProfileSummary {
        user_id: user.user_id,
        username: user.username,
        display_name: user.display_name,
        headline: user.headline,
        bio: user.bio,
        is_public: user.is_public,
        role: user.role,
    }
}

fn admin_summary(user: StoredUser) -> AdminUserSummary {
    AdminUserSummary {
        user_id: user.user_id,
        username: user.username,
        role: user.role,
        is_public: user.is_public,
        created_at: user.created_at,
    }
}

fn invalid_credentials() -> ApiError {
    ApiError::new(ErrorCode::Unauthorized, "invalid username or password")
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
