use shared::domain::{CollectionKind, Role};
use storage::{ProfileFields, ReplaceOutcome, Storage, StoredItem};

#[tokio::test]
async fn profile_role_and_collection_lifecycle() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");

    let alice = storage.create_user("alice").await.expect("alice");
    let bob = storage.create_user("bob").await.expect("bob");

    let updated = storage
        .update_profile(
            alice,
            &ProfileFields {
                display_name: Some("Alice A.".into()),
                headline: Some("Engineer".into()),
                bio: None,
                is_public: false,
            },
        )
        .await
        .expect("update profile");
    assert!(updated);

    let loaded = storage.load_user(alice).await.expect("load").expect("alice");
    assert_eq!(loaded.display_name.as_deref(), Some("Alice A."));
    assert!(!loaded.is_public);

    assert!(storage.set_role(bob, Role::Admin).await.expect("role"));
    let users = storage.list_users().await.expect("users");
    assert_eq!(
        users.iter().map(|u| u.username.as_str()).collect::<Vec<_>>(),
        vec!["alice", "bob"]
    );
    assert_eq!(users[1].role, Role::Admin);

    let items = vec![
        StoredItem {
            item_id: "e1".into(),
            payload: r#"{"id":"e1","company":"Acme"}"#.into(),
        },
        StoredItem {
            item_id: "e2".into(),
            payload: r#"{"id":"e2","company":"Initech"}"#.into(),
        },
    ];
    let outcome = storage
        .replace_collection(alice, CollectionKind::Experience, &items, Some(0))
        .await
        .expect("replace");
    assert_eq!(outcome, ReplaceOutcome::Replaced { revision: 1 });

    let stored = storage
        .load_collection(alice, CollectionKind::Experience)
        .await
        .expect("load");
    assert_eq!(stored.items, items);

    let bob_view = storage
        .load_collection(bob, CollectionKind::Experience)
        .await
        .expect("load bob");
    assert!(bob_view.items.is_empty());
}
