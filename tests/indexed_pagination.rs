//! Indexes and paginators sharing one store.
//!
//! Pages fetched by a paginator land in the store inside one commit, so every
//! index attached to that store sees them before any reader does.

use facet::{
    Entity, EntityId, EntityStore, Error, FetchResponse, IndexedStore, NormalizedEntities,
    PageInfo, Paginator, StoreRegistry,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: i64,
    email: String,
    role: Option<String>,
}

impl Entity for User {
    fn id(&self) -> EntityId {
        EntityId::Int(self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Role {
    id: String,
    label: String,
}

impl Entity for Role {
    fn id(&self) -> EntityId {
        EntityId::from(self.id.as_str())
    }
}

fn user(id: i64, email: &str) -> User {
    User {
        id,
        email: email.to_string(),
        role: None,
    }
}

fn users_page(page: u32) -> FetchResponse<User> {
    let users = match page {
        1 => vec![user(1, "ada@example.com"), user(2, "grace@example.com")],
        _ => vec![user(3, "edsger@example.com")],
    };
    FetchResponse::entities(PageInfo::new(page, 2, 2).with_total(3), users)
}

fn directory() -> (EntityStore<User>, IndexedStore<User>) {
    let users = EntityStore::<User>::new("users");
    let indexed = IndexedStore::builder(users.clone())
        .index("email", |u: &User| Some(u.email.clone()))
        .index("role", |u: &User| u.role.clone())
        .build()
        .unwrap();
    (users, indexed)
}

#[test]
fn fetched_pages_are_indexed() {
    let (users, indexed) = directory();
    let paginator = Paginator::new(users.clone()).unwrap();

    paginator.update(users_page(1)).unwrap();
    let by_email = indexed.index_query("email").unwrap();
    assert_eq!(by_email.get_id("grace@example.com"), Some(EntityId::from(2i64)));

    paginator.update(users_page(2)).unwrap();
    assert_eq!(
        by_email.get_entity("edsger@example.com").map(|u| u.id),
        Some(3)
    );
    assert_eq!(indexed.index_store("email").unwrap().snapshot().len(), 3);
}

#[test]
fn clearing_the_cache_clears_the_index() {
    let (users, indexed) = directory();
    let paginator = Paginator::new(users.clone()).unwrap();
    paginator.update(users_page(1)).unwrap();

    paginator.clear_cache();
    let email = indexed.index_store("email").unwrap();
    assert!(email.snapshot().is_empty());
    assert!(email.snapshot().is_consistent());
    assert!(users.is_empty());
}

#[test]
fn undeclared_index_is_an_error() {
    let (_, indexed) = directory();
    assert!(matches!(
        indexed.index_query("handle"),
        Err(Error::IndexNotDeclared { .. })
    ));
}

#[test]
fn normalized_pages_fill_every_registered_store() {
    let (users, indexed) = directory();
    let roles = EntityStore::<Role>::new("roles");
    let registry = StoreRegistry::new()
        .register(users.clone())
        .and_then(|r| r.register(roles.clone()))
        .unwrap();
    let paginator = Paginator::builder(users.clone())
        .name("staff")
        .registry(registry)
        .build()
        .unwrap();

    let mut entities: NormalizedEntities = BTreeMap::new();
    entities.insert(
        "users".into(),
        BTreeMap::from([(
            "1".to_string(),
            json!({"id": 1, "email": "ada@example.com", "role": "admin"}),
        )]),
    );
    entities.insert(
        "roles".into(),
        BTreeMap::from([("admin".to_string(), json!({"id": "admin", "label": "Admin"}))]),
    );

    paginator
        .update(FetchResponse::normalized(
            PageInfo::new(1, 10, 1),
            vec![EntityId::from(1i64)],
            entities,
        ))
        .unwrap();

    assert_eq!(roles.len(), 1);
    let by_role = indexed.index_query("role").unwrap();
    assert_eq!(by_role.get_id("admin"), Some(EntityId::from(1i64)));
    assert_eq!(paginator.pagination().total, 1);
}

#[tokio::test(start_paused = true)]
async fn index_lookups_follow_page_edits() {
    let (users, indexed) = directory();
    let paginator = Paginator::new(users.clone()).unwrap();
    let mut pages = paginator.get_page(|page: u32| async move { Ok::<_, Error>(users_page(page)) });
    let first = pages.next().await.unwrap().unwrap();
    assert_eq!(first.entities().count(), 2);

    let by_email = indexed.index_query("email").unwrap();
    let mut ada = by_email.select_entity("ada@example.com");
    assert_eq!(ada.next().await.unwrap().map(|u| u.id), Some(1));

    users.update(&EntityId::from(1i64), |u| u.email = "ada@lovelace.dev".into());
    assert_eq!(ada.next().await, Some(None));

    let page = pages.next().await.unwrap().unwrap();
    assert_eq!(
        page.entities().next().map(|u| u.email.as_str()),
        Some("ada@lovelace.dev")
    );
    assert_eq!(by_email.get_id("ada@lovelace.dev"), Some(EntityId::from(1i64)));
}
