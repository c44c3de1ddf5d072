#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parlor_client::{DataUrlUploader, LocalAuth, ParlorClient};
use parlor_shared::constants::{CHATS, USERS};
use parlor_shared::UserId;
use parlor_store::{DocumentStore, Fields, MemoryStore, NewDocument};
use serde_json::{json, Value};
use tokio::sync::watch;

pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

pub async fn seed_user(store: &MemoryStore, id: &str, username: &str) {
    store
        .put(
            USERS,
            id,
            NewDocument::new(fields(json!({ "username": username, "bio": "", "blocked": [] }))),
        )
        .await
        .unwrap();
}

pub async fn seed_direct_chat(store: &MemoryStore, id: &str, a: &str, b: &str) {
    store
        .put(
            CHATS,
            id,
            NewDocument::new(fields(json!({ "type": "direct", "members": [a, b] }))),
        )
        .await
        .unwrap();
}

pub async fn wait_until<T, F>(rx: &mut watch::Receiver<T>, pred: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed")
        .clone()
}

/// A started client on `store` with `user` signed in and their chat list attached.
pub async fn signed_in_client(store: &MemoryStore, user: &str) -> (ParlorClient, Arc<LocalAuth>) {
    let auth = Arc::new(LocalAuth::new());
    let client = ParlorClient::new(
        Arc::new(store.clone()),
        auth.clone(),
        Arc::new(DataUrlUploader::new(1024 * 1024)),
    );
    client.start();

    let mut chats = client.chats().subscribe();
    auth.sign_in(UserId::from(user));
    wait_until(&mut chats, |v| v.user.as_ref().map(UserId::as_str) == Some(user)).await;

    let mut active = client.active().subscribe();
    wait_until(&mut active, |v| v.me.is_some()).await;
    (client, auth)
}
