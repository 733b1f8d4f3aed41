//! Lock domains of a shared session.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use bwbridge_client::{ClientConfig, Executor, Invocation, ItemCatalog, RawOutput, SessionManager};
use bwbridge_common::Result;

const SERVER: &str = "https://vault.example.com";

/// Tool whose `sync` does not return until released.
struct ParkedSync {
    sync_started: Notify,
    release_sync: Notify,
    unlocked: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl ParkedSync {
    fn new() -> Self {
        Self {
            sync_started: Notify::new(),
            release_sync: Notify::new(),
            unlocked: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn count(&self, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| *call == command)
            .count()
    }
}

fn success(data: serde_json::Value) -> RawOutput {
    RawOutput::new(0, json!({ "success": true, "data": data }).to_string())
}

fn failure(message: &str) -> RawOutput {
    RawOutput::new(1, json!({ "success": false, "message": message }).to_string())
}

#[async_trait]
impl Executor for ParkedSync {
    async fn execute(&self, invocation: &Invocation, _input: Option<&[u8]>) -> Result<RawOutput> {
        self.calls.lock().unwrap().push(invocation.name().to_string());

        let output = match invocation.name() {
            "login --check" => success(json!({ "object": "message" })),
            "unlock --check" => {
                if self.unlocked.load(Ordering::SeqCst) {
                    success(json!({ "object": "message" }))
                } else {
                    failure("Vault is locked.")
                }
            }
            "status" => success(json!({
                "object": "template",
                "template": {
                    "serverUrl": SERVER,
                    "userEmail": "ada@example.com",
                    "userId": "ada-id",
                    "status": "unlocked"
                }
            })),
            "lock" => {
                self.unlocked.store(false, Ordering::SeqCst);
                success(json!({ "object": "message", "title": "Your vault is locked." }))
            }
            "sync" => {
                self.sync_started.notify_one();
                self.release_sync.notified().await;
                success(json!({ "object": "message", "title": "Syncing complete." }))
            }
            "list items" => success(json!({ "object": "list", "data": [] })),
            _ => failure("Invalid command."),
        };
        Ok(output)
    }
}

#[tokio::test]
async fn test_sync_holds_data_lock_but_not_auth_lock() {
    let tool = Arc::new(ParkedSync::new());
    let config = ClientConfig::new("ada@example.com")
        .with_server(SERVER)
        .with_session_key("held-key");
    let session = Arc::new(SessionManager::with_executor(config, tool.clone()).unwrap());
    let catalog = ItemCatalog::new(session.clone());

    let syncing = tokio::spawn({
        let session = session.clone();
        async move { session.sync().await }
    });
    tool.sync_started.notified().await;

    let listing = tokio::spawn(async move { catalog.list_items().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Listing has passed its unlock check and waits behind the sync.
    assert!(!listing.is_finished());
    assert_eq!(tool.count("list items"), 0);

    // Auth transitions are not held up by a running sync.
    tokio::time::timeout(Duration::from_secs(1), session.ensure_locked())
        .await
        .expect("lock waited for sync")
        .unwrap();
    assert_eq!(tool.count("lock"), 1);
    assert!(!syncing.is_finished());

    tool.release_sync.notify_one();
    syncing.await.unwrap().unwrap();
    assert!(listing.await.unwrap().unwrap().is_empty());
    assert_eq!(tool.count("list items"), 1);
}
