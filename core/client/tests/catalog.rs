//! Item listing through a scripted vault tool.

use serde_json::json;
use std::sync::Arc;

use bwbridge_client::{ClientConfig, ItemCatalog, MockVault, RawOutput, SessionManager};
use bwbridge_common::Error;

const SERVER: &str = "https://vault.example.com";

fn items() -> Vec<serde_json::Value> {
    vec![
        json!({
            "object": "item",
            "id": "11111111-0000-0000-0000-000000000001",
            "organizationId": null,
            "folderId": "f1",
            "type": 1,
            "name": "GitHub",
            "login": {
                "uris": [{ "match": null, "uri": "https://github.com" }],
                "username": "ada",
                "password": "pw",
                "passwordRevisionDate": null
            },
            "collectionIds": [],
            "revisionDate": "2024-01-01T00:00:00.000Z"
        }),
        json!({
            "object": "item",
            "id": "11111111-0000-0000-0000-000000000002",
            "organizationId": "org1",
            "folderId": null,
            "type": 3,
            "name": "Visa",
            "card": {
                "cardholderName": "Ada Lovelace",
                "brand": "Visa",
                "number": "4111111111111111",
                "expMonth": "4",
                "expYear": "2030",
                "code": "123"
            },
            "collectionIds": ["col1"],
            "revisionDate": "2024-02-01T00:00:00.000Z"
        }),
        json!({
            "object": "item",
            "id": "11111111-0000-0000-0000-000000000003",
            "type": 4,
            "name": "Passport",
            "identity": {
                "firstName": "Ada",
                "middleName": null,
                "lastName": "Lovelace",
                "postalCode": "W1",
                "passportNumber": "P123",
                "licenseNumber": null
            },
            "collectionIds": [],
            "revisionDate": "2024-03-01T00:00:00.000Z"
        }),
        json!({
            "object": "item",
            "id": "11111111-0000-0000-0000-000000000004",
            "type": 2,
            "name": "Note",
            "secureNote": { "type": 0 },
            "collectionIds": [],
            "revisionDate": "2024-04-01T00:00:00.000Z"
        }),
    ]
}

fn catalog(vault: &Arc<MockVault>) -> ItemCatalog {
    let config = ClientConfig::new("ada@example.com")
        .with_server(SERVER)
        .with_master_password("correct horse");
    let session = SessionManager::with_executor(config, vault.clone()).unwrap();
    ItemCatalog::new(Arc::new(session))
}

fn vault() -> Arc<MockVault> {
    Arc::new(
        MockVault::new(SERVER)
            .with_account("ada@example.com", "ada-id", "correct horse")
            .logged_in_as("ada@example.com")
            .with_items(items()),
    )
}

#[tokio::test]
async fn test_list_items_renames_fields() {
    let vault = vault();
    let items = catalog(&vault).list_items().await.unwrap();

    assert_eq!(items.len(), 4);

    let login = &items[0];
    assert_eq!(login.name(), Some("GitHub"));
    assert_eq!(login.kind(), Some(1));
    assert_eq!(login.folder_id(), Some("f1"));
    assert_eq!(login.revision_date(), Some("2024-01-01T00:00:00.000Z"));
    assert!(login.get("login").unwrap().get("password_revision_date").is_some());

    let card = &items[1];
    assert_eq!(card.organization_id(), Some("org1"));
    assert_eq!(card.collection_ids(), vec!["col1"]);
    assert_eq!(card.get("card").unwrap()["cardholder_name"], "Ada Lovelace");
    assert_eq!(card.get("card").unwrap()["exp_year"], "2030");

    let identity = items[2].get("identity").unwrap();
    assert_eq!(identity["first_name"], "Ada");
    assert_eq!(identity["passport_number"], "P123");
    assert!(identity.get("firstName").is_none());

    assert_eq!(items[3].get("secure_note"), Some(&json!({ "type": 0 })));
}

#[tokio::test]
async fn test_list_items_unlocks_once() {
    let vault = vault();
    let catalog = catalog(&vault);

    catalog.list_items().await.unwrap();
    catalog.list_items().await.unwrap();

    assert_eq!(vault.count("unlock").await, 1);
    assert_eq!(vault.count("list items").await, 2);
}

#[tokio::test]
async fn test_tool_failure_message_is_kept() {
    let vault = vault();
    vault
        .respond_once(
            "list items",
            RawOutput::new(0, r#"{"success":false,"message":"invalid master password"}"#),
        )
        .await;

    let err = catalog(&vault).list_items().await.unwrap_err();
    assert!(matches!(err, Error::Envelope { .. }));
    assert!(err.to_string().contains("invalid master password"));
}

#[tokio::test]
async fn test_map_in_place_of_item_list_is_structural_mismatch() {
    let vault = vault();
    vault
        .respond_once(
            "list items",
            RawOutput::new(0, r#"{"success":true,"data":{"object":"list","data":{}}}"#),
        )
        .await;

    match catalog(&vault).list_items().await {
        Err(Error::StructuralMismatch { key, expected, .. }) => {
            assert_eq!(key, "data");
            assert_eq!(expected, "list");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_listing_without_items_is_unexpected() {
    let responses = [
        r#"{"success":true,"data":{"object":"list"}}"#,
        r#"{"success":true,"data":{"object":"list","data":null}}"#,
        r#"{"success":true,"data":null}"#,
    ];
    for response in responses {
        let vault = vault();
        vault
            .respond_once("list items", RawOutput::new(0, response))
            .await;

        assert!(
            matches!(
                catalog(&vault).list_items().await,
                Err(Error::UnexpectedOutput { .. })
            ),
            "{}",
            response
        );
    }
}

#[tokio::test]
async fn test_prompt_before_listing_is_dropped() {
    let vault = vault();
    vault
        .respond_once(
            "list items",
            RawOutput::new(
                0,
                "? Master password: [hidden]\n{\"success\":true,\"data\":{\"object\":\"list\",\"data\":[]}}\n",
            ),
        )
        .await;

    assert!(catalog(&vault).list_items().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_host_items_enclose_sub_objects() {
    let vault = vault();
    let items = catalog(&vault).host_items().await.unwrap();

    assert_eq!(items[0].get("login").unwrap().as_array().unwrap().len(), 1);
    assert_eq!(
        items[1].get("card").unwrap()[0]["cardholder_name"],
        "Ada Lovelace"
    );
    assert!(items[2].get("identity").unwrap().is_array());
    assert_eq!(items[3].get("secure_note"), Some(&json!([{ "type": 0 }])));
    assert!(items[0].get("card").is_none());
}

#[tokio::test]
async fn test_locked_vault_without_password_fails() {
    let vault = vault();
    let config = ClientConfig::new("ada@example.com").with_server(SERVER);
    let session = SessionManager::with_executor(config, vault.clone()).unwrap();

    let err = ItemCatalog::new(Arc::new(session)).list_items().await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(vault.count("list items").await, 0);
}
