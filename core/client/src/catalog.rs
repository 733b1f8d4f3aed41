//! Vault item listing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::session::SessionManager;
use bwbridge_common::{Error, Result};
use bwbridge_transform::{enclose, Conversion};

const LIST_ITEMS: &str = "list items";

/// Renames applied to the `list items` envelope.
///
/// The tool speaks camel case; callers get snake case for the fields they
/// read by name.
pub fn item_conversion() -> Conversion {
    let item = Conversion::new()
        .rename("organizationId", "organization_id")
        .rename("folderId", "folder_id")
        .descend(
            "card",
            Conversion::new()
                .rename("cardholderName", "cardholder_name")
                .rename("expMonth", "exp_month")
                .rename("expYear", "exp_year"),
        )
        .descend(
            "identity",
            Conversion::new()
                .rename("firstName", "first_name")
                .rename("middleName", "middle_name")
                .rename("lastName", "last_name")
                .rename("postalCode", "postal_code")
                .rename("passportNumber", "passport_number")
                .rename("licenseNumber", "license_number"),
        )
        .descend(
            "login",
            Conversion::new().rename("passwordRevisionDate", "password_revision_date"),
        )
        .rename("secureNote", "secure_note")
        .rename("collectionIds", "collection_ids")
        .rename("revisionDate", "revision_date");

    Conversion::new().descend("data", Conversion::new().each("data", vec![item]))
}

/// Enclosures that turn listed items into the plugin-host shape.
pub fn host_enclosure() -> Conversion {
    let item = Conversion::new()
        .enclose("card")
        .enclose("identity")
        .enclose("login")
        .enclose("secure_note");
    Conversion::new().each("items", vec![item])
}

/// One vault item as a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultItem(Map<String, Value>);

impl VaultItem {
    /// Wrap a JSON object.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Item id.
    pub fn id(&self) -> Option<&str> {
        self.str_field("id")
    }

    /// Display name.
    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    /// Item type: 1 login, 2 secure note, 3 card, 4 identity.
    pub fn kind(&self) -> Option<u64> {
        self.0.get("type").and_then(Value::as_u64)
    }

    /// Folder the item is filed under, if any.
    pub fn folder_id(&self) -> Option<&str> {
        self.str_field("folder_id")
    }

    /// Owning organization, if any.
    pub fn organization_id(&self) -> Option<&str> {
        self.str_field("organization_id")
    }

    /// Last revision timestamp as reported by the server.
    pub fn revision_date(&self) -> Option<&str> {
        self.str_field("revision_date")
    }

    /// Collections the item belongs to.
    pub fn collection_ids(&self) -> Vec<&str> {
        self.0
            .get("collection_ids")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Any field by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// All fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Unwrap into a JSON object value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

/// Lists vault items through a shared session.
#[derive(Clone)]
pub struct ItemCatalog {
    session: Arc<SessionManager>,
}

impl ItemCatalog {
    /// Create a catalog over a shared session.
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    /// Session the catalog lists through.
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// List every item in the vault, keys renamed by `item_conversion`.
    ///
    /// # Errors
    /// - The vault cannot be unlocked
    /// - The tool reports failure; the error carries its message
    /// - The listing is not a list of objects
    pub async fn list_items(&self) -> Result<Vec<VaultItem>> {
        self.session.ensure_unlocked().await?;

        let conversion = item_conversion();
        let mut data = self
            .session
            .fetch(LIST_ITEMS, &["list", "items", "--response"], Some(&conversion))
            .await?;

        let items = match data.get_mut("data").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => return Err(unexpected(data.to_string())),
        };

        let items = items
            .into_iter()
            .map(into_item)
            .collect::<Result<Vec<_>>>()?;

        info!(count = items.len(), "listed vault items");
        Ok(items)
    }

    /// List items in the plugin-host shape: `card`, `identity`, `login` and
    /// `secure_note` each wrapped in a one-element list.
    pub async fn host_items(&self) -> Result<Vec<VaultItem>> {
        let items = self.list_items().await?;

        let mut document = Value::Object(Map::from_iter([(
            "items".to_string(),
            Value::Array(items.into_iter().map(VaultItem::into_value).collect()),
        )]));
        enclose(&mut document, &host_enclosure())?;
        debug!("enclosed items for host");

        match document.get_mut("items").map(Value::take) {
            Some(Value::Array(items)) => items.into_iter().map(into_item).collect(),
            _ => Err(unexpected(document.to_string())),
        }
    }
}

fn into_item(value: Value) -> Result<VaultItem> {
    match value {
        Value::Object(fields) => Ok(VaultItem(fields)),
        other => Err(unexpected(other.to_string())),
    }
}

fn unexpected(output: String) -> Error {
    Error::UnexpectedOutput {
        command: LIST_ITEMS.to_string(),
        output,
    }
}
