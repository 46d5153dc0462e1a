//! Client-side cart state: optimistic local edits persisted to disk, then
//! reconciled with the cart API.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use db::models::cart_item::{AddCartItem, UpdateCartItem};
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use super::cart::CartSummary;

/// Key the cart is stored under, shared with the web frontend.
pub const CART_STORAGE_KEY: &str = "fruitful-cart-storage";

const STORAGE_VERSION: u32 = 0;

#[derive(Debug, Error)]
pub enum CartStoreError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("{0}")]
    Api(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct LocalCartItem {
    /// Server id; `None` until the backend has acknowledged the line.
    pub id: Option<Uuid>,
    pub brand_id: Uuid,
    pub brand_name: String,
    #[ts(type = "number")]
    pub quantity: i64,
    #[ts(type = "number")]
    pub price_cents: i64,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct CartState {
    pub items: Vec<LocalCartItem>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl CartState {
    /// `None` if the lines do not fit in an `i64` total, e.g. after a
    /// hand-edited storage file.
    pub fn total_cents(&self) -> Option<i64> {
        self.items.iter().try_fold(0i64, |total, i| {
            i.quantity
                .checked_mul(i.price_cents)
                .and_then(|line| total.checked_add(line))
        })
    }

    pub fn item_count(&self) -> i64 {
        self.items
            .iter()
            .fold(0i64, |count, i| count.saturating_add(i.quantity))
    }
}

#[async_trait]
pub trait CartBackend: Send + Sync {
    async fn fetch_cart(&self, session_id: &str) -> Result<CartSummary, CartStoreError>;

    async fn add_item(&self, session_id: &str, item: &AddCartItem) -> Result<(), CartStoreError>;

    async fn update_quantity(
        &self,
        session_id: &str,
        item_id: Uuid,
        quantity: i64,
    ) -> Result<(), CartStoreError>;

    async fn remove_item(&self, session_id: &str, item_id: Uuid) -> Result<(), CartStoreError>;

    async fn clear(&self, session_id: &str) -> Result<(), CartStoreError>;
}

/// `CartBackend` over the `/api/cart` HTTP routes.
#[derive(Debug, Clone)]
pub struct HttpCartBackend {
    http: Client,
    base_url: String,
}

impl HttpCartBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CartStoreError> {
        let http = Client::builder()
            .user_agent(concat!("seedwave/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CartStoreError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn cart_url(&self, session_id: &str) -> String {
        format!(
            "{}/api/cart/{}",
            self.base_url,
            urlencoding::encode(session_id)
        )
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, CartStoreError> {
        let res = request
            .send()
            .await
            .map_err(|e| CartStoreError::Transport(e.to_string()))?;
        let status = res.status();
        let envelope: ApiResponse<T> = res
            .json()
            .await
            .map_err(|e| CartStoreError::Transport(e.to_string()))?;
        if !envelope.is_success() {
            let message = envelope
                .error
                .unwrap_or_else(|| format!("cart request failed with status {status}"));
            return Err(CartStoreError::Api(message));
        }
        Ok(envelope.into_data())
    }
}

#[async_trait]
impl CartBackend for HttpCartBackend {
    async fn fetch_cart(&self, session_id: &str) -> Result<CartSummary, CartStoreError> {
        self.send::<CartSummary>(self.http.get(self.cart_url(session_id)))
            .await?
            .ok_or_else(|| CartStoreError::Api("cart response had no data".to_string()))
    }

    async fn add_item(&self, session_id: &str, item: &AddCartItem) -> Result<(), CartStoreError> {
        let url = format!("{}/items", self.cart_url(session_id));
        self.send::<Value>(self.http.post(url).json(item)).await?;
        Ok(())
    }

    async fn update_quantity(
        &self,
        session_id: &str,
        item_id: Uuid,
        quantity: i64,
    ) -> Result<(), CartStoreError> {
        let url = format!("{}/items/{}", self.cart_url(session_id), item_id);
        self.send::<Value>(self.http.patch(url).json(&UpdateCartItem { quantity }))
            .await?;
        Ok(())
    }

    async fn remove_item(&self, session_id: &str, item_id: Uuid) -> Result<(), CartStoreError> {
        let url = format!("{}/items/{}", self.cart_url(session_id), item_id);
        self.send::<Value>(self.http.delete(url)).await?;
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<(), CartStoreError> {
        self.send::<Value>(self.http.delete(self.cart_url(session_id)))
            .await?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCart {
    state: PersistedState,
    version: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    items: Vec<LocalCartItem>,
}

/// A JSON file of `key -> { state, version }` entries, the same layout the
/// browser keeps in `localStorage`. Other keys in the file are preserved.
#[derive(Debug, Clone)]
pub struct CartStorage {
    path: PathBuf,
}

impl CartStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Map<String, Value>, CartStoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(Map::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn load(&self) -> Result<Vec<LocalCartItem>, CartStoreError> {
        let mut all = self.read_all().await?;
        let Some(entry) = all.remove(CART_STORAGE_KEY) else {
            return Ok(Vec::new());
        };
        let persisted: PersistedCart = serde_json::from_value(entry)?;
        if persisted.version != STORAGE_VERSION {
            warn!(
                version = persisted.version,
                "Cart storage has an unknown version, starting empty"
            );
            return Ok(Vec::new());
        }
        Ok(persisted.state.items)
    }

    pub async fn save(&self, items: &[LocalCartItem]) -> Result<(), CartStoreError> {
        let mut all = self.read_all().await?;
        let entry = PersistedCart {
            state: PersistedState {
                items: items.to_vec(),
            },
            version: STORAGE_VERSION,
        };
        all.insert(CART_STORAGE_KEY.to_string(), serde_json::to_value(entry)?);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(&all)?).await?;
        Ok(())
    }
}

/// Cart state for one session.
///
/// Mutations are applied locally first, persisted, sent to the backend and
/// followed by a reload from the backend. A failed backend call leaves the
/// optimistic state in place and records the message in `error`.
pub struct CartStore<B: CartBackend> {
    session_id: String,
    backend: B,
    storage: Option<CartStorage>,
    state: CartState,
}

impl<B: CartBackend> CartStore<B> {
    pub fn new(session_id: impl Into<String>, backend: B) -> Self {
        Self {
            session_id: session_id.into(),
            backend,
            storage: None,
            state: CartState::default(),
        }
    }

    /// Restore previously persisted items and keep persisting to `storage`.
    pub async fn with_storage(
        session_id: impl Into<String>,
        backend: B,
        storage: CartStorage,
    ) -> Result<Self, CartStoreError> {
        let items = storage.load().await?;
        let mut store = Self::new(session_id, backend);
        store.state.items = items;
        store.storage = Some(storage);
        Ok(store)
    }

    pub fn state(&self) -> &CartState {
        &self.state
    }

    pub fn items(&self) -> &[LocalCartItem] {
        &self.state.items
    }

    pub fn total_cents(&self) -> Option<i64> {
        self.state.total_cents()
    }

    pub fn item_count(&self) -> i64 {
        self.state.item_count()
    }

    pub async fn add_item(
        &mut self,
        brand_id: Uuid,
        brand_name: impl Into<String>,
        price_cents: i64,
        quantity: i64,
        metadata: Option<Value>,
    ) -> Result<(), CartStoreError> {
        match self.state.items.iter_mut().find(|i| i.brand_id == brand_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(quantity);
                existing.price_cents = price_cents;
            }
            None => self.state.items.push(LocalCartItem {
                id: None,
                brand_id,
                brand_name: brand_name.into(),
                quantity,
                price_cents,
                metadata: metadata.clone().unwrap_or_else(|| serde_json::json!({})),
            }),
        }
        self.begin().await;

        let request = AddCartItem {
            brand_id,
            quantity: Some(quantity),
            price_cents,
            metadata,
        };
        let result = self.backend.add_item(&self.session_id, &request).await;
        self.finish(result).await
    }

    /// Set a line's quantity; zero or less removes it.
    pub async fn update_quantity(
        &mut self,
        item_id: Uuid,
        quantity: i64,
    ) -> Result<(), CartStoreError> {
        if quantity <= 0 {
            return self.remove_item(item_id).await;
        }
        if let Some(item) = self
            .state
            .items
            .iter_mut()
            .find(|i| i.id == Some(item_id))
        {
            item.quantity = quantity;
        }
        self.begin().await;

        let result = self
            .backend
            .update_quantity(&self.session_id, item_id, quantity)
            .await;
        self.finish(result).await
    }

    pub async fn remove_item(&mut self, item_id: Uuid) -> Result<(), CartStoreError> {
        self.state.items.retain(|i| i.id != Some(item_id));
        self.begin().await;

        let result = self.backend.remove_item(&self.session_id, item_id).await;
        self.finish(result).await
    }

    pub async fn clear_cart(&mut self) -> Result<(), CartStoreError> {
        self.state.items.clear();
        self.begin().await;

        let result = self.backend.clear(&self.session_id).await;
        self.finish(result).await
    }

    /// Replace local items with the backend's view of the cart.
    pub async fn load_cart(&mut self) -> Result<(), CartStoreError> {
        self.state.is_loading = true;
        match self.backend.fetch_cart(&self.session_id).await {
            Ok(summary) => {
                self.state.items = summary
                    .items
                    .into_iter()
                    .map(|line| LocalCartItem {
                        id: Some(line.item.id),
                        brand_id: line.item.brand_id,
                        brand_name: line.brand_name,
                        quantity: line.item.quantity,
                        price_cents: line.item.price_cents,
                        metadata: line.item.metadata,
                    })
                    .collect();
                self.state.is_loading = false;
                self.state.error = None;
                self.persist().await;
                debug!(session_id = %self.session_id, items = self.state.items.len(), "Cart reloaded");
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    async fn begin(&mut self) {
        self.state.is_loading = true;
        self.state.error = None;
        self.persist().await;
    }

    async fn finish(&mut self, result: Result<(), CartStoreError>) -> Result<(), CartStoreError> {
        match result {
            Ok(()) => self.load_cart().await,
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, e: CartStoreError) -> Result<(), CartStoreError> {
        warn!(session_id = %self.session_id, error = %e, "Cart backend call failed");
        self.state.is_loading = false;
        self.state.error = Some(e.to_string());
        Err(e)
    }

    // Persistence failures are logged; the in-memory state stays authoritative.
    async fn persist(&self) {
        let Some(storage) = &self.storage else {
            return;
        };
        if let Err(e) = storage.save(&self.state.items).await {
            warn!(path = %storage.path().display(), error = %e, "Failed to persist cart");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use db::models::cart_item::{CartItem, CartItemWithBrand};

    use super::*;

    /// In-memory stand-in for the cart API.
    #[derive(Default)]
    struct MemoryBackend {
        lines: Mutex<Vec<CartItemWithBrand>>,
        fail_with: Option<String>,
    }

    impl MemoryBackend {
        fn failing(message: &str) -> Self {
            Self {
                lines: Mutex::default(),
                fail_with: Some(message.to_string()),
            }
        }

        fn check(&self) -> Result<(), CartStoreError> {
            match &self.fail_with {
                Some(message) => Err(CartStoreError::Api(message.clone())),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl CartBackend for MemoryBackend {
        async fn fetch_cart(&self, session_id: &str) -> Result<CartSummary, CartStoreError> {
            self.check()?;
            let lines = self.lines.lock().unwrap().clone();
            CartSummary::from_items(session_id, lines)
                .map_err(|e| CartStoreError::Api(e.to_string()))
        }

        async fn add_item(
            &self,
            session_id: &str,
            item: &AddCartItem,
        ) -> Result<(), CartStoreError> {
            self.check()?;
            let mut lines = self.lines.lock().unwrap();
            let quantity = item.quantity.unwrap_or(1);
            if let Some(line) = lines.iter_mut().find(|l| l.item.brand_id == item.brand_id) {
                line.item.quantity += quantity;
                line.item.price_cents = item.price_cents;
                return Ok(());
            }
            let now = Utc::now();
            lines.push(CartItemWithBrand {
                item: CartItem {
                    id: Uuid::new_v4(),
                    session_id: session_id.to_string(),
                    brand_id: item.brand_id,
                    quantity,
                    price_cents: item.price_cents,
                    metadata: item.metadata.clone().unwrap_or_else(|| serde_json::json!({})),
                    created_at: now,
                    updated_at: now,
                },
                brand_name: "Server Brand".to_string(),
            });
            Ok(())
        }

        async fn update_quantity(
            &self,
            _session_id: &str,
            item_id: Uuid,
            quantity: i64,
        ) -> Result<(), CartStoreError> {
            self.check()?;
            let mut lines = self.lines.lock().unwrap();
            match lines.iter_mut().find(|l| l.item.id == item_id) {
                Some(line) => {
                    line.item.quantity = quantity;
                    Ok(())
                }
                None => Err(CartStoreError::Api("cart item not found".to_string())),
            }
        }

        async fn remove_item(
            &self,
            _session_id: &str,
            item_id: Uuid,
        ) -> Result<(), CartStoreError> {
            self.check()?;
            self.lines.lock().unwrap().retain(|l| l.item.id != item_id);
            Ok(())
        }

        async fn clear(&self, _session_id: &str) -> Result<(), CartStoreError> {
            self.check()?;
            self.lines.lock().unwrap().clear();
            Ok(())
        }
    }

    #[tokio::test]
    async fn add_reloads_server_state() {
        let mut store = CartStore::new("s1", MemoryBackend::default());
        let brand = Uuid::new_v4();

        store.add_item(brand, "Local Name", 1500, 2, None).await.unwrap();
        store.add_item(brand, "Local Name", 1500, 1, None).await.unwrap();

        assert_eq!(store.items().len(), 1);
        let line = &store.items()[0];
        assert!(line.id.is_some());
        assert_eq!(line.brand_name, "Server Brand");
        assert_eq!(line.quantity, 3);
        assert_eq!(store.total_cents(), Some(4500));
        assert_eq!(store.item_count(), 3);
        assert!(!store.state().is_loading);
        assert_eq!(store.state().error, None);
    }

    #[tokio::test]
    async fn update_and_remove_by_server_id() {
        let mut store = CartStore::new("s1", MemoryBackend::default());
        store.add_item(Uuid::new_v4(), "A", 100, 1, None).await.unwrap();
        store.add_item(Uuid::new_v4(), "B", 250, 1, None).await.unwrap();
        let first = store.items()[0].id.unwrap();
        let second = store.items()[1].id.unwrap();

        store.update_quantity(first, 4).await.unwrap();
        assert_eq!(store.total_cents(), Some(4 * 100 + 250));

        store.update_quantity(second, 0).await.unwrap();
        assert_eq!(store.items().len(), 1);

        store.clear_cart().await.unwrap();
        assert!(store.items().is_empty());
        assert_eq!(store.total_cents(), Some(0));
    }

    #[tokio::test]
    async fn failure_keeps_optimistic_state_and_records_error() {
        let mut store = CartStore::new("s1", MemoryBackend::failing("service unavailable"));
        let result = store.add_item(Uuid::new_v4(), "Offline", 999, 2, None).await;

        assert!(result.is_err());
        assert_eq!(store.items().len(), 1);
        assert_eq!(store.items()[0].id, None);
        assert_eq!(store.item_count(), 2);
        assert_eq!(store.state().error.as_deref(), Some("service unavailable"));
        assert!(!store.state().is_loading);
    }

    #[tokio::test]
    async fn persists_under_storage_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, r#"{"theme":{"state":{"dark":true},"version":0}}"#).unwrap();

        let storage = CartStorage::new(&path);
        let mut store = CartStore::with_storage("s1", MemoryBackend::default(), storage.clone())
            .await
            .unwrap();
        store.add_item(Uuid::new_v4(), "Kept", 700, 3, None).await.unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"]["state"]["dark"], true);
        assert_eq!(raw[CART_STORAGE_KEY]["version"], 0);
        assert_eq!(raw[CART_STORAGE_KEY]["state"]["items"][0]["quantity"], 3);

        let restored = CartStore::with_storage("s1", MemoryBackend::default(), storage)
            .await
            .unwrap();
        assert_eq!(restored.items(), store.items());
        assert_eq!(restored.total_cents(), Some(2100));
    }

    #[tokio::test]
    async fn missing_storage_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CartStorage::new(dir.path().join("nested").join("cart.json"));
        assert!(storage.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_stored_lines_do_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let brand = Uuid::new_v4();
        let stored = serde_json::json!({
            CART_STORAGE_KEY: {
                "state": {"items": [{
                    "id": null,
                    "brand_id": brand,
                    "brand_name": "Edited",
                    "quantity": i64::MAX,
                    "price_cents": 2,
                    "metadata": {}
                }]},
                "version": 0
            }
        });
        std::fs::write(&path, stored.to_string()).unwrap();

        let mut store =
            CartStore::with_storage("s1", MemoryBackend::failing("offline"), CartStorage::new(&path))
                .await
                .unwrap();
        assert_eq!(store.total_cents(), None);

        let _ = store.add_item(brand, "Edited", 2, 5, None).await;
        assert_eq!(store.item_count(), i64::MAX);
    }
}
