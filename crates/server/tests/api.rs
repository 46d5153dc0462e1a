use db::DBService;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use server::{DeploymentImpl, build_router, config::ServerConfig};
use services::services::{
    cart_store::{CartStore, CartStoreError, HttpCartBackend},
    payfast::{PayFastConfig, generate_signature},
};

struct TestApp {
    base: String,
    client: Client,
}

impl TestApp {
    async fn spawn(config: ServerConfig) -> Self {
        let db = DBService::new_in_memory().await.expect("in-memory db");
        let deployment = DeploymentImpl::with_db(db, config).expect("deployment");
        let app = build_router(deployment);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });

        Self {
            base: format!("http://{addr}"),
            client: Client::new(),
        }
    }

    async fn default() -> Self {
        Self::spawn(ServerConfig::default()).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self.client.get(self.url(path)).send().await.expect("get");
        let status = res.status();
        (status, res.json().await.expect("json body"))
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .request(method, self.url(path))
            .json(&body)
            .send()
            .await
            .expect("request");
        let status = res.status();
        (status, res.json().await.expect("json body"))
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, path, body).await
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        let res = self.client.delete(self.url(path)).send().await.expect("delete");
        let status = res.status();
        (status, res.json().await.expect("json body"))
    }

    async fn create_sector(&self, name: &str) -> String {
        let (status, body) = self
            .post("/api/sectors", json!({ "name": name, "emoji": "🌱" }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().expect("sector id").to_string()
    }

    async fn create_brand(&self, sector_id: &str, name: &str) -> String {
        let (status, body) = self
            .post("/api/brands", json!({ "name": name, "sector_id": sector_id }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().expect("brand id").to_string()
    }
}

#[tokio::test]
async fn health_reports_database_ok() {
    let app = TestApp::default().await;
    for path in ["/health", "/api/health"] {
        let (status, body) = app.get(path).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["database"], "ok");
    }
}

#[tokio::test]
async fn sectors_and_brands_crud() {
    let app = TestApp::default().await;
    let sector_id = app.create_sector("Agriculture").await;
    let seedling = app.create_brand(&sector_id, "Seedling").await;
    let _harvest = app.create_brand(&sector_id, "Harvest").await;

    let (status, body) = app
        .post(
            "/api/brands",
            json!({ "name": "Seedling Node", "sector_id": sector_id, "parent_id": seedling }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = app.get(&format!("/api/sectors/{sector_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Agriculture");
    assert_eq!(body["data"]["brand_count"], 2);
    assert_eq!(body["data"]["subnode_count"], 1);

    let (_, body) = app.get(&format!("/api/sectors/{sector_id}/brands")).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(3));

    let (_, body) = app.get("/api/brands?search=harv").await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .expect("brands")
        .iter()
        .filter_map(|b| b["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Harvest"]);

    let (status, body) = app
        .send(
            reqwest::Method::PUT,
            &format!("/api/brands/{seedling}"),
            json!({ "status": "inactive" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "inactive");

    let (_, body) = app.get("/api/brands?status=inactive").await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn brand_references_are_checked() {
    let app = TestApp::default().await;
    let missing = uuid::Uuid::new_v4();

    let (status, body) = app
        .post("/api/brands", json!({ "name": "Orphan", "sector_id": missing }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let sector_id = app.create_sector("Mining").await;
    let brand_id = app.create_brand(&sector_id, "Ore").await;
    let (status, _) = app
        .send(
            reqwest::Method::PUT,
            &format!("/api/brands/{brand_id}"),
            json!({ "parent_id": brand_id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn brand_parents_cannot_form_a_loop() {
    let app = TestApp::default().await;
    let sector_id = app.create_sector("Energy").await;
    let grid = app.create_brand(&sector_id, "Grid").await;
    let (_, body) = app
        .post(
            "/api/brands",
            json!({ "name": "Solar", "sector_id": sector_id, "parent_id": grid }),
        )
        .await;
    let solar = body["data"]["id"].as_str().expect("brand id").to_string();
    let (_, body) = app
        .post(
            "/api/brands",
            json!({ "name": "Panels", "sector_id": sector_id, "parent_id": solar }),
        )
        .await;
    let panels = body["data"]["id"].as_str().expect("brand id").to_string();

    for (brand, parent) in [(&grid, &solar), (&grid, &panels)] {
        let (status, body) = app
            .send(
                reqwest::Method::PUT,
                &format!("/api/brands/{brand}"),
                json!({ "parent_id": parent }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(body["error"].as_str().unwrap_or_default().contains("loop"));
    }

    let (_, body) = app.get(&format!("/api/brands/{grid}")).await;
    assert!(body["data"]["parent_id"].is_null());

    // Re-parenting within the tree without closing a loop is fine.
    let (status, body) = app
        .send(
            reqwest::Method::PUT,
            &format!("/api/brands/{panels}"),
            json!({ "parent_id": grid }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn sector_with_brands_cannot_be_deleted() {
    let app = TestApp::default().await;
    let sector_id = app.create_sector("Logistics").await;
    let brand_id = app.create_brand(&sector_id, "Routes").await;

    let (status, body) = app.delete(&format!("/api/sectors/{sector_id}")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap_or_default().contains("1 brands"));

    let (status, _) = app.delete(&format!("/api/brands/{brand_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.delete(&format!("/api/sectors/{sector_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/api/sectors/{sector_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cart_lines_merge_and_total() {
    let app = TestApp::default().await;
    let sector_id = app.create_sector("Retail").await;
    let brand_a = app.create_brand(&sector_id, "Basket").await;
    let brand_b = app.create_brand(&sector_id, "Crate").await;
    let cart = "/api/cart/session-abc";

    let (status, _) = app
        .post(
            &format!("{cart}/items"),
            json!({ "brand_id": brand_a, "price_cents": 1999 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, body) = app
        .post(
            &format!("{cart}/items"),
            json!({ "brand_id": brand_a, "quantity": 2, "price_cents": 1999 }),
        )
        .await;
    assert_eq!(body["data"]["quantity"], 3);
    let (_, body) = app
        .post(
            &format!("{cart}/items"),
            json!({ "brand_id": brand_b, "price_cents": 500 }),
        )
        .await;
    let line_b = body["data"]["id"].as_str().expect("line id").to_string();

    let (status, body) = app.get(cart).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["item_count"], 4);
    assert_eq!(body["data"]["total_cents"], 3 * 1999 + 500);
    assert_eq!(body["data"]["total"], "64.97");

    let (status, body) = app
        .send(
            reqwest::Method::PATCH,
            &format!("{cart}/items/{line_b}"),
            json!({ "quantity": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_null());

    let (status, body) = app.delete(cart).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["removed"], 1);

    let (_, body) = app.get(cart).await;
    assert_eq!(body["data"]["item_count"], 0);
}

#[tokio::test]
async fn cart_rejects_unknown_brand_and_bad_quantity() {
    let app = TestApp::default().await;
    let (status, body) = app
        .post(
            "/api/cart/s1/items",
            json!({ "brand_id": uuid::Uuid::new_v4(), "price_cents": 100 }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let sector_id = app.create_sector("Retail").await;
    let brand_id = app.create_brand(&sector_id, "Basket").await;
    let (status, _) = app
        .post(
            "/api/cart/s1/items",
            json!({ "brand_id": brand_id, "quantity": 0, "price_cents": 100 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cart_rejects_amounts_that_would_overflow_totals() {
    let app = TestApp::default().await;
    let sector_id = app.create_sector("Retail").await;
    let brand_id = app.create_brand(&sector_id, "Basket").await;

    let (status, body) = app
        .post(
            "/api/cart/s1/items",
            json!({ "brand_id": brand_id, "quantity": i64::MAX, "price_cents": 2 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = app
        .post(
            "/api/cart/s1/items",
            json!({ "brand_id": brand_id, "quantity": 1, "price_cents": i64::MAX }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(
            "/api/cart/s1/items",
            json!({ "brand_id": brand_id, "quantity": 10_000, "price_cents": 100 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let line = body["data"]["id"].as_str().expect("line id").to_string();

    let (status, _) = app
        .post(
            "/api/cart/s1/items",
            json!({ "brand_id": brand_id, "quantity": 1, "price_cents": 100 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .send(
            reqwest::Method::PATCH,
            &format!("/api/cart/s1/items/{line}"),
            json!({ "quantity": i64::MAX }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.get("/api/cart/s1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["item_count"], 10_000);
    assert_eq!(body["data"]["total_cents"], 1_000_000);
}

#[tokio::test]
async fn cart_store_round_trips_through_the_http_backend() {
    let app = TestApp::default().await;
    let sector_id = app.create_sector("Retail").await;
    let basket: uuid::Uuid = app.create_brand(&sector_id, "Basket").await.parse().expect("uuid");
    let crate_id: uuid::Uuid = app.create_brand(&sector_id, "Crate").await.parse().expect("uuid");

    let backend = HttpCartBackend::new(format!("{}/", app.base)).expect("backend");
    let mut store = CartStore::new("http session", backend);

    store.add_item(basket, "Local", 1250, 2, None).await.expect("add");
    store
        .add_item(crate_id, "Local", 300, 1, Some(json!({ "plan": "pro" })))
        .await
        .expect("add");
    assert_eq!(store.items().len(), 2);
    assert_eq!(store.items()[0].brand_name, "Basket");
    assert_eq!(store.items()[1].metadata["plan"], "pro");
    assert_eq!(store.total_cents(), Some(2 * 1250 + 300));

    let basket_line = store.items()[0].id.expect("server id");
    store.update_quantity(basket_line, 5).await.expect("update");
    assert_eq!(store.item_count(), 6);

    // The server sees the same cart under the encoded session id.
    let (_, body) = app.get("/api/cart/http%20session").await;
    assert_eq!(body["data"]["item_count"], 6);
    assert_eq!(body["data"]["total_cents"], 5 * 1250 + 300);

    store.remove_item(basket_line).await.expect("remove");
    assert_eq!(store.items().len(), 1);

    let error = store
        .update_quantity(uuid::Uuid::new_v4(), 2)
        .await
        .expect_err("unknown line");
    assert!(matches!(error, CartStoreError::Api(_)));
    assert_eq!(store.state().error.as_deref(), Some("cart item not found"));

    store.clear_cart().await.expect("clear");
    assert!(store.items().is_empty());
    let (_, body) = app.get("/api/cart/http%20session").await;
    assert_eq!(body["data"]["item_count"], 0);
}

#[tokio::test]
async fn legal_document_lifecycle() {
    let app = TestApp::default().await;
    let (status, body) = app
        .post(
            "/api/legal-documents",
            json!({ "document_type": "nda", "title": "Mutual NDA", "content": "Both parties agree." }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["status"], "draft");
    let id = body["data"]["id"].as_str().expect("doc id").to_string();

    let (_, body) = app.get(&format!("/api/legal-documents/{id}/verify")).await;
    assert_eq!(body["data"]["hash_matches"], true);
    assert!(body["data"]["signature_valid"].is_null());

    let (status, body) = app
        .post(
            &format!("/api/legal-documents/{id}/sign"),
            json!({ "signer_name": "Thandi", "signer_email": "Thandi@Example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "signed");
    assert_eq!(body["data"]["signer_email"], "thandi@example.com");

    let (_, body) = app.get(&format!("/api/legal-documents/{id}/verify")).await;
    assert_eq!(body["data"]["signature_valid"], true);

    let (status, _) = app
        .post(
            &format!("/api/legal-documents/{id}/sign"),
            json!({ "signer_name": "Again", "signer_email": "again@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .post(&format!("/api/legal-documents/{id}/revoke"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "revoked");
    let (status, _) = app
        .post(&format!("/api/legal-documents/{id}/revoke"), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = app.get("/api/legal-documents?document_type=terms").await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
    let (_, body) = app.get("/api/legal-documents?document_type=nda").await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn admin_stats_summarise_the_catalogue() {
    let app = TestApp::default().await;
    let sector_id = app.create_sector("Energy").await;
    let brand_id = app.create_brand(&sector_id, "Solar").await;
    app.create_brand(&sector_id, "Wind").await;
    app.post(
        "/api/cart/stats-session/items",
        json!({ "brand_id": brand_id, "price_cents": 250 }),
    )
    .await;

    let (status, body) = app.get("/api/admin/stats").await;
    assert_eq!(status, StatusCode::OK);
    let stats = &body["data"];
    assert_eq!(stats["total_sectors"], 1);
    assert_eq!(stats["total_brands"], 2);
    assert_eq!(stats["brands_by_status"]["active"], 2);
    assert_eq!(stats["cart_items"], 1);
    assert_eq!(stats["active_carts"], 1);
    assert_eq!(stats["revenue_cents"], 0);
    assert_eq!(stats["sectors"][0]["brand_count"], 2);
}

#[tokio::test]
async fn payments_are_unavailable_without_provider_config() {
    let app = TestApp::default().await;
    let (status, body) = app
        .post("/api/payments/paypal/orders", json!({ "session_id": "s1" }))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);

    let (status, _) = app
        .post("/api/payments/payfast/checkout", json!({ "session_id": "s1" }))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

fn payfast_config() -> ServerConfig {
    ServerConfig {
        payfast: Some(PayFastConfig {
            merchant_id: "10000100".to_string(),
            merchant_key: "46f0cd694581a".to_string(),
            passphrase: Some("jt7NOE43FZPn".to_string()),
            sandbox: true,
            return_url: None,
            cancel_url: None,
            notify_url: Some("https://fruitful.example/api/payments/payfast/notify".to_string()),
            validate_with_server: false,
        }),
        ..ServerConfig::default()
    }
}

#[tokio::test]
async fn payfast_checkout_and_itn_settle_the_payment() {
    let app = TestApp::spawn(payfast_config()).await;
    let sector_id = app.create_sector("Retail").await;
    let brand_id = app.create_brand(&sector_id, "Basket").await;
    app.post(
        "/api/cart/pf-session/items",
        json!({ "brand_id": brand_id, "quantity": 2, "price_cents": 5000 }),
    )
    .await;

    let (status, _) = app
        .post("/api/payments/payfast/checkout", json!({ "session_id": "empty" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(
            "/api/payments/payfast/checkout",
            json!({ "session_id": "pf-session", "buyer": { "email_address": "buyer@example.com" } }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let payment = &body["data"]["payment"];
    assert_eq!(payment["status"], "pending");
    assert_eq!(payment["currency"], "ZAR");
    assert_eq!(payment["amount_cents"], 10000);
    let payment_id = payment["id"].as_str().expect("payment id").to_string();
    let m_payment_id = payment["external_reference"]
        .as_str()
        .expect("reference")
        .to_string();
    assert!(
        body["data"]["form"]["action_url"]
            .as_str()
            .unwrap_or_default()
            .contains("sandbox.payfast.co.za")
    );

    let mut fields: Vec<(String, String)> = vec![
        ("m_payment_id".to_string(), m_payment_id.clone()),
        ("pf_payment_id".to_string(), "1089250".to_string()),
        ("payment_status".to_string(), "COMPLETE".to_string()),
        ("item_name".to_string(), "Seedwave order".to_string()),
        ("amount_gross".to_string(), "100.00".to_string()),
    ];
    let signature = generate_signature(&fields, Some("jt7NOE43FZPn"));

    let mut forged = fields.clone();
    forged.push(("signature".to_string(), "0".repeat(32)));
    let res = app
        .client
        .post(app.url("/api/payments/payfast/notify"))
        .form(&forged)
        .send()
        .await
        .expect("notify");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    fields.push(("signature".to_string(), signature));
    let res = app
        .client
        .post(app.url("/api/payments/payfast/notify"))
        .form(&fields)
        .send()
        .await
        .expect("notify");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.expect("body"), "OK");

    let (_, body) = app.get(&format!("/api/payments/{payment_id}")).await;
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["provider_reference"], "1089250");

    // A completed payment empties the cart; replays are acknowledged.
    let (_, body) = app.get("/api/cart/pf-session").await;
    assert_eq!(body["data"]["item_count"], 0);
    let res = app
        .client
        .post(app.url("/api/payments/payfast/notify"))
        .form(&fields)
        .send()
        .await
        .expect("notify");
    assert_eq!(res.status(), StatusCode::OK);

    let metrics = app
        .client
        .get(app.url("/metrics"))
        .send()
        .await
        .expect("metrics")
        .text()
        .await
        .expect("metrics body");
    assert!(metrics.contains("payment_notifications_total{outcome=\"accepted\",provider=\"payfast\"} 2"));
    assert!(metrics.contains("payment_notifications_total{outcome=\"rejected\",provider=\"payfast\"} 1"));
}

#[tokio::test]
async fn metrics_use_route_templates() {
    let app = TestApp::default().await;
    let sector_id = app.create_sector("Health").await;
    app.get(&format!("/api/sectors/{sector_id}")).await;

    let res = app
        .client
        .get(app.url("/metrics"))
        .send()
        .await
        .expect("metrics");
    assert_eq!(res.status(), StatusCode::OK);
    let content_type = res
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
    let body = res.text().await.expect("body");
    assert!(body.contains(
        "http_requests_total{method=\"GET\",route=\"/api/sectors/{sector_id}\",status=\"200\"} 1"
    ));
    assert!(!body.contains(&sector_id));
}

#[tokio::test]
async fn errors_use_the_json_envelope() {
    let app = TestApp::default().await;

    let (status, body) = app.get("/api/sectors/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());

    let (status, body) = app.get("/api/nothing-here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let res = app
        .client
        .post(app.url("/api/sectors"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("post");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.expect("json");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn unknown_paths_serve_the_spa_shell() {
    let app = TestApp::default().await;
    let res = app
        .client
        .get(app.url("/sectors/agriculture"))
        .send()
        .await
        .expect("get");
    assert_eq!(res.status(), StatusCode::OK);
    let content_type = res
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/html"));
}
