use std::sync::Arc;

use bizdesk_api::app::{build_app_with, services::AppServices};
use bizdesk_auth::{JwtClaims, PrincipalId, Role};
use bizdesk_core::TenantId;
use bizdesk_infra::external::{CompanyProfile, InMemoryOutbox};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

const SECRET: &str = "black-box-secret";

struct TestServer {
    base_url: String,
    outbox: Arc<InMemoryOutbox>,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over in-memory services, on an ephemeral port.
        let (services, outbox) = AppServices::in_memory(CompanyProfile {
            name: "Bizdesk Test".to_string(),
            ..CompanyProfile::default()
        });
        let app = build_app_with(Arc::new(services), SECRET);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            outbox,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn put(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn delete(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    /// POST that must succeed; returns the JSON body.
    async fn ok(&self, token: &str, path: &str, body: Value) -> Value {
        let res = self.post(token, path, body).await;
        let status = res.status();
        let body: Value = res.json().await.unwrap();
        assert!(status.is_success(), "POST {path} -> {status}: {body}");
        body
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(tenant_id: TenantId, roles: &[&'static str]) -> String {
    mint_jwt_for(PrincipalId::new(), tenant_id, roles)
}

fn mint_jwt_for(sub: PrincipalId, tenant_id: TenantId, roles: &[&'static str]) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub,
        tenant_id,
        roles: roles.iter().map(|r| Role::new(*r)).collect(),
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn customer(server: &TestServer, token: &str, name: &str) -> String {
    let body = server
        .ok(
            token,
            "/customers",
            json!({ "name": name, "contact": { "email": "billing@acme.test" } }),
        )
        .await;
    body["id"].as_str().unwrap().to_string()
}

async fn catalog_item(server: &TestServer, token: &str, sku: &str, track_inventory: bool) -> String {
    let body = server
        .ok(
            token,
            "/catalog",
            json!({
                "sku": sku,
                "name": format!("Item {sku}"),
                "unit": "h",
                "unit_price": 10000,
                "cost_price": 4000,
                "tax_rate_bps": 2000,
                "track_inventory": track_inventory,
            }),
        )
        .await;
    body["id"].as_str().unwrap().to_string()
}

async fn draft_quote(server: &TestServer, token: &str, customer_id: &str, item_id: &str) -> Value {
    let valid_until = (Utc::now() + ChronoDuration::days(30)).date_naive();
    server
        .ok(
            token,
            "/quotes",
            json!({
                "customer_id": customer_id,
                "currency": "EUR",
                "valid_until": valid_until,
                "lines": [
                    { "catalog_item_id": item_id, "quantity": "1.5" },
                    { "description": "Setup", "quantity": 1, "unit_price": 5000 },
                ],
            }),
        )
        .await
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::spawn().await;
    let res = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn browser_preflight_is_answered_without_a_token() {
    let server = TestServer::spawn().await;

    let res = server
        .client
        .request(reqwest::Method::OPTIONS, server.url("/quotes"))
        .header("origin", "https://app.example.test")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "authorization,content-type")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    let methods = res.headers()["access-control-allow-methods"].to_str().unwrap();
    assert!(methods.contains("POST") && methods.contains("DELETE"));

    // Simple requests carry the header too, even when rejected.
    let res = server
        .client
        .get(server.url("/quotes"))
        .header("origin", "https://app.example.test")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let server = TestServer::spawn().await;

    let res = server.client.get(server.url("/quotes")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");
    assert!(body["message"].is_string());

    let res = server.get("not-a-jwt", "/quotes").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whoami_reports_tenant_and_permissions() {
    let server = TestServer::spawn().await;
    let tenant = TenantId::new();
    let token = mint_jwt(tenant, &["staff"]);

    let body: Value = server.get(&token, "/whoami").await.json().await.unwrap();
    assert_eq!(body["tenant_id"], tenant.to_string());
    assert_eq!(body["roles"], json!(["staff"]));
    assert!(body["permissions"].as_array().unwrap().contains(&json!("timesheets.log")));
}

#[tokio::test]
async fn viewers_cannot_write() {
    let server = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), &["viewer"]);

    let res = server.post(&token, "/customers", json!({ "name": "Acme Ltd" })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    let res = server.get(&token, "/customers").await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn quote_converts_to_a_numbered_invoice() {
    let server = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), &["manager"]);

    let customer_id = customer(&server, &token, "Acme Ltd").await;
    let item_id = catalog_item(&server, &token, "CONSULT", false).await;
    let quote = draft_quote(&server, &token, &customer_id, &item_id).await;
    let quote_id = quote["id"].as_str().unwrap();

    assert_eq!(quote["number"], "QUO-00001");
    assert_eq!(quote["status"], "draft");
    // 1.5 x 100.00 + 20% tax, plus 50.00 untaxed.
    assert_eq!(quote["totals"]["total"], 23000);
    assert_eq!(quote["lines"][0]["quantity"], 1.5);

    // Drafts cannot be converted.
    let res = server.post(&token, &format!("/quotes/{quote_id}/convert"), json!({})).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    server.ok(&token, &format!("/quotes/{quote_id}/send"), json!({})).await;
    let converted = server
        .ok(&token, &format!("/quotes/{quote_id}/convert"), json!({}))
        .await;
    assert_eq!(converted["quote"]["status"], "converted");
    assert_eq!(converted["invoice"]["number"], "INV-00001");
    assert_eq!(converted["invoice"]["totals"]["total"], 23000);
    assert_eq!(converted["invoice"]["source"]["quote_number"], "QUO-00001");
    let invoice_id = converted["invoice"]["id"].as_str().unwrap();

    // A quote converts at most once.
    let res = server.post(&token, &format!("/quotes/{quote_id}/convert"), json!({})).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let invoices: Value = server.get(&token, "/invoices").await.json().await.unwrap();
    assert_eq!(invoices["items"].as_array().unwrap().len(), 1);

    let paid = server
        .ok(
            &token,
            &format!("/invoices/{invoice_id}/payments"),
            json!({ "amount": 23000, "method": "card" }),
        )
        .await;
    assert_eq!(paid["status"], "paid");
    assert_eq!(paid["outstanding"], 0);

    let history: Value = server
        .get(&token, &format!("/quotes/{quote_id}/history"))
        .await
        .json()
        .await
        .unwrap();
    let types: Vec<_> = history["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_type"].as_str().unwrap().to_string())
        .collect();
    assert!(types.last().unwrap().contains("converted"), "{types:?}");
}

#[tokio::test]
async fn tenants_cannot_see_each_other() {
    let server = TestServer::spawn().await;
    let a = mint_jwt(TenantId::new(), &["admin"]);
    let b = mint_jwt(TenantId::new(), &["admin"]);

    let customer_id = customer(&server, &a, "Acme Ltd").await;
    let item_id = catalog_item(&server, &a, "CONSULT", false).await;
    let quote = draft_quote(&server, &a, &customer_id, &item_id).await;
    let quote_id = quote["id"].as_str().unwrap();

    let res = server.get(&b, &format!("/quotes/{quote_id}")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");

    let res = server.get(&b, &format!("/customers/{customer_id}")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // Tenant B numbers its own documents from 1.
    let b_customer = customer(&server, &b, "Globex").await;
    let b_item = catalog_item(&server, &b, "CONSULT", false).await;
    let b_quote = draft_quote(&server, &b, &b_customer, &b_item).await;
    assert_eq!(b_quote["number"], "QUO-00001");
}

#[tokio::test]
async fn malformed_requests_get_json_errors() {
    let server = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), &["admin"]);

    let res = server.get(&token, "/quotes/not-a-uuid").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_id");

    let res = server
        .post(&token, "/customers", json!({ "name": "" }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn documents_render_and_email() {
    let server = TestServer::spawn().await;
    let tenant = TenantId::new();
    let token = mint_jwt(tenant, &["admin"]);

    let customer_id = customer(&server, &token, "Acme Ltd").await;
    let item_id = catalog_item(&server, &token, "CONSULT", false).await;
    let quote = draft_quote(&server, &token, &customer_id, &item_id).await;
    let quote_id = quote["id"].as_str().unwrap();

    let res = server.get(&token, &format!("/quotes/{quote_id}/pdf")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/pdf");
    let bytes = res.bytes().await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));

    let emailed = server
        .ok(
            &token,
            &format!("/quotes/{quote_id}/email"),
            json!({ "message": "Please find our quote attached." }),
        )
        .await;
    assert_eq!(emailed["email"]["to"], "billing@acme.test");
    assert_eq!(emailed["quote"]["status"], "sent");

    let sent = server.outbox.sent(tenant);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].attachments.len(), 1);
    assert!(sent[0].text_body.starts_with("Please find our quote attached."));
}

#[tokio::test]
async fn numbering_is_configurable_by_admins_only() {
    let server = TestServer::spawn().await;
    let tenant = TenantId::new();
    let admin = mint_jwt(tenant, &["admin"]);
    let manager = mint_jwt(tenant, &["manager"]);

    let settings = json!({ "prefix": "F-", "padding": 3, "next_value": 10 });
    let res = server.put(&manager, "/settings/numbering/invoice", settings.clone()).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = server.put(&admin, "/settings/numbering/invoice", settings).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["next_number"], "F-010");

    let res = server.get(&admin, "/settings/numbering/bogus").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let customer_id = customer(&server, &admin, "Acme Ltd").await;
    let invoice = server
        .ok(
            &admin,
            "/invoices",
            json!({
                "customer_id": customer_id,
                "currency": "EUR",
                "lines": [{ "description": "Support", "quantity": 2, "unit_price": 2500 }],
            }),
        )
        .await;
    assert_eq!(invoice["number"], "F-010");

    // Cannot move backwards.
    let res = server
        .put(
            &admin,
            "/settings/numbering/invoice",
            json!({ "prefix": "F-", "padding": 3, "next_value": 1 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn approved_time_is_invoiced_once() {
    let server = TestServer::spawn().await;
    let tenant = TenantId::new();
    let manager = mint_jwt(tenant, &["manager"]);
    let alice = mint_jwt_for(PrincipalId::new(), tenant, &["staff"]);
    let bob = mint_jwt_for(PrincipalId::new(), tenant, &["staff"]);

    let customer_id = customer(&server, &manager, "Acme Ltd").await;
    let project = server
        .ok(
            &manager,
            "/projects",
            json!({ "customer_id": customer_id, "code": "ACME-1", "name": "Rollout", "hourly_rate": 8000 }),
        )
        .await;
    let project_id = project["id"].as_str().unwrap();

    let today = Utc::now().date_naive();
    let entry = server
        .ok(
            &alice,
            "/timesheets",
            json!({ "project_id": project_id, "work_date": today, "minutes": 90, "description": "Workshop" }),
        )
        .await;
    let entry_id = entry["id"].as_str().unwrap();
    assert_eq!(entry["status"], "logged");

    // Staff see only their own entries and cannot approve.
    let theirs: Value = server.get(&bob, "/timesheets").await.json().await.unwrap();
    assert!(theirs["items"].as_array().unwrap().is_empty());
    let res = server.post(&alice, &format!("/timesheets/{entry_id}/approve"), json!({})).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    server
        .ok(&manager, &format!("/timesheets/{entry_id}/approve"), json!({}))
        .await;
    let bill = json!({ "project_id": project_id, "entry_ids": [entry_id], "currency": "EUR" });
    let invoice = server.ok(&manager, "/timesheets/bill", bill.clone()).await;
    assert_eq!(invoice["totals"]["total"], 12000);

    let res = server.post(&manager, "/timesheets/bill", bill).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let summary: Value = server
        .get(&manager, &format!("/projects/{project_id}/summary"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(summary["minutes_logged"], 90);
    assert_eq!(summary["unbilled_value"], 0);
    assert_eq!(summary["invoiced"], 12000);
}

#[tokio::test]
async fn receiving_goods_books_stock() {
    let server = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), &["manager"]);

    let supplier = server
        .ok(&token, "/suppliers", json!({ "name": "Parts Inc" }))
        .await;
    let supplier_id = supplier["id"].as_str().unwrap();
    let item_id = catalog_item(&server, &token, "BOLT-M8", true).await;

    // Suppliers are not customers.
    let res = server.get(&token, &format!("/customers/{supplier_id}")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let order = server
        .ok(
            &token,
            "/purchase-orders",
            json!({
                "supplier_id": supplier_id,
                "currency": "EUR",
                "lines": [{ "catalog_item_id": item_id, "quantity": 100 }],
            }),
        )
        .await;
    let order_id = order["id"].as_str().unwrap();
    assert_eq!(order["number"], "PO-00001");
    assert_eq!(order["lines"][0]["unit_cost"], 4000);

    server.ok(&token, &format!("/purchase-orders/{order_id}/approve"), json!({})).await;
    server.ok(&token, &format!("/purchase-orders/{order_id}/send"), json!({})).await;
    let received = server
        .ok(
            &token,
            &format!("/purchase-orders/{order_id}/receive"),
            json!({ "receipts": [{ "line_no": 1, "quantity": 60 }] }),
        )
        .await;
    assert_eq!(received["order"]["status"], "partially_received");

    let stock: Value = server
        .get(&token, &format!("/inventory/{item_id}"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(stock["on_hand"], 60.0);

    let res = server
        .post(
            &token,
            &format!("/inventory/{item_id}/adjust"),
            json!({ "delta": -61, "reason": "issue" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = server.get(&token, &format!("/purchase-orders/{order_id}/pdf")).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn draft_lines_are_editable_until_sent() {
    let server = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), &["manager"]);

    let customer_id = customer(&server, &token, "Acme Ltd").await;
    let item_id = catalog_item(&server, &token, "CONSULT", false).await;
    let quote = draft_quote(&server, &token, &customer_id, &item_id).await;
    let quote_id = quote["id"].as_str().unwrap();

    let quote = server
        .ok(
            &token,
            &format!("/quotes/{quote_id}/lines"),
            json!({ "lines": [{ "catalog_item_id": item_id, "quantity": 1 }] }),
        )
        .await;
    assert_eq!(quote["lines"].as_array().unwrap().len(), 3);
    assert_eq!(quote["lines"][2]["line_no"], 3);
    assert_eq!(quote["totals"]["total"], 35000);

    let res = server.delete(&token, &format!("/quotes/{quote_id}/lines/2")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let quote: Value = res.json().await.unwrap();
    assert_eq!(quote["lines"].as_array().unwrap().len(), 2);
    assert_eq!(quote["totals"]["total"], 30000);

    let res = server.delete(&token, &format!("/quotes/{quote_id}/lines/9")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    server.ok(&token, &format!("/quotes/{quote_id}/send"), json!({})).await;
    let res = server
        .post(
            &token,
            &format!("/quotes/{quote_id}/lines"),
            json!({ "lines": [{ "description": "Extra", "quantity": 1, "unit_price": 100 }] }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let res = server.delete(&token, &format!("/quotes/{quote_id}/lines/1")).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let stored: Value = server
        .get(&token, &format!("/quotes/{quote_id}"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(stored["lines"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn purchase_lines_are_editable_until_approved() {
    let server = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), &["manager"]);

    let supplier = server
        .ok(&token, "/suppliers", json!({ "name": "Parts Inc" }))
        .await;
    let supplier_id = supplier["id"].as_str().unwrap();
    let bolts = catalog_item(&server, &token, "BOLT-M8", true).await;
    let nuts = catalog_item(&server, &token, "NUT-M8", true).await;

    let order = server
        .ok(
            &token,
            "/purchase-orders",
            json!({
                "supplier_id": supplier_id,
                "currency": "EUR",
                "lines": [{ "catalog_item_id": bolts, "quantity": 100 }],
            }),
        )
        .await;
    let order_id = order["id"].as_str().unwrap();

    let order = server
        .ok(
            &token,
            &format!("/purchase-orders/{order_id}/lines"),
            json!({ "lines": [{ "catalog_item_id": nuts, "quantity": 50 }] }),
        )
        .await;
    assert_eq!(order["lines"].as_array().unwrap().len(), 2);
    assert_eq!(order["lines"][1]["line_no"], 2);

    server.ok(&token, &format!("/purchase-orders/{order_id}/approve"), json!({})).await;
    let res = server
        .post(
            &token,
            &format!("/purchase-orders/{order_id}/lines"),
            json!({ "lines": [{ "catalog_item_id": nuts, "quantity": 5 }] }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
