//! Integration tests for the Theme Studio backend.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::theme::ThemeCatalog;
use crate::{create_router, AppState};

const API_KEY: &str = "test-api-key";
const EDITOR_ORIGIN: &str = "http://localhost:3000";

type PreviewSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn test_config(psk: Option<String>, db_path: PathBuf) -> Config {
    Config {
        api_psk: psk,
        db_path,
        themes_dir: None,
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        log_level: "warn".to_string(),
        editor_origin: EDITOR_ORIGIN.to_string(),
        preview_ready_timeout: Duration::from_millis(100),
    }
}

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_psk(Some(API_KEY.to_string())).await
    }

    async fn with_psk(psk: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));
        let themes = Arc::new(ThemeCatalog::builtin().expect("Failed to load themes"));

        let state = AppState::new(repo, themes, test_config(psk.clone(), db_path));
        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn put(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self.client.put(self.url(path)).json(&body).send().await.unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn delete(&self, path: &str) -> (u16, Value) {
        let resp = self.client.delete(self.url(path)).send().await.unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    /// Open a preview socket for `subdomain`, presenting `origin`.
    async fn open_preview(&self, subdomain: &str, origin: &str) -> PreviewSocket {
        let url = format!(
            "{}/api/stores/{}/preview/ws",
            self.base_url.replacen("http", "ws", 1),
            subdomain
        );
        let mut request = url.into_client_request().unwrap();
        request
            .headers_mut()
            .insert("x-api-key", API_KEY.parse().unwrap());
        request.headers_mut().insert("origin", origin.parse().unwrap());

        let (socket, _response) = connect_async(request).await.expect("Failed to connect");
        // Let the server mount the socket on the store's bus
        tokio::time::sleep(Duration::from_millis(100)).await;
        socket
    }

    async fn create_store(&self, subdomain: &str, theme_id: &str) -> Value {
        let (status, body) = self
            .post(
                "/api/stores",
                json!({ "subdomain": subdomain, "name": "Test Store", "themeId": theme_id }),
            )
            .await;
        assert_eq!(status, 200, "{body}");
        body["data"].clone()
    }
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_psk() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .get(fixture.url("/api/themes"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_auth_invalid_psk() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .get(fixture.url("/api/themes"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = Client::new()
        .get(fixture.url("/api/themes"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_auth_disabled_without_psk() {
    let fixture = TestFixture::with_psk(None).await;
    let (status, body) = fixture.get("/api/themes").await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_themes_and_presets() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.get("/api/themes").await;
    assert_eq!(status, 200);
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["aurora", "minimal"]);

    let (status, body) = fixture.get("/api/themes/aurora").await;
    assert_eq!(status, 200);
    assert!(body["data"]["sections"]["hero"].is_object());

    let (status, body) = fixture
        .get("/api/themes/aurora/sections/header/presets")
        .await;
    assert_eq!(status, 200);
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"classic"));

    let (status, _) = fixture.get("/api/themes/nope").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_store_provisioning() {
    let fixture = TestFixture::new().await;

    let store = fixture.create_store("acme", "aurora").await;
    assert_eq!(store["subdomain"], "acme");

    let (status, body) = fixture
        .post(
            "/api/stores",
            json!({ "subdomain": "acme", "name": "Again", "themeId": "aurora" }),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, _) = fixture
        .post(
            "/api/stores",
            json!({ "subdomain": "Bad Name", "name": "X", "themeId": "aurora" }),
        )
        .await;
    assert_eq!(status, 422);

    let (status, _) = fixture
        .post(
            "/api/stores",
            json!({ "subdomain": "ghost", "name": "X", "themeId": "unknown" }),
        )
        .await;
    assert_eq!(status, 404);

    let (status, body) = fixture.get("/api/stores/acme").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["themeId"], "aurora");

    let (status, _) = fixture.get("/api/stores/missing").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_resolve_template() {
    let fixture = TestFixture::new().await;
    fixture.create_store("acme", "aurora").await;

    let (status, body) = fixture.get("/api/stores/acme/templates/homepage").await;
    assert_eq!(status, 200);
    let sections = body["data"].as_array().unwrap();
    assert_eq!(sections.len(), 5);
    assert_eq!(sections[0]["type"], "header");
    assert_eq!(sections[0]["title"], "Header");
    assert_eq!(sections[0]["enabled"], true);
    assert_eq!(sections[2]["title"], "Featured Collection");

    // Same ids on a second resolve.
    let (_, again) = fixture.get("/api/stores/acme/templates/homepage").await;
    assert_eq!(again["data"], body["data"]);

    let (status, body) = fixture.get("/api/stores/acme/templates/checkout").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_section_editing() {
    let fixture = TestFixture::new().await;
    fixture.create_store("acme", "aurora").await;
    let base = "/api/stores/acme/templates/homepage";

    let (_, body) = fixture.get(base).await;
    let hero_id = body["data"][1]["id"].as_str().unwrap().to_string();

    // Singleton
    let (status, _) = fixture
        .post(&format!("{base}/sections"), json!({ "sectionType": "footer" }))
        .await;
    assert_eq!(status, 409);

    // Invalid settings shape
    let (status, body) = fixture
        .post(
            &format!("{base}/sections"),
            json!({ "sectionType": "hero", "settings": { "style": { "minHeight": "tall" } } }),
        )
        .await;
    assert_eq!(status, 422);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    // Insert a testimonials section at position 1
    let (status, body) = fixture
        .post(
            &format!("{base}/sections"),
            json!({ "sectionType": "testimonials", "position": 1 }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["position"], 1);
    let testimonials_id = body["data"]["id"].as_str().unwrap().to_string();

    // Update the hero
    let (status, body) = fixture
        .put(
            &format!("{base}/sections/{hero_id}"),
            json!({ "settings": { "content": { "heading": "Summer" } }, "enabled": false }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["settings"]["content"]["heading"], "Summer");
    assert_eq!(body["data"]["enabled"], false);

    // Reorder
    let (status, body) = fixture
        .put(
            &format!("{base}/sections/order"),
            json!({ "sectionIds": [hero_id, testimonials_id] }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["id"], hero_id.as_str());
    assert_eq!(body["data"][1]["id"], testimonials_id.as_str());

    // Remove and check dense positions
    let (status, _) = fixture
        .delete(&format!("{base}/sections/{testimonials_id}"))
        .await;
    assert_eq!(status, 200);
    let (_, body) = fixture.get(base).await;
    let positions: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["position"].as_i64().unwrap())
        .collect();
    assert_eq!(positions, vec![0, 1, 2, 3, 4]);

    // Required sections stay
    let header_id = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["type"] == "header")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    let (status, _) = fixture.delete(&format!("{base}/sections/{header_id}")).await;
    assert_eq!(status, 422);

    let (status, _) = fixture.delete(&format!("{base}/sections/nope")).await;
    assert_eq!(status, 404);

    let (status, body) = fixture.get("/api/stores/acme/customizations").await;
    assert_eq!(status, 200);
    let ops: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["op"].as_str().unwrap())
        .collect();
    assert_eq!(ops.first(), Some(&"add"));
    assert_eq!(ops.last(), Some(&"remove"));
}

#[tokio::test]
async fn test_emptied_template_stays_empty() {
    let fixture = TestFixture::new().await;
    fixture.create_store("plain", "minimal").await;
    let base = "/api/stores/plain/templates/homepage";

    let (_, body) = fixture.get(base).await;
    for section in body["data"].as_array().unwrap() {
        let id = section["id"].as_str().unwrap();
        let (status, _) = fixture.delete(&format!("{base}/sections/{id}")).await;
        assert_eq!(status, 200);
    }

    let (status, body) = fixture.get(base).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_block_editing() {
    let fixture = TestFixture::new().await;
    fixture.create_store("plain", "minimal").await;
    let base = "/api/stores/plain/templates/page";

    let (status, body) = fixture.get(base).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"], json!([]));

    let (_, body) = fixture
        .post(&format!("{base}/sections"), json!({ "sectionType": "hero" }))
        .await;
    assert_eq!(body["data"]["type"], "hero");
    assert_eq!(body["data"]["position"], 0);
    assert_eq!(body["data"]["enabled"], true);
    let section = format!("{base}/sections/{}", body["data"]["id"].as_str().unwrap());

    let (status, body) = fixture
        .post(
            &format!("{section}/blocks"),
            json!({
                "block": {
                    "id": "row",
                    "type": "container",
                    "settings": {
                        "blocks": [
                            { "id": "row-text", "type": "text", "settings": { "text": "Hi" } },
                            { "id": "row-button", "type": "button" }
                        ]
                    }
                }
            }),
        )
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["data"]["blocks"][0]["settings"]["blocks"][1]["id"], "row-button");

    // Nested add inside the container
    let (status, _) = fixture
        .post(
            &format!("{section}/blocks"),
            json!({
                "block": { "id": "row-image", "type": "image" },
                "targetId": "row",
                "placement": "inside"
            }),
        )
        .await;
    assert_eq!(status, 200);

    // Nested update and delete
    let (status, body) = fixture
        .put(
            &format!("{section}/blocks/row-text"),
            json!({ "settings": { "text": "Hello" } }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(
        body["data"]["blocks"][0]["settings"]["blocks"][0]["settings"]["text"],
        "Hello"
    );
    let (status, body) = fixture.delete(&format!("{section}/blocks/row-image")).await;
    assert_eq!(status, 200);
    assert_eq!(
        body["data"]["blocks"][0]["settings"]["blocks"]
            .as_array()
            .unwrap()
            .len(),
        2
    );

    // Duplicate the container
    let (status, body) = fixture
        .post(&format!("{section}/blocks/row/duplicate"), json!({}))
        .await;
    assert_eq!(status, 200);
    let blocks = body["data"]["blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 2);
    let copy_id = blocks[1]["id"].as_str().unwrap().to_string();
    assert_ne!(copy_id, "row");
    for child in blocks[1]["settings"]["blocks"].as_array().unwrap() {
        assert!(!child["id"].as_str().unwrap().starts_with("row-"));
    }

    // Reorder top level
    let (status, body) = fixture
        .put(
            &format!("{section}/blocks/order"),
            json!({ "blockIds": [copy_id, "row"] }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["blocks"][0]["id"], copy_id.as_str());
    assert_eq!(body["data"]["blocks"][0]["position"], 0);
    assert_eq!(body["data"]["blocks"][1]["id"], "row");

    // Missing id on a new block
    let (status, _) = fixture
        .post(
            &format!("{section}/blocks"),
            json!({ "block": { "id": "", "type": "text" } }),
        )
        .await;
    assert_eq!(status, 422);
}

#[tokio::test]
async fn test_draft_and_publish() {
    let fixture = TestFixture::new().await;
    fixture.create_store("acme", "aurora").await;
    let base = "/api/stores/acme/templates/homepage";

    let (status, body) = fixture.get("/api/stores/acme/publish").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["hasChanges"], false);
    assert_eq!(body["data"]["isDraft"], false);

    let (_, body) = fixture.get(base).await;
    let rich_text_id = body["data"][3]["id"].as_str().unwrap().to_string();

    // Publish the untouched baseline.
    let (status, body) = fixture.post("/api/stores/acme/publish", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["savedFirst"], true);
    let (_, live) = fixture.get("/api/storefront/acme/homepage").await;
    assert_eq!(live["data"].as_array().unwrap().len(), 5);

    // Edit: hide the rich text section.
    fixture
        .put(
            &format!("{base}/sections/{rich_text_id}"),
            json!({ "enabled": false }),
        )
        .await;
    let (_, body) = fixture.get("/api/stores/acme/publish").await;
    assert_eq!(body["data"]["hasChanges"], true);
    assert_eq!(body["data"]["isDraft"], true);

    // The storefront still serves the published version.
    let (_, live) = fixture.get("/api/storefront/acme/homepage").await;
    assert_eq!(live["data"].as_array().unwrap().len(), 5);

    // Save, then publish without a second save.
    let (status, body) = fixture.post("/api/stores/acme/draft", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["hasChanges"], false);
    assert!(body["data"]["lastSavedAt"].is_string());

    let (_, body) = fixture.post("/api/stores/acme/publish", json!({})).await;
    assert_eq!(body["data"]["savedFirst"], false);
    assert_eq!(body["data"]["state"]["isDraft"], false);

    let (_, live) = fixture.get("/api/storefront/acme/homepage").await;
    let live = live["data"].as_array().unwrap();
    assert_eq!(live.len(), 4);
    assert!(live.iter().all(|s| s["id"] != rich_text_id.as_str()));
}

#[tokio::test]
async fn test_storefront_is_public() {
    let fixture = TestFixture::new().await;
    fixture.create_store("acme", "aurora").await;

    let resp = Client::new()
        .get(fixture.url("/api/storefront/acme/product"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(!body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_preview_message_requires_open_preview() {
    let fixture = TestFixture::new().await;
    fixture.create_store("acme", "aurora").await;

    let (status, _) = fixture
        .post(
            "/api/stores/acme/preview/messages",
            json!({ "type": "SCROLL_TO_SECTION", "payload": { "sectionId": "x" } }),
        )
        .await;
    assert_eq!(status, 404);

    let (status, _) = fixture
        .post(
            "/api/stores/acme/preview/messages",
            json!({ "type": "PREVIEW_READY" }),
        )
        .await;
    assert_eq!(status, 422);
}

fn preview_frame(message_type: &str) -> Message {
    Message::text(
        json!({
            "themeStudio": { "type": message_type, "payload": {}, "timestamp": 0, "source": "preview" }
        })
        .to_string(),
    )
}

/// Next bus frame from the socket, skipping control frames.
async fn next_frame(socket: &mut PreviewSocket) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("Timed out waiting for a frame")
            .expect("Socket closed")
            .expect("Socket error");
        if let Message::Text(_) = &message {
            let frame: Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
            return frame["themeStudio"].clone();
        }
    }
}

#[tokio::test]
async fn test_preview_socket_flushes_queued_edits() {
    let fixture = TestFixture::new().await;
    fixture.create_store("acme", "aurora").await;
    let base = "/api/stores/acme/templates/homepage";
    let (_, body) = fixture.get(base).await;
    let hero_id = body["data"][1]["id"].as_str().unwrap().to_string();

    let mut socket = fixture.open_preview("acme", EDITOR_ORIGIN).await;

    // Not ready yet: the edit is held back.
    let (status, _) = fixture
        .put(
            &format!("{base}/sections/{hero_id}"),
            json!({ "settings": { "content": { "heading": "Live" } } }),
        )
        .await;
    assert_eq!(status, 200);

    socket.send(preview_frame("PREVIEW_READY")).await.unwrap();

    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["type"], "SECTION_UPDATE");
    assert_eq!(frame["source"], "editor");
    assert_eq!(frame["payload"]["section"]["id"], hero_id.as_str());
    assert_eq!(
        frame["payload"]["section"]["settings"]["content"]["heading"],
        "Live"
    );

    // Ready now: editor messages go straight out.
    let (status, body) = fixture
        .post(
            "/api/stores/acme/preview/messages",
            json!({ "type": "SCROLL_TO_SECTION", "payload": { "sectionId": hero_id } }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["ready"], true);
    assert_eq!(body["data"]["outcome"], "sent");
    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["type"], "SCROLL_TO_SECTION");

    // Disconnecting releases the store's bus.
    socket.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let (status, _) = fixture
        .post(
            "/api/stores/acme/preview/messages",
            json!({ "type": "SCROLL_TO_SECTION", "payload": { "sectionId": hero_id } }),
        )
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_preview_socket_ignores_foreign_origin() {
    let fixture = TestFixture::new().await;
    fixture.create_store("acme", "aurora").await;

    let mut socket = fixture.open_preview("acme", "http://evil.example").await;
    socket.send(preview_frame("PREVIEW_READY")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (status, body) = fixture
        .post(
            "/api/stores/acme/preview/messages",
            json!({ "type": "TOGGLE_SELECTOR_MODE", "payload": { "enabled": true } }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["ready"], false);
    assert_eq!(body["data"]["outcome"], "queued");
}
