//! Outbound Bot API calls.

use async_trait::async_trait;
use relaybot_core::ConversationId;
use relaybot_dispatch::{SettingsMenu, Transport, TransportError};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, instrument};

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &str) -> Result<T, TransportError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(TransportError::Api {
                method: method.to_string(),
                description: "response carried no result".to_string(),
            }),
            (false, _) => Err(TransportError::Api {
                method: method.to_string(),
                description: self
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct File {
    #[serde(default)]
    file_path: Option<String>,
}

/// Inline keyboard markup for a settings menu.
fn inline_keyboard(menu: &SettingsMenu) -> JsonValue {
    let rows: Vec<Vec<JsonValue>> = menu
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| json!({"text": button.label, "callback_data": button.payload}))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// [`Transport`] backed by the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramTransport {
    http: Client,
    method_base: String,
    file_base: String,
}

impl std::fmt::Debug for TelegramTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The bases embed the bot token.
        f.debug_struct("TelegramTransport").finish_non_exhaustive()
    }
}

impl TelegramTransport {
    /// Creates a transport for `token` against the API rooted at `api_url`.
    #[must_use]
    pub fn new(http: Client, api_url: &str, token: &str) -> Self {
        let root = api_url.trim_end_matches('/');
        Self {
            http,
            method_base: format!("{root}/bot{token}"),
            file_base: format!("{root}/file/bot{token}"),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &JsonValue,
    ) -> Result<T, TransportError> {
        let request = self
            .http
            .post(format!("{}/{method}", self.method_base))
            .json(body);
        self.send(method, request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TransportError> {
        let failed = |message: String| TransportError::RequestFailed {
            method: method.to_string(),
            message,
        };
        let response = request.send().await.map_err(|e| failed(e.to_string()))?;
        // Error statuses still carry the JSON envelope with a description.
        let envelope: ApiResponse<T> = response.json().await.map_err(|e| failed(e.to_string()))?;
        envelope.into_result(method)
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    #[instrument(skip(self, text), fields(chars = text.len()))]
    async fn send_text(&self, to: &ConversationId, text: &str) -> Result<(), TransportError> {
        self.call::<JsonValue>("sendMessage", &json!({"chat_id": to.as_str(), "text": text}))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, audio), fields(bytes = audio.len()))]
    async fn send_voice(&self, to: &ConversationId, audio: Vec<u8>) -> Result<(), TransportError> {
        let part = Part::bytes(audio)
            .file_name("reply.mp3")
            .mime_str("audio/mpeg")
            .map_err(|e| TransportError::RequestFailed {
                method: "sendVoice".to_string(),
                message: e.to_string(),
            })?;
        let form = Form::new()
            .text("chat_id", to.to_string())
            .part("voice", part);
        let request = self
            .http
            .post(format!("{}/sendVoice", self.method_base))
            .multipart(form);
        self.send::<JsonValue>("sendVoice", request).await?;
        Ok(())
    }

    #[instrument(skip(self, text, menu))]
    async fn send_settings_menu(
        &self,
        to: &ConversationId,
        text: &str,
        menu: &SettingsMenu,
    ) -> Result<(), TransportError> {
        let body = json!({
            "chat_id": to.as_str(),
            "text": text,
            "reply_markup": inline_keyboard(menu),
        });
        self.call::<JsonValue>("sendMessage", &body).await?;
        Ok(())
    }

    async fn typing(&self, to: &ConversationId) -> Result<(), TransportError> {
        self.call::<bool>(
            "sendChatAction",
            &json!({"chat_id": to.as_str(), "action": "typing"}),
        )
        .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError> {
        self.call::<bool>(
            "answerCallbackQuery",
            &json!({"callback_query_id": callback_id}),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn download(&self, file_id: &str) -> Result<Vec<u8>, TransportError> {
        let download_failed = |message: String| TransportError::DownloadFailed {
            file_id: file_id.to_string(),
            message,
        };

        let file: File = self
            .call("getFile", &json!({"file_id": file_id}))
            .await
            .map_err(|e| download_failed(e.to_string()))?;
        let path = file
            .file_path
            .ok_or_else(|| download_failed("file is not available for download".to_string()))?;

        let response = self
            .http
            .get(format!("{}/{path}", self.file_base))
            .send()
            .await
            .map_err(|e| download_failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(download_failed(format!("HTTP {}", response.status().as_u16())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_failed(e.to_string()))?;

        debug!(bytes = bytes.len(), "downloaded attachment");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};
    use axum::Json;
    use std::sync::{Arc, Mutex};

    type Calls = Arc<Mutex<Vec<JsonValue>>>;

    /// Serves a fake Bot API for token `TEST` and returns its root URL.
    async fn fake_api(calls: Calls) -> String {
        let send_message = {
            let calls = calls.clone();
            move |Json(body): Json<JsonValue>| {
                let calls = calls.clone();
                async move {
                    calls.lock().unwrap().push(body);
                    Json(json!({"ok": true, "result": {"message_id": 1}}))
                }
            }
        };
        let app = axum::Router::new()
            .route("/botTEST/sendMessage", post(send_message))
            .route(
                "/botTEST/sendChatAction",
                post(|| async {
                    Json(json!({"ok": false, "error_code": 400, "description": "Bad Request: chat not found"}))
                }),
            )
            .route(
                "/botTEST/getFile",
                post(|| async {
                    Json(json!({"ok": true, "result": {"file_id": "f1", "file_path": "voice/file_1.oga"}}))
                }),
            )
            .route(
                "/file/botTEST/voice/file_1.oga",
                get(|| async { vec![1u8, 2, 3] }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[test]
    fn keyboard_mirrors_menu_rows() {
        let markup = inline_keyboard(&SettingsMenu::standard());
        let rows = markup["inline_keyboard"].as_array().unwrap();

        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].as_array().unwrap().len(), 2);
        assert!(
            rows[0][0]["callback_data"]
                .as_str()
                .unwrap()
                .starts_with("/setting_")
        );
    }

    #[test]
    fn failed_envelope_surfaces_description() {
        let envelope: ApiResponse<bool> =
            serde_json::from_str(r#"{"ok": false, "description": "Forbidden: bot was blocked"}"#)
                .unwrap();

        assert_eq!(
            envelope.into_result("sendMessage"),
            Err(TransportError::Api {
                method: "sendMessage".to_string(),
                description: "Forbidden: bot was blocked".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn send_text_posts_chat_and_text() {
        let calls: Calls = Arc::default();
        let root = fake_api(calls.clone()).await;
        let transport = TelegramTransport::new(Client::new(), &root, "TEST");

        transport
            .send_text(&ConversationId::new("42"), "hi there")
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["chat_id"], "42");
        assert_eq!(calls[0]["text"], "hi there");
    }

    #[tokio::test]
    async fn api_errors_map_to_transport_errors() {
        let root = fake_api(Arc::default()).await;
        let transport = TelegramTransport::new(Client::new(), &root, "TEST");

        let err = transport
            .typing(&ConversationId::new("42"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransportError::Api { ref method, ref description }
                if method == "sendChatAction" && description.contains("chat not found")
        ));
    }

    #[tokio::test]
    async fn download_resolves_file_path() {
        let root = fake_api(Arc::default()).await;
        let transport = TelegramTransport::new(Client::new(), &root, "TEST");

        let bytes = transport.download("f1").await.unwrap();

        assert_eq!(bytes, vec![1, 2, 3]);
    }
}
