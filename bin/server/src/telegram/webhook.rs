//! Webhook endpoint Telegram posts updates to.

use crate::queue::EventQueue;
use crate::telegram::types::Update;
use axum::{Json, extract::State, http::HeaderMap, http::StatusCode};
use std::sync::Arc;
use tracing::{debug, warn};

/// Header carrying the secret set with `setWebhook`.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Shared state for the webhook route.
#[derive(Debug)]
pub struct WebhookState {
    queue: EventQueue,
    secret: Option<String>,
}

impl WebhookState {
    pub fn new(queue: EventQueue, secret: Option<String>) -> Self {
        Self { queue, secret }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        match &self.secret {
            None => true,
            Some(expected) => headers
                .get(SECRET_HEADER)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|given| given == expected),
        }
    }
}

/// Accepts one update and queues it.
///
/// Answers 200 as soon as the update is queued so Telegram does not redeliver
/// it while a slow provider call is in flight.
pub async fn receive(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> StatusCode {
    if !state.authorized(&headers) {
        warn!(update_id = update.update_id, "webhook secret mismatch");
        return StatusCode::UNAUTHORIZED;
    }

    let update_id = update.update_id;
    match update.into_event() {
        Some(event) => {
            debug!(update_id, event_id = %event.event_id, kind = event.kind.label(), "queued update");
            state.queue.enqueue(event);
        }
        None => debug!(update_id, "ignored update"),
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::EventHandler;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use relaybot_dispatch::{DispatchError, InboundEvent};
    use rootcause::Report;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Collect {
        events: Mutex<Vec<InboundEvent>>,
        arrived: Notify,
    }

    #[async_trait]
    impl EventHandler for Collect {
        async fn handle(&self, event: InboundEvent) -> Result<(), Report<DispatchError>> {
            self.events.lock().unwrap().push(event);
            self.arrived.notify_one();
            Ok(())
        }
    }

    fn text_update() -> Update {
        serde_json::from_str(
            r#"{
                "update_id": 1,
                "message": {
                    "message_id": 1,
                    "from": {"id": 42, "first_name": "Ada"},
                    "chat": {"id": 42, "type": "private"},
                    "text": "hello"
                }
            }"#,
        )
        .unwrap()
    }

    fn state(secret: Option<&str>) -> (Arc<WebhookState>, Arc<Collect>) {
        let collect = Arc::new(Collect::default());
        let queue = EventQueue::new(collect.clone());
        let state = Arc::new(WebhookState::new(queue, secret.map(str::to_string)));
        (state, collect)
    }

    #[tokio::test]
    async fn queues_update_without_secret() {
        let (state, collect) = state(None);

        let status = receive(State(state), HeaderMap::new(), Json(text_update())).await;

        assert_eq!(status, StatusCode::OK);
        collect.arrived.notified().await;
        assert_eq!(collect.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejects_wrong_secret() {
        let (state, collect) = state(Some("s3cret"));
        let mut headers = HeaderMap::new();
        headers.insert(SECRET_HEADER, HeaderValue::from_static("guess"));

        let status = receive(State(state.clone()), headers, Json(text_update())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let status = receive(State(state), HeaderMap::new(), Json(text_update())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(collect.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn accepts_matching_secret() {
        let (state, collect) = state(Some("s3cret"));
        let mut headers = HeaderMap::new();
        headers.insert(SECRET_HEADER, HeaderValue::from_static("s3cret"));

        let status = receive(State(state), headers, Json(text_update())).await;

        assert_eq!(status, StatusCode::OK);
        collect.arrived.notified().await;
        assert_eq!(collect.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ignored_updates_still_succeed() {
        let (state, collect) = state(None);
        let update: Update = serde_json::from_str(r#"{"update_id": 9}"#).unwrap();

        let status = receive(State(state.clone()), HeaderMap::new(), Json(update)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.queue.active_workers(), 0);
        assert!(collect.events.lock().unwrap().is_empty());
    }
}
