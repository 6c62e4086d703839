//! Inbound webhook endpoints.
//!
//! The platform disables a webhook that answers non-2xx, so every path out of
//! the receiver, including malformed payloads, answers 200 with a fixed body.

use crate::server::AppState;
use axum::routing::post;
use axum::{Extension, Router};
use relay_messaging::WebhookEnvelope;
use std::sync::Arc;

pub const WEBHOOK_ACK_BODY: &str = "this is TestWebHook!";

pub fn router() -> Router {
    Router::new()
        .route("/api/Webhook", post(receive_webhook))
        .route("/api/TestWebHook", post(test_webhook))
}

#[tracing::instrument(level = "info", skip_all)]
async fn receive_webhook(
    Extension(state): Extension<Arc<AppState>>,
    body: String,
) -> &'static str {
    let envelope = match serde_json::from_str::<WebhookEnvelope>(&body) {
        Ok(envelope) => envelope,
        Err(error) => {
            tracing::warn!(%error, "webhook payload parse failed; acknowledging anyway");
            return WEBHOOK_ACK_BODY;
        }
    };

    if is_test_traffic(&envelope, &state.test_reply_token) {
        tracing::debug!("test traffic acknowledged without dispatch");
        return WEBHOOK_ACK_BODY;
    }

    // Must not block on downstream work; a full queue is logged and the
    // envelope dropped.
    state.queue.enqueue(envelope);
    WEBHOOK_ACK_BODY
}

/// Reachability probe endpoint; performs no parsing.
async fn test_webhook() -> &'static str {
    WEBHOOK_ACK_BODY
}

/// Platform connectivity checks arrive either with no events at all or with
/// the configured verification reply token on the first event. Only the first
/// event is inspected.
pub fn is_test_traffic(envelope: &WebhookEnvelope, test_reply_token: &str) -> bool {
    let Some(first) = envelope.events.first() else {
        return true;
    };
    first.reply_token.as_deref() == Some(test_reply_token)
}

#[cfg(test)]
mod tests {
    use super::{WEBHOOK_ACK_BODY, is_test_traffic, router};
    use crate::queue::EventQueue;
    use crate::server::AppState;
    use axum::Extension;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use relay_messaging::{EventType, WebhookEnvelope, WebhookEvent};
    use std::sync::Arc;
    use std::time::Instant;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    const TEST_TOKEN: &str = "00000000000000000000000000000000";

    fn test_app() -> (axum::Router, mpsc::Receiver<WebhookEnvelope>) {
        let (queue, rx) = EventQueue::bounded(8);
        let state = Arc::new(AppState {
            queue,
            test_reply_token: TEST_TOKEN.to_string(),
            started_at: Instant::now(),
        });
        (router().layer(Extension(state)), rx)
    }

    async fn post_webhook(app: axum::Router, body: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/Webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, String::from_utf8(bytes.to_vec()).expect("utf8"))
    }

    fn event(reply_token: Option<&str>) -> WebhookEvent {
        WebhookEvent {
            event_type: EventType::Message,
            mode: None,
            timestamp: 1,
            source: None,
            reply_token: reply_token.map(str::to_string),
            message: None,
            unsend: None,
        }
    }

    #[test]
    fn empty_or_absent_events_is_test_traffic() {
        let envelope = WebhookEnvelope::default();
        assert!(is_test_traffic(&envelope, TEST_TOKEN));
    }

    #[test]
    fn verification_reply_token_is_test_traffic() {
        let envelope = WebhookEnvelope {
            destination: None,
            events: vec![event(Some(TEST_TOKEN))],
        };
        assert!(is_test_traffic(&envelope, TEST_TOKEN));
    }

    #[test]
    fn genuine_first_event_is_not_test_traffic() {
        let envelope = WebhookEnvelope {
            destination: None,
            events: vec![event(Some("real-token"))],
        };
        assert!(!is_test_traffic(&envelope, TEST_TOKEN));

        let envelope = WebhookEnvelope {
            destination: None,
            events: vec![event(None)],
        };
        assert!(!is_test_traffic(&envelope, TEST_TOKEN));
    }

    #[tokio::test]
    async fn malformed_body_answers_200_and_never_enqueues() {
        let (app, mut rx) = test_app();
        let (status, body) = post_webhook(app, "{not json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, WEBHOOK_ACK_BODY);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_events_answers_200_without_enqueue() {
        let (app, mut rx) = test_app();
        let (status, _) = post_webhook(app, r#"{"events":[]}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn verification_traffic_answers_200_without_enqueue() {
        let (app, mut rx) = test_app();
        let body = format!(
            r#"{{"events":[{{"type":"message","timestamp":1,"replyToken":"{TEST_TOKEN}"}}]}}"#
        );
        let (status, _) = post_webhook(app, &body).await;
        assert_eq!(status, StatusCode::OK);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn genuine_event_answers_200_and_enqueues() {
        let (app, mut rx) = test_app();
        let body = r#"{
            "destination": "bot",
            "events": [{
                "type": "message",
                "timestamp": 1,
                "replyToken": "real-token",
                "message": {"id": "m1", "type": "text", "text": "Hi"}
            }]
        }"#;
        let (status, response_body) = post_webhook(app, body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response_body, WEBHOOK_ACK_BODY);

        let envelope = rx.try_recv().expect("enqueued envelope");
        assert_eq!(envelope.events.len(), 1);
        assert_eq!(envelope.events[0].reply_token.as_deref(), Some("real-token"));
    }

    #[tokio::test]
    async fn test_webhook_endpoint_answers_fixed_body() {
        let (app, _rx) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/TestWebHook")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(&bytes[..], WEBHOOK_ACK_BODY.as_bytes());
    }
}
