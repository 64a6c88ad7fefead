use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{
        Html, IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::UnboundedReceiverStream};
use tracing::{debug, info, warn};

use crate::client::PreparedLogin;
use crate::{OAuthClient, OAuthError, OAuthRequest, OAuthResponse, Progress, StreamEvent};

pub(super) const INDEX_HTML: &str = include_str!("html/index.html");

#[derive(Clone)]
pub(super) struct AppState {
    pub(super) client: OAuthClient,
}

pub(super) async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub(super) async fn configs_handler(State(state): State<AppState>) -> Response {
    match state.client.configs().snapshot().await {
        Ok(snapshot) => (
            [(header::CONTENT_TYPE, "application/json")],
            snapshot.raw().to_string(),
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "failed to load configs");
            error_response(status_for(&err), err.to_string())
        }
    }
}

pub(super) async fn oauth_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: OAuthRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            debug!(error = %err, "rejecting undecodable oauth body");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    let prepared = match state.client.prepare(&request).await {
        Ok(prepared) => prepared,
        Err(err) => return error_response(status_for(&err), err.to_string()),
    };

    if wants_event_stream(&headers) {
        return event_stream(state.client, prepared).into_response();
    }

    match state.client.run(prepared, &Progress::silent()).await {
        Ok(code) => Json(OAuthResponse::success(code)).into_response(),
        Err(err) => error_response(status_for(&err), err.to_string()),
    }
}

pub(super) async fn method_not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

pub(super) async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "404 page not found")
}

/// Runs the login on its own task and forwards every progress step as an SSE event,
/// followed by exactly one terminal event. The run is dropped once the client goes away.
fn event_stream(
    client: OAuthClient,
    prepared: PreparedLogin,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, axum::Error>>> {
    let (events_tx, events_rx) = mpsc::unbounded_channel::<StreamEvent>();

    let progress_tx = events_tx.clone();
    let progress = Progress::new(move |step| {
        let _ = progress_tx.send(StreamEvent::Progress {
            message: step.to_string(),
        });
    });

    tokio::spawn(async move {
        tokio::select! {
            result = client.run(prepared, &progress) => {
                let _ = events_tx.send(StreamEvent::from(result));
            }
            _ = events_tx.closed() => {
                info!("event stream closed by client, abandoning login");
            }
        }
    });

    let stream =
        UnboundedReceiverStream::new(events_rx).map(|event| Event::default().json_data(event));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

fn status_for(err: &OAuthError) -> StatusCode {
    if err.is_config_source() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::BAD_REQUEST
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(OAuthResponse::error(message))).into_response()
}
