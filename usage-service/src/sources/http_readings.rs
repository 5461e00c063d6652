use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use usage_core::{session::SessionSummary, UsageReading};

use crate::{
    pipeline::{Envelope, EnvelopeStream, Origin, PipelineError, Source},
    sinks::SharedSession,
};

#[derive(Clone)]
struct AppState {
    tx: mpsc::Sender<Envelope<UsageReading>>,
    session: SharedSession,
}

/// Manual "add reading" surface plus the JSON display endpoints.
///
/// - `POST /readings` queues readings for the manual pipeline.
/// - `GET /summary` returns the current session snapshot.
/// - `POST /reset` starts a new session.
#[derive(Clone)]
pub struct HttpReadingSource {
    receiver: Arc<tokio::sync::Mutex<Option<mpsc::Receiver<Envelope<UsageReading>>>>>,
}

#[derive(serde::Deserialize)]
struct IncomingReading {
    #[serde(default, with = "time::serde::rfc3339::option")]
    ts: Option<OffsetDateTime>,
    kwh: f64,
}

impl From<IncomingReading> for UsageReading {
    fn from(i: IncomingReading) -> Self {
        UsageReading { ts: i.ts, kwh: i.kwh }
    }
}

impl HttpReadingSource {
    pub async fn new(
        bind_addr: &str,
        channel_capacity: usize,
        session: SharedSession,
    ) -> Result<Self, PipelineError> {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let app = router(AppState { tx, session });

        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|e| PipelineError::Source(format!("invalid bind addr: {e}")))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| PipelineError::Source(format!("failed to bind readings listener: {e}")))?;
        tracing::info!(%addr, "manual readings endpoint listening");

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                tracing::error!(error = %e, "readings HTTP server error");
            }
        });

        Ok(Self::from_receiver(rx))
    }

    fn from_receiver(rx: mpsc::Receiver<Envelope<UsageReading>>) -> Self {
        Self {
            receiver: Arc::new(tokio::sync::Mutex::new(Some(rx))),
        }
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/readings", post(post_readings))
        .route("/summary", get(get_summary))
        .route("/reset", post(post_reset))
        .with_state(state)
}

#[async_trait::async_trait]
impl Source<UsageReading> for HttpReadingSource {
    async fn stream(&self) -> EnvelopeStream<UsageReading> {
        let mut guard = self.receiver.lock().await;
        match guard.take() {
            Some(rx) => Box::pin(ReceiverStream::new(rx).map(Ok::<_, PipelineError>)),
            None => Box::pin(futures::stream::once(async {
                Err(PipelineError::Source(
                    "manual readings stream already taken; only one consumer supported".to_string(),
                ))
            })),
        }
    }
}

async fn post_readings(
    State(state): State<AppState>,
    Json(payload): Json<Vec<IncomingReading>>,
) -> StatusCode {
    metrics::counter!("http_readings_requests_total").increment(1);

    for incoming in payload {
        let env = Envelope::new(UsageReading::from(incoming), Origin::Manual);
        if state.tx.send(env).await.is_err() {
            // Manual pipeline is gone; nothing will consume this.
            metrics::counter!("http_readings_failed_total").increment(1);
            return StatusCode::SERVICE_UNAVAILABLE;
        }
    }

    StatusCode::ACCEPTED
}

async fn get_summary(State(state): State<AppState>) -> Result<Json<SessionSummary>, StatusCode> {
    let mut session = state.session.lock().await;
    session
        .summary(OffsetDateTime::now_utc())
        .map(Json)
        .map_err(|e| {
            tracing::error!(error = %e, "failed to build session summary");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

async fn post_reset(State(state): State<AppState>) -> StatusCode {
    state.session.lock().await.reset(OffsetDateTime::now_utc());
    tracing::info!("session reset");
    StatusCode::NO_CONTENT
}
