use super::AppState;
use crate::llm::{ ChunkStream, LlmError };
use crate::models::api::ChatRequest;
use axum::{
    body::{ Body, Bytes },
    extract::State,
    http::{ header, StatusCode },
    response::{ IntoResponse, Response },
};
use futures::{ Stream, StreamExt };
use log::{ debug, error, info, warn };
use std::fmt;
use std::pin::Pin;
use std::task::{ Context, Poll };
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("prompt is required")]
    PromptRequired,
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error(transparent)]
    Upstream(#[from] LlmError),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self {
            RelayError::PromptRequired => {
                (StatusCode::BAD_REQUEST, "Prompt is required").into_response()
            }
            RelayError::InvalidBody(_) => {
                (StatusCode::BAD_REQUEST, "Invalid request body").into_response()
            }
            RelayError::Upstream(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    Idle,
    AwaitingUpstream,
    Streaming,
    Closed,
    Failed,
}

impl fmt::Display for RelayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayPhase::Idle => "idle",
            RelayPhase::AwaitingUpstream => "awaiting-upstream",
            RelayPhase::Streaming => "streaming",
            RelayPhase::Closed => "closed",
            RelayPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn transition(phase: &mut RelayPhase, next: RelayPhase) {
    debug!("Relay {} -> {}", phase, next);
    *phase = next;
}

/// Response body that forwards upstream chunks untouched and logs them on
/// the way through.
pub struct RelayBody {
    first: Option<Bytes>,
    upstream: ChunkStream,
    phase: RelayPhase,
    chunks: usize,
    bytes: usize,
}

impl RelayBody {
    fn new(first: Option<Bytes>, upstream: ChunkStream) -> Self {
        let mut phase = RelayPhase::AwaitingUpstream;
        if first.is_some() {
            transition(&mut phase, RelayPhase::Streaming);
        } else {
            // upstream already ended; it must not be polled again
            transition(&mut phase, RelayPhase::Closed);
            info!("Stream complete (0 chunks, 0 bytes)");
        }
        Self { first, upstream, phase, chunks: 0, bytes: 0 }
    }

    pub fn phase(&self) -> RelayPhase {
        self.phase
    }

    fn observe(&mut self, chunk: &Bytes) {
        self.chunks += 1;
        self.bytes += chunk.len();
        debug!("Response chunk: {}", String::from_utf8_lossy(chunk));
    }
}

impl Stream for RelayBody {
    type Item = Result<Bytes, LlmError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(chunk) = this.first.take() {
            this.observe(&chunk);
            return Poll::Ready(Some(Ok(chunk)));
        }
        if this.phase != RelayPhase::Streaming {
            return Poll::Ready(None);
        }

        match this.upstream.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.observe(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                error!("Error while streaming text after {} chunks: {}", this.chunks, e);
                transition(&mut this.phase, RelayPhase::Closed);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                transition(&mut this.phase, RelayPhase::Closed);
                info!("Stream complete ({} chunks, {} bytes)", this.chunks, this.bytes);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Runs a request up to the first upstream chunk. Everything that can fail
/// before bytes are committed to the client fails here.
pub async fn start_relay(state: &AppState, body: &[u8]) -> Result<RelayBody, RelayError> {
    let mut phase = RelayPhase::Idle;

    let request: ChatRequest = serde_json::from_slice(body).map_err(|e| {
        warn!("Rejecting malformed chat request: {}", e);
        transition(&mut phase, RelayPhase::Failed);
        RelayError::InvalidBody(e.to_string())
    })?;
    info!("Parsed prompt: {:?}", request.prompt);

    let prompt = match request.prompt() {
        Some(prompt) => prompt,
        None => {
            transition(&mut phase, RelayPhase::Failed);
            return Err(RelayError::PromptRequired);
        }
    };

    transition(&mut phase, RelayPhase::AwaitingUpstream);
    let combined = state.prompts.render(prompt, request.text());

    let mut upstream = match
        state.chat_client.stream_completion(&state.prompts.system, &combined).await
    {
        Ok(upstream) => upstream,
        Err(e) => {
            error!("Error while starting upstream stream: {}", e);
            transition(&mut phase, RelayPhase::Failed);
            return Err(e.into());
        }
    };

    let first = match upstream.next().await {
        Some(Ok(chunk)) => Some(chunk),
        Some(Err(e)) => {
            error!("Error while streaming text: {}", e);
            transition(&mut phase, RelayPhase::Failed);
            return Err(e.into());
        }
        None => None,
    };

    Ok(RelayBody::new(first, upstream))
}

pub async fn chat_handler(State(state): State<AppState>, body: Bytes) -> Response {
    match start_relay(&state, &body).await {
        Ok(relay) => {
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                Body::from_stream(relay),
            ).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn health_handler() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::prompt::PromptConfig;
    use crate::llm::chat::ChatClient;
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::Arc;
    use std::sync::atomic::{ AtomicUsize, Ordering };
    use std::sync::Mutex;

    struct ScriptedClient {
        chunks: Vec<Result<&'static str, &'static str>>,
        calls: AtomicUsize,
        last_prompt: Mutex<Option<(String, String)>>,
    }

    impl ScriptedClient {
        fn new(chunks: Vec<Result<&'static str, &'static str>>) -> Arc<Self> {
            Arc::new(Self {
                chunks,
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn stream_completion(
            &self,
            system: &str,
            prompt: &str
        ) -> Result<ChunkStream, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some((system.to_string(), prompt.to_string()));
            let items: Vec<Result<Bytes, LlmError>> = self.chunks
                .iter()
                .map(|c| match c {
                    Ok(s) => Ok(Bytes::from_static(s.as_bytes())),
                    Err(s) => Err(LlmError::Stream(s.to_string())),
                })
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }

        fn get_model(&self) -> String {
            "scripted".into()
        }

        fn get_base_url(&self) -> String {
            "memory://".into()
        }
    }

    struct FailingClient;

    #[async_trait]
    impl ChatClient for FailingClient {
        async fn stream_completion(&self, _: &str, _: &str) -> Result<ChunkStream, LlmError> {
            Err(LlmError::MissingApiKey)
        }

        fn get_model(&self) -> String {
            "failing".into()
        }

        fn get_base_url(&self) -> String {
            "memory://".into()
        }
    }

    fn state_with(client: Arc<dyn ChatClient>) -> AppState {
        AppState::new(client, Arc::new(PromptConfig::default()))
    }

    #[tokio::test]
    async fn missing_prompt_never_reaches_upstream() {
        let client = ScriptedClient::new(vec![Ok("0:\"x\"\n")]);
        let state = state_with(client.clone());

        for body in [r#"{"text":"hi"}"#, r#"{"prompt":"","text":"hi"}"#, r#"{"prompt":null}"#] {
            let err = start_relay(&state, body.as_bytes()).await.err().expect("rejected");
            assert!(matches!(err, RelayError::PromptRequired));
        }
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_body_is_a_client_error() {
        let client = ScriptedClient::new(vec![]);
        let err = start_relay(&state_with(client.clone()), b"not json").await.err().expect("rejected");
        assert!(matches!(err, RelayError::InvalidBody(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn upstream_receives_system_and_combined_prompt() {
        let client = ScriptedClient::new(vec![Ok("0:\"ok\"\n")]);
        let state = state_with(client.clone());

        let relay = start_relay(&state, br#"{"prompt":"Ask","text":"Who?"}"#).await.expect("relay");
        let _: Vec<_> = relay.collect().await;

        let (system, prompt) = client.last_prompt.lock().unwrap().clone().expect("called");
        assert_eq!(system, state.prompts.system);
        assert_eq!(prompt, "Prompt: Ask\nText: Who?");
    }

    #[tokio::test]
    async fn relay_forwards_bytes_in_order_and_closes() {
        let chunks = vec![Ok("0:\"Hel"), Ok("lo\"\n0:\" wor"), Ok("ld\"\n"), Ok("d:{\"finishReason\":\"stop\"}\n")];
        let state = state_with(ScriptedClient::new(chunks));

        let mut relay = start_relay(&state, br#"{"prompt":"p","text":"t"}"#).await.expect("relay");
        let mut out = Vec::new();
        while let Some(item) = relay.next().await {
            out.extend_from_slice(&item.expect("chunk"));
        }
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "0:\"Hello\"\n0:\" world\"\nd:{\"finishReason\":\"stop\"}\n"
        );
        assert_eq!(relay.phase(), RelayPhase::Closed);
    }

    #[tokio::test]
    async fn setup_failure_is_internal_error() {
        let state = state_with(Arc::new(FailingClient));
        let err = start_relay(&state, br#"{"prompt":"p"}"#).await.err().expect("fails");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn error_before_first_chunk_is_internal_error() {
        let state = state_with(ScriptedClient::new(vec![Err("boom"), Ok("late")]));
        let err = start_relay(&state, br#"{"prompt":"p"}"#).await.err().expect("fails");
        assert!(matches!(err, RelayError::Upstream(LlmError::Stream(_))));
    }

    #[tokio::test]
    async fn error_mid_stream_ends_the_body() {
        let state = state_with(ScriptedClient::new(vec![Ok("a"), Err("boom"), Ok("never")]));
        let relay = start_relay(&state, br#"{"prompt":"p"}"#).await.expect("relay");
        let items: Vec<_> = relay.collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    /// Ends once, then panics if polled again.
    struct EndsOnce {
        ended: bool,
    }

    impl Stream for EndsOnce {
        type Item = Result<Bytes, LlmError>;

        fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            let this = self.get_mut();
            assert!(!this.ended, "polled after completion");
            this.ended = true;
            Poll::Ready(None)
        }
    }

    struct EmptyClient;

    #[async_trait]
    impl ChatClient for EmptyClient {
        async fn stream_completion(&self, _: &str, _: &str) -> Result<ChunkStream, LlmError> {
            Ok(Box::pin(EndsOnce { ended: false }))
        }

        fn get_model(&self) -> String {
            "empty".into()
        }

        fn get_base_url(&self) -> String {
            "memory://".into()
        }
    }

    #[tokio::test]
    async fn empty_upstream_gives_empty_body() {
        let state = state_with(ScriptedClient::new(vec![]));
        let relay = start_relay(&state, br#"{"prompt":"p"}"#).await.expect("relay");
        assert_eq!(relay.phase(), RelayPhase::Closed);
        let items: Vec<_> = relay.collect().await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn finished_upstream_is_not_polled_again() {
        let state = state_with(Arc::new(EmptyClient));
        let mut relay = start_relay(&state, br#"{"prompt":"p"}"#).await.expect("relay");
        assert_eq!(relay.phase(), RelayPhase::Closed);
        assert!(relay.next().await.is_none());
        assert!(relay.next().await.is_none());
    }
}
