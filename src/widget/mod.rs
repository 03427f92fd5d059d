pub mod decoder;
pub mod filter;
pub mod terminal;

use crate::models::api::ChatRequest;
use crate::models::chat::{ Conversation, Message, Role };
use futures::StreamExt;
use log::{ debug, info, warn };
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::llm::chat::LineBuffer;
use self::decoder::Utf8Decoder;
use self::filter::{ DataStreamFilter, TextFilter };

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:3000/api/chat";
pub const DEFAULT_INSTRUCTION: &str = "Ask me anything about the AIC events!";
pub const DEFAULT_GREETING: &str = "This is the AIC support system. How may I help you?";

#[derive(Debug, Error)]
pub enum WidgetError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("An error occurred while fetching the data")]
    Status(u16),
}

/// Receives every change to the conversation. Implementations render it.
pub trait WidgetView: Send + Sync {
    fn message_added(&self, message: &Message);
    fn message_updated(&self, message: &Message, delta: &str);
    /// Transient, user-facing error notice.
    fn notify_error(&self, message: &str);
}

#[derive(Debug, Clone)]
pub struct WidgetConfig {
    pub endpoint: String,
    pub instruction: String,
    pub greeting: String,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

pub struct ChatWidget {
    http: reqwest::Client,
    config: WidgetConfig,
    conversation: Mutex<Conversation>,
    input: Mutex<String>,
    filter: Arc<dyn TextFilter>,
    view: Arc<dyn WidgetView>,
}

impl ChatWidget {
    pub fn new(config: WidgetConfig, view: Arc<dyn WidgetView>) -> Self {
        Self::with_filter(config, view, Arc::new(DataStreamFilter))
    }

    pub fn with_filter(
        config: WidgetConfig,
        view: Arc<dyn WidgetView>,
        filter: Arc<dyn TextFilter>
    ) -> Self {
        let conversation = Conversation::with_greeting(&config.greeting);
        info!("Chat widget targeting {} (filter {})", config.endpoint, filter.version());
        Self {
            http: reqwest::Client::new(),
            config,
            conversation: Mutex::new(conversation),
            input: Mutex::new(String::new()),
            filter,
            view,
        }
    }

    pub async fn conversation(&self) -> Conversation {
        self.conversation.lock().await.clone()
    }

    pub async fn set_input(&self, text: &str) {
        *self.input.lock().await = text.to_string();
    }

    pub async fn input(&self) -> String {
        self.input.lock().await.clone()
    }

    /// Submits the current input box content and clears it.
    pub async fn submit(&self) -> Result<Option<String>, WidgetError> {
        let text = {
            let mut input = self.input.lock().await;
            if input.trim().is_empty() {
                return Ok(None);
            }
            std::mem::take(&mut *input)
        };
        self.send(&text).await
    }

    /// Sends `text` and streams the reply into a new assistant message.
    /// Returns that message's id, or `None` when `text` is blank. Failures
    /// are reported to the view; whatever was streamed so far is kept.
    pub async fn send(&self, text: &str) -> Result<Option<String>, WidgetError> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        {
            let mut conversation = self.conversation.lock().await;
            let message = conversation.push(Message::new(Role::User, text));
            self.view.message_added(message);
        }

        match self.stream_reply(text).await {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                warn!("Chat request failed: {}", e);
                self.view.notify_error(&e.to_string());
                Err(e)
            }
        }
    }

    async fn stream_reply(&self, text: &str) -> Result<String, WidgetError> {
        let request = ChatRequest::new(self.config.instruction.clone(), text);
        let resp = self.http.post(&self.config.endpoint).json(&request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(WidgetError::Status(status.as_u16()));
        }

        let id = {
            let mut conversation = self.conversation.lock().await;
            let message = conversation.push(Message::new(Role::Assistant, ""));
            self.view.message_added(message);
            message.id.clone()
        };

        let mut decoder = Utf8Decoder::new();
        let mut frames = LineBuffer::new();
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    // keep whatever partial frame already arrived
                    let pending = frames.push(decoder.finish().as_bytes());
                    self.append_frames(&id, pending, frames.finish()).await;
                    return Err(e.into());
                }
            };
            let decoded = decoder.decode(&chunk);
            let complete = frames.push(decoded.as_bytes());
            self.append_frames(&id, complete, None).await;
        }
        let complete = frames.push(decoder.finish().as_bytes());
        self.append_frames(&id, complete, frames.finish()).await;

        debug!("Assistant message {} complete", id);
        Ok(id)
    }

    /// Filters whole frames only, so no substitution sees half a frame.
    async fn append_frames(&self, id: &str, complete: Vec<String>, tail: Option<String>) {
        let mut text = String::new();
        for line in complete {
            text.push_str(&line);
            text.push('\n');
        }
        if let Some(tail) = tail {
            text.push_str(&tail);
        }
        self.append(id, &text).await;
    }

    async fn append(&self, id: &str, decoded: &str) {
        if decoded.is_empty() {
            return;
        }
        let cleaned = self.filter.apply(decoded);
        if cleaned.is_empty() {
            return;
        }
        let mut conversation = self.conversation.lock().await;
        if let Some(message) = conversation.append(id, &cleaned) {
            self.view.message_updated(message, &cleaned);
        }
    }
}
