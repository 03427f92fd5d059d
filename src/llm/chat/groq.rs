use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, info, warn };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ encode_finish_frame, encode_text_frame, ChatClient, LineBuffer };
use crate::llm::{ ChunkStream, LlmConfig, LlmError, DEFAULT_BASE_URL, DEFAULT_MODEL };

pub struct GroqChatClient {
    http: HttpClient,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

#[derive(Serialize, Deserialize)]
struct GroqMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct GroqRequest {
    messages: Vec<GroqMessage>,
    model: String,
    temperature: f32,
    #[serde(rename = "max_tokens")]
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct GroqStreamResponse {
    choices: Vec<GroqStreamChoice>,
}

#[derive(Deserialize)]
struct GroqStreamChoice {
    delta: GroqDelta,
    #[serde(rename = "finish_reason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GroqDelta {
    content: Option<String>,
}

enum SseEvent {
    Token(String),
    Finish(String),
    Done,
}

fn parse_sse_line(line: &str) -> Vec<SseEvent> {
    let data = match line.strip_prefix("data:") {
        Some(data) => data.trim(),
        None => {
            return Vec::new();
        }
    };
    if data == "[DONE]" {
        return vec![SseEvent::Done];
    }

    match serde_json::from_str::<GroqStreamResponse>(data) {
        Ok(stream_resp) => {
            let mut events = Vec::new();
            for choice in stream_resp.choices {
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        events.push(SseEvent::Token(content));
                    }
                }
                if let Some(reason) = choice.finish_reason {
                    events.push(SseEvent::Finish(reason));
                }
            }
            events
        }
        Err(e) => {
            warn!("Failed to parse Groq chunk: {}, error: {}", data, e);
            Vec::new()
        }
    }
}

impl GroqChatClient {
    pub fn new(
        api_key: Option<String>,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, LlmError> {
        let chat_model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let http = HttpClient::builder().build()?;

        Ok(Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: chat_model,
            base_url: api_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Self::new(config.api_key.clone(), config.completion_model.clone(), config.base_url.clone())
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatClient for GroqChatClient {
    async fn stream_completion(&self, system: &str, prompt: &str) -> Result<ChunkStream, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;
        let url = self.completions_url();

        let req = GroqRequest {
            messages: vec![
                GroqMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                GroqMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                }
            ],
            model: self.model.clone(),
            temperature: 0.7,
            max_tokens: 1024,
            stream: true,
        };

        info!("Starting Groq stream request to {} (model {})", url, self.model);
        let resp = self.http.post(&url).bearer_auth(api_key).json(&req).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut bytes = resp.bytes_stream();
            let mut lines = LineBuffer::new();
            let mut finish_reason: Option<String> = None;

            'read: while let Some(chunk_result) = bytes.next().await {
                let chunk = match chunk_result {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(LlmError::Http(e))).await;
                        return;
                    }
                };
                debug!("Groq raw chunk: {}", String::from_utf8_lossy(&chunk));

                for line in lines.push(&chunk) {
                    for event in parse_sse_line(&line) {
                        match event {
                            SseEvent::Token(token) => {
                                if tx.send(Ok(encode_text_frame(&token))).await.is_err() {
                                    return;
                                }
                            }
                            SseEvent::Finish(reason) => {
                                finish_reason = Some(reason);
                            }
                            SseEvent::Done => {
                                break 'read;
                            }
                        }
                    }
                }
            }

            if let Some(tail) = lines.finish() {
                for event in parse_sse_line(&tail) {
                    match event {
                        SseEvent::Token(token) => {
                            if tx.send(Ok(encode_text_frame(&token))).await.is_err() {
                                return;
                            }
                        }
                        SseEvent::Finish(reason) => {
                            finish_reason = Some(reason);
                        }
                        SseEvent::Done => {}
                    }
                }
            }

            let reason = finish_reason.unwrap_or_else(|| "stop".to_string());
            let _ = tx.send(Ok(encode_finish_frame(&reason))).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> String {
        self.base_url.clone()
    }
}
