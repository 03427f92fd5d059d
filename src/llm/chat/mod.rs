pub mod groq;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use self::groq::GroqChatClient;
use super::{ ChunkStream, LlmConfig, LlmError };

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Starts a streaming completion. Errors returned here happen before any
    /// byte is produced; later failures arrive as stream items.
    async fn stream_completion(&self, system: &str, prompt: &str) -> Result<ChunkStream, LlmError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> String;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client = GroqChatClient::from_config(config)?;
    Ok(Arc::new(client))
}

/// Text frame: `0:` followed by the JSON-encoded token and a newline.
pub fn encode_text_frame(token: &str) -> Bytes {
    let quoted = serde_json::Value::String(token.to_string()).to_string();
    Bytes::from(format!("0:{}\n", quoted))
}

/// Finish frame closing a data stream.
pub fn encode_finish_frame(finish_reason: &str) -> Bytes {
    let payload = serde_json::json!({ "finishReason": finish_reason });
    Bytes::from(format!("d:{}\n", payload))
}

/// Reassembles newline-terminated lines from arbitrarily split byte chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(text.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Whatever is left once the source is exhausted.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).trim_end_matches('\r').to_string();
        self.pending.clear();
        Some(rest)
    }
}
