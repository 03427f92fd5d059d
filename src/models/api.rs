use serde::{ Serialize, Deserialize };

/// Body of `POST /api/chat`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            text: Some(text.into()),
        }
    }

    /// The prompt, if present and non-empty.
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref().filter(|p| !p.is_empty())
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}
