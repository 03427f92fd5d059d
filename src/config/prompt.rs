use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::info;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the AIC (Artificial Intelligence Club) Society chatbot at Mehran University of Engineering and Technology, an AI assistant that provides information about the AIC Society. Your primary role is to help students with questions about the events organized by the society, the structure and organization of the society, membership details and eligibility criteria. The society is made up of a core team, a head team and members who contribute to each head. The president is Abdul Ahad, a BSAI student of the 23 batch at MUET; the core team is also from the 23 batch of BSAI. The vice president is Shafaque, the membership chair is Narmeen Afreen, the head treasurer is Hadeed Hyder, the general secretary is Muneeb ur Rehman and the web master is Muzamil Muhammad. Each tenure lasts one year and applications open accordingly.";

pub const DEFAULT_PROMPT_TEMPLATE: &str = "Prompt: {prompt}\nText: {text}";

#[derive(Debug)]
pub enum PromptError {
    MissingPlaceholder(&'static str),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::MissingPlaceholder(key) =>
                write!(f, "Prompt template is missing the '{}' placeholder", key),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_system")]
    pub system: String,
    #[serde(default = "default_template")]
    pub prompt_template: String,
}

fn default_system() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_template() -> String {
    DEFAULT_PROMPT_TEMPLATE.to_string()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system: default_system(),
            prompt_template: default_template(),
        }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        if !self.prompt_template.contains("{prompt}") {
            return Err(PromptError::MissingPlaceholder("{prompt}"));
        }
        if !self.prompt_template.contains("{text}") {
            return Err(PromptError::MissingPlaceholder("{text}"));
        }
        Ok(())
    }

    /// Builds the user turn sent upstream.
    pub fn render(&self, prompt: &str, text: &str) -> String {
        // Single pass so a `{text}` inside the prompt value is not expanded.
        let mut out = String::with_capacity(self.prompt_template.len() + prompt.len() + text.len());
        let mut rest = self.prompt_template.as_str();
        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix("{prompt}") {
                out.push_str(prompt);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{text}") {
                out.push_str(text);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(&path)?;
    let config: PromptConfig = serde_json::from_str(&file_content)?;
    config.validate()?;
    info!("Loaded prompt configuration from '{}'", path.as_ref().display());
    Ok(Arc::new(config))
}

/// Built-in defaults unless a prompts file is configured.
pub fn resolve_prompts(path: Option<&str>) -> Result<Arc<PromptConfig>, PromptError> {
    match path {
        Some(p) if !p.trim().is_empty() => load_prompts(p),
        _ => {
            info!("Using built-in prompt configuration");
            Ok(Arc::new(PromptConfig::default()))
        }
    }
}
