use clap::{ Args as ClapArgs, Parser, Subcommand };

use crate::widget::{ DEFAULT_ENDPOINT, DEFAULT_GREETING, DEFAULT_INSTRUCTION };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (per-chunk stream diagnostics)
    #[arg(long, env = "DEBUG", default_value = "false", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the relay endpoint.
    Serve(ServeArgs),
    /// Chat with a running relay from the terminal.
    Chat(ChatArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    /// Host address and port for the relay to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    // --- Upstream Provider Args ---
    /// API key for the upstream provider. Requests fail without it, startup does not.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub groq_api_key: Option<String>,

    /// Base URL for the OpenAI-compatible upstream API.
    #[arg(long, env = "CHAT_BASE_URL")] // No default, the client falls back to Groq
    pub chat_base_url: Option<String>,

    /// Model name for chat completion (e.g., llama3-8b-8192)
    #[arg(long, env = "CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// Optional JSON file overriding the system prompt and prompt template.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    // --- TLS Args ---
    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    /// Path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ChatArgs {
    /// Relay chat endpoint.
    #[arg(long, env = "CHAT_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Instruction context sent as `prompt` with every message.
    #[arg(long, env = "CHAT_INSTRUCTION", default_value = DEFAULT_INSTRUCTION)]
    pub instruction: String,

    #[arg(long, env = "CHAT_GREETING", default_value = DEFAULT_GREETING)]
    pub greeting: String,

    /// Print the relay stream as received, without clean-up.
    #[arg(long, env = "CHAT_RAW_OUTPUT", default_value = "false")]
    pub raw: bool,
}
