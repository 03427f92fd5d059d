pub mod models;
pub mod server;
pub mod config;
pub mod llm;
pub mod cli;
pub mod widget;

use cli::{ ChatArgs, Cli, Command, ServeArgs };
use config::prompt::resolve_prompts;
use llm::LlmConfig;
use log::{ info, warn };
use server::{ AppState, Server, TlsSettings };
use std::error::Error;
use widget::WidgetConfig;

pub async fn run(cli: Cli) -> Result<(), Box<dyn Error + Send + Sync>> {
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Chat(args) => chat(args).await,
    }
}

fn tls_settings(args: &ServeArgs) -> Result<Option<TlsSettings>, Box<dyn Error + Send + Sync>> {
    if !args.enable_tls {
        info!("TLS not enabled. Running plain HTTP relay.");
        return Ok(None);
    }
    match (&args.tls_cert_path, &args.tls_key_path) {
        (Some(cert_path), Some(key_path)) =>
            Ok(
                Some(TlsSettings {
                    cert_path: cert_path.clone(),
                    key_path: key_path.clone(),
                })
            ),
        (Some(_), None) | (None, Some(_)) => {
            Err("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.".into())
        }
        (None, None) => Err("--enable-tls was set but no certificate/key paths provided.".into()),
    }
}

pub async fn serve(args: ServeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let llm_config = LlmConfig {
        api_key: args.groq_api_key.clone().filter(|k| !k.trim().is_empty()),
        completion_model: args.chat_model.clone(),
        base_url: args.chat_base_url.clone(),
    };

    info!("--- Relay Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Upstream Base URL: {}", llm_config.base_url());
    info!("Upstream Model: {}", llm_config.model());
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("TLS Enabled: {}", args.enable_tls);
    info!("---------------------------");

    if llm_config.api_key.is_none() {
        warn!("GROQ_API_KEY is not set; chat requests will fail until it is provided.");
    }

    let prompts = resolve_prompts(args.prompts_path.as_deref())?;
    let chat_client = llm::chat::new_client(&llm_config)?;
    info!(
        "Chat client configured: Model={}, BaseURL={}",
        chat_client.get_model(),
        chat_client.get_base_url()
    );
    let tls = tls_settings(&args)?;

    let state = AppState::new(chat_client, prompts);
    Server::new(args.server_addr.clone(), state, tls).run().await
}

pub async fn chat(args: ChatArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = WidgetConfig {
        endpoint: args.endpoint,
        instruction: args.instruction,
        greeting: args.greeting,
    };
    widget::terminal::run_terminal(config, widget::filter::filter_for(args.raw)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn serve_args(extra: &[&str]) -> ServeArgs {
        let mut argv = vec!["chat-relay", "serve"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).expect("parse").command {
            Command::Serve(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn tls_disabled_by_default() {
        assert!(tls_settings(&serve_args(&[])).expect("ok").is_none());
    }

    #[test]
    fn tls_needs_both_paths() {
        assert!(tls_settings(&serve_args(&["--enable-tls", "--tls-cert-path", "c.pem"])).is_err());
        assert!(tls_settings(&serve_args(&["--enable-tls"])).is_err());

        let tls = tls_settings(
            &serve_args(&["--enable-tls", "--tls-cert-path", "c.pem", "--tls-key-path", "k.pem"])
        )
            .expect("ok")
            .expect("enabled");
        assert_eq!(tls.cert_path, "c.pem");
        assert_eq!(tls.key_path, "k.pem");
    }
}
