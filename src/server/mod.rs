pub mod api;

use crate::config::prompt::PromptConfig;
use crate::llm::chat::ChatClient;
use axum::{ routing::{ get, post }, Router };
use log::{ info, error };
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{ Any, CorsLayer };

pub use api::RelayError;

#[derive(Clone)]
pub struct AppState {
    pub chat_client: Arc<dyn ChatClient>,
    pub prompts: Arc<PromptConfig>,
}

impl AppState {
    pub fn new(chat_client: Arc<dyn ChatClient>, prompts: Arc<PromptConfig>) -> Self {
        Self { chat_client, prompts }
    }
}

#[derive(Debug, Clone)]
pub struct TlsSettings {
    pub cert_path: String,
    pub key_path: String,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/chat", post(api::chat_handler))
        .route("/health", get(api::health_handler))
        .layer(cors)
        .with_state(state)
}

pub struct Server {
    addr: String,
    state: AppState,
    tls: Option<TlsSettings>,
}

impl Server {
    pub fn new(addr: String, state: AppState, tls: Option<TlsSettings>) -> Self {
        Self { addr, state, tls }
    }

    pub async fn run(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let app = router(self.state);

        match self.tls {
            Some(tls) => {
                let addr = self.addr.parse::<SocketAddr>()?;
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    tls.cert_path,
                    tls.key_path
                );
                let tls_config = axum_server::tls_rustls::RustlsConfig
                    ::from_pem_file(&tls.cert_path, &tls.key_path).await
                    .map_err(|e| format!("Failed to load TLS certificate/key: {}", e))?;

                info!("HTTPS relay listening on: https://{}", addr);
                axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
            }
            None => {
                let listener = TcpListener::bind(&self.addr).await.map_err(|e| {
                    error!("Failed to bind HTTP server to {}: {}. Try a different port.", self.addr, e);
                    e
                })?;
                info!("HTTP relay listening on: http://{}", listener.local_addr()?);
                serve(listener, app).await?;
            }
        }

        Ok(())
    }
}

/// Serves `app` on an already-bound listener.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(listener, app.into_make_service()).await
}
