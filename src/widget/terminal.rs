use super::filter::TextFilter;
use super::{ ChatWidget, WidgetConfig, WidgetView };
use crate::models::chat::{ Message, Role };
use log::info;
use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{ AsyncBufReadExt, BufReader };

/// Renders the conversation on stdout and notifications on stderr.
pub struct TerminalView {
    assistant_label: String,
}

impl TerminalView {
    pub fn new(assistant_label: impl Into<String>) -> Self {
        Self { assistant_label: assistant_label.into() }
    }
}

impl WidgetView for TerminalView {
    fn message_added(&self, message: &Message) {
        let mut stdout = std::io::stdout().lock();
        match message.role {
            // already echoed by the terminal
            Role::User => {}
            Role::Assistant => {
                let _ = write!(stdout, "{}> {}", self.assistant_label, message.content);
                if !message.content.is_empty() {
                    let _ = writeln!(stdout);
                }
            }
        }
        let _ = stdout.flush();
    }

    fn message_updated(&self, _message: &Message, delta: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "{}", delta);
        let _ = stdout.flush();
    }

    fn notify_error(&self, message: &str) {
        eprintln!("\n[error] {}", message);
    }
}

/// Interactive loop: one submission per input line until EOF.
pub async fn run_terminal(
    config: WidgetConfig,
    filter: Arc<dyn TextFilter>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("Starting terminal chat against {}", config.endpoint);
    let view = Arc::new(TerminalView::new("AIC"));
    let widget = ChatWidget::with_filter(config, view.clone(), filter);
    for message in widget.conversation().await.messages.iter() {
        view.message_added(message);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        widget.set_input(&line).await;
        // errors were already shown by the view
        if let Ok(Some(_)) = widget.submit().await {
            println!();
        }
    }

    info!("Input closed, leaving chat");
    Ok(())
}
