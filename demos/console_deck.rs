//! Drive one virtual key from the terminal.
//!
//! Run with:
//! ```sh
//! ECOFLOW_ACCESS_KEY=... ECOFLOW_SECRET_KEY=... cargo run --example console_deck
//! ```
//!
//! The key image is written to `key.html` (open it in a browser). Press
//! Enter to simulate a key press, Ctrl-C to quit.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use eco_power_deck::{DisplaySink, EcoFlowClient, Error, PollController, Settings};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const CONTEXT: &str = "console";

/// Writes the key image into an HTML page and prints titles.
struct HtmlFileSink {
    path: PathBuf,
}

#[async_trait]
impl DisplaySink for HtmlFileSink {
    async fn set_image(&self, image: Option<&str>) -> Result<(), Error> {
        let html = match image {
            Some(src) => format!(
                "<!DOCTYPE html><html><body style=\"background:#000\">\
                 <meta http-equiv=\"refresh\" content=\"5\">\
                 <img src=\"{}\" width=\"144\" height=\"144\"></body></html>",
                src
            ),
            None => String::new(),
        };
        tokio::fs::write(&self.path, html)
            .await
            .map_err(|e| Error::Sink(format!("Failed to write {}: {}", self.path.display(), e)))
    }

    async fn set_title(&self, title: Option<&str>) -> Result<(), Error> {
        if let Some(title) = title {
            println!("[{}] {}", CONTEXT, title.replace('\n', " "));
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings {
        poll_interval: std::env::var("POLL_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok()),
    };

    let controller = PollController::from_result(EcoFlowClient::from_env());
    let sink = Arc::new(HtmlFileSink {
        path: PathBuf::from("key.html"),
    });

    controller
        .will_appear(CONTEXT, sink.clone(), &settings)
        .await;
    println!("Writing key image to key.html - Enter refreshes, Ctrl-C quits");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line {
                Ok(Some(_)) => controller.key_down(CONTEXT, sink.clone()).await,
                _ => break,
            },
        }
    }

    controller.will_disappear(CONTEXT).await;
}
