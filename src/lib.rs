//! # eco-power-deck
//!
//! Live solar generation and household load from the
//! [EcoFlow](https://developer.ecoflow.com) cloud, rendered onto a
//! button-deck key.
//!
//! The crate is split into three layers:
//! - **Client**: a signed EcoFlow IoT open API client ([`EcoFlowClient`])
//! - **Render**: a pure SVG glyph for a 100x100 key ([`render`])
//! - **Controller**: one repeating poll timer bound to host lifecycle
//!   events ([`PollController`]), pushing images into a [`DisplaySink`]
//!
//! The host integration (plugin SDK, manifest, websocket protocol) lives
//! outside this crate: an adapter implements [`DisplaySink`] for its key
//! handle and forwards lifecycle callbacks to the controller.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use eco_power_deck::{EcoFlowClient, PollController, Settings};
//!
//! // ECOFLOW_ACCESS_KEY / ECOFLOW_SECRET_KEY from the developer portal
//! let controller = PollController::from_result(EcoFlowClient::from_env());
//!
//! // On "willAppear"
//! controller.will_appear(context, Arc::new(key_sink), &settings).await;
//!
//! // On "keyDown"
//! controller.key_down(context, Arc::new(key_sink)).await;
//! ```
//!
//! ## Readings
//!
//! EcoFlow micro-inverters and smart plugs report power in tenths of a
//! watt. [`PowerStatus`] keeps the reported values; the renderer divides by
//! [`READING_SCALE`] for display.

pub mod client;
pub mod config;
pub mod controller;
mod error;
mod power;
pub mod render;
pub mod sign;

pub use client::{Device, EcoFlowClient, PowerSource};
pub use config::ClientConfig;
pub use controller::{DisplaySink, PollController};
pub use error::{Error, API_ERROR_LABEL, CONNECTION_ERROR_LABEL};
pub use power::{Consumption, Generation, PowerStatus, Settings, Summary};
pub use render::{render_power_svg, svg_data_uri};

/// EcoFlow IoT open API host
pub const API_BASE_URL: &str = "https://api.ecoflow.com";

/// HTTP request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Polling interval when the key has no setting
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Shortest polling interval a key can configure
pub const MIN_POLL_INTERVAL_SECS: u64 = 1;

/// Longest polling interval a key can configure (one day)
pub const MAX_POLL_INTERVAL_SECS: u64 = 86_400;

/// Key canvas width and height in pixels
pub const CANVAS_SIZE: u32 = 100;

/// Reported readings per watt
pub const READING_SCALE: f64 = 10.0;

/// Load that maps to 100 units of bar width
pub const LOAD_REFERENCE_WATTS: f64 = 800.0;

/// Width of the load bar track
pub const LOAD_BAR_MAX_WIDTH: f64 = 80.0;
