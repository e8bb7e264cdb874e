//! Polling lifecycle for deck keys.
//!
//! A [`PollController`] owns one repeating timer and a set of visible keys.
//! The host adapter forwards its lifecycle callbacks:
//!
//! | Host event        | Controller call                       |
//! |-------------------|---------------------------------------|
//! | key appears       | [`PollController::will_appear`]       |
//! | key disappears    | [`PollController::will_disappear`]    |
//! | key pressed       | [`PollController::key_down`]          |
//! | settings changed  | [`PollController::did_receive_settings`] |
//!
//! Every poll renders onto the *current* key: the one that appeared or was
//! pressed most recently. Key presses and timer ticks are not serialized, so
//! whichever render finishes last wins.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use eco_power_deck::{EcoFlowClient, PollController, Settings};
//!
//! let controller = PollController::from_result(EcoFlowClient::from_env());
//! controller
//!     .will_appear("key-context", Arc::new(my_sink), &Settings::default())
//!     .await;
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};

use crate::client::PowerSource;
use crate::error::{Error, API_ERROR_LABEL, CONNECTION_ERROR_LABEL};
use crate::power::Settings;
use crate::render::{render_status_svg, svg_data_uri};

/// Where a key's image and title end up.
///
/// Implemented by the host adapter; `None` clears the value.
#[async_trait]
pub trait DisplaySink: Send + Sync {
    /// Set the key image (a `data:` URI).
    async fn set_image(&self, image: Option<&str>) -> Result<(), Error>;

    /// Set the key title.
    async fn set_title(&self, title: Option<&str>) -> Result<(), Error>;
}

/// Drives polling and rendering for all visible keys of one action.
#[derive(Clone)]
pub struct PollController {
    inner: Arc<Inner>,
}

struct Inner {
    source: Option<Arc<dyn PowerSource>>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    instances: BTreeMap<String, Arc<dyn DisplaySink>>,
    current: Option<String>,
    timer: Option<PollTimer>,
}

/// Handle to the running timer task. Dropping it stops the task after any
/// in-flight poll finishes.
struct PollTimer {
    period: Duration,
    _stop: oneshot::Sender<()>,
}

impl PollController {
    /// Create a controller polling `source`.
    pub fn new(source: Arc<dyn PowerSource>) -> Self {
        Self::with_source(Some(source))
    }

    /// Create a controller whose source failed to initialize.
    ///
    /// Every poll shows the persistent `"API Error"` title.
    pub fn without_source() -> Self {
        Self::with_source(None)
    }

    /// Create a controller from a fallible source constructor.
    pub fn from_result<S>(source: Result<S, Error>) -> Self
    where
        S: PowerSource + 'static,
    {
        match source {
            Ok(source) => Self::new(Arc::new(source)),
            Err(e) => {
                tracing::error!("Failed to initialize EcoFlow API: {}", e);
                Self::without_source()
            }
        }
    }

    fn with_source(source: Option<Arc<dyn PowerSource>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// A key became visible.
    ///
    /// Starts the timer if none is running, makes the key the current
    /// target and polls once immediately.
    pub async fn will_appear(
        &self,
        context: impl Into<String>,
        sink: Arc<dyn DisplaySink>,
        settings: &Settings,
    ) {
        let context = context.into();
        {
            let mut state = self.inner.state.lock();
            if state.timer.is_none() {
                state.timer = Some(start_timer(&self.inner, settings.poll_period()));
            }
            state.instances.insert(context.clone(), sink);
            state.current = Some(context);
        }

        self.inner.refresh().await;
    }

    /// A key is no longer visible.
    ///
    /// Polling stops once the last visible key is gone.
    pub async fn will_disappear(&self, context: &str) {
        let mut state = self.inner.state.lock();
        state.instances.remove(context);

        if state.current.as_deref() == Some(context) {
            state.current = state.instances.keys().next().cloned();
        }

        if state.instances.is_empty() {
            stop_timer(&mut state);
        }
    }

    /// A key was pressed: poll immediately.
    ///
    /// Only keys that appeared (and have not disappeared since) are
    /// tracked; a press from any other key is ignored so it can never keep
    /// the timer alive.
    pub async fn key_down(&self, context: impl Into<String>, sink: Arc<dyn DisplaySink>) {
        let context = context.into();
        {
            let mut state = self.inner.state.lock();
            match state.instances.get_mut(&context) {
                Some(registered) => *registered = sink,
                None => {
                    tracing::debug!("Ignoring key press from unknown key {}", context);
                    return;
                }
            }
            state.current = Some(context);
        }

        self.inner.refresh().await;
    }

    /// New settings arrived; restart the timer if polling.
    pub async fn did_receive_settings(&self, context: &str, settings: &Settings) {
        let mut state = self.inner.state.lock();
        if state.timer.is_none() {
            tracing::debug!("Ignoring settings for {} while not polling", context);
            return;
        }

        stop_timer(&mut state);
        state.timer = Some(start_timer(&self.inner, settings.poll_period()));
    }

    /// Poll once and render onto the current key.
    pub async fn refresh(&self) {
        self.inner.refresh().await;
    }

    /// Stop polling and forget every key.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.instances.clear();
        state.current = None;
        stop_timer(&mut state);
    }

    pub fn is_polling(&self) -> bool {
        self.inner.state.lock().timer.is_some()
    }

    /// Period of the running timer.
    pub fn poll_period(&self) -> Option<Duration> {
        self.inner.state.lock().timer.as_ref().map(|t| t.period)
    }

    /// The key polls currently render onto.
    pub fn current_context(&self) -> Option<String> {
        self.inner.state.lock().current.clone()
    }

    pub fn visible_count(&self) -> usize {
        self.inner.state.lock().instances.len()
    }
}

impl Inner {
    fn current_sink(&self) -> Option<Arc<dyn DisplaySink>> {
        let state = self.state.lock();
        state
            .current
            .as_ref()
            .and_then(|context| state.instances.get(context))
            .cloned()
    }

    async fn refresh(&self) {
        let Some(source) = &self.source else {
            if let Some(sink) = self.current_sink() {
                report(sink.set_title(Some(API_ERROR_LABEL)).await);
            }
            return;
        };

        if self.current_sink().is_none() {
            tracing::debug!("No visible key, skipping poll");
            return;
        }

        let result = source.power_status().await;

        // The target may have changed while the fetch was in flight
        let Some(sink) = self.current_sink() else {
            return;
        };

        match result {
            Ok(status) => {
                let image = svg_data_uri(&render_status_svg(&status));
                report(sink.set_title(None).await);
                report(sink.set_image(Some(&image)).await);
                tracing::info!(
                    "Updated power data: Gen={}W, Load={}W",
                    status.generation.current,
                    status.consumption.total
                );
            }
            Err(e) => {
                tracing::error!(
                    transient = e.is_transient(),
                    "Failed to get power status: {}",
                    e
                );
                report(sink.set_image(None).await);
                report(sink.set_title(Some(CONNECTION_ERROR_LABEL)).await);
            }
        }
    }
}

fn report(result: Result<(), Error>) {
    if let Err(e) = result {
        tracing::warn!("Display update failed: {}", e);
    }
}

fn start_timer(inner: &Arc<Inner>, period: Duration) -> PollTimer {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let weak: Weak<Inner> = Arc::downgrade(inner);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {}
            }

            let Some(inner) = weak.upgrade() else {
                break;
            };
            inner.refresh().await;
        }
    });

    tracing::info!("Started EcoFlow power polling every {:?}", period);
    PollTimer {
        period,
        _stop: stop_tx,
    }
}

fn stop_timer(state: &mut State) {
    if state.timer.take().is_some() {
        tracing::info!("Stopped EcoFlow power polling");
    }
}
