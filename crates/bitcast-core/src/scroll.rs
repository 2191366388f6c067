//! Turns scroll positions into "load the next page" signals.
//!
//! The trigger itself is a small pure state machine ([`ScrollTrigger`]).
//! [`attach`] wires it to a [`FeedQueryEngine`]: the view pushes positions
//! through a [`ScrollHandle`] and a listener task owned by a
//! [`Subscription`] evaluates only the latest one.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::feed::FeedQueryEngine;
use crate::subscription::Subscription;

/// Distance from the bottom, in pixels, at which the next page is requested
pub const DEFAULT_THRESHOLD_PX: f64 = 200.0;

/// Viewport geometry at one scroll position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub viewport_height: f64,
    pub scroll_top: f64,
    pub content_height: f64,
}

impl ScrollMetrics {
    pub fn new(viewport_height: f64, scroll_top: f64, content_height: f64) -> Self {
        Self {
            viewport_height,
            scroll_top,
            content_height,
        }
    }

    /// Pixels between the bottom of the viewport and the end of the content
    pub fn distance_to_bottom(&self) -> f64 {
        self.content_height - (self.viewport_height + self.scroll_top)
    }
}

/// Fires once each time the view enters the threshold zone.
///
/// While a load is locked the trigger stays armed, so the next scroll
/// signal retries. After firing it re-arms when the view leaves the zone
/// or the content grows.
#[derive(Debug, Clone)]
pub struct ScrollTrigger {
    threshold: f64,
    armed: bool,
    content_height: f64,
}

impl ScrollTrigger {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            armed: true,
            content_height: 0.0,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether this position should request the next page.
    pub fn evaluate(&mut self, metrics: &ScrollMetrics, locked: bool) -> bool {
        if metrics.content_height > self.content_height {
            self.armed = true;
        }
        self.content_height = metrics.content_height;

        if metrics.distance_to_bottom() >= self.threshold {
            self.armed = true;
            return false;
        }
        if locked || !self.armed {
            return false;
        }

        self.armed = false;
        true
    }
}

impl Default for ScrollTrigger {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_PX)
    }
}

/// Sending half held by the view.
#[derive(Debug, Clone)]
pub struct ScrollHandle {
    tx: watch::Sender<Option<ScrollMetrics>>,
}

impl ScrollHandle {
    /// Report the current scroll position.
    ///
    /// Returns `false` once the observer has been detached.
    pub fn notify_on_scroll(&self, metrics: ScrollMetrics) -> bool {
        self.tx.send(Some(metrics)).is_ok()
    }
}

/// Observe scroll positions and call `load_more` on the engine.
///
/// Dropping the returned [`Subscription`] stops the observer.
pub fn attach(engine: Arc<FeedQueryEngine>, threshold: f64) -> (ScrollHandle, Subscription) {
    let (tx, mut rx) = watch::channel(None::<ScrollMetrics>);

    let subscription = Subscription::spawn("scroll-trigger", async move {
        let mut trigger = ScrollTrigger::new(threshold);
        while rx.changed().await.is_ok() {
            let latest = *rx.borrow_and_update();
            let Some(metrics) = latest else {
                continue;
            };
            if trigger.evaluate(&metrics, engine.is_loading()) {
                debug!(
                    distance = metrics.distance_to_bottom(),
                    "Scroll threshold reached"
                );
                engine.load_more().await;
            }
        }
    });

    (ScrollHandle { tx }, subscription)
}
