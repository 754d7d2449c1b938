//! # Configuration Bridge
//!
//! Turns configuration property changes into rate setter calls.
//!
//! ```text
//!     config layer ──► PropertyChange { name, value }
//!                              │
//!                              ▼
//!                       ConfigBridge::handle
//!                              │
//!        ┌─────────────────────┼──────────────────────┐
//!        ▼                     ▼                      ▼
//!   max.inapp.message.rate  max.push.message.rate  anything else
//!   set_in_app_msg_rate     set_push_msg_rate      ignored
//! ```
//!
//! Configuration loading belongs to the embedding application. It either
//! calls [`ConfigBridge::handle`] inline, or sends changes over an `mpsc`
//! channel to a watcher thread started with [`ConfigBridge::spawn`].

use super::{
    channel::Channel,
    clock::Clock,
    error::ThrottleResult,
    service::RateLimiterService,
};
use std::io;
use std::ops::Deref;
use std::sync::mpsc;
use std::thread;
use tracing::{debug, info, warn};

/// A configuration property that changed, with its new integer value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChange {
    /// Property name, e.g. `max.push.message.rate`.
    pub name: String,
    /// New value.
    pub value: i64,
}

impl PropertyChange {
    /// Creates a change notification.
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Change of `channel`'s rate property.
    pub fn rate(channel: Channel, value: i64) -> Self {
        Self::new(channel.property_key(), value)
    }
}

/// What [`ConfigBridge::handle`] did with a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// The property named a channel rate and the new rate is in effect.
    Applied(Channel),
    /// The property is not a rate property; nothing was touched.
    Ignored,
}

/// Tally returned by a watcher thread when its channel closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeReport {
    /// Rate changes applied.
    pub applied: u64,
    /// Unrelated properties skipped.
    pub ignored: u64,
    /// Rate changes refused with `InvalidRate`.
    pub rejected: u64,
}

impl BridgeReport {
    /// Total notifications received.
    pub fn total(&self) -> u64 {
        self.applied + self.ignored + self.rejected
    }
}

/// Routes property changes to a [`RateLimiterService`].
///
/// Holds anything that dereferences to the service: `&'static` from
/// [`RateLimiterService::global`], an `Arc`, or a plain reference for
/// inline use.
///
/// # Example
///
/// ```rust
/// use dispatch_throttle::{BridgeOutcome, Channel, ConfigBridge, PropertyChange, RateLimiterService};
/// use std::sync::{mpsc, Arc};
///
/// let service = Arc::new(RateLimiterService::new());
/// let bridge = ConfigBridge::new(service.clone());
///
/// let outcome = bridge.handle(&PropertyChange::new("max.push.message.rate", 5)).unwrap();
/// assert_eq!(outcome, BridgeOutcome::Applied(Channel::Push));
///
/// let (tx, rx) = mpsc::channel();
/// let watcher = bridge.spawn(rx).unwrap();
/// tx.send(PropertyChange::new("max.inapp.message.rate", 20)).unwrap();
/// drop(tx);
///
/// let report = watcher.join().unwrap();
/// assert_eq!(report.applied, 1);
/// assert_eq!(service.rate(Channel::InApp), 20);
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBridge<S> {
    service: S,
}

impl<S, C> ConfigBridge<S>
where
    S: Deref<Target = RateLimiterService<C>>,
    C: Clock,
{
    /// Creates a bridge feeding `service`.
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// Applies one change.
    ///
    /// A recognized rate property calls the matching setter; any other
    /// name is ignored without touching the service.
    ///
    /// # Errors
    ///
    /// [`ThrottleError::InvalidRate`](crate::ThrottleError::InvalidRate)
    /// from the setter. The channel keeps its previous rate.
    pub fn handle(&self, change: &PropertyChange) -> ThrottleResult<BridgeOutcome> {
        let Some(channel) = Channel::from_property(&change.name) else {
            return Ok(BridgeOutcome::Ignored);
        };

        self.service.set_rate(channel, change.value)?;
        debug!("Applied property {}={}", change.name, change.value);
        Ok(BridgeOutcome::Applied(channel))
    }

    /// Starts a watcher thread applying every change received on `changes`.
    ///
    /// The thread exits once every sender has been dropped and returns a
    /// [`BridgeReport`]. Invalid rates are logged and counted; they do not
    /// stop the watcher.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(
        self,
        changes: mpsc::Receiver<PropertyChange>,
    ) -> io::Result<thread::JoinHandle<BridgeReport>>
    where
        S: Send + 'static,
        C: 'static,
    {
        thread::Builder::new()
            .name("throttle-config-bridge".to_string())
            .spawn(move || {
                info!("Started config bridge thread");

                let mut report = BridgeReport::default();
                while let Ok(change) = changes.recv() {
                    match self.handle(&change) {
                        Ok(BridgeOutcome::Applied(_)) => report.applied += 1,
                        Ok(BridgeOutcome::Ignored) => report.ignored += 1,
                        Err(err) => {
                            warn!("Config bridge dropped property {}: {}", change.name, err);
                            report.rejected += 1;
                        }
                    }
                }

                info!(
                    "Config bridge thread stopping (applied: {}, ignored: {}, rejected: {})",
                    report.applied, report.ignored, report.rejected
                );
                report
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::channel::{IN_APP_RATE_PROPERTY, PUSH_RATE_PROPERTY};
    use crate::rate_limiter::config::ThrottleConfig;
    use crate::ThrottleError;
    use std::sync::Arc;

    fn service() -> Arc<RateLimiterService> {
        Arc::new(RateLimiterService::with_config(ThrottleConfig::new(10, 10)).unwrap())
    }

    #[test]
    fn test_recognized_properties_call_setters() {
        let service = service();
        let bridge = ConfigBridge::new(service.clone());

        assert_eq!(
            bridge.handle(&PropertyChange::new(IN_APP_RATE_PROPERTY, 3)),
            Ok(BridgeOutcome::Applied(Channel::InApp))
        );
        assert_eq!(
            bridge.handle(&PropertyChange::rate(Channel::Push, 0)),
            Ok(BridgeOutcome::Applied(Channel::Push))
        );

        assert_eq!(service.rate(Channel::InApp), 3);
        assert_eq!(service.rate(Channel::Push), 0);
    }

    #[test]
    fn test_unknown_properties_are_ignored() {
        let service = service();
        let bridge = ConfigBridge::new(&*service);

        for name in ["", "mmx.external.service.port", "max.inapp.message.rate "] {
            assert_eq!(
                bridge.handle(&PropertyChange::new(name, -1)),
                Ok(BridgeOutcome::Ignored)
            );
        }
        assert_eq!(service.stats().in_app.total_reconfigurations, 0);
        assert_eq!(service.stats().push.total_reconfigurations, 0);
    }

    #[test]
    fn test_invalid_rate_is_reported() {
        let service = service();
        let bridge = ConfigBridge::new(service.clone());

        let result = bridge.handle(&PropertyChange::new(PUSH_RATE_PROPERTY, -5));
        assert!(matches!(result, Err(ThrottleError::InvalidRate { rate: -5, .. })));
        assert_eq!(service.rate(Channel::Push), 10);
    }

    #[test]
    fn test_watcher_thread_drains_until_senders_drop() {
        let service = service();
        let (tx, rx) = mpsc::channel();
        let watcher = ConfigBridge::new(service.clone()).spawn(rx).unwrap();

        let producer = {
            let tx = tx.clone();
            thread::spawn(move || {
                tx.send(PropertyChange::new(PUSH_RATE_PROPERTY, 40)).unwrap();
                tx.send(PropertyChange::new("unrelated", 1)).unwrap();
            })
        };
        tx.send(PropertyChange::new(IN_APP_RATE_PROPERTY, -1)).unwrap();
        tx.send(PropertyChange::new(IN_APP_RATE_PROPERTY, 25)).unwrap();
        producer.join().unwrap();
        drop(tx);

        let report = watcher.join().unwrap();
        assert_eq!(
            report,
            BridgeReport {
                applied: 2,
                ignored: 1,
                rejected: 1,
            }
        );
        assert_eq!(report.total(), 4);
        assert_eq!(service.rate(Channel::Push), 40);
        assert_eq!(service.rate(Channel::InApp), 25);
    }
}
