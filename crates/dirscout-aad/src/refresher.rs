//! Proactive access-token renewal behind a readiness gate.
//!
//! A [`CredentialRefresher`] owns one token for one audience. A background
//! task sleeps until [`RENEWAL_MARGIN`] before expiry, clears the gate,
//! obtains a replacement and sets the gate again. Crawlers call
//! [`ReadinessGate::ready`] before every request, so no request is ever
//! built with a token the refresher considers stale.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{AadError, AadResult, AccessToken, TokenProvider};

/// How long before expiry a token is renewed.
pub const RENEWAL_MARGIN: Duration = Duration::from_secs(15);

/// Interval between attempts when renewal yields no usable token.
pub const RENEWAL_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Source of wall-clock time for expiry arithmetic.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Delay until the renewal of a token expiring at `expires_on` should start.
///
/// Clamped to zero when the margin has already passed.
#[must_use]
pub fn renewal_delay(expires_on: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let margin = chrono::Duration::from_std(RENEWAL_MARGIN).unwrap_or_default();
    (expires_on - now - margin).to_std().unwrap_or(Duration::ZERO)
}

#[derive(Debug, Clone)]
enum GateState {
    Renewing,
    Ready(Arc<AccessToken>),
    Stopped,
}

/// Read side of a refresher's gate. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    rx: watch::Receiver<GateState>,
}

impl ReadinessGate {
    /// Suspends until a usable token is published and returns it.
    ///
    /// # Errors
    ///
    /// Returns `AadError::Auth` once the owning refresher has been cancelled
    /// or dropped.
    pub async fn ready(&self) -> AadResult<Arc<AccessToken>> {
        let mut rx = self.rx.clone();
        let state = rx
            .wait_for(|state| !matches!(state, GateState::Renewing))
            .await
            .map_err(|_| stopped())?;

        match &*state {
            GateState::Ready(token) => Ok(Arc::clone(token)),
            GateState::Renewing | GateState::Stopped => Err(stopped()),
        }
    }

    /// True while a usable token is published.
    #[must_use]
    pub fn is_set(&self) -> bool {
        matches!(*self.rx.borrow(), GateState::Ready(_))
    }
}

fn stopped() -> AadError {
    AadError::Auth("credential refresher is no longer running".to_string())
}

/// Owns one token for one audience and keeps it fresh until cancelled.
#[derive(Debug)]
pub struct CredentialRefresher {
    sender: Arc<watch::Sender<GateState>>,
    task: JoinHandle<()>,
}

impl CredentialRefresher {
    /// Acquires the initial token and starts the renewal task.
    ///
    /// # Errors
    ///
    /// Propagates the provider's error if the initial token cannot be
    /// obtained. This is not retried.
    pub async fn start(
        provider: Arc<dyn TokenProvider>,
        audience: impl Into<String>,
        label: impl Into<String>,
    ) -> AadResult<Self> {
        Self::start_with_clock(provider, audience, label, Arc::new(SystemClock)).await
    }

    /// Like [`CredentialRefresher::start`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Propagates the provider's error for the initial token.
    pub async fn start_with_clock(
        provider: Arc<dyn TokenProvider>,
        audience: impl Into<String>,
        label: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> AadResult<Self> {
        let audience = audience.into();
        let label = label.into();

        let initial = provider.get_token(&audience).await?;
        let usable = initial.is_usable_at(clock.now());

        let (tx, _rx) = watch::channel(GateState::Renewing);
        let sender = Arc::new(tx);

        let initial = Arc::new(initial);
        if usable {
            publish(&sender, GateState::Ready(Arc::clone(&initial)));
        } else {
            warn!(type_name = %label, expires_on = %initial.expires_on, "initial access token already expired");
        }

        let renewal = Renewal {
            provider,
            audience,
            label,
            clock,
            sender: Arc::clone(&sender),
        };
        let task = tokio::spawn(async move {
            let current = if usable {
                initial
            } else {
                tokio::time::sleep(RENEWAL_RETRY_INTERVAL).await;
                let token = renewal.acquire_usable().await;
                publish(&renewal.sender, GateState::Ready(Arc::clone(&token)));
                token
            };
            renewal.run(current).await;
        });

        Ok(Self { sender, task })
    }

    /// Returns a new reader of this refresher's gate.
    #[must_use]
    pub fn gate(&self) -> ReadinessGate {
        ReadinessGate {
            rx: self.sender.subscribe(),
        }
    }

    /// Stops renewal immediately. Pending and future waiters get an error.
    pub fn cancel(&self) {
        self.task.abort();
        self.sender.send_replace(GateState::Stopped);
    }
}

impl Drop for CredentialRefresher {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Publishes a new state unless the gate has been stopped.
fn publish(sender: &watch::Sender<GateState>, next: GateState) {
    sender.send_if_modified(|state| {
        if matches!(state, GateState::Stopped) {
            return false;
        }
        *state = next;
        true
    });
}

struct Renewal {
    provider: Arc<dyn TokenProvider>,
    audience: String,
    label: String,
    clock: Arc<dyn Clock>,
    sender: Arc<watch::Sender<GateState>>,
}

impl Renewal {
    async fn run(&self, mut current: Arc<AccessToken>) {
        loop {
            let delay = renewal_delay(current.expires_on, self.clock.now());
            debug!(type_name = %self.label, ?delay, "scheduled token renewal");
            tokio::time::sleep(delay).await;

            publish(&self.sender, GateState::Renewing);
            info!(type_name = %self.label, "waiting for new access token for {}", self.label);

            current = self.acquire_usable().await;
            publish(&self.sender, GateState::Ready(Arc::clone(&current)));
            info!(type_name = %self.label, "access token renewed, resuming enumeration");
        }
    }

    /// Requests tokens until one with positive remaining lifetime arrives.
    async fn acquire_usable(&self) -> Arc<AccessToken> {
        loop {
            match self.provider.get_token(&self.audience).await {
                Ok(token) if token.is_usable_at(self.clock.now()) => return Arc::new(token),
                Ok(token) => warn!(
                    type_name = %self.label,
                    expires_on = %token.expires_on,
                    "received an expired access token, retrying"
                ),
                Err(e) => warn!(type_name = %self.label, error = %e, "token renewal failed, retrying"),
            }
            tokio::time::sleep(RENEWAL_RETRY_INTERVAL).await;
        }
    }
}
