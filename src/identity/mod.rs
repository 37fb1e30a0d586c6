//! Outbound identity rotation.
//!
//! The trend service blocks addresses that query it too often. Before that
//! happens (and whenever it does) the scorer asks for a fresh egress identity
//! through the local anonymizing proxy and waits until the externally observed
//! address has actually changed.
//!
//! # Architecture
//!
//! - [`ProxyController`]: sends the new-identity signal ([`tor::TorController`])
//! - [`AddressProbe`]: observes the current external address ([`probe::HttpAddressProbe`])
//! - [`IdentityRotator`]: combines both with a settle interval and a retry policy
//! - [`IdentityRotation`]: what the scorer depends on

pub mod probe;
pub mod tor;

use crate::backoff::{Clock, RetryPolicy};
use crate::errors::RotationError;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Something that can request a new egress identity.
pub trait ProxyController {
    async fn new_identity(&self) -> Result<(), RotationError>;
}

/// Something that can report the externally observed address.
pub trait AddressProbe {
    async fn observe(&self) -> Result<IpAddr, RotationError>;
}

/// A confirmed identity change, as seen by the trend scorer.
pub trait IdentityRotation {
    /// Returns once a new identity is confirmed, or
    /// [`RotationError::Exhausted`] when the retry budget is spent.
    async fn rotate(&self) -> Result<(), RotationError>;
}

/// Requests a new identity and verifies the external address changed.
pub struct IdentityRotator<P, A, C> {
    controller: P,
    probe: A,
    clock: C,
    /// Wait between the signal and the re-observation.
    settle: Duration,
    /// `max_attempts` bounds controller calls; `delay_for` is the extra wait
    /// after an attempt that did not confirm a change.
    policy: RetryPolicy,
}

impl<P, A, C> IdentityRotator<P, A, C>
where
    P: ProxyController,
    A: AddressProbe,
    C: Clock,
{
    pub fn new(controller: P, probe: A, clock: C, settle: Duration, policy: RetryPolicy) -> Self {
        Self {
            controller,
            probe,
            clock,
            settle,
            policy,
        }
    }
}

impl<P, A, C> std::fmt::Debug for IdentityRotator<P, A, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityRotator")
            .field("settle", &self.settle)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<P, A, C> IdentityRotation for IdentityRotator<P, A, C>
where
    P: ProxyController,
    A: AddressProbe,
    C: Clock,
{
    /// Request a new identity until the external address is seen to change.
    ///
    /// Each attempt sends the signal, waits the settle interval and observes
    /// the address again. Attempts that do not confirm a change are followed
    /// by `policy.delay_for(attempt)`, except the last one.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::Exhausted`] after `policy.max_attempts`
    /// unconfirmed attempts. Controller and probe errors are only logged; they
    /// count as failed attempts.
    #[instrument(level = "info", skip_all)]
    async fn rotate(&self) -> Result<(), RotationError> {
        let t0 = Instant::now();
        let max = self.policy.max_attempts;

        // Without a baseline the change check is skipped: any address observed
        // after a successful signal counts as the new identity.
        let previous = match self.probe.observe().await {
            Ok(addr) => {
                debug!(%addr, "Observed current external address");
                Some(addr)
            }
            Err(e) => {
                warn!(error = %e, "Could not observe current address; change check skipped");
                None
            }
        };

        for attempt in 1..=max {
            match self.controller.new_identity().await {
                Ok(()) => {
                    self.clock.sleep(self.settle).await;
                    match self.probe.observe().await {
                        Ok(addr) if previous == Some(addr) => {
                            warn!(attempt, max, %addr, "Address unchanged after new-identity signal");
                        }
                        Ok(addr) => {
                            info!(
                                attempt,
                                previous = ?previous,
                                %addr,
                                elapsed_ms = t0.elapsed().as_millis() as u64,
                                "Identity rotated"
                            );
                            return Ok(());
                        }
                        Err(e) => {
                            warn!(attempt, max, error = %e, "Could not observe address after rotation");
                        }
                    }
                }
                Err(e) => {
                    warn!(attempt, max, error = %e, "New-identity signal failed");
                }
            }

            if attempt < max {
                self.clock.sleep(self.policy.delay_for(attempt)).await;
            }
        }

        error!(
            attempts = max,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Identity rotation exhausted retries"
        );
        Err(RotationError::Exhausted { attempts: max })
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Controller that counts signals and can fail the first `failures` of them.
    #[derive(Debug, Default)]
    pub struct CountingController {
        pub calls: AtomicUsize,
        pub failures: usize,
    }

    impl CountingController {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ProxyController for &CountingController {
        async fn new_identity(&self) -> Result<(), RotationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(RotationError::Control("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    /// Probe replaying a script of observations; repeats the last one when exhausted.
    #[derive(Debug)]
    pub struct ScriptedProbe {
        script: Mutex<VecDeque<Option<IpAddr>>>,
        last: Mutex<Option<IpAddr>>,
    }

    impl ScriptedProbe {
        pub fn new(script: &[Option<&str>]) -> Self {
            Self {
                script: Mutex::new(
                    script
                        .iter()
                        .map(|s| s.map(|a| a.parse::<IpAddr>().unwrap()))
                        .collect(),
                ),
                last: Mutex::new(None),
            }
        }
    }

    impl AddressProbe for ScriptedProbe {
        async fn observe(&self) -> Result<IpAddr, RotationError> {
            let next = match self.script.lock().unwrap().pop_front() {
                Some(step) => {
                    *self.last.lock().unwrap() = step;
                    step
                }
                None => *self.last.lock().unwrap(),
            };
            next.ok_or_else(|| RotationError::Probe("timed out".into()))
        }
    }

    /// Rotation that counts calls; fails every call when `fail` is set.
    #[derive(Debug, Default)]
    pub struct CountingRotation {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl CountingRotation {
        pub fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl IdentityRotation for &CountingRotation {
        async fn rotate(&self) -> Result<(), RotationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(RotationError::Exhausted { attempts: 3 })
            } else {
                Ok(())
            }
        }
    }
}
