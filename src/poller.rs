//! fixed-interval shadow poller.
//!
//! the poller writes a reading only when the TRH event time moves. the very
//! first snapshot after start only sets the baseline, so a restart does not
//! re-insert the reading the previous run already stored.

use crate::extract::{extract, trh_event_time};
use crate::shadow::ShadowSource;
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub enum PollState {
    /// nothing observed since start
    AwaitingBaseline,
    /// last TRH event time seen; may be None if the device never sent one
    Steady { last_seen: Option<String> },
}

/// what one tick did
#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    FetchFailed,
    Baseline,
    Unchanged,
    Persisted(i64),
    ParseFailed,
    StoreFailed,
}

pub struct Poller<S> {
    source: Arc<S>,
    store: Store,
    state: PollState,
    show_sensor_data: bool,
}

impl<S: ShadowSource> Poller<S> {
    pub fn new(source: Arc<S>, store: Store) -> Self {
        Self {
            source,
            store,
            state: PollState::AwaitingBaseline,
            show_sensor_data: false,
        }
    }

    pub fn with_sensor_echo(mut self, enabled: bool) -> Self {
        self.show_sensor_data = enabled;
        self
    }

    #[allow(dead_code)]
    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub async fn tick(&mut self) -> PollOutcome {
        let snapshot = match self.source.fetch().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(error = %err, "shadow fetch failed; skipping cycle");
                return PollOutcome::FetchFailed;
            }
        };
        let current = trh_event_time(&snapshot).map(str::to_string);

        let current = match &self.state {
            PollState::AwaitingBaseline => {
                tracing::info!(event_time = ?current, "baseline recorded");
                self.state = PollState::Steady { last_seen: current };
                return PollOutcome::Baseline;
            }
            PollState::Steady { last_seen } => match current {
                Some(ts) if last_seen.as_deref() != Some(ts.as_str()) => ts,
                _ => return PollOutcome::Unchanged,
            },
        };

        let reading = match extract(&snapshot) {
            Ok(reading) => reading,
            Err(err) => {
                tracing::warn!(error = %err, event_time = %current, "unreadable snapshot; skipping cycle");
                return PollOutcome::ParseFailed;
            }
        };

        let row = reading.clone();
        match self.store.run(move |store| store.append(&row)).await {
            Ok(id) => {
                if self.show_sensor_data {
                    tracing::info!(
                        id,
                        event_time = %current,
                        temperature = ?reading.temperature,
                        humidity = ?reading.humidity,
                        vis = ?reading.vis.present(),
                        nir = ?reading.nir.present(),
                        "reading saved"
                    );
                } else {
                    tracing::debug!(id, event_time = %current, "reading saved");
                }
                self.state = PollState::Steady {
                    last_seen: Some(current),
                };
                PollOutcome::Persisted(id)
            }
            Err(err) => {
                tracing::error!(error = %err, event_time = %current, "failed to save reading");
                PollOutcome::StoreFailed
            }
        }
    }

    /// poll forever, sleeping `interval` between ticks
    pub async fn run(mut self, interval: Duration) {
        tracing::info!(interval_s = interval.as_secs(), "starting shadow polling");
        loop {
            let outcome = self.tick().await;
            tracing::trace!(?outcome, "poll cycle finished");
            tokio::time::sleep(interval).await;
        }
    }
}
