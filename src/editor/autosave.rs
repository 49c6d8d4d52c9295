//! Debounced autosave of the full stop list.
//!
//! Every edit hands the autosaver a snapshot of the whole list. The snapshots
//! go through a `watch` channel so only the newest one is kept, and a single
//! quiet-period timer restarts on each of them. When the timer runs out the
//! newest snapshot is sent as one "replace all stops" request.
//!
//! Issued saves are numbered. A response for anything but the newest issued
//! save is dropped, failed saves are retried with exponential backoff until a
//! newer save supersedes them, and the outcome is published as a [`SaveState`].
use futures::future::join_all;
use std::{fmt, future::Future, sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{sleep, timeout},
};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::model::{RouteId, Stop};

/// Destination of autosaves.
pub trait SaveRoute: Send + Sync + 'static {
    /// Replaces every stop of the route with `stops`.
    fn save_route(
        &self,
        route_id: &RouteId,
        stops: &[Stop],
    ) -> impl Future<Output = Result<(), SaveError>> + Send;
}

#[derive(thiserror::Error, Debug)]
pub enum SaveError {
    #[error("error sending the route")]
    HttpRequestError(#[from] reqwest::Error),

    #[error("server rejected the route with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("can't build a save url from {0}")]
    InvalidUrl(String),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AutosaveSettings {
    /// How long edits have to stop before a save goes out
    pub quiet_period: Duration,
    /// Extra attempts after a failed save
    pub max_retries: u32,
    /// Wait before the first retry, doubled for each one after
    pub retry_backoff: Duration,
}

impl Default for AutosaveSettings {
    fn default() -> Self {
        AutosaveSettings {
            quiet_period: Duration::from_millis(600),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Bookkeeping behind the save indicator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveState {
    /// Bumped by every scheduled save
    pub revision: u64,
    /// Revision carried by the newest successful save
    pub saved_revision: u64,
    /// Sequence number of the newest issued save
    pub latest_seq: u64,
    /// Whether the newest issued save is still unresolved
    pub in_flight: bool,
    /// Why the newest resolved save failed, cleared by the next success
    pub last_error: Option<String>,
}

impl SaveState {
    pub fn status(&self) -> SaveStatus {
        if self.in_flight {
            SaveStatus::Saving
        } else if let Some(reason) = &self.last_error {
            SaveStatus::Failed {
                reason: reason.clone(),
            }
        } else if self.saved_revision == self.revision {
            SaveStatus::Saved
        } else {
            SaveStatus::Pending
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveStatus {
    Saved,
    /// Edits are waiting for the quiet period to pass
    Pending,
    Saving,
    /// Changes are not on the server
    Failed { reason: String },
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveStatus::Saved => write!(f, "all changes saved"),
            SaveStatus::Pending => write!(f, "unsaved changes"),
            SaveStatus::Saving => write!(f, "saving..."),
            SaveStatus::Failed { reason } => write!(f, "unsaved changes (save failed: {reason})"),
        }
    }
}

#[derive(Clone, Debug)]
struct Snapshot {
    revision: u64,
    stops: Vec<Stop>,
}

/// Owns the pending-save timer of one editing session.
pub struct Autosaver {
    snapshots: watch::Sender<Option<Snapshot>>,
    state: Arc<watch::Sender<SaveState>>,
    task: JoinHandle<()>,
}

impl Autosaver {
    /// Starts the debounce task. Without a route id every save fails locally
    /// and the editor keeps working without persisting.
    pub fn spawn<S: SaveRoute>(
        route_id: Option<RouteId>,
        sink: Arc<S>,
        settings: AutosaveSettings,
    ) -> Self {
        let (snapshots, snapshot_receiver) = watch::channel(None);
        let state = Arc::new(watch::channel(SaveState::default()).0);

        let span = info_span!("autosave", route_id = route_id.as_ref().map(RouteId::as_str));
        let saver = Arc::new(Saver {
            route_id,
            sink,
            settings,
            state: state.clone(),
        });

        let task = tokio::spawn(debounce(snapshot_receiver, saver).instrument(span));

        Autosaver {
            snapshots,
            state,
            task,
        }
    }

    /// Restarts the quiet period with `stops` as the list to save.
    pub fn schedule(&self, stops: Vec<Stop>) {
        let mut revision = 0;
        self.state.send_modify(|state| {
            state.revision += 1;
            revision = state.revision;
        });

        self.snapshots
            .send_replace(Some(Snapshot { revision, stops }));
    }

    pub fn status(&self) -> SaveStatus {
        self.state.borrow().status()
    }

    /// Sends a pending snapshot right away and waits for every issued save to
    /// settle.
    pub async fn close(self) -> SaveStatus {
        let Autosaver {
            snapshots,
            state,
            task,
        } = self;

        drop(snapshots);

        if let Err(e) = task.await {
            error!("autosave task ended abnormally {e}");
        }

        state.borrow().status()
    }
}

/// Trailing-edge debounce. Runs until the sending side is dropped.
async fn debounce<S: SaveRoute>(
    mut snapshots: watch::Receiver<Option<Snapshot>>,
    saver: Arc<Saver<S>>,
) {
    let quiet_period = saver.settings.quiet_period;
    let mut issued: Vec<JoinHandle<()>> = vec![];
    let mut seq = 0;

    while snapshots.changed().await.is_ok() {
        // a change restarts the wait, a closed channel ends it early so the
        // last snapshot still goes out
        while let Ok(Ok(())) = timeout(quiet_period, snapshots.changed()).await {}

        let Some(snapshot) = snapshots.borrow_and_update().clone() else {
            continue;
        };

        seq += 1;
        saver.issue(seq);

        issued.retain(|save| !save.is_finished());
        issued.push(tokio::spawn(saver.clone().save(seq, snapshot)));
    }

    for res in join_all(issued).await {
        if let Err(e) = res {
            error!("save task ended abnormally {e}");
        }
    }

    debug!("autosave closed");
}

struct Saver<S> {
    route_id: Option<RouteId>,
    sink: Arc<S>,
    settings: AutosaveSettings,
    state: Arc<watch::Sender<SaveState>>,
}

impl<S: SaveRoute> Saver<S> {
    fn issue(&self, seq: u64) {
        self.state.send_modify(|state| {
            state.latest_seq = seq;
            state.in_flight = true;
        });
    }

    fn is_superseded(&self, seq: u64) -> bool {
        self.state.borrow().latest_seq > seq
    }

    #[tracing::instrument(skip(self, snapshot), fields(revision = snapshot.revision, stops = snapshot.stops.len()))]
    async fn save(self: Arc<Self>, seq: u64, snapshot: Snapshot) {
        let Some(route_id) = &self.route_id else {
            warn!("no route identifier, changes are kept locally only");
            self.settle(seq, snapshot.revision, Err("no route identifier".to_string()));
            return;
        };

        let mut attempt = 0;
        loop {
            let err = match self.sink.save_route(route_id, &snapshot.stops).await {
                Ok(()) => {
                    info!("route saved");
                    self.settle(seq, snapshot.revision, Ok(()));
                    return;
                }
                Err(e) => e,
            };

            if attempt >= self.settings.max_retries {
                error!("giving up on save after {} attempts: {err}", attempt + 1);
                self.settle(seq, snapshot.revision, Err(err.to_string()));
                return;
            }

            let backoff = self.settings.retry_backoff * 2u32.saturating_pow(attempt);
            warn!("save failed, retrying in {backoff:?}: {err}");
            sleep(backoff).await;
            attempt += 1;

            if self.is_superseded(seq) {
                debug!("newer save issued, dropping retries");
                return;
            }
        }
    }

    fn settle(&self, seq: u64, revision: u64, outcome: Result<(), String>) {
        self.state.send_modify(|state| {
            if seq < state.latest_seq {
                debug!(seq, latest = state.latest_seq, "discarding stale save response");
                return;
            }

            state.in_flight = false;
            match outcome {
                Ok(()) => {
                    state.saved_revision = revision;
                    state.last_error = None;
                }
                Err(reason) => state.last_error = Some(reason),
            }
        });
    }
}
