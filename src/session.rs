//! Session lifecycle: Closed -> Opening -> Open -> Closing -> Closed.
//!
//! One actor task owns every piece of per-session state. UI collaborators drive it through a
//! cloneable [`SessionHandle`]; work it starts (loads, detail lookups, search timers) runs in a
//! `JoinSet` under the session's cancellation token and reports back tagged with a generation,
//! so anything finishing after a close is dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheSettings, DatasetCache, DatasetResult, FileStore, Freshness, SystemClock};
use crate::config::EngineConfig;
use crate::details::{DetailLookup, ItemDetail};
use crate::error::{InventoryError, InventoryResult};
use crate::facets::{Facet, FilterState};
use crate::inventory::{FetchSettings, Fetcher, InventorySource, ProxyProvider};
use crate::model::{InventoryRecord, MergedDataset};
use crate::view::{InventoryView, ViewSnapshot};

const UPDATE_CAPACITY: usize = 64;
const COMMAND_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Closed,
    Opening,
    Open,
    Closing,
}

/// Inputs raised by presentation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UiEvent {
    Open,
    Close,
    ForceRefresh,
    FacetChanged { facet: Facet, value: String },
    SearchChanged { text: String },
    PageChanged { page: usize },
    ResetFilters,
    RowSelected { product_code: String },
}

/// Pushed to subscribers while the session is open.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "update", rename_all = "snake_case")]
pub enum SessionUpdate {
    StateChanged {
        state: SessionState,
    },
    DatasetLoaded {
        records: usize,
        freshness: Option<Freshness>,
        notice: Option<String>,
    },
    ViewChanged {
        snapshot: ViewSnapshot,
    },
    DetailReady {
        detail: ItemDetail,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub generation: u64,
    pub view: Option<ViewSnapshot>,
    pub freshness: Option<Freshness>,
    pub notice: Option<String>,
    /// Search text waiting for the debounce timer.
    pub pending_search: Option<String>,
    pub selected: Option<ItemDetail>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub rows_per_page: usize,
    pub search_debounce: Duration,
}

impl SessionSettings {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            rows_per_page: cfg.rows_per_page.max(1),
            search_debounce: cfg.search_debounce,
        }
    }
}

/// Shared collaborators handed to a session instead of module-level globals.
#[derive(Clone)]
pub struct SessionContext {
    pub cache: Arc<DatasetCache>,
    pub source: Arc<dyn InventorySource>,
    pub settings: SessionSettings,
}

impl SessionContext {
    /// Proxy client, file-backed cache and system clock wired from configuration.
    pub fn from_config(cfg: &EngineConfig) -> InventoryResult<Self> {
        let source: Arc<dyn InventorySource> = Arc::new(ProxyProvider::from_config(cfg)?);
        let fetcher = Fetcher::new(source.clone(), FetchSettings::from_config(cfg));
        let cache = DatasetCache::new(
            fetcher,
            Arc::new(FileStore::new(&cfg.cache_path)),
            Arc::new(SystemClock),
            CacheSettings::from_config(cfg),
        );
        Ok(Self {
            cache: Arc::new(cache),
            source,
            settings: SessionSettings::from_config(cfg),
        })
    }
}

enum Command {
    Event(UiEvent, oneshot::Sender<InventoryResult<()>>),
    Status(oneshot::Sender<SessionStatus>),
    Subscribe(oneshot::Sender<broadcast::Receiver<SessionUpdate>>),
    FacetValues(Facet, oneshot::Sender<Vec<String>>),
}

enum Internal {
    Loaded {
        generation: u64,
        load: u64,
        result: InventoryResult<DatasetResult>,
    },
    SearchDue {
        generation: u64,
        seq: u64,
        text: String,
    },
    DetailDone {
        generation: u64,
        detail: ItemDetail,
    },
}

/// Cloneable front door to one session actor. Dropping every handle closes the session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    /// Start the actor on the current tokio runtime; the session begins Closed.
    pub fn spawn(ctx: SessionContext) -> Self {
        let (tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let actor = SessionActor {
            ctx,
            state: SessionState::Closed,
            generation: 0,
            load_seq: 0,
            search_seq: 0,
            cancel: CancellationToken::new(),
            load_cancel: CancellationToken::new(),
            tasks: JoinSet::new(),
            updates: None,
            view: None,
            details: None,
            freshness: None,
            notice: None,
            pending_search: None,
            selected: None,
            internal_tx,
        };
        tokio::spawn(actor.run(commands, internal_rx));
        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> InventoryResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| InventoryError::SessionClosed)?;
        rx.await.map_err(|_| InventoryError::SessionClosed)
    }

    pub async fn send(&self, event: UiEvent) -> InventoryResult<()> {
        self.request(|reply| Command::Event(event, reply)).await?
    }

    pub async fn open(&self) -> InventoryResult<()> {
        self.send(UiEvent::Open).await
    }

    pub async fn close(&self) -> InventoryResult<()> {
        self.send(UiEvent::Close).await
    }

    pub async fn force_refresh(&self) -> InventoryResult<()> {
        self.send(UiEvent::ForceRefresh).await
    }

    pub async fn facet_changed(&self, facet: Facet, value: &str) -> InventoryResult<()> {
        self.send(UiEvent::FacetChanged {
            facet,
            value: value.to_string(),
        })
        .await
    }

    pub async fn search_changed(&self, text: &str) -> InventoryResult<()> {
        self.send(UiEvent::SearchChanged {
            text: text.to_string(),
        })
        .await
    }

    pub async fn page_changed(&self, page: usize) -> InventoryResult<()> {
        self.send(UiEvent::PageChanged { page }).await
    }

    pub async fn reset_filters(&self) -> InventoryResult<()> {
        self.send(UiEvent::ResetFilters).await
    }

    pub async fn row_selected(&self, product_code: &str) -> InventoryResult<()> {
        self.send(UiEvent::RowSelected {
            product_code: product_code.to_string(),
        })
        .await
    }

    pub async fn status(&self) -> InventoryResult<SessionStatus> {
        self.request(Command::Status).await
    }

    /// Receiver of updates until the current (or next) Open ends.
    pub async fn subscribe(&self) -> InventoryResult<broadcast::Receiver<SessionUpdate>> {
        self.request(Command::Subscribe).await
    }

    pub async fn facet_values(&self, facet: Facet) -> InventoryResult<Vec<String>> {
        self.request(|reply| Command::FacetValues(facet, reply)).await
    }
}

struct SessionActor {
    ctx: SessionContext,
    state: SessionState,
    generation: u64,
    load_seq: u64,
    search_seq: u64,
    cancel: CancellationToken,
    /// Child of `cancel` for the load in flight; replaced by every new load.
    load_cancel: CancellationToken,
    tasks: JoinSet<()>,
    updates: Option<broadcast::Sender<SessionUpdate>>,
    view: Option<InventoryView>,
    details: Option<Arc<DetailLookup>>,
    freshness: Option<Freshness>,
    notice: Option<String>,
    pending_search: Option<String>,
    selected: Option<ItemDetail>,
    internal_tx: mpsc::UnboundedSender<Internal>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        self.close("all handles dropped");
                        break;
                    }
                },
                Some(msg) = internal.recv() => self.handle_internal(msg),
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            warn!(error = %err, "session task panicked");
                        }
                    }
                }
            }
        }
        self.tasks.shutdown().await;
        debug!("session actor stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Event(event, reply) => {
                let result = self.handle_event(event);
                let _ = reply.send(result);
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Subscribe(reply) => {
                let _ = reply.send(self.sender().subscribe());
            }
            Command::FacetValues(facet, reply) => {
                let values = self
                    .view
                    .as_ref()
                    .map(|v| v.facet_values(facet).to_vec())
                    .unwrap_or_default();
                let _ = reply.send(values);
            }
        }
    }

    fn handle_event(&mut self, event: UiEvent) -> InventoryResult<()> {
        match event {
            UiEvent::Open => {
                self.open();
                Ok(())
            }
            UiEvent::Close => {
                self.close("close requested");
                Ok(())
            }
            UiEvent::ForceRefresh => {
                self.ensure_active()?;
                self.start_load(true);
                Ok(())
            }
            UiEvent::FacetChanged { facet, value } => {
                self.view_mut()?.set_facet(facet, &value);
                self.publish_view();
                Ok(())
            }
            UiEvent::SearchChanged { text } => {
                self.ensure_active()?;
                self.schedule_search(text);
                Ok(())
            }
            UiEvent::PageChanged { page } => {
                self.view_mut()?.set_page(page);
                self.publish_view();
                Ok(())
            }
            UiEvent::ResetFilters => {
                self.view_mut()?.reset_filters();
                self.pending_search = None;
                self.search_seq += 1;
                self.publish_view();
                Ok(())
            }
            UiEvent::RowSelected { product_code } => {
                self.ensure_active()?;
                self.select_row(product_code);
                Ok(())
            }
        }
    }

    fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Loaded {
                generation,
                load,
                result,
            } => {
                if generation != self.generation || load != self.load_seq {
                    debug!(generation, load, "late load result dropped");
                    return;
                }
                self.finish_load(result);
            }
            Internal::SearchDue {
                generation,
                seq,
                text,
            } => {
                if generation != self.generation || seq != self.search_seq {
                    debug!(generation, seq, "superseded search dropped");
                    return;
                }
                self.apply_search(&text);
            }
            Internal::DetailDone { generation, detail } => {
                if generation != self.generation || self.state == SessionState::Closed {
                    debug!(generation, product_code = %detail.product_code, "late detail result dropped");
                    return;
                }
                self.selected = Some(detail.clone());
                self.publish(SessionUpdate::DetailReady { detail });
            }
        }
    }

    fn open(&mut self) {
        if self.state != SessionState::Closed {
            debug!(state = ?self.state, "open ignored; session already active");
            return;
        }
        self.generation += 1;
        self.cancel = CancellationToken::new();
        let empty = Arc::new(MergedDataset::new(Vec::new(), Utc::now()));
        self.view = Some(InventoryView::new(empty, self.ctx.settings.rows_per_page));
        self.details = Some(Arc::new(DetailLookup::new(self.ctx.source.clone())));
        self.freshness = None;
        self.notice = None;
        self.pending_search = None;
        self.selected = None;
        self.start_load(false);
    }

    /// The base dataset is always loaded unfiltered; facets and search apply in the view.
    fn start_load(&mut self, force_refresh: bool) {
        self.load_seq += 1;
        self.transition(SessionState::Opening);

        // A superseded load stops fetching and never reaches the cache.
        self.load_cancel.cancel();
        self.load_cancel = self.cancel.child_token();

        let filters = FilterState::new();
        let cache = self.ctx.cache.clone();
        let cancel = self.load_cancel.clone();
        let tx = self.internal_tx.clone();
        let (generation, load) = (self.generation, self.load_seq);
        self.tasks.spawn(async move {
            let result = cache.get(&filters, force_refresh, &cancel).await;
            let _ = tx.send(Internal::Loaded {
                generation,
                load,
                result,
            });
        });
    }

    fn finish_load(&mut self, result: InventoryResult<DatasetResult>) {
        match result {
            Ok(result) => {
                let dataset = result.dataset().clone();
                let records = dataset.len();
                if let Some(view) = self.view.as_mut() {
                    view.set_dataset(dataset);
                }
                self.freshness = result.freshness().cloned();
                self.notice = result.notice();
                self.transition(SessionState::Open);
                self.publish(SessionUpdate::DatasetLoaded {
                    records,
                    freshness: self.freshness.clone(),
                    notice: self.notice.clone(),
                });
                self.publish_view();
            }
            Err(InventoryError::Cancelled) => debug!("load cancelled"),
            Err(err) => {
                warn!(error = %err, "load failed");
                self.notice = Some(err.to_string());
                self.transition(SessionState::Open);
            }
        }
    }

    fn close(&mut self, reason: &str) {
        if self.state == SessionState::Closed {
            return;
        }
        self.transition(SessionState::Closing);
        self.cancel.cancel();
        self.tasks.abort_all();
        self.view = None;
        self.details = None;
        self.freshness = None;
        self.notice = None;
        self.pending_search = None;
        self.selected = None;
        self.search_seq += 1;
        self.transition(SessionState::Closed);
        self.updates = None;
        info!(generation = self.generation, reason, "session closed");
    }

    fn schedule_search(&mut self, text: String) {
        self.search_seq += 1;
        let debounce = self.ctx.settings.search_debounce;
        if debounce.is_zero() {
            self.apply_search(&text);
            return;
        }
        self.pending_search = Some(text.clone());
        let tx = self.internal_tx.clone();
        let (generation, seq) = (self.generation, self.search_seq);
        self.tasks.spawn(async move {
            tokio::time::sleep(debounce).await;
            let _ = tx.send(Internal::SearchDue {
                generation,
                seq,
                text,
            });
        });
    }

    fn apply_search(&mut self, text: &str) {
        self.pending_search = None;
        if let Some(view) = self.view.as_mut() {
            view.set_query(text);
        }
        self.publish_view();
    }

    fn select_row(&mut self, product_code: String) {
        let Some(lookup) = self.details.clone() else {
            return;
        };
        let record = self
            .view
            .as_ref()
            .and_then(|v| v.find(&product_code).cloned())
            .unwrap_or_else(|| InventoryRecord {
                product_code: product_code.clone(),
                ..InventoryRecord::default()
            });
        let tx = self.internal_tx.clone();
        let generation = self.generation;
        self.tasks.spawn(async move {
            let detail = lookup.select(&record).await;
            let _ = tx.send(Internal::DetailDone { generation, detail });
        });
    }

    fn ensure_active(&self) -> InventoryResult<()> {
        match self.state {
            SessionState::Opening | SessionState::Open => Ok(()),
            SessionState::Closed | SessionState::Closing => Err(InventoryError::SessionClosed),
        }
    }

    fn view_mut(&mut self) -> InventoryResult<&mut InventoryView> {
        self.ensure_active()?;
        self.view.as_mut().ok_or(InventoryError::SessionClosed)
    }

    fn transition(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        info!(generation = self.generation, from = ?self.state, to = ?next, "session state");
        self.state = next;
        self.publish(SessionUpdate::StateChanged { state: next });
    }

    fn sender(&mut self) -> &broadcast::Sender<SessionUpdate> {
        self.updates
            .get_or_insert_with(|| broadcast::channel(UPDATE_CAPACITY).0)
    }

    fn publish(&self, update: SessionUpdate) {
        if let Some(tx) = self.updates.as_ref() {
            let _ = tx.send(update);
        }
    }

    fn publish_view(&self) {
        if let Some(view) = self.view.as_ref() {
            self.publish(SessionUpdate::ViewChanged {
                snapshot: view.snapshot(),
            });
        }
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            generation: self.generation,
            view: self.view.as_ref().map(InventoryView::snapshot),
            freshness: self.freshness.clone(),
            notice: self.notice.clone(),
            pending_search: self.pending_search.clone(),
            selected: self.selected.clone(),
        }
    }
}
