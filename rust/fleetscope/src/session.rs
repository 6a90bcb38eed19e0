//! Per-session view state and the sequencer that decides which fetches
//! run eagerly, which are deferred, and when the last results are reused.

use crate::{
    cache::ResultCache,
    filter::FilterSelection,
    models::{AggregateBundle, Table, ViewKind},
    query::FilterOptions,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

/// Global-view tables whose joint emptiness means "no data for these
/// filters".
const PRIMARY_TABLES: [&str; 3] = ["top_devices", "subcategory", "category"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewState {
    NoSelectionYet,
    Loaded,
    EmptyResult,
}

/// What caused a render: an explicit apply-filters action, or a plain
/// render of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Apply,
    Initial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderOutcome {
    /// Fresh eager fetches ran this cycle.
    Fetched,
    /// No new apply action; the last bundles were reused unchanged.
    Reused,
    /// Explicit apply found no data; rendering halts for this cycle.
    Empty,
    /// Nothing loaded yet and the trigger did not warrant a fetch.
    AwaitingSelection,
}

pub struct SessionViewState {
    pub state: ViewState,
    pub selection: FilterSelection,
    pub global: Arc<AggregateBundle>,
    pub risk: Arc<AggregateBundle>,
    pub vulnerabilities: Arc<AggregateBundle>,
    pub initial_load_done: bool,
    pub vuln_needs_refresh: bool,
}

impl SessionViewState {
    pub fn new() -> Self {
        Self {
            state: ViewState::NoSelectionYet,
            selection: FilterSelection::default(),
            global: Arc::new(AggregateBundle::empty(ViewKind::Global)),
            risk: Arc::new(AggregateBundle::empty(ViewKind::Risk)),
            vulnerabilities: Arc::new(AggregateBundle::empty(ViewKind::Vulnerabilities)),
            initial_load_done: false,
            vuln_needs_refresh: true,
        }
    }
}

impl Default for SessionViewState {
    fn default() -> Self {
        Self::new()
    }
}

/// The sequencer. Owns the cache (and through it the fetchers); mutates
/// session state on behalf of the presentation layer.
pub struct Dashboard {
    cache: ResultCache,
}

impl Dashboard {
    pub fn new(cache: ResultCache) -> Self {
        Self { cache }
    }

    pub async fn filter_options(&self) -> Arc<FilterOptions> {
        self.cache.filter_options().await
    }

    /// Run one render cycle. An explicit apply always fetches; a plain
    /// render fetches only the first time in a session and only when
    /// every field is unset (the implicit "load everything" default).
    /// Global is fetched before Risk so its partial results are
    /// presentable first; Vulnerability is merely re-armed.
    pub async fn render(
        &self,
        session: &mut SessionViewState,
        selection: FilterSelection,
        trigger: Trigger,
    ) -> RenderOutcome {
        let should_fetch = trigger == Trigger::Apply
            || (!session.initial_load_done && selection.is_empty());

        if !should_fetch {
            return if session.initial_load_done {
                RenderOutcome::Reused
            } else {
                RenderOutcome::AwaitingSelection
            };
        }

        session.initial_load_done = true;
        session.selection = selection.clone();

        session.global = self.cache.bundle(ViewKind::Global, &selection).await;
        session.risk = self.cache.bundle(ViewKind::Risk, &selection).await;
        session.vuln_needs_refresh = true;

        let primaries_empty = PRIMARY_TABLES
            .iter()
            .all(|name| session.global.table(name).map_or(true, Table::is_empty));

        if primaries_empty && trigger == Trigger::Apply {
            session.state = ViewState::EmptyResult;
            RenderOutcome::Empty
        } else {
            session.state = ViewState::Loaded;
            RenderOutcome::Fetched
        }
    }

    /// The vulnerability view became visible. Fetches lazily, exactly
    /// once per distinct filter application; later visits reuse the
    /// bundle unchanged. Before the first load there is nothing to
    /// refresh against, so the empty default is served as-is.
    pub async fn vulnerabilities_visible(
        &self,
        session: &mut SessionViewState,
    ) -> Arc<AggregateBundle> {
        if session.initial_load_done && session.vuln_needs_refresh {
            session.vulnerabilities = self
                .cache
                .bundle(ViewKind::Vulnerabilities, &session.selection)
                .await;
            session.vuln_needs_refresh = false;
        }
        session.vulnerabilities.clone()
    }

    /// Best-classified examples for the session's last-applied selection.
    pub async fn uid_examples(&self, session: &SessionViewState) -> Table {
        self.cache.uid_examples(&session.selection).await
    }
}

/// Process-wide registry of live sessions. Each session is guarded by its
/// own async mutex: one logical thread of control per session.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<SessionViewState>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve an existing session or create a fresh one. An unknown or
    /// absent id always yields a usable session.
    pub fn resolve(&self, id: Option<Uuid>) -> (Uuid, Arc<tokio::sync::Mutex<SessionViewState>>) {
        let mut sessions = self.sessions.lock();
        if let Some(id) = id {
            if let Some(session) = sessions.get(&id) {
                return (id, session.clone());
            }
        }

        let id = Uuid::new_v4();
        let session = Arc::new(tokio::sync::Mutex::new(SessionViewState::new()));
        sessions.insert(id, session.clone());
        (id, session)
    }

    pub fn discard(&self, id: Uuid) {
        self.sessions.lock().remove(&id);
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
