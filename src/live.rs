//! Live collections: an initial load kept current by the change feed.
//!
//! Each `LiveCollection` owns one worker thread. The worker is the only
//! writer of the reconciler state and handles one input at a time in arrival
//! order (refresh requests, channel lifecycle events, row changes), so a
//! slow re-fetch can never let a later change overtake an earlier one.

use crate::credentials::CredentialProvider;
use crate::decoder::Decoder;
use crate::error::{Result, SyncError};
use crate::feed::{ChangeFeed, ChangeRecord, ChannelConfig, ChannelHandle, FeedEvent, FilterExpr};
use crate::reconciler::{Action, Phase, ReconcilerState, Snapshot};
use crate::source::{CollectionSource, ItemFilter};
use crate::types::{LiveItem, ScopeId};
use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Live collection configuration.
#[derive(Clone, Debug)]
pub struct LiveCollectionConfig {
    /// Scope whose items are kept.
    pub scope: ScopeId,

    /// Row filter for loads (None = every item of the scope).
    pub filter: Option<ItemFilter>,

    /// Whether to follow the change feed after loading.
    /// Default: true
    pub live_updates: bool,

    /// Default: "public"
    pub schema: String,

    /// Default: "transactions"
    pub table: String,

    /// Primary key column in change messages.
    /// Default: "id"
    pub id_column: String,

    /// Scope column used for the channel filter and the scope re-check.
    /// Default: "pool_id"
    pub scope_column: String,

    /// Max buffered changes before the feed drops the channel.
    /// Default: 1024
    pub buffer_size: usize,
}

impl LiveCollectionConfig {
    pub fn new(scope: impl Into<ScopeId>) -> Self {
        Self {
            scope: scope.into(),
            filter: None,
            live_updates: true,
            schema: "public".to_string(),
            table: "transactions".to_string(),
            id_column: "id".to_string(),
            scope_column: "pool_id".to_string(),
            buffer_size: 1024,
        }
    }

    pub fn with_filter(mut self, filter: ItemFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_live_updates(mut self, enabled: bool) -> Self {
        self.live_updates = enabled;
        self
    }

    pub fn with_table(mut self, schema: impl Into<String>, table: impl Into<String>) -> Self {
        self.schema = schema.into();
        self.table = table.into();
        self
    }

    pub fn with_columns(
        mut self,
        id_column: impl Into<String>,
        scope_column: impl Into<String>,
    ) -> Self {
        self.id_column = id_column.into();
        self.scope_column = scope_column.into();
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// The feed channel for this scope: `scope_column=eq.scope`.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::table(self.schema.clone(), self.table.clone())
            .with_filter(FilterExpr::eq(
                self.scope_column.clone(),
                self.scope.as_str(),
            ))
            .with_buffer_size(self.buffer_size)
    }
}

/// State shared between the handle and its worker.
struct Shared<T> {
    state: Mutex<ReconcilerState<T>>,
    changed: Condvar,
    /// Cleared on close; nothing mutates the state afterwards.
    alive: AtomicBool,
}

impl<T: LiveItem> Shared<T> {
    fn apply(&self, action: Action<T>) -> bool {
        let mut state = self.state.lock();
        if !self.alive.load(Ordering::SeqCst) {
            debug!(action = action.name(), "collection closed, dropping action");
            return false;
        }
        let changed = state.apply(action);
        if changed {
            self.changed.notify_all();
        }
        changed
    }

    fn is_loading(&self) -> bool {
        self.state.lock().loading()
    }
}

enum Command {
    Refresh { done: Sender<()> },
    SetLive(bool),
    Shutdown,
}

/// Turns feed records into reconciler actions for one scope.
pub(crate) struct ChangeResolver<T> {
    decoder: Decoder<T>,
    scope: ScopeId,
    filter: Option<ItemFilter>,
}

impl<T: LiveItem + Serialize> ChangeResolver<T> {
    pub(crate) fn new(config: &LiveCollectionConfig, source: Arc<dyn CollectionSource<T>>) -> Self {
        Self {
            decoder: Decoder::new(source, config.id_column.clone(), config.scope_column.clone()),
            scope: config.scope.clone(),
            filter: config.filter.clone(),
        }
    }

    /// Resolve a record to an action, or `None` if it is not for this view.
    ///
    /// Key-only deletes carry no scope; removing an id this view never held
    /// is a no-op, so they pass through.
    pub(crate) fn resolve(&self, record: &ChangeRecord) -> Option<Action<T>> {
        let event = match self.decoder.decode(record) {
            Ok(event) => event,
            Err(e) => {
                warn!(scope = %self.scope, error = %e, "undecodable change");
                return Some(Action::EventFetchFailed(e));
            }
        };

        if let Some(scope) = &event.scope {
            if *scope != self.scope {
                debug!(scope = %self.scope, other = %scope, id = %event.id, "ignoring change for other scope");
                return None;
            }
        }

        let action: Action<T> = match self.decoder.hydrate(&event) {
            Ok(resolved) => resolved.into(),
            Err(e) => {
                warn!(scope = %self.scope, id = %event.id, error = %e, "failed to hydrate change");
                return Some(Action::EventFetchFailed(e));
            }
        };

        match action {
            Action::ItemInserted(item) | Action::ItemUpdated(item)
                if item.scope() != &self.scope =>
            {
                // Moved to another scope since the message was sent.
                Some(Action::ItemDeleted(item.id()))
            }
            Action::ItemInserted(item) if !self.passes_filter(&item) => None,
            Action::ItemUpdated(item) if !self.passes_filter(&item) => {
                // No longer part of the filtered view.
                Some(Action::ItemDeleted(item.id()))
            }
            other => Some(other),
        }
    }

    fn passes_filter(&self, item: &T) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(item))
    }
}

/// The single writer of a live collection's state.
struct Worker<T> {
    config: LiveCollectionConfig,
    source: Arc<dyn CollectionSource<T>>,
    resolver: ChangeResolver<T>,
    feed: Arc<ChangeFeed>,
    credentials: Arc<dyn CredentialProvider>,
    shared: Arc<Shared<T>>,
    channel: Option<ChannelHandle>,
    live: bool,
}

impl<T: LiveItem + Serialize> Worker<T> {
    fn run(mut self, commands: Receiver<Command>) {
        self.load();
        self.set_live(self.config.live_updates);

        loop {
            let events = match &self.channel {
                Some(channel) => channel.receiver.clone(),
                None => never(),
            };

            select! {
                recv(commands) -> command => match command {
                    Ok(Command::Refresh { done }) => {
                        self.load();
                        let _ = done.send(());
                    }
                    Ok(Command::SetLive(enabled)) => self.set_live(enabled),
                    Ok(Command::Shutdown) | Err(_) => break,
                },
                recv(events) -> event => match event {
                    Ok(event) => self.handle_event(event),
                    Err(_) => self.channel_lost("channel dropped by the feed".to_string()),
                },
            }
        }

        self.close_channel();
        debug!(scope = %self.config.scope, "live collection worker stopped");
    }

    fn load(&self) {
        let scope = &self.config.scope;
        match self.source.fetch_all(scope, self.config.filter.as_ref()) {
            Ok(items) => {
                info!(scope = %scope, count = items.len(), "collection loaded");
                self.shared.apply(Action::LoadSucceeded(items));
            }
            Err(e) => {
                warn!(scope = %scope, error = %e, "collection load failed");
                self.shared.apply(Action::LoadFailed(e));
            }
        }
    }

    fn set_live(&mut self, enabled: bool) {
        self.live = enabled;
        if enabled {
            self.open_channel();
        } else {
            self.close_channel();
        }
    }

    /// Open the scope's channel once the initial load has settled.
    fn open_channel(&mut self) {
        if self.channel.is_some() || !self.live || self.shared.is_loading() {
            return;
        }
        match self.feed.subscribe(self.config.channel_config()) {
            Ok(handle) => {
                info!(scope = %self.config.scope, channel = handle.id.0, "live updates on");
                self.channel = Some(handle);
            }
            Err(e) => {
                warn!(scope = %self.config.scope, error = %e, "could not open channel");
                self.shared.apply(Action::StreamFailed(e));
            }
        }
    }

    fn close_channel(&mut self) {
        if let Some(handle) = self.channel.take() {
            self.feed.remove_channel(handle.id);
            info!(scope = %self.config.scope, channel = handle.id.0, "live updates off");
        }
    }

    fn handle_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Subscribed => self.reauthenticate(),
            FeedEvent::Change { record } => {
                if let Some(action) = self.resolver.resolve(&record) {
                    self.shared.apply(action);
                }
            }
            FeedEvent::Closed { reason } => self.channel_lost(format!("channel closed: {}", reason)),
        }
    }

    /// The token may have rotated since the feed was created.
    fn reauthenticate(&self) {
        match self.credentials.access_token() {
            Some(token) => {
                self.feed.set_auth(token);
                debug!(scope = %self.config.scope, "credential re-applied after join");
            }
            None => warn!(scope = %self.config.scope, "joined without a credential"),
        }
    }

    /// Transport failures are not retried here.
    fn channel_lost(&mut self, message: String) {
        warn!(scope = %self.config.scope, %message, "live updates stopped");
        self.channel = None;
        self.shared.apply(Action::StreamFailed(SyncError::Stream(message)));
    }
}

/// A scoped collection kept in sync with the backing store.
///
/// Dropping the handle closes the channel and stops the worker.
pub struct LiveCollection<T: LiveItem> {
    scope: ScopeId,
    shared: Arc<Shared<T>>,
    commands: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl<T: LiveItem + Serialize> LiveCollection<T> {
    /// Start loading the collection and, once loaded, following the feed.
    ///
    /// Returns immediately; the first snapshot is `loading` until the
    /// initial load lands.
    pub fn open(
        config: LiveCollectionConfig,
        source: Arc<dyn CollectionSource<T>>,
        feed: Arc<ChangeFeed>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(ReconcilerState::new()),
            changed: Condvar::new(),
            alive: AtomicBool::new(true),
        });
        let (commands, receiver) = unbounded();

        let scope = config.scope.clone();
        let worker = Worker {
            resolver: ChangeResolver::new(&config, Arc::clone(&source)),
            config,
            source,
            feed,
            credentials,
            shared: Arc::clone(&shared),
            channel: None,
            live: false,
        };

        let handle = thread::Builder::new()
            .name(format!("poolsync-{}", scope))
            .spawn(move || worker.run(receiver))?;

        Ok(Self {
            scope,
            shared,
            commands,
            worker: Some(handle),
        })
    }
}

impl<T: LiveItem> LiveCollection<T> {
    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    /// Copy out the current state.
    pub fn snapshot(&self) -> Snapshot<T> {
        self.shared.state.lock().snapshot()
    }

    pub fn items(&self) -> Vec<T> {
        self.shared.state.lock().items().to_vec()
    }

    pub fn loading(&self) -> bool {
        self.shared.state.lock().loading()
    }

    pub fn error(&self) -> Option<SyncError> {
        self.shared.state.lock().error().cloned()
    }

    pub fn phase(&self) -> Phase {
        self.shared.state.lock().phase()
    }

    pub fn revision(&self) -> u64 {
        self.shared.state.lock().revision()
    }

    /// Reload the collection and wait until the result is applied.
    ///
    /// Load failures land in the error slot; this only fails once the
    /// collection is closed.
    pub fn refresh(&self) -> Result<()> {
        let (done, finished) = bounded(1);
        self.send(Command::Refresh { done })?;
        finished.recv().map_err(|_| SyncError::Closed)
    }

    /// Turn change-feed following on or off.
    pub fn set_live_updates(&self, enabled: bool) -> Result<()> {
        self.send(Command::SetLive(enabled))
    }

    fn send(&self, command: Command) -> Result<()> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        self.commands.send(command).map_err(|_| SyncError::Closed)
    }

    /// Block until the state satisfies `predicate` or the timeout passes.
    pub fn wait_for<F>(&self, predicate: F, timeout: Duration) -> Option<Snapshot<T>>
    where
        F: Fn(&ReconcilerState<T>) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !predicate(&*state) {
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                return predicate(&*state).then(|| state.snapshot());
            }
        }
        Some(state.snapshot())
    }

    /// Block until the revision reaches `revision`.
    pub fn wait_for_revision(&self, revision: u64, timeout: Duration) -> Option<Snapshot<T>> {
        self.wait_for(|state| state.revision() >= revision, timeout)
    }

    pub fn is_closed(&self) -> bool {
        !self.shared.alive.load(Ordering::SeqCst)
    }

    /// Stop following the feed and discard the worker.
    ///
    /// Anything still in flight is dropped without touching the state.
    pub fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.shared.alive.store(false, Ordering::SeqCst);
            let _ = self.commands.send(Command::Shutdown);
            if worker.join().is_err() {
                warn!(scope = %self.scope, "live collection worker panicked");
            }
            self.shared.changed.notify_all();
        }
    }
}

impl<T: LiveItem> Drop for LiveCollection<T> {
    fn drop(&mut self) {
        self.close();
    }
}
