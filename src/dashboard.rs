//! Dashboard context: tabs, fields, writers and the engine that drives them.
//!
//! Everything lives on one `Dashboard` value created by the builder and torn
//! down with [`Dashboard::shutdown`]. There is no global state.

use crate::config::DashboardConfig;
use crate::engine::store::{self, FieldState, Store, TabState};
use crate::engine::{catch_panic, run_merge, Engine};
use crate::error::{ConfigError, DashError};
use crate::handler::{Binding, Handler, Role};
use crate::logging::{Diagnostics, LogSink};
use crate::model::{Dispatch, FieldPhase, FieldRef, FieldView, StreamEvent, TabView};
use crate::stream::TabContent;
use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A handler bound to a field, probed once at registration.
pub(crate) struct Field {
    pub handler: Arc<dyn Handler>,
    pub binding: Binding,
    pub label: String,
    pub timeout: Duration,
    pub editable: bool,
}

impl Field {
    pub fn triggerable(&self) -> bool {
        self.editable && self.binding.role != Role::Display
    }
}

pub(crate) struct WriterSlot {
    pub handler: Arc<dyn Handler>,
    pub binding: Binding,
}

pub(crate) struct TabSection {
    pub title: String,
    pub fields: Vec<Field>,
    pub writers: Vec<WriterSlot>,
}

/// Immutable shape of the dashboard.
pub(crate) struct Layout {
    pub tabs: Vec<TabSection>,
}

impl Layout {
    pub fn tab(&self, tab: usize) -> Result<&TabSection, DashError> {
        self.tabs.get(tab).ok_or(DashError::UnknownTab(tab))
    }

    pub fn field(&self, at: FieldRef) -> Result<&Field, DashError> {
        self.tab(at.tab)?
            .fields
            .get(at.field)
            .ok_or(DashError::UnknownField {
                tab: at.tab,
                field: at.field,
            })
    }

    pub fn writer(&self, tab: usize, writer: usize) -> Option<&WriterSlot> {
        self.tabs.get(tab)?.writers.get(writer)
    }
}

/// Field registration.
pub struct FieldSpec {
    handler: Arc<dyn Handler>,
    timeout: Option<Duration>,
    locked: bool,
}

impl FieldSpec {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            timeout: None,
            locked: false,
        }
    }

    /// Per-field deadline. `Duration::ZERO` runs the handler on the caller.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Show the field but never trigger it.
    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }
}

/// Tab registration: fields in display order plus any writers feeding its log.
pub struct TabSpec {
    title: String,
    fields: Vec<FieldSpec>,
    writers: Vec<Arc<dyn Handler>>,
}

impl TabSpec {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            fields: Vec::new(),
            writers: Vec::new(),
        }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn handler(self, handler: Arc<dyn Handler>) -> Self {
        self.field(FieldSpec::new(handler))
    }

    pub fn writer(mut self, handler: Arc<dyn Handler>) -> Self {
        self.writers.push(handler);
        self
    }
}

pub struct DashboardBuilder {
    config: DashboardConfig,
    tabs: Vec<TabSpec>,
    sink: Option<LogSink>,
}

impl DashboardBuilder {
    pub fn tab(mut self, tab: TabSpec) -> Self {
        self.tabs.push(tab);
        self
    }

    pub fn log_sink(mut self, sink: LogSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Probe every handler and start the merge task. Must run inside a tokio runtime.
    pub fn build(self) -> Result<Dashboard, DashError> {
        let runtime = Handle::try_current().map_err(|_| DashError::NoRuntime)?;
        let DashboardBuilder {
            config,
            tabs: specs,
            sink,
        } = self;

        let mut tabs = Vec::with_capacity(specs.len());
        let mut states = Vec::with_capacity(specs.len());
        for spec in specs {
            let (section, state) = register_tab(spec, config.default_timeout)?;
            tabs.push(section);
            states.push(state);
        }

        let layout = Arc::new(Layout { tabs });
        let store = Arc::new(Mutex::new(Store::new(states)));
        let diag = Diagnostics::new(sink);
        let (events_tx, events_rx) = mpsc::channel::<StreamEvent>(config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let merge = runtime.spawn(run_merge(
            layout.clone(),
            store.clone(),
            events_rx,
            shutdown_rx,
            diag.clone(),
        ));
        let engine = Engine::new(
            layout.clone(),
            store.clone(),
            events_tx.clone(),
            runtime,
            diag,
        );
        tracing::info!(tabs = layout.tabs.len(), title = %config.title, "dashboard ready");

        Ok(Dashboard {
            config,
            layout,
            store,
            engine,
            events: events_tx,
            merge: Some(merge),
            shutdown: Some(shutdown_tx),
        })
    }
}

fn register_tab(
    spec: TabSpec,
    default_timeout: Duration,
) -> Result<(TabSection, TabState), ConfigError> {
    if spec.fields.is_empty() && spec.writers.is_empty() {
        return Err(ConfigError::EmptyTab(spec.title));
    }

    let mut fields = Vec::with_capacity(spec.fields.len());
    let mut states = Vec::with_capacity(spec.fields.len());
    for f in spec.fields {
        let binding = Binding::for_field(&*f.handler)?;
        let value = initial_value(&*f.handler, binding.role);
        fields.push(Field {
            label: f.handler.label().to_string(),
            editable: !f.locked && binding.role != Role::Display,
            timeout: f.timeout.unwrap_or(default_timeout),
            handler: f.handler,
            binding,
        });
        states.push(FieldState::new(value));
    }

    let mut names = HashSet::new();
    let mut writers = Vec::with_capacity(spec.writers.len());
    for handler in spec.writers {
        let binding = Binding::for_writer(&*handler)?;
        if !names.insert(handler.name().to_string()) {
            return Err(ConfigError::DuplicateWriter {
                tab: spec.title,
                writer: handler.name().to_string(),
            });
        }
        writers.push(WriterSlot { handler, binding });
    }

    let section = TabSection {
        title: spec.title,
        fields,
        writers,
    };
    let state = TabState {
        fields: states,
        ..Default::default()
    };
    Ok((section, state))
}

fn initial_value(handler: &dyn Handler, role: Role) -> String {
    match role {
        Role::Edit | Role::Interactive => handler.as_edit().map(|e| e.value()),
        Role::Display => handler.as_display().map(|d| d.content()),
        _ => None,
    }
    .unwrap_or_default()
}

pub struct Dashboard {
    config: DashboardConfig,
    layout: Arc<Layout>,
    store: Arc<Mutex<Store>>,
    engine: Engine,
    events: mpsc::Sender<StreamEvent>,
    merge: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Dashboard {
    pub fn builder(config: DashboardConfig) -> DashboardBuilder {
        DashboardBuilder {
            config,
            tabs: Vec::new(),
            sink: None,
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// See [`Engine::trigger`].
    pub fn trigger(&self, at: FieldRef, input: &str) -> Result<Dispatch, DashError> {
        self.engine.trigger(at, input)
    }

    pub fn tab_count(&self) -> usize {
        self.layout.tabs.len()
    }

    pub fn tab_title(&self, tab: usize) -> Option<&str> {
        self.layout.tabs.get(tab).map(|t| t.title.as_str())
    }

    pub fn field_count(&self, tab: usize) -> usize {
        self.layout.tabs.get(tab).map_or(0, |t| t.fields.len())
    }

    /// Bumped on every change to any tab; renderers can skip redraws when it is unchanged.
    pub fn revision(&self) -> u64 {
        store::lock(&self.store).revision()
    }

    pub fn contents(&self, tab: usize) -> Result<Vec<TabContent>, DashError> {
        self.layout.tab(tab)?;
        let store = store::lock(&self.store);
        Ok(store
            .tabs
            .get(tab)
            .map(|t| t.contents.entries().to_vec())
            .unwrap_or_default())
    }

    pub fn phase(&self, at: FieldRef) -> Result<FieldPhase, DashError> {
        self.layout.field(at)?;
        let store = store::lock(&self.store);
        Ok(store
            .field_state(at)
            .map_or(FieldPhase::Idle, |s| s.phase))
    }

    /// Current text of a display field, unformatted. `None` for other roles.
    pub fn display_content(&self, at: FieldRef) -> Result<Option<String>, DashError> {
        let field = self.layout.field(at)?;
        if field.binding.role != Role::Display {
            return Ok(None);
        }
        Ok(field.handler.as_display().map(|d| d.content()))
    }

    pub fn field_view(&self, at: FieldRef) -> Result<FieldView, DashError> {
        let field = self.layout.field(at)?;
        let state = store::lock(&self.store)
            .field_state(at)
            .cloned()
            .ok_or(DashError::UnknownField {
                tab: at.tab,
                field: at.field,
            })?;
        Ok(view_of(field, state))
    }

    /// Owned snapshot of a tab for drawing. Handler accessors are called after
    /// the lock is released.
    pub fn tab_view(&self, tab: usize) -> Result<TabView, DashError> {
        let section = self.layout.tab(tab)?;
        let (states, contents, revision) = {
            let store = store::lock(&self.store);
            let t = store.tabs.get(tab).ok_or(DashError::UnknownTab(tab))?;
            (
                t.fields.clone(),
                t.contents.entries().to_vec(),
                store.revision(),
            )
        };
        let fields = section
            .fields
            .iter()
            .zip(states)
            .map(|(field, state)| view_of(field, state))
            .collect();
        Ok(TabView {
            title: section.title.clone(),
            fields,
            contents,
            revision,
        })
    }

    /// Handle for feeding a registered writer.
    pub fn writer(&self, tab: usize, name: &str) -> Result<WriterHandle, DashError> {
        let section = self.layout.tab(tab)?;
        let writer = section
            .writers
            .iter()
            .position(|w| w.handler.name() == name)
            .ok_or_else(|| DashError::UnknownWriter {
                tab,
                name: name.to_string(),
            })?;
        Ok(WriterHandle {
            tab,
            writer,
            events: self.events.clone(),
            pending: Vec::new(),
            broken: false,
        })
    }

    /// Stop the merge task and wait for it. Workers still running are detached.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(merge) = self.merge.take() {
            if let Err(e) = merge.await {
                tracing::warn!("merge task ended abnormally: {e}");
            }
        }
        tracing::info!("dashboard shut down");
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn view_of(field: &Field, state: FieldState) -> FieldView {
    let waiting_for_user = field.binding.role == Role::Interactive
        && catch_panic(|| {
            field
                .handler
                .as_interactive()
                .is_some_and(|i| i.waiting_for_user())
        })
        .unwrap_or(false);
    FieldView {
        label: field.label.clone(),
        name: field.handler.name().to_string(),
        value: state.value,
        role: field.binding.role,
        editable: field.editable,
        phase: state.phase,
        last_outcome: state.last_outcome,
        waiting_for_user,
    }
}

/// Sender side of a writer. Implements [`io::Write`]: complete lines are sent
/// as messages, a trailing partial line waits for `flush` or the next newline.
/// Bytes are decoded per line, so a character split across writes survives.
///
/// The blocking methods must not be called from inside an async task; use
/// [`WriterHandle::send`] there.
#[derive(Debug)]
pub struct WriterHandle {
    tab: usize,
    writer: usize,
    events: mpsc::Sender<StreamEvent>,
    pending: Vec<u8>,
    // Set once a send failed; later writes report the closed dashboard.
    broken: bool,
}

impl Clone for WriterHandle {
    fn clone(&self) -> Self {
        Self {
            tab: self.tab,
            writer: self.writer,
            events: self.events.clone(),
            pending: Vec::new(),
            broken: false,
        }
    }
}

impl WriterHandle {
    fn event(&self, text: String) -> StreamEvent {
        StreamEvent::Write {
            tab: self.tab,
            writer: self.writer,
            text,
        }
    }

    pub fn write_line(&self, text: impl Into<String>) -> Result<(), DashError> {
        self.events
            .blocking_send(self.event(text.into()))
            .map_err(|_| DashError::Closed)
    }

    pub async fn send(&self, text: impl Into<String>) -> Result<(), DashError> {
        self.events
            .send(self.event(text.into()))
            .await
            .map_err(|_| DashError::Closed)
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, DashError::Closed)
}

impl io::Write for WriterHandle {
    /// Accepts all of `buf` or none of it. A send failure after the bytes were
    /// taken is reported by the next `write` or `flush`.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.broken || self.events.is_closed() {
            return Err(closed());
        }
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(['\n', '\r']);
            if text.is_empty() {
                continue;
            }
            if self.write_line(text).is_err() {
                self.broken = true;
                break;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.broken {
            return Err(closed());
        }
        if self.pending.is_empty() {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&std::mem::take(&mut self.pending)).into_owned();
        self.write_line(line).map_err(|_| {
            self.broken = true;
            closed()
        })
    }
}
