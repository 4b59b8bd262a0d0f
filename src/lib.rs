//! Terminal dashboards made of tabs and fields, where each field is bound to a
//! handler that may take arbitrarily long to run.
//!
//! The engine runs handlers off the control thread, relays their progress into
//! per-tab message streams, enforces per-field timeouts and guarantees at most
//! one operation in flight per field. Rendering is left to the caller, apart
//! from the optional ratatui front end behind the `tui` feature.

pub mod config;
pub mod dashboard;
pub mod demo;
pub mod engine;
pub mod error;
pub mod handler;
pub mod logging;
pub mod model;
pub mod nav;
pub mod stream;
pub mod tracker;
#[cfg(feature = "tui")]
pub mod tui;

pub use config::DashboardConfig;
pub use dashboard::{Dashboard, DashboardBuilder, FieldSpec, TabSpec, WriterHandle};
pub use engine::{Engine, Progress};
pub use error::{ConfigError, DashError, HandlerError, OperationError};
pub use handler::{
    Binding, Capabilities, Display, Edit, Execution, Handler, Interactive, Role, Tracker, Writer,
};
pub use logging::LogSink;
pub use model::{Dispatch, FieldPhase, FieldRef, FieldView, OutcomeKind, TabView};
pub use nav::{Commit, FieldLookup, NavInput, NavState};
pub use stream::{classify, Severity, TabContent};
pub use tracker::OperationId;
