//! Handler capability model.
//!
//! A handler is any `Handler` implementation. What it can do is discovered by
//! probing the `as_*` accessors, each of which hands out one narrow capability
//! trait. The probe runs once when a field is registered and the result is
//! cached on the field.

use crate::engine::Progress;
use crate::error::{ConfigError, HandlerError};
use crate::stream::Severity;
use crate::tracker::OperationId;
use serde::Serialize;

/// A user-supplied object bound to a field or registered as a writer.
pub trait Handler: Send + Sync + 'static {
    /// Stable name used to attribute messages (`[name] text`).
    fn name(&self) -> &str;

    /// Text shown next to the field. Defaults to the name.
    fn label(&self) -> &str {
        self.name()
    }

    fn as_display(&self) -> Option<&dyn Display> {
        None
    }

    fn as_edit(&self) -> Option<&dyn Edit> {
        None
    }

    fn as_execution(&self) -> Option<&dyn Execution> {
        None
    }

    fn as_interactive(&self) -> Option<&dyn Interactive> {
        None
    }

    fn as_writer(&self) -> Option<&dyn Writer> {
        None
    }

    fn as_tracker(&self) -> Option<&dyn Tracker> {
        None
    }
}

/// Static, read-only content.
pub trait Display: Send + Sync {
    fn content(&self) -> String;
}

/// A value the user can change.
pub trait Edit: Send + Sync {
    fn value(&self) -> String;

    /// Apply `new_value`. The returned text becomes the final message; on error
    /// the field keeps its previous value.
    fn change(&self, new_value: &str, progress: &Progress) -> Result<String, HandlerError>;
}

/// A no-argument action (button).
pub trait Execution: Send + Sync {
    fn execute(&self, progress: &Progress) -> Result<String, HandlerError>;
}

/// Refines [`Edit`] with a gate on whether keystrokes are collected as input.
///
/// While `waiting_for_user` is false, confirming the field calls `change("")`,
/// which asks the handler for its current content.
pub trait Interactive: Send + Sync {
    fn waiting_for_user(&self) -> bool;
}

/// Log sink fed by code rather than by the user.
pub trait Writer: Send + Sync {
    /// Fixed severity for everything this writer emits. `None` classifies the text.
    fn severity(&self) -> Option<Severity> {
        None
    }
}

/// Handler whose messages can be rewritten in place.
pub trait Tracker: Send + Sync {
    fn last_operation_id(&self) -> Option<OperationId>;
    fn set_last_operation_id(&self, id: Option<OperationId>);
}

/// How user input is routed to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    Display,
    Edit,
    Execution,
    Interactive,
    Writer,
    WriterTracker,
}

impl Role {
    /// Whether this role accepts a typed value.
    pub fn takes_input(self) -> bool {
        matches!(self, Role::Edit | Role::Interactive)
    }

    pub fn is_writer(self) -> bool {
        matches!(self, Role::Writer | Role::WriterTracker)
    }
}

/// Every capability a handler exposes, probed independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub display: bool,
    pub edit: bool,
    pub execution: bool,
    pub interactive: bool,
    pub writer: bool,
    pub tracker: bool,
}

impl Capabilities {
    pub fn probe(handler: &dyn Handler) -> Self {
        Self {
            display: handler.as_display().is_some(),
            edit: handler.as_edit().is_some(),
            execution: handler.as_execution().is_some(),
            interactive: handler.as_interactive().is_some(),
            writer: handler.as_writer().is_some(),
            tracker: handler.as_tracker().is_some(),
        }
    }

    /// Role of a handler bound to a field.
    ///
    /// Interactive wins over Edit, Edit over Execution, Execution over Display.
    pub fn field_role(&self) -> Option<Role> {
        if self.interactive && self.edit {
            Some(Role::Interactive)
        } else if self.edit {
            Some(Role::Edit)
        } else if self.execution {
            Some(Role::Execution)
        } else if self.display {
            Some(Role::Display)
        } else {
            None
        }
    }

    pub fn writer_role(&self) -> Option<Role> {
        match (self.writer, self.tracker) {
            (true, true) => Some(Role::WriterTracker),
            (true, false) => Some(Role::Writer),
            _ => None,
        }
    }
}

/// Cached result of probing a handler at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub role: Role,
    pub caps: Capabilities,
}

impl Binding {
    pub fn for_field(handler: &dyn Handler) -> Result<Self, ConfigError> {
        let caps = Capabilities::probe(handler);
        if caps.interactive && !caps.edit {
            return Err(ConfigError::InteractiveWithoutEdit {
                handler: handler.name().to_string(),
            });
        }
        let role = caps.field_role().ok_or_else(|| ConfigError::NoCapability {
            handler: handler.name().to_string(),
        })?;
        Ok(Self { role, caps })
    }

    pub fn for_writer(handler: &dyn Handler) -> Result<Self, ConfigError> {
        let caps = Capabilities::probe(handler);
        let role = caps.writer_role().ok_or_else(|| ConfigError::NotAWriter {
            handler: handler.name().to_string(),
        })?;
        Ok(Self { role, caps })
    }

    /// Messages from this binding may be rewritten in place.
    pub fn tracks(&self) -> bool {
        self.caps.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;
    impl Handler for Bare {
        fn name(&self) -> &str {
            "bare"
        }
    }

    struct Port;
    impl Handler for Port {
        fn name(&self) -> &str {
            "port"
        }
        fn as_edit(&self) -> Option<&dyn Edit> {
            Some(self)
        }
        fn as_tracker(&self) -> Option<&dyn Tracker> {
            Some(self)
        }
    }
    impl Edit for Port {
        fn value(&self) -> String {
            "5432".into()
        }
        fn change(&self, v: &str, _: &Progress) -> Result<String, HandlerError> {
            Ok(v.to_string())
        }
    }
    impl Tracker for Port {
        fn last_operation_id(&self) -> Option<OperationId> {
            None
        }
        fn set_last_operation_id(&self, _: Option<OperationId>) {}
    }

    struct Chat;
    impl Handler for Chat {
        fn name(&self) -> &str {
            "chat"
        }
        fn as_edit(&self) -> Option<&dyn Edit> {
            Some(self)
        }
        fn as_interactive(&self) -> Option<&dyn Interactive> {
            Some(self)
        }
        fn as_display(&self) -> Option<&dyn Display> {
            Some(self)
        }
    }
    impl Edit for Chat {
        fn value(&self) -> String {
            String::new()
        }
        fn change(&self, _: &str, _: &Progress) -> Result<String, HandlerError> {
            Ok(String::new())
        }
    }
    impl Interactive for Chat {
        fn waiting_for_user(&self) -> bool {
            true
        }
    }
    impl Display for Chat {
        fn content(&self) -> String {
            "hello".into()
        }
    }

    struct HalfInteractive;
    impl Handler for HalfInteractive {
        fn name(&self) -> &str {
            "half"
        }
        fn as_interactive(&self) -> Option<&dyn Interactive> {
            Some(self)
        }
    }
    impl Interactive for HalfInteractive {
        fn waiting_for_user(&self) -> bool {
            false
        }
    }

    #[test]
    fn handler_without_capabilities_is_rejected() {
        assert_eq!(
            Binding::for_field(&Bare),
            Err(ConfigError::NoCapability {
                handler: "bare".into()
            })
        );
    }

    #[test]
    fn tracker_detected_alongside_edit() {
        let b = Binding::for_field(&Port).unwrap();
        assert_eq!(b.role, Role::Edit);
        assert!(b.tracks());
    }

    #[test]
    fn interactive_takes_precedence() {
        let b = Binding::for_field(&Chat).unwrap();
        assert_eq!(b.role, Role::Interactive);
        assert!(b.caps.display && b.caps.edit);
    }

    #[test]
    fn interactive_requires_edit() {
        assert!(matches!(
            Binding::for_field(&HalfInteractive),
            Err(ConfigError::InteractiveWithoutEdit { .. })
        ));
    }

    #[test]
    fn writer_role_needs_writer_capability() {
        assert!(Binding::for_writer(&Port).is_err());
    }
}
