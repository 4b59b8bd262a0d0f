//! Sample handlers used by the demo binary and the tests.

use crate::config::DashboardConfig;
use crate::dashboard::{Dashboard, DashboardBuilder, FieldSpec, TabSpec};
use crate::engine::Progress;
use crate::error::HandlerError;
use crate::handler::{Display, Edit, Execution, Handler, Interactive, Tracker, Writer};
use crate::tracker::OperationId;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn guard<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Database port, validated synchronously.
#[derive(Debug)]
pub struct DatabasePort {
    port: Mutex<String>,
}

impl DatabasePort {
    pub fn new(port: u16) -> Self {
        Self {
            port: Mutex::new(port.to_string()),
        }
    }
}

impl Handler for DatabasePort {
    fn name(&self) -> &str {
        "database"
    }
    fn label(&self) -> &str {
        "Port"
    }
    fn as_edit(&self) -> Option<&dyn Edit> {
        Some(self)
    }
}

impl Edit for DatabasePort {
    fn value(&self) -> String {
        guard(&self.port).clone()
    }

    fn change(&self, new_value: &str, _progress: &Progress) -> Result<String, HandlerError> {
        let raw = new_value.trim();
        if raw.is_empty() {
            return Err(HandlerError::validation("port cannot be empty"));
        }
        let port: u16 = raw
            .parse()
            .map_err(|_| HandlerError::validation(format!("invalid port: {raw}")))?;
        if port == 0 {
            return Err(HandlerError::validation("port must be between 1 and 65535"));
        }
        *guard(&self.port) = port.to_string();
        Ok(format!("Port configured: {port}"))
    }
}

/// Long-running build with a progress line per step.
#[derive(Debug)]
pub struct BuildAction {
    steps: Vec<&'static str>,
    step_delay: Duration,
}

impl BuildAction {
    pub fn new(step_delay: Duration) -> Self {
        Self {
            steps: vec![
                "Resolving dependencies",
                "Compiling sources",
                "Running tests",
                "Packaging artifacts",
            ],
            step_delay,
        }
    }
}

impl Handler for BuildAction {
    fn name(&self) -> &str {
        "build"
    }
    fn label(&self) -> &str {
        "Build project"
    }
    fn as_execution(&self) -> Option<&dyn Execution> {
        Some(self)
    }
}

impl Execution for BuildAction {
    fn execute(&self, progress: &Progress) -> Result<String, HandlerError> {
        let total = self.steps.len();
        for (i, step) in self.steps.iter().enumerate() {
            if progress.is_cancelled() {
                return Err(HandlerError::failed("build abandoned"));
            }
            progress.report(format!("[{}/{}] {step}...", i + 1, total));
            std::thread::sleep(self.step_delay);
        }
        Ok("Build completed successfully".into())
    }
}

/// Deployment whose progress rewrites a single line.
#[derive(Debug)]
pub struct DeployAction {
    target: String,
    tick: Duration,
    last_op: Mutex<Option<OperationId>>,
}

impl DeployAction {
    pub fn new(target: impl Into<String>, tick: Duration) -> Self {
        Self {
            target: target.into(),
            tick,
            last_op: Mutex::new(None),
        }
    }
}

impl Handler for DeployAction {
    fn name(&self) -> &str {
        "deploy"
    }
    fn label(&self) -> &str {
        "Deploy"
    }
    fn as_execution(&self) -> Option<&dyn Execution> {
        Some(self)
    }
    fn as_tracker(&self) -> Option<&dyn Tracker> {
        Some(self)
    }
}

impl Execution for DeployAction {
    fn execute(&self, progress: &Progress) -> Result<String, HandlerError> {
        for pct in (0..=100).step_by(25) {
            if progress.is_cancelled() {
                break;
            }
            progress.report(format!("Deploying to {}... {pct}%", self.target));
            std::thread::sleep(self.tick);
        }
        Ok(format!("Deployed to {}", self.target))
    }
}

impl Tracker for DeployAction {
    fn last_operation_id(&self) -> Option<OperationId> {
        *guard(&self.last_op)
    }
    fn set_last_operation_id(&self, id: Option<OperationId>) {
        *guard(&self.last_op) = id;
    }
}

#[derive(Debug, Default)]
struct ChatState {
    started: bool,
    waiting: bool,
    transcript: Vec<String>,
}

/// Multi-turn exchange. Confirming with no input opens the conversation;
/// after that every confirmed line gets a reply.
#[derive(Debug)]
pub struct ChatAssistant {
    state: Mutex<ChatState>,
    think: Duration,
}

impl ChatAssistant {
    pub fn new(think: Duration) -> Self {
        Self {
            state: Mutex::new(ChatState::default()),
            think,
        }
    }
}

impl Handler for ChatAssistant {
    fn name(&self) -> &str {
        "chat"
    }
    fn label(&self) -> &str {
        "Assistant"
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

impl Edit for ChatAssistant {
    fn value(&self) -> String {
        guard(&self.state)
            .transcript
            .last()
            .cloned()
            .unwrap_or_default()
    }

    fn change(&self, new_value: &str, progress: &Progress) -> Result<String, HandlerError> {
        let msg = new_value.trim();
        if msg.is_empty() {
            let opening = {
                let mut st = guard(&self.state);
                let opening = !st.started;
                st.started = true;
                st.waiting = true;
                opening
            };
            if opening {
                return Ok("Chat ready. Type a message and press Enter.".into());
            }
            return Ok(Display::content(self));
        }

        guard(&self.state).waiting = false;
        progress.report("Thinking...");
        std::thread::sleep(self.think);
        let reply = format!("You said: {msg}");
        let mut st = guard(&self.state);
        st.transcript.push(format!("> {msg}"));
        st.transcript.push(reply.clone());
        st.waiting = true;
        Ok(reply)
    }
}

impl Interactive for ChatAssistant {
    fn waiting_for_user(&self) -> bool {
        guard(&self.state).waiting
    }
}

impl Display for ChatAssistant {
    fn content(&self) -> String {
        let st = guard(&self.state);
        if st.transcript.is_empty() {
            "No messages yet.".into()
        } else {
            st.transcript.join("\n")
        }
    }
}

/// Read-only status line.
#[derive(Debug)]
pub struct StatusDisplay {
    text: String,
}

impl StatusDisplay {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Handler for StatusDisplay {
    fn name(&self) -> &str {
        "status"
    }
    fn label(&self) -> &str {
        "Status"
    }
    fn as_display(&self) -> Option<&dyn Display> {
        Some(self)
    }
}

impl Display for StatusDisplay {
    fn content(&self) -> String {
        self.text.clone()
    }
}

/// Append-only log writer.
#[derive(Debug)]
pub struct SystemLog;

impl Handler for SystemLog {
    fn name(&self) -> &str {
        "system"
    }
    fn as_writer(&self) -> Option<&dyn Writer> {
        Some(self)
    }
}

impl Writer for SystemLog {}

/// Writer that keeps rewriting one line until told to start a new one.
#[derive(Debug, Default)]
pub struct Heartbeat {
    last_op: Mutex<Option<OperationId>>,
}

impl Heartbeat {
    /// Next write starts a fresh line.
    pub fn reset(&self) {
        *guard(&self.last_op) = None;
    }
}

impl Handler for Heartbeat {
    fn name(&self) -> &str {
        "heartbeat"
    }
    fn as_writer(&self) -> Option<&dyn Writer> {
        Some(self)
    }
    fn as_tracker(&self) -> Option<&dyn Tracker> {
        Some(self)
    }
}

impl Writer for Heartbeat {}

impl Tracker for Heartbeat {
    fn last_operation_id(&self) -> Option<OperationId> {
        *guard(&self.last_op)
    }
    fn set_last_operation_id(&self, id: Option<OperationId>) {
        *guard(&self.last_op) = id;
    }
}

/// Tab index of the build tab in [`builder`].
pub const BUILD_TAB: usize = 1;

/// The demo layout: configuration, build/deploy, chat. `heartbeat` feeds the build tab.
pub fn builder(config: DashboardConfig, heartbeat: Arc<Heartbeat>) -> DashboardBuilder {
    let default_timeout = config.default_timeout;
    Dashboard::builder(config)
        .tab(
            TabSpec::new("CONFIG")
                .field(FieldSpec::new(Arc::new(DatabasePort::new(5432))).timeout(Duration::ZERO))
                .handler(Arc::new(StatusDisplay::new(
                    "Edit a field with Enter, confirm with Enter, cancel with Esc.",
                )))
                .writer(Arc::new(SystemLog)),
        )
        .tab(
            TabSpec::new("BUILD")
                .handler(Arc::new(BuildAction::new(Duration::from_millis(700))))
                .field(
                    FieldSpec::new(Arc::new(DeployAction::new(
                        "staging",
                        Duration::from_millis(500),
                    )))
                    .timeout(default_timeout.max(Duration::from_secs(5))),
                )
                .writer(heartbeat),
        )
        .tab(TabSpec::new("CHAT").handler(Arc::new(ChatAssistant::new(Duration::from_millis(400)))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_validation() {
        let p = DatabasePort::new(5432);
        let none = Progress::detached();
        assert_eq!(p.change("8080", &none).unwrap(), "Port configured: 8080");
        assert_eq!(p.value(), "8080");
        assert!(matches!(
            p.change("abc", &none),
            Err(HandlerError::Validation(_))
        ));
        assert!(p.change("", &none).is_err());
        assert!(p.change("0", &none).is_err());
        assert!(p.change("70000", &none).is_err());
        assert_eq!(p.value(), "8080");
    }

    #[test]
    fn chat_switches_modes_on_empty_input() {
        let chat = ChatAssistant::new(Duration::ZERO);
        let none = Progress::detached();
        assert!(!chat.waiting_for_user());
        let opened = chat.change("", &none).unwrap();
        assert!(opened.starts_with("Chat ready"));
        assert!(chat.waiting_for_user());
        assert_eq!(chat.change("hello", &none).unwrap(), "You said: hello");
        assert!(chat.waiting_for_user());
        assert_eq!(chat.change("", &none).unwrap(), "> hello\nYou said: hello");
    }
}
