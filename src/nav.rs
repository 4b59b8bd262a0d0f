//! Tab/field selection and the edit buffer.
//!
//! Pure state: it never calls the engine. Confirming an edit yields a
//! [`Commit`] which the caller passes to `trigger`.

use crate::dashboard::Dashboard;
use crate::handler::Role;
use crate::model::{FieldRef, FieldView};

/// What the navigation layer needs to know about fields.
pub trait FieldLookup {
    fn tab_count(&self) -> usize;
    fn field_count(&self, tab: usize) -> usize;
    fn field_view(&self, at: FieldRef) -> Option<FieldView>;
}

impl FieldLookup for Dashboard {
    fn tab_count(&self) -> usize {
        Dashboard::tab_count(self)
    }

    fn field_count(&self, tab: usize) -> usize {
        Dashboard::field_count(self, tab)
    }

    fn field_view(&self, at: FieldRef) -> Option<FieldView> {
        Dashboard::field_view(self, at).ok()
    }
}

/// Renderer-independent input events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavInput {
    NextTab,
    PrevTab,
    NextField,
    PrevField,
    Left,
    Right,
    Char(char),
    Backspace,
    Confirm,
    Cancel,
}

/// Text being typed into a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBuffer {
    pub at: FieldRef,
    pub text: String,
    /// Cursor position in chars.
    pub cursor: usize,
}

impl EditBuffer {
    fn new(at: FieldRef, text: String) -> Self {
        let cursor = text.chars().count();
        Self { at, text, cursor }
    }

    fn byte_index(&self, char_idx: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_idx)
            .map_or(self.text.len(), |(i, _)| i)
    }

    fn insert(&mut self, c: char) {
        let idx = self.byte_index(self.cursor);
        self.text.insert(idx, c);
        self.cursor += 1;
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let idx = self.byte_index(self.cursor);
        self.text.remove(idx);
    }

    fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }
}

/// Request to run a field's handler with `input`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub at: FieldRef,
    pub input: String,
}

#[derive(Debug, Clone, Default)]
pub struct NavState {
    tab: usize,
    // Selected field per tab, so switching tabs keeps each tab's position.
    selected: Vec<usize>,
    editing: Option<EditBuffer>,
}

impl NavState {
    pub fn tab(&self) -> usize {
        self.tab
    }

    pub fn field(&self) -> usize {
        self.selected.get(self.tab).copied().unwrap_or(0)
    }

    pub fn current(&self) -> FieldRef {
        FieldRef::new(self.tab, self.field())
    }

    pub fn editing(&self) -> Option<&EditBuffer> {
        self.editing.as_ref()
    }

    fn set_field(&mut self, field: usize) {
        if self.selected.len() <= self.tab {
            self.selected.resize(self.tab + 1, 0);
        }
        self.selected[self.tab] = field;
    }

    fn switch_tab(&mut self, fields: &impl FieldLookup, forward: bool) {
        let count = fields.tab_count();
        if count == 0 {
            return;
        }
        self.editing = None;
        self.tab = if forward {
            (self.tab + 1) % count
        } else {
            (self.tab + count - 1) % count
        };
    }

    fn move_field(&mut self, fields: &impl FieldLookup, forward: bool) {
        let count = fields.field_count(self.tab);
        if count == 0 || self.editing.is_some() {
            return;
        }
        let cur = self.field().min(count - 1);
        let next = if forward {
            (cur + 1) % count
        } else {
            (cur + count - 1) % count
        };
        self.set_field(next);
    }

    /// Apply one input. Returns a commit when the user confirmed something to run.
    pub fn handle(&mut self, input: NavInput, fields: &impl FieldLookup) -> Option<Commit> {
        match input {
            NavInput::NextTab => self.switch_tab(fields, true),
            NavInput::PrevTab => self.switch_tab(fields, false),
            NavInput::NextField => self.move_field(fields, true),
            NavInput::PrevField => self.move_field(fields, false),
            NavInput::Left => match self.editing.as_mut() {
                Some(buf) => buf.left(),
                None => self.switch_tab(fields, false),
            },
            NavInput::Right => match self.editing.as_mut() {
                Some(buf) => buf.right(),
                None => self.switch_tab(fields, true),
            },
            NavInput::Char(c) => self.type_char(c, fields),
            NavInput::Backspace => {
                if let Some(buf) = self.editing.as_mut() {
                    buf.backspace();
                }
            }
            NavInput::Cancel => self.editing = None,
            NavInput::Confirm => return self.confirm(fields),
        }
        None
    }

    fn type_char(&mut self, c: char, fields: &impl FieldLookup) {
        if let Some(buf) = self.editing.as_mut() {
            buf.insert(c);
            return;
        }
        // An interactive handler waiting for the user takes keystrokes directly.
        let at = self.current();
        if let Some(view) = fields.field_view(at) {
            if view.role == Role::Interactive
                && view.editable
                && view.waiting_for_user
                && !view.in_flight()
            {
                let mut buf = EditBuffer::new(at, String::new());
                buf.insert(c);
                self.editing = Some(buf);
            }
        }
    }

    fn confirm(&mut self, fields: &impl FieldLookup) -> Option<Commit> {
        if let Some(buf) = self.editing.take() {
            return Some(Commit {
                at: buf.at,
                input: buf.text,
            });
        }

        let at = self.current();
        let view = fields.field_view(at)?;
        if !view.editable {
            return None;
        }
        match view.role {
            Role::Edit => {
                self.editing = Some(EditBuffer::new(at, view.value));
                None
            }
            Role::Interactive if view.waiting_for_user => {
                self.editing = Some(EditBuffer::new(at, String::new()));
                None
            }
            Role::Interactive | Role::Execution => Some(Commit {
                at,
                input: String::new(),
            }),
            Role::Display | Role::Writer | Role::WriterTracker => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldPhase;

    struct Fake {
        tabs: Vec<Vec<FieldView>>,
    }

    fn view(role: Role, value: &str, waiting: bool) -> FieldView {
        FieldView {
            label: format!("{role:?}"),
            name: format!("{role:?}").to_lowercase(),
            value: value.to_string(),
            role,
            editable: role != Role::Display,
            phase: FieldPhase::Idle,
            last_outcome: None,
            waiting_for_user: waiting,
        }
    }

    impl FieldLookup for Fake {
        fn tab_count(&self) -> usize {
            self.tabs.len()
        }
        fn field_count(&self, tab: usize) -> usize {
            self.tabs.get(tab).map_or(0, |t| t.len())
        }
        fn field_view(&self, at: FieldRef) -> Option<FieldView> {
            self.tabs.get(at.tab)?.get(at.field).cloned()
        }
    }

    fn fake() -> Fake {
        Fake {
            tabs: vec![
                vec![
                    view(Role::Edit, "5432", false),
                    view(Role::Execution, "", false),
                    view(Role::Display, "info", false),
                ],
                vec![view(Role::Interactive, "", true)],
            ],
        }
    }

    #[test]
    fn selection_moves_without_commits() {
        let f = fake();
        let mut nav = NavState::default();
        assert_eq!(nav.handle(NavInput::NextField, &f), None);
        assert_eq!(nav.current(), FieldRef::new(0, 1));
        nav.handle(NavInput::PrevField, &f);
        nav.handle(NavInput::PrevField, &f);
        assert_eq!(nav.current(), FieldRef::new(0, 2));
        nav.handle(NavInput::NextTab, &f);
        assert_eq!(nav.current(), FieldRef::new(1, 0));
        nav.handle(NavInput::NextTab, &f);
        assert_eq!(nav.current(), FieldRef::new(0, 2), "tab keeps its own selection");
    }

    #[test]
    fn edit_field_collects_input_until_confirm() {
        let f = fake();
        let mut nav = NavState::default();
        assert_eq!(nav.handle(NavInput::Confirm, &f), None);
        assert_eq!(nav.editing().map(|b| b.text.as_str()), Some("5432"));

        for _ in 0..4 {
            nav.handle(NavInput::Backspace, &f);
        }
        for c in "8080".chars() {
            nav.handle(NavInput::Char(c), &f);
        }
        // Arrows move the cursor instead of changing field while editing.
        nav.handle(NavInput::NextField, &f);
        nav.handle(NavInput::Left, &f);
        nav.handle(NavInput::Char('1'), &f);
        assert_eq!(nav.current(), FieldRef::new(0, 0));

        let commit = nav.handle(NavInput::Confirm, &f).unwrap();
        assert_eq!(commit.at, FieldRef::new(0, 0));
        assert_eq!(commit.input, "80810");
        assert!(nav.editing().is_none());
    }

    #[test]
    fn cancel_discards_the_buffer() {
        let f = fake();
        let mut nav = NavState::default();
        nav.handle(NavInput::Confirm, &f);
        nav.handle(NavInput::Char('9'), &f);
        nav.handle(NavInput::Cancel, &f);
        assert!(nav.editing().is_none());
        assert_eq!(nav.handle(NavInput::NextField, &f), None);
    }

    #[test]
    fn execution_commits_immediately_and_display_never_does() {
        let f = fake();
        let mut nav = NavState::default();
        nav.handle(NavInput::NextField, &f);
        let commit = nav.handle(NavInput::Confirm, &f).unwrap();
        assert_eq!(commit.input, "");

        nav.handle(NavInput::NextField, &f);
        assert_eq!(nav.handle(NavInput::Confirm, &f), None);
        nav.handle(NavInput::Char('x'), &f);
        assert!(nav.editing().is_none());
    }

    #[test]
    fn interactive_routing_follows_waiting_flag() {
        let mut f = fake();
        let mut nav = NavState::default();
        nav.handle(NavInput::NextTab, &f);

        for c in "hi".chars() {
            nav.handle(NavInput::Char(c), &f);
        }
        let commit = nav.handle(NavInput::Confirm, &f).unwrap();
        assert_eq!(commit.input, "hi");

        f.tabs[1][0].waiting_for_user = false;
        nav.handle(NavInput::Char('z'), &f);
        assert!(nav.editing().is_none(), "keystrokes ignored when not waiting");
        let commit = nav.handle(NavInput::Confirm, &f).unwrap();
        assert_eq!(commit.input, "", "empty input requests content");
    }

    #[test]
    fn multibyte_editing() {
        let mut buf = EditBuffer::new(FieldRef::new(0, 0), "héllo".into());
        buf.left();
        buf.left();
        buf.backspace();
        assert_eq!(buf.text, "hélo");
        buf.insert('ł');
        assert_eq!(buf.text, "héłlo");
    }
}
