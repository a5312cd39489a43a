use tracing::debug;

use vara_proto::protocol::ViewState;

/// Result of a back action.
#[derive(Debug, Clone, PartialEq)]
pub enum PopOutcome {
    /// The top entry was removed; the new current view is returned.
    Popped(ViewState),
    /// Only the root entry is left; nothing changed.
    AtRoot,
    /// The return-to-assistant flag was armed; the stack is untouched and
    /// the caller should go back to the assistant page.
    ReturnToAssistant,
}

/// Drill-down history of views. Never empty.
#[derive(Debug, Clone)]
pub struct NavigationStack {
    entries: Vec<ViewState>,
    return_to_assistant: bool,
}

impl Default for NavigationStack {
    fn default() -> Self {
        Self::new(ViewState::for_you())
    }
}

impl NavigationStack {
    pub fn new(root: ViewState) -> Self {
        Self {
            entries: vec![root],
            return_to_assistant: false,
        }
    }

    pub fn push(&mut self, view: ViewState) {
        debug!(view = ?view.view, depth = self.entries.len() + 1, "nav: push");
        self.entries.push(view);
    }

    /// Consumes the return-to-assistant flag if set, otherwise removes the
    /// top entry while more than one remains.
    pub fn pop(&mut self) -> PopOutcome {
        if std::mem::take(&mut self.return_to_assistant) {
            debug!("nav: back redirected to assistant");
            return PopOutcome::ReturnToAssistant;
        }
        if self.entries.len() <= 1 {
            return PopOutcome::AtRoot;
        }
        self.entries.pop();
        PopOutcome::Popped(self.current().clone())
    }

    /// Replaces the whole history with one entry. Also drops a pending
    /// return-to-assistant redirect.
    pub fn reset(&mut self, view: ViewState) {
        debug!(view = ?view.view, "nav: reset");
        self.entries.clear();
        self.entries.push(view);
        self.return_to_assistant = false;
    }

    pub fn current(&self) -> &ViewState {
        // entries always holds the root
        &self.entries[self.entries.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn arm_return_to_assistant(&mut self) {
        self.return_to_assistant = true;
    }

    pub fn returns_to_assistant(&self) -> bool {
        self.return_to_assistant
    }
}
