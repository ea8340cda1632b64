//! The in-memory conversation view shared by the session and its pollers.

use std::sync::{Arc, Mutex, MutexGuard};

use super::message::Message;

#[derive(Debug, Default)]
struct ViewState {
    conversation_id: Option<String>,
    messages: Vec<Message>,
    revision: u64,
}

/// Message list plus a revision counter.
///
/// All changes go through [`ConversationView::update`], which hands the
/// closure the current list under the lock, so two racing writers (a poll
/// tick and a manual refresh) can never overwrite each other with stale
/// snapshots. Cloning shares the same view.
#[derive(Debug, Clone, Default)]
pub struct ConversationView {
    state: Arc<Mutex<ViewState>>,
}

impl ConversationView {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Conversation view lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Runs a reducer against the current messages.
    ///
    /// When the reducer returns `Some(next)` the list is replaced and the
    /// revision advances; the new revision is returned. `None` leaves the view
    /// untouched, revision included.
    pub fn update<F>(&self, reducer: F) -> Option<u64>
    where
        F: FnOnce(&[Message]) -> Option<Vec<Message>>,
    {
        let mut state = self.lock();
        let next = reducer(&state.messages)?;
        state.messages = next;
        state.revision += 1;
        Some(state.revision)
    }

    /// Replaces the whole view, e.g. after loading another conversation.
    pub fn reset(&self, conversation_id: Option<String>, messages: Vec<Message>) -> u64 {
        let mut state = self.lock();
        state.conversation_id = conversation_id;
        state.messages = messages;
        state.revision += 1;
        state.revision
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.lock().conversation_id.clone()
    }

    /// Sets the conversation id if none is set yet; returns the id in effect.
    pub fn adopt_conversation_id(&self, id: &str) -> String {
        let mut state = self.lock();
        state
            .conversation_id
            .get_or_insert_with(|| id.to_string())
            .clone()
    }
}
