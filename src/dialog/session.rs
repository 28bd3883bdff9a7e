//! Dialog sessions and their registry.
//!
//! One session per conversation, created when a flow starts and destroyed on
//! completion, cancel, or idle timeout. The registry is the only place
//! sessions live; there is no global state elsewhere.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::dialog::buffer::DialogBuffer;
use crate::dialog::flow::FlowKind;

/// Where the session is in its flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for input to the step at this index.
    InProgress { step_idx: usize },
    /// All steps answered; only the persistence commit remains. The buffer
    /// stays intact so a failed commit can be retried. `user_id` is the
    /// answerer captured at completion; a retry triggered by another
    /// sender in the conversation must not reattribute the lead.
    Completed { user_id: i64 },
}

#[derive(Debug)]
pub struct DialogSession {
    pub flow: FlowKind,
    pub state: SessionState,
    pub buffer: DialogBuffer,
    pub last_activity: Instant,
}

impl DialogSession {
    pub fn new(flow: FlowKind) -> Self {
        Self {
            flow,
            state: SessionState::InProgress { step_idx: 0 },
            buffer: DialogBuffer::default(),
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() >= timeout
    }
}

/// All live sessions, keyed by conversation id.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<i64, DialogSession>>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Create a fresh session, abandoning any existing one for this
    /// conversation. Buffers are never merged.
    pub fn start(&self, conversation_id: i64, flow: FlowKind) {
        let mut sessions = self.sessions.lock().expect("session registry poisoned");
        if sessions.remove(&conversation_id).is_some() {
            debug!(conversation_id, "Abandoning previous dialog session");
        }
        sessions.insert(conversation_id, DialogSession::new(flow));
    }

    /// Run `f` on the session for this conversation, if one exists.
    pub fn with_session<R>(
        &self,
        conversation_id: i64,
        f: impl FnOnce(&mut DialogSession) -> R,
    ) -> Option<R> {
        let mut sessions = self.sessions.lock().expect("session registry poisoned");
        sessions.get_mut(&conversation_id).map(f)
    }

    /// Destroy the session. Returns whether one existed.
    pub fn remove(&self, conversation_id: i64) -> bool {
        self.sessions
            .lock()
            .expect("session registry poisoned")
            .remove(&conversation_id)
            .is_some()
    }

    pub fn contains(&self, conversation_id: i64) -> bool {
        self.sessions
            .lock()
            .expect("session registry poisoned")
            .contains_key(&conversation_id)
    }

    /// Drop every session idle past the timeout. Returns how many were
    /// abandoned.
    pub fn prune_idle(&self) -> usize {
        let mut sessions = self.sessions.lock().expect("session registry poisoned");
        let before = sessions.len();
        sessions.retain(|conversation_id, session| {
            let keep = !session.is_idle(self.idle_timeout);
            if !keep {
                debug!(conversation_id, flow = ?session.flow, "Dialog session timed out");
            }
            keep
        });
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
