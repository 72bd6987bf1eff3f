//! Timer-driven reveal for live messages.
//!
//! A [`RevealDriver`] runs one [`RevealScheduler`] on the tokio timer and
//! hands each prefix to a frame sink. There is at most one timer chain per
//! driver: replacing the source aborts the running chain and bumps a
//! generation counter. The reset frame and every later frame are emitted
//! under the same lock that checks the generation, so a frame from an old
//! chain can never appear after the reset.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use inferra_core::persistence::MessageRole;
//! use inferra_core::reveal::{RevealConfig, RevealDriver};
//!
//! # async fn run() {
//! let sink = Arc::new(|frame: &inferra_core::reveal::RevealFrame| println!("{}", frame.displayed));
//! let mut driver = RevealDriver::new("message-1", RevealConfig::default(), sink);
//! driver.set_source(MessageRole::Assistant, "Hello\nworld");
//! driver.join().await;
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::persistence::types::{Message, MessageRole};

use super::scheduler::{RevealConfig, RevealScheduler, RevealState};

/// What the message view should paint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealFrame {
    pub message_id: String,
    pub displayed: String,
    pub state: RevealState,
}

/// Receives frames. Must not call back into the driver that emitted them.
pub type FrameSink = Arc<dyn Fn(&RevealFrame) + Send + Sync>;

struct Shared {
    generation: u64,
    displayed: String,
    state: RevealState,
}

impl Shared {
    fn emit(&mut self, sink: &FrameSink, message_id: &str, displayed: String, state: RevealState) {
        self.displayed = displayed;
        self.state = state;
        sink(&RevealFrame {
            message_id: message_id.to_string(),
            displayed: self.displayed.clone(),
            state,
        });
    }
}

/// Reveal driver for one message identity.
pub struct RevealDriver {
    message_id: String,
    config: RevealConfig,
    sink: FrameSink,
    shared: Arc<Mutex<Shared>>,
    source: Option<String>,
    task: Option<JoinHandle<()>>,
}

impl RevealDriver {
    pub fn new(message_id: impl Into<String>, config: RevealConfig, sink: FrameSink) -> Self {
        Self {
            message_id: message_id.into(),
            config,
            sink,
            shared: Arc::new(Mutex::new(Shared {
                generation: 0,
                displayed: String::new(),
                state: RevealState::Idle,
            })),
            source: None,
            task: None,
        }
    }

    /// Start revealing `text`, replacing whatever was being revealed.
    ///
    /// User messages are shown in full with a single frame. Assistant
    /// messages emit an empty reset frame first and then one frame per
    /// character on the tokio timer. Outside a tokio runtime the text is shown
    /// in full at once.
    pub fn set_source(&mut self, role: MessageRole, text: impl Into<String>) {
        let text = text.into();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.source = Some(text.clone());

        let mut shared = match self.shared.lock() {
            Ok(shared) => shared,
            Err(e) => {
                log::warn!("Reveal state poisoned for {}: {}", self.message_id, e);
                return;
            }
        };
        shared.generation += 1;
        let generation = shared.generation;

        if role == MessageRole::User {
            shared.emit(&self.sink, &self.message_id, text, RevealState::Complete);
            return;
        }

        let mut scheduler = RevealScheduler::new(self.config);
        scheduler.start(text);
        shared.emit(&self.sink, &self.message_id, String::new(), scheduler.state());
        if scheduler.state() == RevealState::Complete {
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                log::warn!("No async runtime for reveal of {}, showing in full", self.message_id);
                let full = scheduler.source().to_string();
                shared.emit(&self.sink, &self.message_id, full, RevealState::Complete);
                return;
            }
        };
        drop(shared);

        log::debug!(
            "Revealing {} ({} chars, generation {})",
            self.message_id,
            scheduler.source().chars().count(),
            generation
        );

        let shared = Arc::clone(&self.shared);
        let sink = Arc::clone(&self.sink);
        let message_id = self.message_id.clone();
        self.task = Some(runtime.spawn(async move {
            while let Some(step) = scheduler.advance() {
                {
                    let Ok(mut current) = shared.lock() else {
                        return;
                    };
                    if current.generation != generation {
                        return;
                    }
                    current.emit(&sink, &message_id, step.displayed, scheduler.state());
                }

                match step.next_delay {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => break,
                }
            }
        }));
    }

    /// Wait for the current timer chain to finish.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    log::warn!("Reveal task for {} failed: {}", self.message_id, e);
                }
            }
        }
    }

    /// Stop revealing, leaving the current prefix on display.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Ok(mut shared) = self.shared.lock() {
            shared.generation += 1;
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// The text most recently passed to [`set_source`](Self::set_source).
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn displayed(&self) -> String {
        self.shared
            .lock()
            .map(|s| s.displayed.clone())
            .unwrap_or_default()
    }

    pub fn state(&self) -> RevealState {
        self.shared
            .lock()
            .map(|s| s.state)
            .unwrap_or(RevealState::Idle)
    }

    /// Whether a timer chain is still scheduled.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for RevealDriver {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Reveal drivers keyed by message id, sharing one sink.
pub struct RevealBoard {
    config: RevealConfig,
    sink: FrameSink,
    drivers: HashMap<String, RevealDriver>,
}

impl RevealBoard {
    pub fn new(config: RevealConfig, sink: FrameSink) -> Self {
        Self {
            config,
            sink,
            drivers: HashMap::new(),
        }
    }

    /// Display `message`.
    ///
    /// A message seen for the first time starts revealing. A known message
    /// restarts only if its content changed.
    pub fn show(&mut self, message: &Message) {
        match self.drivers.get_mut(&message.id) {
            Some(driver) if driver.source() == Some(message.content.as_str()) => {}
            Some(driver) => driver.set_source(message.role, message.content.as_str()),
            None => {
                let mut driver =
                    RevealDriver::new(message.id.clone(), self.config, Arc::clone(&self.sink));
                driver.set_source(message.role, message.content.as_str());
                self.drivers.insert(message.id.clone(), driver);
            }
        }
    }

    /// Cancel and drop the driver for `message_id`.
    pub fn forget(&mut self, message_id: &str) {
        if let Some(mut driver) = self.drivers.remove(message_id) {
            driver.cancel();
        }
    }

    /// Cancel every driver.
    pub fn clear(&mut self) {
        for (_, mut driver) in self.drivers.drain() {
            driver.cancel();
        }
    }

    pub fn get(&self, message_id: &str) -> Option<&RevealDriver> {
        self.drivers.get(message_id)
    }

    /// Wait until every running reveal has finished.
    pub async fn join_all(&mut self) {
        for driver in self.drivers.values_mut() {
            driver.join().await;
        }
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
