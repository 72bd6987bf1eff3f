//! Progressive disclosure of assistant replies.
//!
//! The reply text is fully known before disclosure starts. The
//! [`RevealScheduler`] decides what prefix comes next and how long to wait;
//! the [`RevealDriver`] runs it on the tokio timer, one driver per message.

mod driver;
mod scheduler;

pub use driver::{FrameSink, RevealBoard, RevealDriver, RevealFrame};
pub use scheduler::{
    RevealConfig, RevealScheduler, RevealState, RevealStep, DEFAULT_CHAR_INTERVAL,
    DEFAULT_LINE_INTERVAL,
};
