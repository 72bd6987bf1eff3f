//! Terminal painting of revealed replies.
//!
//! Frames carry the whole displayed prefix. The terminal only needs the part
//! that was not printed yet, so the painter remembers what it wrote per
//! message and prints the difference.

use std::io::Write;
use std::sync::{Arc, Mutex};

use inferra_core::reveal::{FrameSink, RevealFrame, RevealState};

#[derive(Debug, PartialEq, Eq)]
pub enum Paint<'a> {
    /// Print this suffix after what is already on screen.
    Append(&'a str),
    /// The text was replaced; start a fresh line and print it all.
    Restart(&'a str),
    Nothing,
}

pub fn delta<'a>(printed: &str, displayed: &'a str) -> Paint<'a> {
    match displayed.strip_prefix(printed) {
        Some("") => Paint::Nothing,
        Some(rest) => Paint::Append(rest),
        None => Paint::Restart(displayed),
    }
}

#[derive(Default)]
struct Screen {
    message_id: String,
    printed: String,
}

/// Build a sink that writes frames to `out`.
pub fn painter<W>(out: W) -> FrameSink
where
    W: Write + Send + 'static,
{
    let out = Mutex::new(out);
    let screen = Mutex::new(Screen::default());
    Arc::new(move |frame: &RevealFrame| {
        let (Ok(mut out), Ok(mut screen)) = (out.lock(), screen.lock()) else {
            return;
        };
        if screen.message_id != frame.message_id {
            screen.message_id = frame.message_id.clone();
            screen.printed.clear();
        }

        let written = match delta(&screen.printed, &frame.displayed) {
            Paint::Append(rest) => write!(out, "{rest}"),
            Paint::Restart(text) if screen.printed.is_empty() => write!(out, "{text}"),
            Paint::Restart(text) => write!(out, "\n{text}"),
            Paint::Nothing => Ok(()),
        };
        screen.printed = frame.displayed.clone();

        let finished = if frame.state == RevealState::Complete && !frame.displayed.is_empty() {
            writeln!(out)
        } else {
            Ok(())
        };

        if let Err(e) = written.and(finished).and_then(|_| out.flush()) {
            log::warn!("Failed to write reply: {}", e);
        }
    })
}
