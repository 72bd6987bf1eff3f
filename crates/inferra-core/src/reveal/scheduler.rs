//! Reveal state machine.
//!
//! Turns a fully known text into a sequence of growing prefixes. Characters
//! inside a line are spaced by `char_interval`; a line break is followed by
//! the longer `line_interval` before the next line starts. The machine does
//! no waiting itself, it only says how long to wait before the next step.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay after revealing a character inside a line.
pub const DEFAULT_CHAR_INTERVAL: Duration = Duration::from_millis(8);

/// Delay after revealing a line break.
pub const DEFAULT_LINE_INTERVAL: Duration = Duration::from_millis(30);

/// Lifecycle of a single reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RevealState {
    /// Text known, nothing shown.
    Idle,

    /// Prefixes are being disclosed.
    Revealing,

    /// The full text is shown. No more steps.
    Complete,
}

/// Timing for a reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealConfig {
    pub char_interval: Duration,
    pub line_interval: Duration,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            char_interval: DEFAULT_CHAR_INTERVAL,
            line_interval: DEFAULT_LINE_INTERVAL,
        }
    }
}

/// One disclosed unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealStep {
    /// The prefix shown after this step.
    pub displayed: String,

    /// How long to wait before the next step; `None` once complete.
    pub next_delay: Option<Duration>,
}

/// Pure, timer-free reveal state machine for one message.
#[derive(Debug, Clone)]
pub struct RevealScheduler {
    config: RevealConfig,
    source: String,
    /// Byte offset into `source` of the shown prefix.
    shown: usize,
    state: RevealState,
}

impl RevealScheduler {
    pub fn new(config: RevealConfig) -> Self {
        Self {
            config,
            source: String::new(),
            shown: 0,
            state: RevealState::Idle,
        }
    }

    /// Begin revealing `text` from an empty display.
    ///
    /// Any reveal in progress is abandoned. Empty text completes at once.
    pub fn start(&mut self, text: impl Into<String>) {
        self.source = text.into();
        self.shown = 0;
        self.state = if self.source.is_empty() {
            RevealState::Complete
        } else {
            RevealState::Revealing
        };
    }

    /// Show `text` in full with no intermediate steps.
    pub fn show_all(&mut self, text: impl Into<String>) {
        self.source = text.into();
        self.shown = self.source.len();
        self.state = RevealState::Complete;
    }

    /// Disclose the next character (or line break).
    ///
    /// Returns `None` unless the machine is revealing.
    pub fn advance(&mut self) -> Option<RevealStep> {
        if self.state != RevealState::Revealing {
            return None;
        }

        let ch = self.source[self.shown..].chars().next()?;
        self.shown += ch.len_utf8();

        let next_delay = if self.shown == self.source.len() {
            self.state = RevealState::Complete;
            None
        } else if ch == '\n' {
            Some(self.config.line_interval)
        } else {
            Some(self.config.char_interval)
        };

        Some(RevealStep {
            displayed: self.displayed().to_string(),
            next_delay,
        })
    }

    /// The prefix currently shown.
    pub fn displayed(&self) -> &str {
        &self.source[..self.shown]
    }

    /// The full text being revealed.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn state(&self) -> RevealState {
        self.state
    }

    pub fn config(&self) -> RevealConfig {
        self.config
    }
}

impl Default for RevealScheduler {
    fn default() -> Self {
        Self::new(RevealConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(scheduler: &mut RevealScheduler) -> Vec<RevealStep> {
        std::iter::from_fn(|| scheduler.advance()).collect()
    }

    #[test]
    fn new_scheduler_is_idle_and_empty() {
        let scheduler = RevealScheduler::default();
        assert_eq!(scheduler.state(), RevealState::Idle);
        assert_eq!(scheduler.displayed(), "");
    }

    #[test]
    fn idle_scheduler_does_not_advance() {
        let mut scheduler = RevealScheduler::default();
        assert!(scheduler.advance().is_none());
    }

    #[test]
    fn reveals_prefixes_across_lines() {
        let mut scheduler = RevealScheduler::default();
        scheduler.start("ab\ncd");
        assert_eq!(scheduler.state(), RevealState::Revealing);
        assert_eq!(scheduler.displayed(), "");

        let shown: Vec<_> = drain(&mut scheduler)
            .into_iter()
            .map(|s| s.displayed)
            .collect();
        assert_eq!(shown, vec!["a", "ab", "ab\n", "ab\nc", "ab\ncd"]);
        assert_eq!(scheduler.state(), RevealState::Complete);
    }

    #[test]
    fn line_breaks_wait_longer_than_characters() {
        let mut scheduler = RevealScheduler::default();
        scheduler.start("ab\ncd");

        let delays: Vec<_> = drain(&mut scheduler)
            .into_iter()
            .map(|s| s.next_delay)
            .collect();
        assert_eq!(
            delays,
            vec![
                Some(DEFAULT_CHAR_INTERVAL),
                Some(DEFAULT_CHAR_INTERVAL),
                Some(DEFAULT_LINE_INTERVAL),
                Some(DEFAULT_CHAR_INTERVAL),
                None,
            ]
        );
    }

    #[test]
    fn completes_on_final_character_without_more_delay() {
        let mut scheduler = RevealScheduler::default();
        scheduler.start("x");

        let step = scheduler.advance().unwrap();
        assert_eq!(step.displayed, "x");
        assert_eq!(step.next_delay, None);
        assert_eq!(scheduler.state(), RevealState::Complete);
        assert!(scheduler.advance().is_none());
    }

    #[test]
    fn trailing_line_break_is_the_last_step() {
        let mut scheduler = RevealScheduler::default();
        scheduler.start("a\n");

        let steps = drain(&mut scheduler);
        assert_eq!(steps.last().unwrap().displayed, "a\n");
        assert_eq!(steps.last().unwrap().next_delay, None);
    }

    #[test]
    fn empty_line_between_breaks() {
        let mut scheduler = RevealScheduler::default();
        scheduler.start("a\n\nb");

        let steps = drain(&mut scheduler);
        let shown: Vec<_> = steps.iter().map(|s| s.displayed.as_str()).collect();
        assert_eq!(shown, vec!["a", "a\n", "a\n\n", "a\n\nb"]);
        assert_eq!(steps[1].next_delay, Some(DEFAULT_LINE_INTERVAL));
        assert_eq!(steps[2].next_delay, Some(DEFAULT_LINE_INTERVAL));
    }

    #[test]
    fn empty_text_completes_immediately() {
        let mut scheduler = RevealScheduler::default();
        scheduler.start("");

        assert_eq!(scheduler.state(), RevealState::Complete);
        assert_eq!(scheduler.displayed(), "");
        assert!(scheduler.advance().is_none());
    }

    #[test]
    fn multibyte_characters_are_revealed_whole() {
        let mut scheduler = RevealScheduler::default();
        scheduler.start("héé");

        let shown: Vec<_> = drain(&mut scheduler)
            .into_iter()
            .map(|s| s.displayed)
            .collect();
        assert_eq!(shown, vec!["h", "hé", "héé"]);
    }

    #[test]
    fn restart_resets_display_to_new_text() {
        let mut scheduler = RevealScheduler::default();
        scheduler.start("ab\ncd");
        scheduler.advance();
        scheduler.advance();

        scheduler.start("xy");
        assert_eq!(scheduler.displayed(), "");

        let shown: Vec<_> = drain(&mut scheduler)
            .into_iter()
            .map(|s| s.displayed)
            .collect();
        assert_eq!(shown, vec!["x", "xy"]);
    }

    #[test]
    fn show_all_skips_to_complete() {
        let mut scheduler = RevealScheduler::default();
        scheduler.show_all("full text");

        assert_eq!(scheduler.state(), RevealState::Complete);
        assert_eq!(scheduler.displayed(), "full text");
        assert_eq!(scheduler.source(), "full text");
        assert!(scheduler.advance().is_none());
    }

    #[test]
    fn custom_intervals_are_used() {
        let config = RevealConfig {
            char_interval: Duration::from_millis(1),
            line_interval: Duration::from_millis(100),
        };
        let mut scheduler = RevealScheduler::new(config);
        scheduler.start("a\nb");

        let delays: Vec<_> = drain(&mut scheduler)
            .into_iter()
            .map(|s| s.next_delay)
            .collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_millis(1)),
                Some(Duration::from_millis(100)),
                None
            ]
        );
        assert_eq!(scheduler.config(), config);
    }
}
