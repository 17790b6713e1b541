//! Input-capture boundary.
//!
//! Calibration blocks on a `CaptureSource` until the user signals that the
//! pointer sits over the target. The wait takes an optional timeout and can
//! be cancelled, so it never hangs forever on one position.
//!
//! - `ChannelCaptureSource` receives events over a `flume` channel. Whatever
//!   holds the matching `CaptureSender` (another thread, a test) drives it.
//! - `ClickCaptureSource` polls a `PointerSampler` and captures where the
//!   left mouse button goes down, so the user simply clicks the target.
//! - `TerminalCaptureSource` reads key presses in raw mode and asks a
//!   `PointerLocator` where the pointer is at that instant.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{Result, StagePilotError};

/// A discrete capture signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Pointer location at the moment of the capture press.
    ///
    /// Raw values: off-screen or negative readings are rejected when stored.
    Captured { x: i32, y: i32 },
    /// Leave this position unset and move on
    Skip,
    /// Stop calibrating altogether
    Cancel,
}

/// Source of capture signals
pub trait CaptureSource {
    /// Block until a signal for `name` arrives.
    ///
    /// Returns `Ok(None)` when `timeout` passes without a signal.
    fn wait_for_capture(
        &mut self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<CaptureEvent>>;

    /// Ask whether to try `name` again after `reason`. `false` skips it.
    fn confirm_retry(&mut self, name: &str, reason: &str) -> Result<bool>;
}

impl<C: CaptureSource + ?Sized> CaptureSource for &mut C {
    fn wait_for_capture(
        &mut self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<CaptureEvent>> {
        (**self).wait_for_capture(name, timeout)
    }

    fn confirm_retry(&mut self, name: &str, reason: &str) -> Result<bool> {
        (**self).confirm_retry(name, reason)
    }
}

/// How long a channel source waits for a retry answer by default
pub const DEFAULT_ANSWER_TIMEOUT: Duration = Duration::from_secs(5);

/// Sending half of a `ChannelCaptureSource`
#[derive(Debug, Clone)]
pub struct CaptureSender {
    events: flume::Sender<CaptureEvent>,
    answers: flume::Sender<bool>,
}

impl CaptureSender {
    /// Deliver a capture at `(x, y)`
    pub fn capture(&self, x: i32, y: i32) -> Result<()> {
        self.send(CaptureEvent::Captured { x, y })
    }

    pub fn skip(&self) -> Result<()> {
        self.send(CaptureEvent::Skip)
    }

    pub fn cancel(&self) -> Result<()> {
        self.send(CaptureEvent::Cancel)
    }

    pub fn send(&self, event: CaptureEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| StagePilotError::capture("capture source dropped"))
    }

    /// Queue an answer for the next retry prompt
    pub fn answer_retry(&self, retry: bool) -> Result<()> {
        self.answers
            .send(retry)
            .map_err(|_| StagePilotError::capture("capture source dropped"))
    }
}

/// Capture source fed through a channel
#[derive(Debug)]
pub struct ChannelCaptureSource {
    events: flume::Receiver<CaptureEvent>,
    answers: flume::Receiver<bool>,
    answer_timeout: Duration,
}

impl ChannelCaptureSource {
    pub fn new() -> (Self, CaptureSender) {
        let (event_tx, event_rx) = flume::unbounded();
        let (answer_tx, answer_rx) = flume::unbounded();
        (
            Self {
                events: event_rx,
                answers: answer_rx,
                answer_timeout: DEFAULT_ANSWER_TIMEOUT,
            },
            CaptureSender {
                events: event_tx,
                answers: answer_tx,
            },
        )
    }

    /// How long to wait for a retry answer before declining
    pub fn with_answer_timeout(mut self, timeout: Duration) -> Self {
        self.answer_timeout = timeout;
        self
    }
}

impl CaptureSource for ChannelCaptureSource {
    fn wait_for_capture(
        &mut self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<CaptureEvent>> {
        debug!("Waiting for capture of '{}'", name);
        match timeout {
            Some(timeout) => match self.events.recv_timeout(timeout) {
                Ok(event) => Ok(Some(event)),
                Err(flume::RecvTimeoutError::Timeout) => Ok(None),
                Err(flume::RecvTimeoutError::Disconnected) => Ok(Some(CaptureEvent::Cancel)),
            },
            None => Ok(Some(self.events.recv().unwrap_or(CaptureEvent::Cancel))),
        }
    }

    fn confirm_retry(&mut self, name: &str, reason: &str) -> Result<bool> {
        debug!("Retry prompt for '{}': {}", name, reason);
        Ok(self.answers.recv_timeout(self.answer_timeout).unwrap_or(false))
    }
}

/// Reads the live pointer location
pub trait PointerLocator {
    fn location(&mut self) -> anyhow::Result<(i32, i32)>;
}

impl<P: PointerLocator + ?Sized> PointerLocator for &mut P {
    fn location(&mut self) -> anyhow::Result<(i32, i32)> {
        (**self).location()
    }
}

/// One reading of global pointer and key state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerSample {
    pub x: i32,
    pub y: i32,
    pub left_down: bool,
    /// The skip key is held
    pub skip: bool,
    /// The cancel key is held
    pub cancel: bool,
}

/// Polls global pointer state, regardless of which window has focus
pub trait PointerSampler {
    fn sample(&mut self) -> anyhow::Result<PointerSample>;
}

impl<P: PointerSampler + ?Sized> PointerSampler for &mut P {
    fn sample(&mut self) -> anyhow::Result<PointerSample> {
        (**self).sample()
    }
}

/// How often a `ClickCaptureSource` samples by default
pub const CLICK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Mouse-driven capture: a left click records the pointer location.
///
/// A press only counts after the button has been seen released, so a button
/// still held from the previous capture is not taken twice. The retry prompt
/// goes to the terminal.
pub struct ClickCaptureSource<P: PointerSampler> {
    sampler: P,
    poll_interval: Duration,
}

impl<P: PointerSampler> ClickCaptureSource<P> {
    pub fn new(sampler: P) -> Self {
        Self {
            sampler,
            poll_interval: CLICK_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn next_event(&mut self, deadline: Option<Instant>) -> Result<Option<CaptureEvent>> {
        let mut armed = false;
        loop {
            let sample = self
                .sampler
                .sample()
                .map_err(|e| StagePilotError::capture(format!("{:#}", e)))?;

            if sample.cancel {
                return Ok(Some(CaptureEvent::Cancel));
            }
            if sample.skip {
                return Ok(Some(CaptureEvent::Skip));
            }
            if !sample.left_down {
                armed = true;
            } else if armed {
                return Ok(Some(CaptureEvent::Captured {
                    x: sample.x,
                    y: sample.y,
                }));
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(None);
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    fn wait_for_key_release(&mut self) -> Result<()> {
        loop {
            let sample = self
                .sampler
                .sample()
                .map_err(|e| StagePilotError::capture(format!("{:#}", e)))?;
            if !sample.skip {
                return Ok(());
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}

impl<P: PointerSampler> CaptureSource for ClickCaptureSource<P> {
    fn wait_for_capture(
        &mut self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<CaptureEvent>> {
        println!(
            "Move the pointer over '{}' and click once (End = skip, Esc = cancel)",
            name
        );
        let _ = std::io::stdout().flush();

        let event = self.next_event(timeout.and_then(|t| Instant::now().checked_add(t)))?;
        // Let the skip key go before the next position is visited
        if matches!(event, Some(CaptureEvent::Skip)) {
            self.wait_for_key_release()?;
        }
        Ok(event)
    }

    fn confirm_retry(&mut self, name: &str, reason: &str) -> Result<bool> {
        prompt_retry(name, reason)
    }
}

/// Keeps the terminal in raw mode for as long as it lives
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Keyboard-driven capture from the controlling terminal.
///
/// Space or Enter captures, `s` skips, Esc or Ctrl+C cancels. Retry prompts
/// take `y` for yes; any other key declines.
pub struct TerminalCaptureSource<L: PointerLocator> {
    locator: L,
}

impl<L: PointerLocator> TerminalCaptureSource<L> {
    pub fn new(locator: L) -> Self {
        Self { locator }
    }
}

/// Wait for the next key press, or `None` once `deadline` passes
fn next_key(deadline: Option<Instant>) -> Result<Option<KeyEvent>> {
    loop {
        let poll_for = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(None);
                }
                remaining.min(POLL_INTERVAL)
            }
            None => POLL_INTERVAL,
        };

        if event::poll(poll_for)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(Some(key));
                }
            }
        }
    }
}

fn is_cancel(key: &KeyEvent) -> bool {
    key.code == KeyCode::Esc
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
}

impl<L: PointerLocator> CaptureSource for TerminalCaptureSource<L> {
    fn wait_for_capture(
        &mut self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<CaptureEvent>> {
        println!(
            "Move the pointer over '{}' and press Space/Enter to capture (s = skip, Esc = cancel)",
            name
        );
        let _ = std::io::stdout().flush();

        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let _raw = RawModeGuard::enable()?;
        loop {
            let Some(key) = next_key(deadline)? else {
                return Ok(None);
            };
            if is_cancel(&key) {
                return Ok(Some(CaptureEvent::Cancel));
            }
            match key.code {
                KeyCode::Char(' ') | KeyCode::Enter => {
                    let (x, y) = self
                        .locator
                        .location()
                        .map_err(|e| StagePilotError::capture(format!("{:#}", e)))?;
                    return Ok(Some(CaptureEvent::Captured { x, y }));
                }
                KeyCode::Char('s') | KeyCode::Char('S') => return Ok(Some(CaptureEvent::Skip)),
                _ => {}
            }
        }
    }

    fn confirm_retry(&mut self, name: &str, reason: &str) -> Result<bool> {
        prompt_retry(name, reason)
    }
}

/// Ask on the terminal whether to retry; only `y` answers yes
fn prompt_retry(name: &str, reason: &str) -> Result<bool> {
    println!("✗ {}", reason);
    println!("Retry '{}'? [y/N]", name);
    let _ = std::io::stdout().flush();

    let _raw = RawModeGuard::enable()?;
    let key = next_key(None)?;
    Ok(matches!(
        key.map(|k| k.code),
        Some(KeyCode::Char('y')) | Some(KeyCode::Char('Y'))
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_delivers_in_order() {
        let (mut source, sender) = ChannelCaptureSource::new();
        sender.capture(10, 20).unwrap();
        sender.skip().unwrap();

        assert_eq!(
            source.wait_for_capture("a", None).unwrap(),
            Some(CaptureEvent::Captured { x: 10, y: 20 })
        );
        assert_eq!(
            source
                .wait_for_capture("b", Some(Duration::from_millis(10)))
                .unwrap(),
            Some(CaptureEvent::Skip)
        );
    }

    #[test]
    fn test_channel_timeout_yields_none() {
        let (mut source, _sender) = ChannelCaptureSource::new();
        let event = source
            .wait_for_capture("a", Some(Duration::from_millis(20)))
            .unwrap();
        assert_eq!(event, None);
    }

    #[test]
    fn test_dropped_sender_cancels() {
        let (mut source, sender) = ChannelCaptureSource::new();
        drop(sender);
        assert_eq!(
            source.wait_for_capture("a", None).unwrap(),
            Some(CaptureEvent::Cancel)
        );
        assert!(!source.confirm_retry("a", "gone").unwrap());
    }

    #[test]
    fn test_retry_answers() {
        let (source, sender) = ChannelCaptureSource::new();
        let mut source = source.with_answer_timeout(Duration::from_millis(20));
        sender.answer_retry(true).unwrap();
        assert!(source.confirm_retry("a", "failed").unwrap());
        // Nothing queued: declines after the timeout
        assert!(!source.confirm_retry("a", "failed").unwrap());
    }

    /// Replays a fixed list of samples, then repeats the last one
    struct ScriptedPointer {
        samples: Vec<PointerSample>,
        next: usize,
    }

    impl ScriptedPointer {
        fn new(samples: Vec<PointerSample>) -> Self {
            Self { samples, next: 0 }
        }
    }

    impl PointerSampler for ScriptedPointer {
        fn sample(&mut self) -> anyhow::Result<PointerSample> {
            let index = self.next.min(self.samples.len() - 1);
            self.next += 1;
            Ok(self.samples[index])
        }
    }

    struct UnpluggedPointer;

    impl PointerSampler for UnpluggedPointer {
        fn sample(&mut self) -> anyhow::Result<PointerSample> {
            anyhow::bail!("no display")
        }
    }

    fn at(x: i32, y: i32, left_down: bool) -> PointerSample {
        PointerSample {
            x,
            y,
            left_down,
            ..PointerSample::default()
        }
    }

    fn click_source(samples: Vec<PointerSample>) -> ClickCaptureSource<ScriptedPointer> {
        ClickCaptureSource::new(ScriptedPointer::new(samples))
            .with_poll_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_click_captures_press_location() {
        let mut source = click_source(vec![at(0, 0, false), at(40, 50, false), at(42, 51, true)]);
        assert_eq!(
            source.wait_for_capture("a", None).unwrap(),
            Some(CaptureEvent::Captured { x: 42, y: 51 })
        );
    }

    #[test]
    fn test_click_ignores_button_held_from_before() {
        let mut source = click_source(vec![
            at(1, 1, true),
            at(2, 2, true),
            at(3, 3, false),
            at(9, 8, true),
        ]);
        assert_eq!(
            source.wait_for_capture("a", None).unwrap(),
            Some(CaptureEvent::Captured { x: 9, y: 8 })
        );
    }

    #[test]
    fn test_click_skip_and_cancel_keys() {
        let skip = PointerSample {
            skip: true,
            ..PointerSample::default()
        };
        let mut source = click_source(vec![at(0, 0, false), skip, at(0, 0, false)]);
        assert_eq!(
            source.wait_for_capture("a", None).unwrap(),
            Some(CaptureEvent::Skip)
        );

        let cancel = PointerSample {
            cancel: true,
            ..PointerSample::default()
        };
        let mut source = click_source(vec![cancel]);
        assert_eq!(
            source.wait_for_capture("a", None).unwrap(),
            Some(CaptureEvent::Cancel)
        );
    }

    #[test]
    fn test_click_timeout_yields_none() {
        let mut source = click_source(vec![at(0, 0, false)]);
        let event = source
            .wait_for_capture("a", Some(Duration::from_millis(20)))
            .unwrap();
        assert_eq!(event, None);
    }

    #[test]
    fn test_click_sampler_failure_is_capture_error() {
        let mut source = ClickCaptureSource::new(UnpluggedPointer);
        assert!(matches!(
            source.wait_for_capture("a", None),
            Err(StagePilotError::Capture(_))
        ));
    }

    #[test]
    fn test_cancel_keys() {
        let esc = KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE);
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        let plain_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE);
        assert!(is_cancel(&esc));
        assert!(is_cancel(&ctrl_c));
        assert!(!is_cancel(&plain_c));
    }
}
