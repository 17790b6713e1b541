//! Live desktop input.
//!
//! `EnigoBackend` injects clicks and keystrokes through enigo;
//! `GlobalPointer` watches the mouse and keyboard through device_query so a
//! click on any window can be captured. Only compiled with the `desktop`
//! feature, since both need a running desktop session.

use anyhow::{Context, Result};
use device_query::{DeviceQuery, DeviceState, Keycode};
use enigo::{Button, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};
use std::thread;
use std::time::Duration;
use tracing::debug;

use crate::action::ActionDispatcher;
use crate::capture::{PointerLocator, PointerSample, PointerSampler};
use crate::position::Coordinates;

/// Pause between the two clicks of a double-click
const DOUBLE_CLICK_GAP: Duration = Duration::from_millis(60);

/// Moves the real pointer, clicks and types
pub struct EnigoBackend {
    enigo: Enigo,
}

impl EnigoBackend {
    /// Connect to the desktop session
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| anyhow::anyhow!("{:?}", e))
            .context("Failed to connect to the desktop input system")?;
        Ok(Self { enigo })
    }

    fn move_to(&mut self, at: Coordinates) -> Result<()> {
        self.enigo
            .move_mouse(at.x, at.y, Coordinate::Abs)
            .with_context(|| format!("Failed to move pointer to {}", at))
    }

    fn left_click(&mut self) -> Result<()> {
        self.enigo
            .button(Button::Left, Direction::Click)
            .context("Failed to click")
    }
}

impl ActionDispatcher for EnigoBackend {
    fn click(&mut self, at: Coordinates) -> Result<()> {
        debug!("click at {}", at);
        self.move_to(at)?;
        self.left_click()
    }

    fn double_click(&mut self, at: Coordinates) -> Result<()> {
        debug!("double-click at {}", at);
        self.move_to(at)?;
        self.left_click()?;
        thread::sleep(DOUBLE_CLICK_GAP);
        self.left_click()
    }

    fn type_text(&mut self, text: &str) -> Result<()> {
        debug!("type {:?}", text);
        self.enigo
            .text(text)
            .with_context(|| format!("Failed to type {:?}", text))
    }
}

impl PointerLocator for EnigoBackend {
    fn location(&mut self) -> Result<(i32, i32)> {
        self.enigo.location().context("Failed to read pointer location")
    }
}

/// `button_pressed` index of the primary button
const LEFT_BUTTON: usize = 1;

/// Global mouse and keyboard state, for click capture
pub struct GlobalPointer {
    state: DeviceState,
}

impl GlobalPointer {
    pub fn new() -> Self {
        Self {
            state: DeviceState::new(),
        }
    }
}

impl Default for GlobalPointer {
    fn default() -> Self {
        Self::new()
    }
}

impl PointerSampler for GlobalPointer {
    fn sample(&mut self) -> Result<PointerSample> {
        let mouse = self.state.get_mouse();
        let keys = self.state.get_keys();
        let (x, y) = mouse.coords;
        Ok(PointerSample {
            x,
            y,
            left_down: mouse
                .button_pressed
                .get(LEFT_BUTTON)
                .copied()
                .unwrap_or(false),
            skip: keys.contains(&Keycode::End),
            cancel: keys.contains(&Keycode::Escape),
        })
    }
}
