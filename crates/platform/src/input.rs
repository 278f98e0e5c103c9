//! Keyboard and mouse state.
//!
//! Keys are tracked as held/not held. Mouse motion is accumulated only while
//! the drag button is down and drained once per frame, so the camera turns
//! by the total drag distance regardless of event rate.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            _ => MouseButton::Other,
        }
    }
}

/// Current keyboard and mouse state.
#[derive(Debug)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    pressed_buttons: HashSet<MouseButton>,
    drag_button: MouseButton,
    drag_delta: (f64, f64),
}

impl Default for InputState {
    fn default() -> Self {
        Self::new(MouseButton::Left)
    }
}

impl InputState {
    /// Creates an input state that turns mouse motion into drag deltas while
    /// `drag_button` is held.
    pub fn new(drag_button: MouseButton) -> Self {
        Self {
            pressed_keys: HashSet::new(),
            pressed_buttons: HashSet::new(),
            drag_button,
            drag_delta: (0.0, 0.0),
        }
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        self.pressed_keys.insert(key);
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        self.pressed_buttons.insert(button);
    }

    pub fn on_mouse_released(&mut self, button: MouseButton) {
        self.pressed_buttons.remove(&button);
    }

    /// Raw relative mouse motion. Ignored unless the drag button is held.
    pub fn on_mouse_motion(&mut self, dx: f64, dy: f64) {
        if self.is_dragging() {
            self.drag_delta.0 += dx;
            self.drag_delta.1 += dy;
        }
    }

    /// Clears everything, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.pressed_keys.clear();
        self.pressed_buttons.clear();
        self.drag_delta = (0.0, 0.0);
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn is_dragging(&self) -> bool {
        self.is_mouse_pressed(self.drag_button)
    }

    /// Returns the drag distance accumulated since the last call, in whole
    /// pixels, and resets it. Sub-pixel remainders are carried over.
    pub fn take_drag_delta(&mut self) -> (i32, i32) {
        let dx = self.drag_delta.0.trunc();
        let dy = self.drag_delta.1.trunc();
        self.drag_delta.0 -= dx;
        self.drag_delta.1 -= dy;
        (dx as i32, dy as i32)
    }
}
