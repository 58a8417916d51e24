use std::collections::HashSet;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use super::controller::{Button, Controller};

/// Pixels of trackpad scroll that count as one wheel notch
const PIXELS_PER_LINE: f32 = 40.0;

/// A mouse drag segment in normalized device coordinates (+y up)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drag {
    pub start: (f32, f32),
    pub end: (f32, f32),
}

/// Adapter that bridges Winit events to the Controller trait
#[derive(Debug, Clone)]
pub struct WinitController {
    pressed_keys: HashSet<Button>,
    pressed_vec: Vec<Button>,
    /// Buttons that went down since the last `reset_deltas`
    just_pressed: Vec<Button>,
    mouse_position: Option<(f32, f32)>,
    /// Window size used for the NDC mapping
    viewport: (f32, f32),
    /// Left-button drag accumulated since the last `take_drag`, in pixels
    drag: Option<((f32, f32), (f32, f32))>,
    scroll_y: f32,
    /// Set when the pointer is over the overlay
    pointer_captured: bool,
}

impl WinitController {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pressed_keys: HashSet::new(),
            pressed_vec: Vec::new(),
            just_pressed: Vec::new(),
            mouse_position: None,
            viewport: (width.max(1) as f32, height.max(1) as f32),
            drag: None,
            scroll_y: 0.0,
            pointer_captured: false,
        }
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width.max(1) as f32, height.max(1) as f32);
    }

    /// While set, drags and scrolls are left to the overlay
    pub fn set_pointer_captured(&mut self, captured: bool) {
        self.pointer_captured = captured;
    }

    /// Process a Winit WindowEvent and update internal state
    pub fn process_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(keycode) = event.physical_key {
                    if let Some(button) = Self::keycode_to_button(keycode) {
                        self.set_button(button, event.state);
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if *button == MouseButton::Left {
                    self.set_button(Button::MouseLeft, *state);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let new_pos = (position.x as f32, position.y as f32);
                if let Some(old_pos) = self.mouse_position {
                    if self.is_down(Button::MouseLeft) && !self.pointer_captured {
                        let start = self.drag.map_or(old_pos, |(start, _)| start);
                        self.drag = Some((start, new_pos));
                    }
                }
                self.mouse_position = Some(new_pos);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                if !self.pointer_captured {
                    self.scroll_y += match delta {
                        MouseScrollDelta::LineDelta(_, y) => *y,
                        MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_LINE,
                    };
                }
            }
            _ => {}
        }
    }

    fn set_button(&mut self, button: Button, state: ElementState) {
        match state {
            ElementState::Pressed => {
                if self.pressed_keys.insert(button) {
                    self.pressed_vec.push(button);
                    self.just_pressed.push(button);
                }
            }
            ElementState::Released => {
                if self.pressed_keys.remove(&button) {
                    self.pressed_vec.retain(|&b| b != button);
                }
            }
        }
    }

    /// Whether `button` went down since the last reset
    pub fn was_pressed(&self, button: Button) -> bool {
        self.just_pressed.contains(&button)
    }

    pub fn close_requested(&self) -> bool {
        self.just_pressed.iter().any(|b| b.closes_viewer())
    }

    /// Take the drag accumulated since the last call, in NDC
    pub fn take_drag(&mut self) -> Option<Drag> {
        let (start, end) = self.drag.take()?;
        Some(Drag {
            start: self.to_ndc(start),
            end: self.to_ndc(end),
        })
    }

    /// Take wheel notches accumulated since the last call (positive scrolls up)
    pub fn take_scroll(&mut self) -> f32 {
        std::mem::take(&mut self.scroll_y)
    }

    /// Reset per-frame state
    pub fn reset_deltas(&mut self) {
        self.just_pressed.clear();
    }

    fn to_ndc(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (-1.0 + 2.0 * x / self.viewport.0, 1.0 - 2.0 * y / self.viewport.1)
    }

    fn keycode_to_button(keycode: KeyCode) -> Option<Button> {
        match keycode {
            KeyCode::KeyW => Some(Button::KeyW),
            KeyCode::KeyA => Some(Button::KeyA),
            KeyCode::KeyS => Some(Button::KeyS),
            KeyCode::KeyD => Some(Button::KeyD),
            KeyCode::ArrowUp => Some(Button::ArrowUp),
            KeyCode::ArrowDown => Some(Button::ArrowDown),
            KeyCode::ArrowLeft => Some(Button::ArrowLeft),
            KeyCode::ArrowRight => Some(Button::ArrowRight),
            KeyCode::KeyE => Some(Button::KeyE),
            KeyCode::KeyC => Some(Button::KeyC),
            KeyCode::KeyP => Some(Button::KeyP),
            KeyCode::Escape => Some(Button::Escape),
            _ => None,
        }
    }
}

impl Controller for WinitController {
    fn is_down(&self, button: Button) -> bool {
        self.pressed_keys.contains(&button)
    }

    fn get_down_keys(&self) -> &[Button] {
        &self.pressed_vec
    }
}
