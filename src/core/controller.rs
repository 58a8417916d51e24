/// Input button identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    KeyW,
    KeyA,
    KeyS,
    KeyD,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    /// Close the viewer
    KeyE,
    /// Close the viewer
    KeyC,
    /// Save a snapshot of both published buffers
    KeyP,
    Escape,
    MouseLeft,
}

impl Button {
    pub fn closes_viewer(self) -> bool {
        matches!(self, Button::KeyE | Button::KeyC | Button::Escape)
    }
}

/// Controller - handles button input states
pub trait Controller {
    /// Check if button is currently down
    fn is_down(&self, button: Button) -> bool;

    /// Get all currently pressed buttons
    fn get_down_keys(&self) -> &[Button];
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct MockController {
        pressed: Vec<Button>,
    }

    impl Controller for MockController {
        fn is_down(&self, button: Button) -> bool {
            self.pressed.contains(&button)
        }

        fn get_down_keys(&self) -> &[Button] {
            &self.pressed
        }
    }

    #[test]
    fn test_close_keys() {
        assert!(Button::KeyE.closes_viewer());
        assert!(Button::KeyC.closes_viewer());
        assert!(Button::Escape.closes_viewer());
        assert!(!Button::KeyP.closes_viewer());
        assert!(!Button::KeyW.closes_viewer());
    }

    #[test]
    fn test_button_hash_duplicates() {
        let mut set = HashSet::new();
        set.insert(Button::KeyW);
        set.insert(Button::KeyW);
        set.insert(Button::ArrowUp);

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_controller_is_down() {
        let controller = MockController {
            pressed: vec![Button::KeyW, Button::MouseLeft],
        };

        assert!(controller.is_down(Button::KeyW));
        assert!(controller.is_down(Button::MouseLeft));
        assert!(!controller.is_down(Button::KeyA));
        assert_eq!(controller.get_down_keys().len(), 2);
    }
}
