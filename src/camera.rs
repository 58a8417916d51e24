use glam::{Quat, Vec3};

use crate::core::controller::{Button, Controller};
use crate::types::CameraUniform;

pub const CAMERA_PAN_SPEED: f32 = 0.02;
pub const ZOOM_STEP: f32 = 0.1;
pub const DEFAULT_FOV_Y: f32 = std::f32::consts::FRAC_PI_4;
const MIN_FOCUS_DISTANCE: f32 = 0.05;

/// Map a point in normalized device coordinates onto the virtual trackball
fn project_to_sphere(x: f32, y: f32) -> Vec3 {
    let d2 = x * x + y * y;
    let z = if d2 <= 0.5 { (1.0 - d2).sqrt() } else { 0.5 / d2.sqrt() };
    Vec3::new(x, y, z).normalize()
}

/// Camera orbiting a focus point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitCamera {
    position: Vec3,
    focus: Vec3,
    up: Vec3,
    pub near: f32,
    pub far: f32,
    pub fov_y: f32,
}

impl OrbitCamera {
    pub fn new(position: Vec3, focus: Vec3, up: Vec3) -> Self {
        Self {
            position,
            focus,
            up: up.normalize(),
            near: 0.01,
            far: 20.0,
            fov_y: DEFAULT_FOV_Y,
        }
    }

    /// Looking at the unit volume at the origin from +z
    pub fn looking_at_volume() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 1.8), Vec3::ZERO, Vec3::Y)
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn focus(&self) -> Vec3 {
        self.focus
    }

    pub fn forward(&self) -> Vec3 {
        (self.focus - self.position).normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up).normalize()
    }

    pub fn up(&self) -> Vec3 {
        self.right().cross(self.forward())
    }

    /// Trackball rotation from a drag between two NDC points
    pub fn update_orientation(&mut self, start_x: f32, start_y: f32, end_x: f32, end_y: f32) {
        let from = project_to_sphere(start_x, start_y);
        let to = project_to_sphere(end_x, end_y);

        let axis = from.cross(to);
        if axis.length_squared() < 1e-12 {
            return;
        }
        let angle = from.dot(to).clamp(-1.0, 1.0).acos();

        // Axis is in view space; bring it to world space
        let world_axis = (self.right() * axis.x + self.up() * axis.y - self.forward() * axis.z).normalize();
        let rotation = Quat::from_axis_angle(world_axis, -angle);

        self.position = self.focus + rotation * (self.position - self.focus);
        self.up = (rotation * self.up).normalize();
    }

    /// Move the camera without moving the focus, stopping short of it
    pub fn offset_position(&mut self, offset: Vec3) {
        let moved = self.position + offset;
        let to_focus = self.focus - moved;
        if to_focus.length() < MIN_FOCUS_DISTANCE || to_focus.dot(self.focus - self.position) <= 0.0 {
            return;
        }
        self.position = moved;
    }

    /// Wheel zoom; positive `scroll_y` moves toward the focus
    pub fn zoom(&mut self, scroll_y: f32) {
        let away = (self.position - self.focus).normalize_or_zero();
        self.offset_position(-scroll_y * ZOOM_STEP * away);
    }

    /// Pan camera and focus together from held keys
    pub fn pan(&mut self, controller: &impl Controller) {
        let axis = |pos: &[Button], neg: &[Button]| -> f32 {
            let pos = pos.iter().any(|b| controller.is_down(*b));
            let neg = neg.iter().any(|b| controller.is_down(*b));
            match (pos, neg) {
                (true, false) => 1.0,
                (false, true) => -1.0,
                _ => 0.0,
            }
        };

        let horizontal = axis(&[Button::KeyD, Button::ArrowRight], &[Button::KeyA, Button::ArrowLeft]);
        let vertical = axis(&[Button::KeyW, Button::ArrowUp], &[Button::KeyS, Button::ArrowDown]);

        let offset = (self.right() * horizontal + self.up() * vertical) * CAMERA_PAN_SPEED;
        self.position += offset;
        self.focus += offset;
    }

    /// Rotate the camera about the world up axis through the focus
    pub fn orbit_yaw(&mut self, radians: f32) {
        let rotation = Quat::from_axis_angle(Vec3::Y, radians);
        self.position = self.focus + rotation * (self.position - self.focus);
        self.up = (rotation * self.up).normalize();
    }

    pub fn to_uniform(&self, aspect: f32) -> CameraUniform {
        CameraUniform {
            position: self.position.to_array(),
            tan_half_fov: (self.fov_y * 0.5).tan(),
            forward: self.forward().to_array(),
            aspect,
            right: self.right().to_array(),
            near: self.near,
            up: self.up().to_array(),
            far: self.far,
        }
    }
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::looking_at_volume()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Held(Vec<Button>);

    impl Controller for Held {
        fn is_down(&self, button: Button) -> bool {
            self.0.contains(&button)
        }

        fn get_down_keys(&self) -> &[Button] {
            &self.0
        }
    }

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn basis_is_orthonormal() {
        let camera = OrbitCamera::looking_at_volume();
        assert!(approx(camera.forward(), Vec3::NEG_Z));
        assert!(approx(camera.right(), Vec3::X));
        assert!(approx(camera.up(), Vec3::Y));
    }

    #[test]
    fn trackball_keeps_focus_distance() {
        let mut camera = OrbitCamera::looking_at_volume();
        let before = camera.position().distance(camera.focus());

        camera.update_orientation(0.0, 0.0, 0.3, -0.2);

        let after = camera.position().distance(camera.focus());
        assert!((before - after).abs() < 1e-4);
        assert!(!approx(camera.position(), Vec3::new(0.0, 0.0, 1.8)));
    }

    #[test]
    fn zero_drag_is_noop() {
        let mut camera = OrbitCamera::looking_at_volume();
        camera.update_orientation(0.2, 0.2, 0.2, 0.2);
        assert_eq!(camera, OrbitCamera::looking_at_volume());
    }

    #[test]
    fn scroll_zooms_along_view_axis() {
        let mut camera = OrbitCamera::looking_at_volume();
        camera.zoom(1.0);
        assert!(approx(camera.position(), Vec3::new(0.0, 0.0, 1.7)));

        camera.zoom(-2.0);
        assert!(approx(camera.position(), Vec3::new(0.0, 0.0, 1.9)));
    }

    #[test]
    fn zoom_never_crosses_focus() {
        let mut camera = OrbitCamera::new(Vec3::new(0.0, 0.0, 0.1), Vec3::ZERO, Vec3::Y);
        camera.zoom(5.0);
        assert!(approx(camera.position(), Vec3::new(0.0, 0.0, 0.1)));
    }

    #[test]
    fn pan_moves_focus_with_camera() {
        let mut camera = OrbitCamera::looking_at_volume();
        camera.pan(&Held(vec![Button::KeyD]));
        assert!(approx(camera.focus(), Vec3::new(CAMERA_PAN_SPEED, 0.0, 0.0)));
        assert!(approx(camera.forward(), Vec3::NEG_Z));
    }

    #[test]
    fn opposing_keys_cancel() {
        let mut camera = OrbitCamera::looking_at_volume();
        camera.pan(&Held(vec![Button::KeyW, Button::ArrowDown]));
        assert_eq!(camera, OrbitCamera::looking_at_volume());
    }

    #[test]
    fn uniform_carries_projection() {
        let uniform = OrbitCamera::looking_at_volume().to_uniform(1.0);
        assert!((uniform.tan_half_fov - (DEFAULT_FOV_Y * 0.5).tan()).abs() < 1e-6);
        assert_eq!(uniform.position, [0.0, 0.0, 1.8]);
    }
}
