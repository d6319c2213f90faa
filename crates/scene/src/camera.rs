//! Free-flying observer camera.

use glam::{Mat4, Quat, Vec3, Vec4};

/// Radians of rotation per pixel of mouse motion.
pub const MOUSE_SENSITIVITY: f32 = 1.0 / 1000.0;

/// A camera rotated by yaw about world Y, then pitch about its own X.
///
/// The shader casts rays along `-front`, so [`Camera::forward`] is the
/// negated front axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
        }
    }
}

impl Camera {
    /// Create a camera at `position` looking along -Z.
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Get the camera rotation, `R_y(yaw) · R_x(pitch)`.
    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch)
    }

    /// Get the right direction vector.
    pub fn right(&self) -> Vec3 {
        self.rotation() * Vec3::X
    }

    /// Get the up direction vector.
    pub fn up(&self) -> Vec3 {
        self.rotation() * Vec3::Y
    }

    /// Get the front axis of the camera basis.
    pub fn front(&self) -> Vec3 {
        self.rotation() * Vec3::Z
    }

    /// Get the viewing direction.
    pub fn forward(&self) -> Vec3 {
        -self.front()
    }

    /// Basis matrix with columns right, up, front and w.
    pub fn look_matrix(&self) -> Mat4 {
        Mat4::from_cols(
            self.right().extend(0.0),
            self.up().extend(0.0),
            self.front().extend(0.0),
            Vec4::W,
        )
    }

    /// Applies mouse motion in pixels.
    pub fn look(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * MOUSE_SENSITIVITY;
        self.pitch -= dy * MOUSE_SENSITIVITY;
    }

    /// Moves `distance` metres along `axes`, given in camera space
    /// (x: right, y: up, z: forward).
    pub fn translate(&mut self, axes: Vec3, distance: f32) {
        if axes == Vec3::ZERO {
            return;
        }
        let offset = self.right() * axes.x + self.up() * axes.y + self.forward() * axes.z;
        self.position += offset * distance;
    }
}
