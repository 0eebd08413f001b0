/// Drawable size in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height; a zero extent on either axis counts as one pixel.
    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

/// Fixed camera the preview object is viewed through.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// How far the scene is pushed away from the eye along the view axis.
    pub distance: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov_degrees: 45.0,
            near: 0.1,
            far: 100.0,
            distance: 5.0,
        }
    }
}

/// Immutable configuration passed to a [`RenderSession`](crate::RenderSession).
///
/// `RendererConfig` mirrors the `viewconfig` file and CLI flags: the initial
/// drawable size, the camera, and the colour each frame is cleared to.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    pub viewport: Viewport,
    pub camera: Camera,
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            camera: Camera::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}
