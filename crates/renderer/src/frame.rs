use std::time::Duration;

use glam::{Mat4, Vec3};
use tracing::trace;

use crate::device::{
    FrameCallbackId, FrameHost, GraphicsDevice, ProgramId, UniformLocation, UniformValue,
};
use crate::session::CompiledProgram;
use crate::types::{Camera, RendererConfig, Viewport};

pub const TIME_UNIFORM: &str = "time";
pub const RESOLUTION_UNIFORM: &str = "resolution";
pub const MODEL_MATRIX_UNIFORM: &str = "modelMatrix";
pub const VIEW_MATRIX_UNIFORM: &str = "viewMatrix";
pub const PROJECTION_MATRIX_UNIFORM: &str = "projectionMatrix";

/// Clock state for one activated program.
///
/// `start` is captured once when the program goes live; `elapsed` never moves
/// backwards even if the host clock does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameState {
    start: Duration,
    elapsed: Duration,
    frames: u64,
}

impl FrameState {
    pub fn new(start: Duration) -> Self {
        Self {
            start,
            elapsed: Duration::ZERO,
            frames: 0,
        }
    }

    pub fn start(&self) -> Duration {
        self.start
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Number of frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Moves to `now` and returns the elapsed seconds for this frame.
    pub fn advance(&mut self, now: Duration) -> f32 {
        let since_start = now.saturating_sub(self.start);
        self.elapsed = self.elapsed.max(since_start);
        self.frames = self.frames.saturating_add(1);
        self.elapsed.as_secs_f32()
    }
}

/// The three transforms uploaded each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMatrices {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

impl FrameMatrices {
    /// Spins the model about +Y by `elapsed` radians and views it from
    /// `camera.distance` units down the -Z axis.
    pub fn compute(elapsed: f32, camera: &Camera, viewport: Viewport) -> Self {
        Self {
            model: Mat4::from_rotation_y(elapsed),
            view: Mat4::from_translation(Vec3::new(0.0, 0.0, -camera.distance)),
            projection: Mat4::perspective_rh_gl(
                camera.fov_degrees.to_radians(),
                viewport.aspect(),
                camera.near,
                camera.far,
            ),
        }
    }
}

/// Uniform locations resolved once when a program goes live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct UniformSlots {
    time: Option<UniformLocation>,
    resolution: Option<UniformLocation>,
    model: Option<UniformLocation>,
    view: Option<UniformLocation>,
    projection: Option<UniformLocation>,
}

impl UniformSlots {
    fn resolve<D: GraphicsDevice + ?Sized>(device: &D, program: ProgramId) -> Self {
        Self {
            time: device.uniform_location(program, TIME_UNIFORM),
            resolution: device.uniform_location(program, RESOLUTION_UNIFORM),
            model: device.uniform_location(program, MODEL_MATRIX_UNIFORM),
            view: device.uniform_location(program, VIEW_MATRIX_UNIFORM),
            projection: device.uniform_location(program, PROJECTION_MATRIX_UNIFORM),
        }
    }
}

/// What a single frame did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub elapsed: f32,
    pub vertices: u32,
    pub uniforms_set: usize,
}

/// Per-frame driver for the active program.
///
/// Holds no timer: the host fires the registered callback and the session
/// forwards it here. The registration is consumed by [`FrameScheduler::cancel`],
/// so a cancelled scheduler cannot be driven again.
#[derive(Debug)]
pub struct FrameScheduler {
    callback: FrameCallbackId,
    state: FrameState,
    slots: UniformSlots,
}

impl FrameScheduler {
    pub(crate) fn start<D: GraphicsDevice + FrameHost + ?Sized>(
        device: &mut D,
        program: &CompiledProgram,
    ) -> Self {
        let slots = UniformSlots::resolve(device, program.program());
        let state = FrameState::new(device.now());
        let callback = device.request_frame_callback();
        trace!(?callback, ?slots, "frame callback registered");
        Self {
            callback,
            state,
            slots,
        }
    }

    pub fn callback(&self) -> FrameCallbackId {
        self.callback
    }

    pub fn state(&self) -> &FrameState {
        &self.state
    }

    pub(crate) fn render_frame<D: GraphicsDevice + FrameHost + ?Sized>(
        &mut self,
        device: &mut D,
        program: &CompiledProgram,
        config: &RendererConfig,
    ) -> FrameReport {
        let elapsed = self.state.advance(device.now());
        let viewport = config.viewport;
        let matrices = FrameMatrices::compute(elapsed, &config.camera, viewport);

        device.viewport(viewport.width, viewport.height);
        device.clear(config.clear_color);
        device.use_program(Some(program.program()));

        let uploads = [
            (self.slots.time, UniformValue::Float(elapsed)),
            (
                self.slots.resolution,
                UniformValue::Vec2([viewport.width as f32, viewport.height as f32]),
            ),
            (
                self.slots.model,
                UniformValue::Mat4(matrices.model.to_cols_array()),
            ),
            (
                self.slots.view,
                UniformValue::Mat4(matrices.view.to_cols_array()),
            ),
            (
                self.slots.projection,
                UniformValue::Mat4(matrices.projection.to_cols_array()),
            ),
        ];
        let mut uniforms_set = 0;
        for (slot, value) in uploads {
            if let Some(location) = slot {
                device.set_uniform(location, value);
                uniforms_set += 1;
            }
        }

        let vertices = program.vertex_count();
        device.draw_triangles(0, vertices);

        FrameReport {
            frame: self.state.frames(),
            elapsed,
            vertices,
            uniforms_set,
        }
    }

    pub(crate) fn cancel<D: FrameHost + ?Sized>(self, device: &mut D) {
        device.cancel_frame_callback(self.callback);
        trace!(callback = ?self.callback, "frame callback cancelled");
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use glam::Vec4;

    use super::*;

    #[test]
    fn elapsed_tracks_clock_from_start() {
        let mut state = FrameState::new(Duration::from_secs(10));
        assert_eq!(state.advance(Duration::from_millis(10_500)), 0.5);
        assert_eq!(state.advance(Duration::from_secs(12)), 2.0);
        assert_eq!(state.frames(), 2);
    }

    #[test]
    fn elapsed_never_decreases() {
        let mut state = FrameState::new(Duration::from_secs(1));
        state.advance(Duration::from_secs(3));
        let after_rewind = state.advance(Duration::from_secs(2));
        assert_eq!(after_rewind, 2.0);
        assert_eq!(state.advance(Duration::ZERO), 2.0);
    }

    #[test]
    fn model_rotates_about_vertical_axis() {
        let matrices = FrameMatrices::compute(FRAC_PI_2, &Camera::default(), Viewport::default());
        let rotated = matrices.model.transform_vector3(Vec3::X);
        assert!((rotated - Vec3::NEG_Z).length() < 1e-6);
        let up = matrices.model.transform_vector3(Vec3::Y);
        assert!((up - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn view_pushes_scene_away_from_camera() {
        let matrices = FrameMatrices::compute(0.0, &Camera::default(), Viewport::default());
        let origin = matrices.view.transform_point3(Vec3::ZERO);
        assert_eq!(origin, Vec3::new(0.0, 0.0, -5.0));
    }

    #[test]
    fn projection_uses_viewport_aspect() {
        let camera = Camera::default();
        let matrices = FrameMatrices::compute(0.0, &camera, Viewport::new(1600, 800));
        let focal = 1.0 / (camera.fov_degrees.to_radians() / 2.0).tan();
        assert!((matrices.projection.y_axis.y - focal).abs() < 1e-5);
        assert!((matrices.projection.x_axis.x - focal / 2.0).abs() < 1e-5);

        let clip = matrices.projection * Vec4::new(0.0, 0.0, -5.0, 1.0);
        let ndc_z = clip.z / clip.w;
        assert!(ndc_z > -1.0 && ndc_z < 1.0);
    }

    #[test]
    fn zero_height_viewport_does_not_divide_by_zero() {
        let matrices = FrameMatrices::compute(0.0, &Camera::default(), Viewport::new(640, 0));
        assert!(matrices.projection.is_finite());
    }

    #[test]
    fn zero_width_viewport_keeps_projection_finite() {
        let matrices = FrameMatrices::compute(0.0, &Camera::default(), Viewport::new(0, 480));
        assert!(matrices.projection.is_finite());
    }
}
