//! Renderer crate for shadersmith.
//!
//! The crate turns a prepared shader bundle into a live program on a
//! host-supplied device and keeps it animated. The overall flow is:
//!
//! ```text
//!   generator text
//!          │ start_render()
//!          ▼
//!   shaderbundle::prepare ──▶ compile ──▶ link ──▶ bind geometry ──▶ Active
//!                                                          │
//!   host refresh callback ──▶ RenderSession::on_frame ─────┴─▶ uniforms + draw
//! ```
//!
//! `RenderSession` owns the device and at most one `CompiledProgram`; the
//! `FrameScheduler` it keeps alongside only holds the callback registration
//! and clock state. `geometry` is pure and can be used on its own, and
//! `HeadlessDevice` implements the device traits in memory for tests and the
//! `check` command.

mod device;
mod frame;
pub mod geometry;
mod headless;
mod session;
mod types;

pub use device::{
    AttribLocation, BufferId, Device, DeviceError, DeviceObject, FrameCallbackId, FrameHost,
    GraphicsDevice, ProgramId, ShaderId, ShaderStage, UniformLocation, UniformValue,
};
pub use frame::{
    FrameMatrices, FrameReport, FrameScheduler, FrameState, MODEL_MATRIX_UNIFORM,
    PROJECTION_MATRIX_UNIFORM, RESOLUTION_UNIFORM, TIME_UNIFORM, VIEW_MATRIX_UNIFORM,
};
pub use geometry::{generate, GeometrySpec, MeshData};
pub use headless::{DeviceEvent, HeadlessDevice};
pub use session::{
    CompiledProgram, FrameOutcome, LastAttempt, PipelineError, PipelineStage, RenderSession,
    NORMAL_ATTRIBUTE, POSITION_ATTRIBUTE,
};
pub use types::{Camera, RendererConfig, Viewport};
