//! Resource lifecycle for one preview view.
//!
//! A [`RenderSession`] owns the device and at most one [`CompiledProgram`].
//! `start_render` walks `Empty → Compiling → Linked → Bound → Active`; any
//! failure lands in `Failed` after every handle acquired so far has been
//! released. Handles are recorded in acquisition order and always released
//! in reverse.

use std::fmt;

use shaderbundle::{ParseFailure, PreparedSources};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::device::{
    BufferId, Device, DeviceError, DeviceObject, FrameCallbackId, GraphicsDevice, ProgramId,
    ShaderId, ShaderStage,
};
use crate::frame::{FrameReport, FrameScheduler, FrameState};
use crate::geometry::{self, GeometrySpec};
use crate::types::{RendererConfig, Viewport};

pub const POSITION_ATTRIBUTE: &str = "position";
pub const NORMAL_ATTRIBUTE: &str = "normal";

/// Where the session's pipeline currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Empty,
    Compiling,
    Linked,
    Bound,
    Active,
    Failed,
}

impl PipelineStage {
    pub fn name(self) -> &'static str {
        match self {
            PipelineStage::Empty => "empty",
            PipelineStage::Compiling => "compiling",
            PipelineStage::Linked => "linked",
            PipelineStage::Bound => "bound",
            PipelineStage::Active => "active",
            PipelineStage::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("shader bundle rejected: {0}")]
    Parse(#[from] ParseFailure),
    #[error("{stage} shader failed to compile: {diagnostic}")]
    CompileFailed {
        stage: ShaderStage,
        diagnostic: String,
    },
    #[error("program failed to link: {diagnostic}")]
    LinkFailed { diagnostic: String },
    #[error("graphics device unavailable")]
    DeviceUnavailable,
}

impl PipelineError {
    /// Short name of the step that failed, for status lines and reports.
    pub fn failed_step(&self) -> &'static str {
        match self {
            PipelineError::Parse(_) => "parse",
            PipelineError::CompileFailed { stage, .. } => match stage {
                ShaderStage::Vertex => "compile-vertex",
                ShaderStage::Fragment => "compile-fragment",
            },
            PipelineError::LinkFailed { .. } => "link",
            PipelineError::DeviceUnavailable => "device",
        }
    }
}

impl From<DeviceError> for PipelineError {
    fn from(err: DeviceError) -> Self {
        warn!(error = %err, "device refused allocation");
        PipelineError::DeviceUnavailable
    }
}

/// Device objects in acquisition order.
#[derive(Debug, Default)]
struct HandleLedger {
    objects: Vec<DeviceObject>,
}

impl HandleLedger {
    fn record(&mut self, object: DeviceObject) {
        self.objects.push(object);
    }

    fn release_all<D: GraphicsDevice + ?Sized>(&mut self, device: &mut D) {
        let released = self.objects.len();
        while let Some(object) = self.objects.pop() {
            device.release(object);
        }
        if released > 0 {
            debug!(released, "released device objects");
        }
    }
}

/// A linked program with its geometry uploaded and bound.
#[derive(Debug)]
pub struct CompiledProgram {
    vertex_shader: ShaderId,
    fragment_shader: ShaderId,
    program: ProgramId,
    position_buffer: BufferId,
    normal_buffer: BufferId,
    geometry: GeometrySpec,
    vertex_count: u32,
    ledger: HandleLedger,
}

impl CompiledProgram {
    pub fn vertex_shader(&self) -> ShaderId {
        self.vertex_shader
    }

    pub fn fragment_shader(&self) -> ShaderId {
        self.fragment_shader
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn position_buffer(&self) -> BufferId {
        self.position_buffer
    }

    pub fn normal_buffer(&self) -> BufferId {
        self.normal_buffer
    }

    pub fn geometry(&self) -> &GeometrySpec {
        &self.geometry
    }

    /// Vertices in the bound triangle list.
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    fn release<D: GraphicsDevice + ?Sized>(mut self, device: &mut D) {
        self.ledger.release_all(device);
    }
}

/// The inputs of the most recent `start_render`, kept for display after a
/// failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastAttempt {
    /// The bundle could not be split.
    Rejected { raw: String },
    /// The bundle was split and repaired; compilation may still have failed.
    Prepared(PreparedSources),
}

impl LastAttempt {
    pub fn raw(&self) -> &str {
        match self {
            LastAttempt::Rejected { raw } => raw,
            LastAttempt::Prepared(sources) => &sources.raw,
        }
    }

    pub fn sources(&self) -> Option<&PreparedSources> {
        match self {
            LastAttempt::Rejected { .. } => None,
            LastAttempt::Prepared(sources) => Some(sources),
        }
    }
}

/// Result of forwarding a host frame callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    Drawn(FrameReport),
    /// No active program, or the callback belongs to a program already torn down.
    Ignored,
}

#[derive(Debug)]
struct ActiveProgram {
    program: CompiledProgram,
    scheduler: FrameScheduler,
}

/// Owns the device and the single live program of a preview view.
pub struct RenderSession<D: Device> {
    device: D,
    config: RendererConfig,
    stage: PipelineStage,
    active: Option<ActiveProgram>,
    last_attempt: Option<LastAttempt>,
    device_lost: bool,
}

impl<D: Device> RenderSession<D> {
    pub fn new(device: D, config: RendererConfig) -> Self {
        Self {
            device,
            config,
            stage: PipelineStage::Empty,
            active: None,
            last_attempt: None,
            device_lost: false,
        }
    }

    /// Replaces the live program with one built from `bundle`.
    ///
    /// A bundle that fails to split leaves the current program running. Once
    /// parsing succeeds the current program is torn down before the first new
    /// handle is created, whatever happens next.
    pub fn start_render(&mut self, bundle: &str) -> Result<(), PipelineError> {
        if self.device_lost {
            warn!("device unavailable; refusing render request");
            return Err(PipelineError::DeviceUnavailable);
        }

        let sources = match shaderbundle::prepare(bundle) {
            Ok(sources) => sources,
            Err(err) => {
                warn!(error = %err, "shader bundle rejected");
                self.last_attempt = Some(LastAttempt::Rejected {
                    raw: bundle.to_string(),
                });
                return Err(err.into());
            }
        };
        if !sources.fragment.is_noop() {
            debug!(
                precision = ?sources.fragment.precision(),
                inserted = ?sources.fragment.inserted(),
                "fragment source repaired"
            );
        }

        self.teardown();

        let mut ledger = HandleLedger::default();
        let result = self.build_program(&sources, &mut ledger);
        self.last_attempt = Some(LastAttempt::Prepared(sources));

        match result {
            Ok(program) => {
                let scheduler = FrameScheduler::start(&mut self.device, &program);
                info!(
                    geometry = %program.geometry().kind(),
                    vertices = program.vertex_count(),
                    "program active"
                );
                self.active = Some(ActiveProgram { program, scheduler });
                self.stage = PipelineStage::Active;
                Ok(())
            }
            Err(err) => {
                ledger.release_all(&mut self.device);
                self.stage = PipelineStage::Failed;
                if err == PipelineError::DeviceUnavailable {
                    self.device_lost = true;
                }
                Err(err)
            }
        }
    }

    /// Cancels the frame callback and releases every device object.
    pub fn stop_render(&mut self) {
        self.teardown();
    }

    /// Draws one frame if `callback` is the live registration.
    pub fn on_frame(&mut self, callback: FrameCallbackId) -> FrameOutcome {
        let Some(active) = self.active.as_mut() else {
            debug!(?callback, "frame callback with no active program");
            return FrameOutcome::Ignored;
        };
        if active.scheduler.callback() != callback {
            warn!(
                ?callback,
                live = ?active.scheduler.callback(),
                "ignoring stale frame callback"
            );
            return FrameOutcome::Ignored;
        }
        let report = active
            .scheduler
            .render_frame(&mut self.device, &active.program, &self.config);
        FrameOutcome::Drawn(report)
    }

    /// Updates the drawable size used from the next frame on.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.viewport = Viewport::new(width, height);
        debug!(width, height, "viewport resized");
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn active_program(&self) -> Option<&CompiledProgram> {
        self.active.as_ref().map(|active| &active.program)
    }

    pub fn active_callback(&self) -> Option<FrameCallbackId> {
        self.active.as_ref().map(|active| active.scheduler.callback())
    }

    pub fn frame_state(&self) -> Option<&FrameState> {
        self.active.as_ref().map(|active| active.scheduler.state())
    }

    pub fn last_attempt(&self) -> Option<&LastAttempt> {
        self.last_attempt.as_ref()
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// True once the device has refused an allocation; the session is then inert.
    pub fn is_device_lost(&self) -> bool {
        self.device_lost
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    fn teardown(&mut self) {
        if let Some(active) = self.active.take() {
            active.scheduler.cancel(&mut self.device);
            active.program.release(&mut self.device);
            debug!("previous program torn down");
        }
        self.stage = PipelineStage::Empty;
    }

    fn build_program(
        &mut self,
        sources: &PreparedSources,
        ledger: &mut HandleLedger,
    ) -> Result<CompiledProgram, PipelineError> {
        self.stage = PipelineStage::Compiling;
        let vertex_shader = self.compile_stage(ShaderStage::Vertex, &sources.vertex, ledger)?;
        let fragment_shader =
            self.compile_stage(ShaderStage::Fragment, sources.fragment.as_str(), ledger)?;

        let program = self.device.create_program()?;
        ledger.record(DeviceObject::Program(program));
        self.device.attach_shader(program, vertex_shader);
        self.device.attach_shader(program, fragment_shader);
        self.device.link_program(program);
        if !self.device.link_status(program) {
            let diagnostic = self.device.program_info_log(program);
            warn!(%diagnostic, "program link failed");
            return Err(PipelineError::LinkFailed { diagnostic });
        }
        self.stage = PipelineStage::Linked;

        let geometry = GeometrySpec::from_kind(sources.geometry);
        let mesh = geometry::generate(&geometry);
        let vertex_count = u32::try_from(mesh.vertex_count()).unwrap_or(u32::MAX);
        let position_buffer = self.upload(bytemuck::cast_slice(&mesh.vertices), ledger)?;
        let normal_buffer = self.upload(bytemuck::cast_slice(&mesh.normals), ledger)?;
        for (name, buffer) in [
            (POSITION_ATTRIBUTE, position_buffer),
            (NORMAL_ATTRIBUTE, normal_buffer),
        ] {
            match self.device.attrib_location(program, name) {
                Some(location) => self.device.bind_attribute(location, buffer, 3),
                None => debug!(attribute = name, "attribute not declared; skipping"),
            }
        }
        self.stage = PipelineStage::Bound;
        debug!(geometry = %geometry.kind(), vertices = vertex_count, "geometry bound");

        Ok(CompiledProgram {
            vertex_shader,
            fragment_shader,
            program,
            position_buffer,
            normal_buffer,
            geometry,
            vertex_count,
            ledger: std::mem::take(ledger),
        })
    }

    fn compile_stage(
        &mut self,
        stage: ShaderStage,
        source: &str,
        ledger: &mut HandleLedger,
    ) -> Result<ShaderId, PipelineError> {
        let shader = self.device.create_shader(stage)?;
        ledger.record(DeviceObject::Shader(shader));
        self.device.shader_source(shader, source);
        self.device.compile_shader(shader);
        if !self.device.compile_status(shader) {
            let diagnostic = self.device.shader_info_log(shader);
            warn!(%stage, %diagnostic, "shader compilation failed");
            return Err(PipelineError::CompileFailed { stage, diagnostic });
        }
        debug!(%stage, "shader compiled");
        Ok(shader)
    }

    fn upload(&mut self, data: &[u8], ledger: &mut HandleLedger) -> Result<BufferId, PipelineError> {
        let buffer = self.device.create_buffer()?;
        ledger.record(DeviceObject::Buffer(buffer));
        self.device.upload_buffer(buffer, data);
        Ok(buffer)
    }
}

impl<D: Device> Drop for RenderSession<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<D: Device + fmt::Debug> fmt::Debug for RenderSession<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderSession")
            .field("device", &self.device)
            .field("stage", &self.stage)
            .field("active", &self.active)
            .field("device_lost", &self.device_lost)
            .finish()
    }
}
