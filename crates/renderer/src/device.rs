//! The graphics device the session drives.
//!
//! The host supplies an implementation of [`Device`]: the GL-style object
//! calls of [`GraphicsDevice`] plus the refresh-callback registry and
//! monotonic clock of [`FrameHost`]. Lookups by name return `None` for names
//! the program does not declare; callers treat that as "skip", not as an
//! error.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// One of the two programmable stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttribLocation(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Registration of a recurring per-refresh callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameCallbackId(pub u64);

/// Any object the session allocates on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceObject {
    Shader(ShaderId),
    Program(ProgramId),
    Buffer(BufferId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("graphics device unavailable: {0}")]
    Unavailable(String),
}

/// Values the frame loop uploads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    /// Column-major.
    Mat4([f32; 16]),
}

pub trait GraphicsDevice {
    fn create_shader(&mut self, stage: ShaderStage) -> Result<ShaderId, DeviceError>;
    fn shader_source(&mut self, shader: ShaderId, source: &str);
    fn compile_shader(&mut self, shader: ShaderId);
    fn compile_status(&self, shader: ShaderId) -> bool;
    fn shader_info_log(&self, shader: ShaderId) -> String;
    fn delete_shader(&mut self, shader: ShaderId);

    fn create_program(&mut self) -> Result<ProgramId, DeviceError>;
    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId);
    fn link_program(&mut self, program: ProgramId);
    fn link_status(&self, program: ProgramId) -> bool;
    fn program_info_log(&self, program: ProgramId) -> String;
    fn use_program(&mut self, program: Option<ProgramId>);
    fn delete_program(&mut self, program: ProgramId);

    fn create_buffer(&mut self) -> Result<BufferId, DeviceError>;
    fn upload_buffer(&mut self, buffer: BufferId, data: &[u8]);
    fn delete_buffer(&mut self, buffer: BufferId);

    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<AttribLocation>;
    /// Points `location` at `buffer`, read as tightly packed `components`-wide floats.
    fn bind_attribute(&mut self, location: AttribLocation, buffer: BufferId, components: u32);
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);

    fn viewport(&mut self, width: u32, height: u32);
    fn clear(&mut self, color: [f32; 4]);
    fn draw_triangles(&mut self, first: u32, count: u32);

    /// Releases `object` through the matching delete call.
    fn release(&mut self, object: DeviceObject) {
        match object {
            DeviceObject::Shader(id) => self.delete_shader(id),
            DeviceObject::Program(id) => self.delete_program(id),
            DeviceObject::Buffer(id) => self.delete_buffer(id),
        }
    }
}

pub trait FrameHost {
    /// Registers a callback the host fires once per display refresh until cancelled.
    fn request_frame_callback(&mut self) -> FrameCallbackId;
    fn cancel_frame_callback(&mut self, id: FrameCallbackId);
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;
}

/// Everything a render session needs from its host.
pub trait Device: GraphicsDevice + FrameHost {}

impl<T: GraphicsDevice + FrameHost + ?Sized> Device for T {}
