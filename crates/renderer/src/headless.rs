//! In-memory [`Device`](crate::Device) for tests and offline checks.
//!
//! `HeadlessDevice` hands out handles, tracks which objects are alive and
//! records every call of interest in an event log. Its "compiler" is a
//! structural check only:
//!
//! - a stage without a `void main(` entry point or with unbalanced braces
//!   fails;
//! - a fragment stage without a float precision statement fails;
//! - a stage that uses one of the host identifiers (`time`, `resolution`,
//!   `vNormal`, `vPosition`) as a whole word without declaring it fails;
//! - linking fails when the fragment stage reads a varying the vertex stage
//!   does not write.
//!
//! Attribute locations follow the vertex stage's `attribute`/`in`
//! declarations in source order; uniform locations are unique per device.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use shaderbundle::RECOGNIZED_IDENTIFIERS;
use tracing::{debug, trace};

use crate::device::{
    AttribLocation, BufferId, DeviceError, DeviceObject, FrameCallbackId, FrameHost,
    GraphicsDevice, ProgramId, ShaderId, ShaderStage, UniformLocation, UniformValue,
};

static MAIN_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bvoid\s+main\s*\(").expect("main pattern"));

static PRECISION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bprecision\s+(?:lowp|mediump|highp)\s+float\s*;").expect("precision pattern")
});

/// `<qualifier> [precision] <type> <name>` at the start of a statement.
static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)(?:^|[;{}])\s*(?:layout\s*\([^)]*\)\s*)?(?:(?:flat|smooth|noperspective|centroid)\s+)*(uniform|varying|attribute|in|out)\s+(?:(?:lowp|mediump|highp)\s+)?\w+\s+(\w+)",
    )
    .expect("declaration pattern")
});

static HOST_IDENTIFIERS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    RECOGNIZED_IDENTIFIERS
        .iter()
        .map(|(name, _)| {
            let pattern = Regex::new(&format!(r"\b{name}\b")).expect("identifier pattern");
            (*name, pattern)
        })
        .collect()
});

/// Something the device was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Created(DeviceObject),
    Deleted(DeviceObject),
    Compiled { shader: ShaderId, success: bool },
    Linked { program: ProgramId, success: bool },
    UsedProgram(Option<ProgramId>),
    AttributeBound {
        location: AttribLocation,
        buffer: BufferId,
        components: u32,
    },
    UniformSet { name: String, value: UniformValue },
    Viewport { width: u32, height: u32 },
    Clear([f32; 4]),
    Draw { first: u32, count: u32 },
    CallbackRegistered(FrameCallbackId),
    CallbackCancelled(FrameCallbackId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Qualifier {
    Uniform,
    Varying,
    Attribute,
    In,
    Out,
}

impl Qualifier {
    fn parse(keyword: &str) -> Option<Self> {
        match keyword {
            "uniform" => Some(Qualifier::Uniform),
            "varying" => Some(Qualifier::Varying),
            "attribute" => Some(Qualifier::Attribute),
            "in" => Some(Qualifier::In),
            "out" => Some(Qualifier::Out),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Declaration {
    qualifier: Qualifier,
    name: String,
}

fn declarations(source: &str) -> Vec<Declaration> {
    DECLARATION
        .captures_iter(source)
        .filter_map(|caps| {
            let qualifier = Qualifier::parse(caps.get(1)?.as_str())?;
            let name = caps.get(2)?.as_str().to_string();
            Some(Declaration { qualifier, name })
        })
        .collect()
}

#[derive(Debug)]
struct ShaderRecord {
    stage: ShaderStage,
    source: String,
    compiled: bool,
    log: String,
}

#[derive(Debug, Default)]
struct ProgramRecord {
    attached: Vec<ShaderId>,
    linked: bool,
    log: String,
    attributes: Vec<String>,
    uniforms: HashMap<String, UniformLocation>,
}

/// A [`GraphicsDevice`] and [`FrameHost`] that never touches a GPU.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_object: u32,
    next_uniform: u32,
    next_callback: u64,
    shaders: HashMap<ShaderId, ShaderRecord>,
    programs: HashMap<ProgramId, ProgramRecord>,
    buffers: HashMap<BufferId, usize>,
    uniform_names: HashMap<UniformLocation, String>,
    current_program: Option<ProgramId>,
    callbacks: Vec<FrameCallbackId>,
    clock: Duration,
    unavailable: Option<String>,
    allocations_left: Option<usize>,
    events: Vec<DeviceEvent>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later allocation fail with [`DeviceError::Unavailable`].
    pub fn set_unavailable(&mut self, reason: impl Into<String>) {
        self.unavailable = Some(reason.into());
    }

    /// Lets `allocations` more objects through, then behaves as
    /// [`set_unavailable`](Self::set_unavailable).
    pub fn fail_after(&mut self, allocations: usize) {
        self.allocations_left = Some(allocations);
    }

    pub fn advance_clock(&mut self, by: Duration) {
        self.clock = self.clock.saturating_add(by);
    }

    /// Moves the clock to `now`, backwards if asked.
    pub fn set_clock(&mut self, now: Duration) {
        self.clock = now;
    }

    /// Registrations that have not been cancelled, oldest first.
    pub fn active_callbacks(&self) -> &[FrameCallbackId] {
        &self.callbacks
    }

    pub fn events(&self) -> &[DeviceEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_objects(&self) -> usize {
        self.live_shaders() + self.live_programs() + self.live_buffers()
    }

    /// Total objects ever created.
    pub fn created_objects(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, DeviceEvent::Created(_)))
            .count()
    }

    pub fn buffer_len(&self, buffer: BufferId) -> Option<usize> {
        self.buffers.get(&buffer).copied()
    }

    pub fn shader_source_text(&self, shader: ShaderId) -> Option<&str> {
        self.shaders.get(&shader).map(|record| record.source.as_str())
    }

    /// `(first, count)` of every draw, in order.
    pub fn draw_calls(&self) -> Vec<(u32, u32)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                DeviceEvent::Draw { first, count } => Some((*first, *count)),
                _ => None,
            })
            .collect()
    }

    /// Every value uploaded to the uniform called `name`, in order.
    pub fn uniform_uploads(&self, name: &str) -> Vec<UniformValue> {
        self.events
            .iter()
            .filter_map(|event| match event {
                DeviceEvent::UniformSet { name: set, value } if set == name => Some(*value),
                _ => None,
            })
            .collect()
    }

    fn allocate(&mut self) -> Result<u32, DeviceError> {
        if self.allocations_left == Some(0) {
            self.unavailable = Some("allocation budget exhausted".to_string());
        }
        if let Some(reason) = &self.unavailable {
            return Err(DeviceError::Unavailable(reason.clone()));
        }
        if let Some(left) = &mut self.allocations_left {
            *left -= 1;
        }
        self.next_object += 1;
        Ok(self.next_object)
    }

    fn record(&mut self, event: DeviceEvent) {
        trace!(?event, "headless device");
        self.events.push(event);
    }

    fn check_stage(stage: ShaderStage, source: &str) -> Result<(), String> {
        if !MAIN_ENTRY.is_match(source) {
            return Err(format!("ERROR: {stage} shader: missing main() entry point"));
        }
        let opened = source.matches('{').count();
        let closed = source.matches('}').count();
        if opened != closed {
            return Err(format!(
                "ERROR: {stage} shader: unbalanced braces ({opened} opening, {closed} closing)"
            ));
        }
        if stage == ShaderStage::Fragment && !PRECISION.is_match(source) {
            return Err("ERROR: fragment shader: no default precision defined for float".into());
        }

        let declared: BTreeSet<String> = declarations(source)
            .into_iter()
            .map(|declaration| declaration.name)
            .collect();
        for (name, used) in HOST_IDENTIFIERS.iter() {
            if used.is_match(source) && !declared.contains(*name) {
                return Err(format!("ERROR: '{name}' : undeclared identifier"));
            }
        }
        Ok(())
    }

    fn check_link(&self, program: &ProgramRecord) -> Result<(Vec<String>, Vec<String>), String> {
        let mut vertex = None;
        let mut fragment = None;
        for shader in &program.attached {
            let record = self
                .shaders
                .get(shader)
                .ok_or_else(|| format!("ERROR: attached shader {} was deleted", shader.0))?;
            if !record.compiled {
                return Err(format!("ERROR: {} shader is not compiled", record.stage));
            }
            match record.stage {
                ShaderStage::Vertex => vertex = Some(record.source.as_str()),
                ShaderStage::Fragment => fragment = Some(record.source.as_str()),
            }
        }
        let vertex = vertex.ok_or("ERROR: no vertex shader attached")?;
        let fragment = fragment.ok_or("ERROR: no fragment shader attached")?;

        let vertex_decls = declarations(vertex);
        let fragment_decls = declarations(fragment);

        let written: BTreeSet<&str> = vertex_decls
            .iter()
            .filter(|decl| matches!(decl.qualifier, Qualifier::Varying | Qualifier::Out))
            .map(|decl| decl.name.as_str())
            .collect();
        for decl in &fragment_decls {
            let reads = matches!(decl.qualifier, Qualifier::Varying | Qualifier::In);
            if reads && !written.contains(decl.name.as_str()) {
                return Err(format!(
                    "ERROR: varying '{}' is read by the fragment shader but not written by the vertex shader",
                    decl.name
                ));
            }
        }

        let attributes = vertex_decls
            .iter()
            .filter(|decl| matches!(decl.qualifier, Qualifier::Attribute | Qualifier::In))
            .map(|decl| decl.name.clone())
            .collect();
        let mut uniforms = Vec::new();
        for decl in vertex_decls.iter().chain(fragment_decls.iter()) {
            if decl.qualifier == Qualifier::Uniform && !uniforms.contains(&decl.name) {
                uniforms.push(decl.name.clone());
            }
        }
        Ok((attributes, uniforms))
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_shader(&mut self, stage: ShaderStage) -> Result<ShaderId, DeviceError> {
        let shader = ShaderId(self.allocate()?);
        self.shaders.insert(
            shader,
            ShaderRecord {
                stage,
                source: String::new(),
                compiled: false,
                log: String::new(),
            },
        );
        self.record(DeviceEvent::Created(DeviceObject::Shader(shader)));
        Ok(shader)
    }

    fn shader_source(&mut self, shader: ShaderId, source: &str) {
        if let Some(record) = self.shaders.get_mut(&shader) {
            record.source = source.to_string();
        }
    }

    fn compile_shader(&mut self, shader: ShaderId) {
        let Some(record) = self.shaders.get_mut(&shader) else {
            debug!(shader = shader.0, "compile of unknown shader");
            return;
        };
        match Self::check_stage(record.stage, &record.source) {
            Ok(()) => {
                record.compiled = true;
                record.log.clear();
            }
            Err(log) => {
                record.compiled = false;
                record.log = log;
            }
        }
        let success = record.compiled;
        self.record(DeviceEvent::Compiled { shader, success });
    }

    fn compile_status(&self, shader: ShaderId) -> bool {
        self.shaders
            .get(&shader)
            .map(|record| record.compiled)
            .unwrap_or(false)
    }

    fn shader_info_log(&self, shader: ShaderId) -> String {
        self.shaders
            .get(&shader)
            .map(|record| record.log.clone())
            .unwrap_or_default()
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        if self.shaders.remove(&shader).is_some() {
            self.record(DeviceEvent::Deleted(DeviceObject::Shader(shader)));
        }
    }

    fn create_program(&mut self) -> Result<ProgramId, DeviceError> {
        let program = ProgramId(self.allocate()?);
        self.programs.insert(program, ProgramRecord::default());
        self.record(DeviceEvent::Created(DeviceObject::Program(program)));
        Ok(program)
    }

    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) {
        if let Some(record) = self.programs.get_mut(&program) {
            record.attached.push(shader);
        }
    }

    fn link_program(&mut self, program: ProgramId) {
        let Some(record) = self.programs.get(&program) else {
            debug!(program = program.0, "link of unknown program");
            return;
        };
        let outcome = self.check_link(record);

        let mut uniform_locations = HashMap::new();
        if let Ok((_, uniforms)) = &outcome {
            for name in uniforms {
                self.next_uniform += 1;
                let location = UniformLocation(self.next_uniform);
                self.uniform_names.insert(location, name.clone());
                uniform_locations.insert(name.clone(), location);
            }
        }

        let Some(record) = self.programs.get_mut(&program) else {
            return;
        };
        match outcome {
            Ok((attributes, _)) => {
                record.linked = true;
                record.log.clear();
                record.attributes = attributes;
                record.uniforms = uniform_locations;
            }
            Err(log) => {
                record.linked = false;
                record.log = log;
                record.attributes.clear();
                record.uniforms.clear();
            }
        }
        let success = record.linked;
        self.record(DeviceEvent::Linked { program, success });
    }

    fn link_status(&self, program: ProgramId) -> bool {
        self.programs
            .get(&program)
            .map(|record| record.linked)
            .unwrap_or(false)
    }

    fn program_info_log(&self, program: ProgramId) -> String {
        self.programs
            .get(&program)
            .map(|record| record.log.clone())
            .unwrap_or_default()
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.current_program = program;
        self.record(DeviceEvent::UsedProgram(program));
    }

    fn delete_program(&mut self, program: ProgramId) {
        if let Some(record) = self.programs.remove(&program) {
            for location in record.uniforms.values() {
                self.uniform_names.remove(location);
            }
            if self.current_program == Some(program) {
                self.current_program = None;
            }
            self.record(DeviceEvent::Deleted(DeviceObject::Program(program)));
        }
    }

    fn create_buffer(&mut self) -> Result<BufferId, DeviceError> {
        let buffer = BufferId(self.allocate()?);
        self.buffers.insert(buffer, 0);
        self.record(DeviceEvent::Created(DeviceObject::Buffer(buffer)));
        Ok(buffer)
    }

    fn upload_buffer(&mut self, buffer: BufferId, data: &[u8]) {
        if let Some(len) = self.buffers.get_mut(&buffer) {
            *len = data.len();
        }
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(&buffer).is_some() {
            self.record(DeviceEvent::Deleted(DeviceObject::Buffer(buffer)));
        }
    }

    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<AttribLocation> {
        let record = self.programs.get(&program).filter(|record| record.linked)?;
        let index = record.attributes.iter().position(|attr| attr == name)?;
        u32::try_from(index).ok().map(AttribLocation)
    }

    fn bind_attribute(&mut self, location: AttribLocation, buffer: BufferId, components: u32) {
        self.record(DeviceEvent::AttributeBound {
            location,
            buffer,
            components,
        });
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs
            .get(&program)
            .filter(|record| record.linked)?
            .uniforms
            .get(name)
            .copied()
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(name) = self.uniform_names.get(&location).cloned() else {
            debug!(location = location.0, "upload to unknown uniform location");
            return;
        };
        self.record(DeviceEvent::UniformSet { name, value });
    }

    fn viewport(&mut self, width: u32, height: u32) {
        self.record(DeviceEvent::Viewport { width, height });
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.record(DeviceEvent::Clear(color));
    }

    fn draw_triangles(&mut self, first: u32, count: u32) {
        self.record(DeviceEvent::Draw { first, count });
    }
}

impl FrameHost for HeadlessDevice {
    fn request_frame_callback(&mut self) -> FrameCallbackId {
        self.next_callback += 1;
        let id = FrameCallbackId(self.next_callback);
        self.callbacks.push(id);
        self.record(DeviceEvent::CallbackRegistered(id));
        id
    }

    fn cancel_frame_callback(&mut self, id: FrameCallbackId) {
        let before = self.callbacks.len();
        self.callbacks.retain(|live| *live != id);
        if self.callbacks.len() != before {
            self.record(DeviceEvent::CallbackCancelled(id));
        }
    }

    fn now(&self) -> Duration {
        self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = "attribute vec3 position;\nattribute vec3 normal;\nuniform mat4 modelMatrix;\nvarying vec3 vNormal;\nvoid main() { vNormal = normal; gl_Position = modelMatrix * vec4(position, 1.0); }";
    const FRAGMENT: &str = "precision mediump float;\nuniform float time;\nvarying vec3 vNormal;\nvoid main() { gl_FragColor = vec4(vNormal * time, 1.0); }";

    fn compile(device: &mut HeadlessDevice, stage: ShaderStage, source: &str) -> ShaderId {
        let shader = device.create_shader(stage).expect("shader");
        device.shader_source(shader, source);
        device.compile_shader(shader);
        shader
    }

    fn link(device: &mut HeadlessDevice, vertex: &str, fragment: &str) -> ProgramId {
        let vs = compile(device, ShaderStage::Vertex, vertex);
        let fs = compile(device, ShaderStage::Fragment, fragment);
        let program = device.create_program().expect("program");
        device.attach_shader(program, vs);
        device.attach_shader(program, fs);
        device.link_program(program);
        program
    }

    #[test]
    fn well_formed_program_links_and_exposes_locations() {
        let mut device = HeadlessDevice::new();
        let program = link(&mut device, VERTEX, FRAGMENT);
        assert!(device.link_status(program), "{}", device.program_info_log(program));
        assert_eq!(device.attrib_location(program, "position"), Some(AttribLocation(0)));
        assert_eq!(device.attrib_location(program, "normal"), Some(AttribLocation(1)));
        assert!(device.uniform_location(program, "modelMatrix").is_some());
        assert!(device.uniform_location(program, "time").is_some());
        assert_eq!(device.uniform_location(program, "resolution"), None);
    }

    #[test]
    fn missing_main_fails_to_compile() {
        let mut device = HeadlessDevice::new();
        let shader = compile(&mut device, ShaderStage::Vertex, "attribute vec3 position;");
        assert!(!device.compile_status(shader));
        assert!(device.shader_info_log(shader).contains("main"));
    }

    #[test]
    fn unbalanced_braces_fail_to_compile() {
        let mut device = HeadlessDevice::new();
        let shader = compile(&mut device, ShaderStage::Vertex, "void main() { {");
        assert!(!device.compile_status(shader));
        assert!(device.shader_info_log(shader).contains("unbalanced"));
    }

    #[test]
    fn fragment_without_precision_fails() {
        let mut device = HeadlessDevice::new();
        let shader = compile(
            &mut device,
            ShaderStage::Fragment,
            "void main() { gl_FragColor = vec4(1.0); }",
        );
        assert!(!device.compile_status(shader));
        assert!(device.shader_info_log(shader).contains("precision"));
    }

    #[test]
    fn undeclared_host_identifier_fails() {
        let mut device = HeadlessDevice::new();
        let shader = compile(
            &mut device,
            ShaderStage::Fragment,
            "precision mediump float;\nvoid main() { gl_FragColor = vec4(sin(time)); }",
        );
        assert!(!device.compile_status(shader));
        assert_eq!(device.shader_info_log(shader), "ERROR: 'time' : undeclared identifier");
    }

    #[test]
    fn unmatched_varying_fails_to_link() {
        let mut device = HeadlessDevice::new();
        let fragment = "precision mediump float;\nvarying vec3 vPosition;\nvoid main() { gl_FragColor = vec4(vPosition, 1.0); }";
        let program = link(&mut device, VERTEX, fragment);
        assert!(!device.link_status(program));
        assert!(device.program_info_log(program).contains("vPosition"));
        assert_eq!(device.attrib_location(program, "position"), None);
    }

    #[test]
    fn unavailable_device_refuses_allocation() {
        let mut device = HeadlessDevice::new();
        device.set_unavailable("context lost");
        assert_eq!(
            device.create_buffer(),
            Err(DeviceError::Unavailable("context lost".into()))
        );
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn fail_after_refuses_once_budget_is_spent() {
        let mut device = HeadlessDevice::new();
        device.fail_after(2);
        assert!(device.create_shader(ShaderStage::Vertex).is_ok());
        assert!(device.create_program().is_ok());
        assert!(matches!(
            device.create_buffer(),
            Err(DeviceError::Unavailable(_))
        ));
        assert!(device.create_buffer().is_err());
        assert_eq!(device.live_objects(), 2);
    }

    #[test]
    fn release_tracks_live_objects() {
        let mut device = HeadlessDevice::new();
        let buffer = device.create_buffer().expect("buffer");
        device.upload_buffer(buffer, &[0u8; 24]);
        assert_eq!(device.buffer_len(buffer), Some(24));
        device.release(DeviceObject::Buffer(buffer));
        assert_eq!(device.live_objects(), 0);
        assert_eq!(
            device.events().last(),
            Some(&DeviceEvent::Deleted(DeviceObject::Buffer(buffer)))
        );
    }

    #[test]
    fn callbacks_register_and_cancel() {
        let mut device = HeadlessDevice::new();
        let first = device.request_frame_callback();
        let second = device.request_frame_callback();
        device.cancel_frame_callback(first);
        assert_eq!(device.active_callbacks(), [second]);
        device.advance_clock(Duration::from_millis(16));
        assert_eq!(device.now(), Duration::from_millis(16));
    }
}
