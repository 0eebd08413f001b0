use std::fmt;

use renderer::{HeadlessDevice, PipelineError, RenderSession};
use serde::Serialize;
use shaderbundle::GeometryKind;

/// Outcome of `shadersmith check`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    pub ok: bool,
    pub stage: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<GeometryKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertices: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<&'static str>,
    pub declared: Vec<&'static str>,
    pub frames: u64,
    pub draw_calls: usize,
    pub live_objects: usize,
    /// Whether stopping the session left nothing alive on the device.
    pub released: bool,
}

impl CheckReport {
    /// Captures the session after the frames were driven, before teardown.
    pub fn capture(
        session: &RenderSession<HeadlessDevice>,
        outcome: Result<(), &PipelineError>,
    ) -> Self {
        let sources = session.last_attempt().and_then(|attempt| attempt.sources());
        let program = session.active_program();
        let device = session.device();

        Self {
            ok: outcome.is_ok(),
            stage: session.stage().name(),
            failed_step: outcome.err().map(PipelineError::failed_step),
            error: outcome.err().map(ToString::to_string),
            geometry: sources.map(|sources| sources.geometry),
            vertices: program.map(|program| program.vertex_count()),
            precision: sources.map(|sources| sources.fragment.precision().name()),
            declared: sources
                .map(|sources| sources.fragment.inserted().to_vec())
                .unwrap_or_default(),
            frames: session.frame_state().map(|state| state.frames()).unwrap_or(0),
            draw_calls: device.draw_calls().len(),
            live_objects: device.live_objects(),
            released: false,
        }
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "stage:        {}", self.stage)?;
        if let Some(step) = self.failed_step {
            writeln!(f, "failed step:  {step}")?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "error:        {error}")?;
        }
        if let Some(geometry) = self.geometry {
            writeln!(f, "geometry:     {geometry}")?;
        }
        if let Some(vertices) = self.vertices {
            writeln!(f, "vertices:     {vertices}")?;
        }
        if let Some(precision) = self.precision {
            writeln!(f, "precision:    {precision}")?;
        }
        if self.declared.is_empty() {
            writeln!(f, "declared:     none")?;
        } else {
            writeln!(f, "declared:     {}", self.declared.join(", "))?;
        }
        writeln!(
            f,
            "frames:       {} ({} draw calls)",
            self.frames, self.draw_calls
        )?;
        writeln!(f, "live objects: {}", self.live_objects)?;
        write!(f, "released:     {}", if self.released { "yes" } else { "no" })
    }
}
