use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Literal line introducing the vertex stage.
pub const VERTEX_MARKER: &str = "// Vertex Shader";
/// Literal line introducing the fragment stage.
pub const FRAGMENT_MARKER: &str = "// Fragment Shader";
/// Prefix of the optional geometry tag.
pub const GEOMETRY_MARKER: &str = "// GEOMETRY:";

static GEOMETRY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{}\s*(\w+)", regex::escape(GEOMETRY_MARKER)))
        .expect("geometry tag pattern")
});

/// The tag as it appears on its own line, for stripping.
static GEOMETRY_TAG_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{}[ \t]*\w*", regex::escape(GEOMETRY_MARKER)))
        .expect("geometry tag text pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("shader bundle is missing the `{marker}` marker")]
    MissingMarker { marker: &'static str },

    #[error("`// Fragment Shader` must follow `// Vertex Shader`")]
    MarkersOutOfOrder,
}

/// Mesh recipe requested by the bundle's geometry tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    #[default]
    Cube,
    Sphere,
    Plane,
    Cylinder,
    Torus,
}

impl GeometryKind {
    pub const ALL: [GeometryKind; 5] = [
        GeometryKind::Cube,
        GeometryKind::Sphere,
        GeometryKind::Plane,
        GeometryKind::Cylinder,
        GeometryKind::Torus,
    ];

    /// Resolves a tag case-insensitively; anything unrecognised is a cube.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "cube" => Self::Cube,
            "sphere" => Self::Sphere,
            "plane" => Self::Plane,
            "cylinder" => Self::Cylinder,
            "torus" => Self::Torus,
            other => {
                debug!(tag = other, "unrecognised geometry tag; using cube");
                Self::Cube
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Cube => "cube",
            Self::Sphere => "sphere",
            Self::Plane => "plane",
            Self::Cylinder => "cylinder",
            Self::Torus => "torus",
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The two stage sources and the geometry tag pulled out of a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitBundle {
    pub geometry: GeometryKind,
    pub vertex: String,
    pub fragment: String,
}

/// Separates a marker-delimited bundle into its vertex and fragment sections.
///
/// Each section starts on the line after its marker. Markdown fences and the
/// geometry tag are stripped from the sections; nothing else is touched.
pub fn split(raw: &str) -> Result<SplitBundle, ParseFailure> {
    let vertex_at = raw.find(VERTEX_MARKER).ok_or(ParseFailure::MissingMarker {
        marker: VERTEX_MARKER,
    })?;
    if !raw.contains(FRAGMENT_MARKER) {
        return Err(ParseFailure::MissingMarker {
            marker: FRAGMENT_MARKER,
        });
    }

    let vertex_start = line_end(raw, vertex_at + VERTEX_MARKER.len());
    let fragment_at = raw[vertex_at..]
        .find(FRAGMENT_MARKER)
        .map(|offset| vertex_at + offset)
        .ok_or(ParseFailure::MarkersOutOfOrder)?;
    let fragment_start = line_end(raw, fragment_at + FRAGMENT_MARKER.len());

    // The fragment marker may share the vertex marker's line in degenerate input.
    let vertex_section = raw.get(vertex_start..fragment_at).unwrap_or_default();
    let fragment_section = &raw[fragment_start..];

    let geometry = GEOMETRY_TAG
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|name| GeometryKind::from_name(name.as_str()))
        .unwrap_or_default();

    let vertex = clean_section(vertex_section);
    let fragment = clean_section(fragment_section);
    debug!(
        %geometry,
        vertex_bytes = vertex.len(),
        fragment_bytes = fragment.len(),
        "split shader bundle"
    );

    Ok(SplitBundle {
        geometry,
        vertex,
        fragment,
    })
}

/// Index just past the newline ending the line that contains `from`.
fn line_end(raw: &str, from: usize) -> usize {
    raw[from..]
        .find('\n')
        .map(|offset| from + offset + 1)
        .unwrap_or(raw.len())
}

fn clean_section(section: &str) -> String {
    let untagged = GEOMETRY_TAG_TEXT.replace_all(section, "");
    let kept: Vec<&str> = untagged
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect();
    kept.join("\n").trim().to_string()
}
