//! Turns generator output into shader sources a GL-style device will accept.
//!
//! The text generator hands us a single blob with a vertex section, a
//! fragment section, and an optional geometry tag. `bundle` carves it up and
//! `normalize` patches the fragment stage so the declarations the language
//! insists on are actually present.
//!
//! Functions:
//!
//! - `split` separates the sections and resolves the geometry tag.
//! - `repair` applies the fragment-stage fixes; it never fails.
//! - `prepare` does both and keeps the raw text around for display.

mod bundle;
mod normalize;

pub use bundle::{
    split, GeometryKind, ParseFailure, SplitBundle, FRAGMENT_MARKER, GEOMETRY_MARKER,
    VERTEX_MARKER,
};
pub use normalize::{
    repair, NormalizedFragmentSource, PrecisionFix, DEFAULT_PRECISION, RECOGNIZED_IDENTIFIERS,
};

/// Sources ready for compilation, alongside the text they were derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSources {
    pub raw: String,
    pub geometry: GeometryKind,
    pub vertex: String,
    pub fragment: NormalizedFragmentSource,
}

/// Splits `raw` and repairs its fragment section.
pub fn prepare(raw: &str) -> Result<PreparedSources, ParseFailure> {
    let split = split(raw)?;
    let fragment = repair(&split.fragment);
    Ok(PreparedSources {
        raw: raw.to_string(),
        geometry: split.geometry,
        vertex: split.vertex,
        fragment,
    })
}
