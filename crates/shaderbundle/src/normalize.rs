//! Fragment-stage repair.
//!
//! Generated fragment shaders routinely forget the float precision statement
//! and the declarations for the uniforms and varyings the host provides. The
//! repair here is a fixed heuristic rather than a parser: identifiers are
//! found by substring search, so a mention inside a comment still earns a
//! declaration. An unused uniform compiles; a missing one does not.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// Statement prepended when the source carries no float precision at all.
pub const DEFAULT_PRECISION: &str = "precision mediump float;";

/// Identifiers the host feeds to every program, with the declaration that
/// gets inserted for each. Insertion follows this order.
pub const RECOGNIZED_IDENTIFIERS: [(&str, &str); 4] = [
    ("time", "uniform float time;"),
    ("resolution", "uniform vec2 resolution;"),
    ("vNormal", "varying vec3 vNormal;"),
    ("vPosition", "varying vec3 vPosition;"),
];

static PRECISION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"precision\s+(?:lowp|mediump|highp)\s+float\s*;").expect("precision pattern")
});

static DECLARATIONS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    RECOGNIZED_IDENTIFIERS
        .iter()
        .map(|(name, _)| {
            Regex::new(&format!(
                r"(?m)(?:^|[;{{}}])\s*(?:layout\s*\([^)]*\)\s*)?(?:(?:flat|smooth|noperspective|centroid)\s+)*(?:uniform|varying|in)\s+[^;{{}}()]*\b{name}\b"
            ))
            .expect("declaration pattern")
        })
        .collect()
});

/// What happened to the precision statement during repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecisionFix {
    /// Already the first statement.
    Kept,
    /// Found further down and moved to the top.
    Relocated,
    /// Absent; [`DEFAULT_PRECISION`] was prepended.
    Inserted,
}

impl PrecisionFix {
    pub fn name(self) -> &'static str {
        match self {
            PrecisionFix::Kept => "kept",
            PrecisionFix::Relocated => "relocated",
            PrecisionFix::Inserted => "inserted",
        }
    }
}

/// Fragment source after [`repair`], plus a record of what was changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedFragmentSource {
    text: String,
    precision: PrecisionFix,
    inserted: Vec<&'static str>,
}

impl NormalizedFragmentSource {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    pub fn precision(&self) -> PrecisionFix {
        self.precision
    }

    /// Names of the identifiers whose declarations were inserted.
    pub fn inserted(&self) -> &[&'static str] {
        &self.inserted
    }

    /// True when repair left the (trimmed) input untouched.
    pub fn is_noop(&self) -> bool {
        self.precision == PrecisionFix::Kept && self.inserted.is_empty()
    }
}

impl AsRef<str> for NormalizedFragmentSource {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for NormalizedFragmentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Makes a generated fragment shader compilable for the known failure modes.
///
/// Steps:
///
/// 1. Trim the source. A leading `#version` line stays on top.
/// 2. Make a float precision statement the first statement, moving the first
///    one outside a `//` comment up or prepending [`DEFAULT_PRECISION`].
/// 3. For each of [`RECOGNIZED_IDENTIFIERS`] that occurs in the body without
///    a declaration, queue its declaration.
/// 4. Insert the queued declarations as one block right after the precision
///    statement.
///
/// Running it on its own output changes nothing.
pub fn repair(source: &str) -> NormalizedFragmentSource {
    let trimmed = source.trim();
    let (header, body) = split_version_directive(trimmed);

    let statement = PRECISION
        .find_iter(body)
        .find(|found| !in_line_comment(body, found.start()));
    let (precision_stmt, rest, precision) = match statement {
        Some(found) if found.start() == 0 => (
            found.as_str(),
            body[found.end()..].trim_start().to_string(),
            PrecisionFix::Kept,
        ),
        Some(found) => {
            let before = body[..found.start()].trim_end();
            let after = body[found.end()..].trim_start();
            let rest = match (before.is_empty(), after.is_empty()) {
                (true, _) => after.to_string(),
                (false, true) => before.to_string(),
                (false, false) => format!("{before}\n{after}"),
            };
            (found.as_str(), rest, PrecisionFix::Relocated)
        }
        None => (DEFAULT_PRECISION, body.to_string(), PrecisionFix::Inserted),
    };

    let missing: Vec<(&'static str, &'static str)> = RECOGNIZED_IDENTIFIERS
        .iter()
        .zip(DECLARATIONS.iter())
        .filter(|((name, _), declared)| body.contains(name) && !declared.is_match(body))
        .map(|(entry, _)| *entry)
        .collect();

    if precision == PrecisionFix::Kept && missing.is_empty() {
        return NormalizedFragmentSource {
            text: trimmed.to_string(),
            precision,
            inserted: Vec::new(),
        };
    }

    let mut lines: Vec<&str> = Vec::with_capacity(missing.len() + 3);
    lines.extend(header);
    lines.push(precision_stmt);
    lines.extend(missing.iter().map(|(_, declaration)| *declaration));
    if !rest.is_empty() {
        lines.push(rest.as_str());
    }
    let text = lines.join("\n");

    let inserted: Vec<&'static str> = missing.iter().map(|(name, _)| *name).collect();
    debug!(?precision, inserted = ?inserted, "repaired fragment source");

    NormalizedFragmentSource {
        text,
        precision,
        inserted,
    }
}

/// Whether `at` sits after a `//` on its line.
fn in_line_comment(source: &str, at: usize) -> bool {
    let line_start = source[..at].rfind('\n').map_or(0, |newline| newline + 1);
    source[line_start..at].contains("//")
}

/// Splits off a leading `#version` line, which must stay first.
fn split_version_directive(source: &str) -> (Option<&str>, &str) {
    if !source.starts_with("#version") {
        return (None, source);
    }
    match source.split_once('\n') {
        Some((directive, body)) => (Some(directive.trim_end()), body.trim_start()),
        None => (Some(source), ""),
    }
}
