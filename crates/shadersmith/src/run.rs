use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};
use renderer::{
    Camera, FrameOutcome, GeometrySpec, HeadlessDevice, RenderSession, RendererConfig, Viewport,
};
use shaderbundle::{GeometryKind, PreparedSources, FRAGMENT_MARKER, GEOMETRY_MARKER, VERTEX_MARKER};
use tracing_subscriber::EnvFilter;
use viewconfig::ViewConfig;

use crate::cli::{CheckArgs, GeometryArgs, InputArgs};
use crate::report::CheckReport;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

pub fn normalize(args: InputArgs) -> Result<()> {
    let raw = read_input(&args.input)?;
    let prepared = shaderbundle::prepare(&raw).context("failed to parse shader bundle")?;
    tracing::info!(
        geometry = %prepared.geometry,
        precision = prepared.fragment.precision().name(),
        inserted = ?prepared.fragment.inserted(),
        "bundle normalized"
    );
    println!("{}", render_bundle(&prepared));
    Ok(())
}

pub fn check(config: &ViewConfig, args: CheckArgs) -> Result<()> {
    let raw = read_input(&args.input.input)?;
    let frames = args.frames.unwrap_or(config.playback.frames);
    let interval = config.playback.frame_interval;

    let mut session = RenderSession::new(HeadlessDevice::new(), renderer_config(config, args.size));
    let outcome = session.start_render(&raw);
    if outcome.is_ok() {
        for _ in 0..frames {
            session.device_mut().advance_clock(interval);
            let Some(callback) = session.active_callback() else {
                break;
            };
            if session.on_frame(callback) == FrameOutcome::Ignored {
                break;
            }
        }
    }

    let mut report = CheckReport::capture(&session, outcome.as_ref().map(|_| ()));
    session.stop_render();
    report.released = session.device().live_objects() == 0;
    tracing::debug!(?report, "check finished");

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to encode report")?
        );
    } else {
        println!("{report}");
    }

    outcome.context("shader bundle failed the check")
}

pub fn geometry(args: GeometryArgs) -> Result<()> {
    let kind = GeometryKind::from_name(&args.name);
    if !kind.name().eq_ignore_ascii_case(args.name.trim()) {
        tracing::warn!(requested = %args.name, resolved = %kind, "unknown geometry; using default");
    }
    let spec = GeometrySpec::from_kind(kind);
    let mesh = renderer::generate(&spec);
    println!("geometry:  {kind}");
    println!("recipe:    {spec:?}");
    println!("vertices:  {}", mesh.vertex_count());
    println!("triangles: {}", mesh.triangle_count());
    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("failed to read bundle from stdin")?;
        return Ok(text);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read bundle at {}", path.display()))
}

/// Prints prepared sources back in the bundle format, so the output can be
/// fed to `check` unchanged.
fn render_bundle(prepared: &PreparedSources) -> String {
    format!(
        "{VERTEX_MARKER}\n{}\n{FRAGMENT_MARKER}\n{}\n{GEOMETRY_MARKER} {}",
        prepared.vertex, prepared.fragment, prepared.geometry
    )
}

fn renderer_config(config: &ViewConfig, size: Option<(u32, u32)>) -> RendererConfig {
    let (width, height) = size.unwrap_or((config.viewport.width, config.viewport.height));
    RendererConfig {
        viewport: Viewport::new(width, height),
        camera: Camera {
            fov_degrees: config.camera.fov_degrees,
            near: config.camera.near,
            far: config.camera.far,
            distance: config.camera.distance,
        },
        clear_color: config.playback.clear_color,
    }
}
