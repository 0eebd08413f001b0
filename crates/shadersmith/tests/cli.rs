use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

const CUBE_BUNDLE: &str = "\
// Vertex Shader
attribute vec3 position;
attribute vec3 normal;
uniform mat4 modelMatrix;
uniform mat4 viewMatrix;
uniform mat4 projectionMatrix;
varying vec3 vNormal;
void main() {
  vNormal = normal;
  gl_Position = projectionMatrix * viewMatrix * modelMatrix * vec4(position, 1.0);
}
// Fragment Shader
void main() {
  gl_FragColor = vec4(abs(vNormal) * (0.5 + 0.5 * sin(time)), 1.0);
}
// GEOMETRY: cube
";

fn shadersmith(root: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_shadersmith"));
    command
        .env_remove("SHADERSMITH_CONFIG")
        .env("XDG_CONFIG_HOME", root.join("config"))
        .env("RUST_LOG", "warn");
    command
}

fn write_bundle(root: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = root.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is a JSON report")
}

#[test]
fn normalize_prints_repaired_bundle() {
    let root = TempDir::new().unwrap();
    let bundle = write_bundle(root.path(), "cube.txt", CUBE_BUNDLE);

    let output = shadersmith(root.path())
        .arg("normalize")
        .arg(&bundle)
        .output()
        .expect("failed to run shadersmith normalize");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains(
        "// Fragment Shader\nprecision mediump float;\nuniform float time;\nvarying vec3 vNormal;\nvoid main() {"
    ));
    assert!(stdout.trim_end().ends_with("// GEOMETRY: cube"));
}

#[test]
fn normalize_reads_standard_input() {
    let root = TempDir::new().unwrap();
    let mut child = shadersmith(root.path())
        .args(["normalize", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("failed to spawn shadersmith");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(CUBE_BUNDLE.replace("cube", "torus").as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.trim_end().ends_with("// GEOMETRY: torus"));
}

#[test]
fn normalize_rejects_bundle_without_fragment_marker() {
    let root = TempDir::new().unwrap();
    let bundle = write_bundle(root.path(), "broken.txt", "// Vertex Shader\nvoid main() {}\n");

    let output = shadersmith(root.path())
        .arg("normalize")
        .arg(&bundle)
        .output()
        .expect("failed to run shadersmith normalize");

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("// Fragment Shader"), "{stderr}");
}

#[test]
fn check_reports_frames_as_json() {
    let root = TempDir::new().unwrap();
    let bundle = write_bundle(root.path(), "cube.txt", CUBE_BUNDLE);

    let output = shadersmith(root.path())
        .arg("check")
        .arg(&bundle)
        .args(["--frames", "2", "--json"])
        .output()
        .expect("failed to run shadersmith check");

    assert!(output.status.success());
    let report = json(&output);
    assert_eq!(report["ok"], true);
    assert_eq!(report["stage"], "active");
    assert_eq!(report["geometry"], "cube");
    assert_eq!(report["vertices"], 36);
    assert_eq!(report["precision"], "inserted");
    assert_eq!(report["declared"], serde_json::json!(["time", "vNormal"]));
    assert_eq!(report["frames"], 2);
    assert_eq!(report["draw_calls"], 2);
    assert_eq!(report["live_objects"], 5);
    assert_eq!(report["released"], true);
}

#[test]
fn check_fails_on_compile_error() {
    let root = TempDir::new().unwrap();
    let broken = CUBE_BUNDLE.replace("1.0);\n}\n// GEOMETRY", "1.0);\n// GEOMETRY");
    let bundle = write_bundle(root.path(), "broken.txt", &broken);

    let output = shadersmith(root.path())
        .arg("check")
        .arg(&bundle)
        .arg("--json")
        .output()
        .expect("failed to run shadersmith check");

    assert!(!output.status.success());
    let report = json(&output);
    assert_eq!(report["ok"], false);
    assert_eq!(report["stage"], "failed");
    assert_eq!(report["failed_step"], "compile-fragment");
    assert_eq!(report["draw_calls"], 0);
    assert_eq!(report["live_objects"], 0);
}

#[test]
fn check_reads_frames_from_config() {
    let root = TempDir::new().unwrap();
    let bundle = write_bundle(root.path(), "cube.txt", CUBE_BUNDLE);
    let config = root.path().join("view.toml");
    fs::write(&config, "[playback]\nframes = 4\nframe_interval = \"20ms\"\n").unwrap();

    let output = shadersmith(root.path())
        .arg("--config")
        .arg(&config)
        .arg("check")
        .arg(&bundle)
        .arg("--json")
        .output()
        .expect("failed to run shadersmith check");

    assert!(output.status.success());
    assert_eq!(json(&output)["draw_calls"], 4);
}

#[test]
fn check_uses_config_from_user_directory() {
    let root = TempDir::new().unwrap();
    let bundle = write_bundle(root.path(), "cube.txt", CUBE_BUNDLE);
    let config_dir = root.path().join("config/shadersmith");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("shadersmith.toml"), "[playback]\nframes = 1\n").unwrap();

    let output = shadersmith(root.path())
        .arg("check")
        .arg(&bundle)
        .arg("--json")
        .output()
        .expect("failed to run shadersmith check");

    assert!(output.status.success());
    assert_eq!(json(&output)["draw_calls"], 1);
}

#[test]
fn check_rejects_invalid_config() {
    let root = TempDir::new().unwrap();
    let bundle = write_bundle(root.path(), "cube.txt", CUBE_BUNDLE);
    let config = root.path().join("view.toml");
    fs::write(&config, "[camera]\nfov_degrees = 0.0\n").unwrap();

    let output = shadersmith(root.path())
        .env("SHADERSMITH_CONFIG", &config)
        .arg("check")
        .arg(&bundle)
        .output()
        .expect("failed to run shadersmith check");

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("view.toml"), "{stderr}");
}

#[test]
fn geometry_prints_vertex_count() {
    let root = TempDir::new().unwrap();
    let output = shadersmith(root.path())
        .args(["geometry", "TORUS"])
        .output()
        .expect("failed to run shadersmith geometry");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("geometry:  torus"));
    assert!(stdout.contains("vertices:  1536"));
}
