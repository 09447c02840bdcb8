use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

const TYPEFACE: &str = r#"{
    "familyName": "Fixture",
    "resolution": 1000,
    "underlineThickness": 50,
    "boundingBox": { "xMin": 0, "xMax": 700, "yMin": -200, "yMax": 1000 },
    "glyphs": {
        "N": { "ha": 800,
               "o": "m 0 0 l 150 0 l 150 700 l 550 0 l 700 0 l 700 1000 l 550 1000 l 550 300 l 150 1000 l 0 1000 z" },
        "1": { "ha": 600,
               "o": "m 200 0 l 400 0 l 400 1000 l 250 1000 l 100 850 l 200 800 z" },
        "?": { "ha": 500, "o": "m 0 0 l 400 0 l 400 400 z" }
    }
}"#;

fn typeface_file() -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("temp typeface");
    tmp.write_all(TYPEFACE.as_bytes()).expect("write typeface");
    tmp
}

/// A 4x2 Radiance file with flat RLE-free scanlines.
fn environment_file() -> NamedTempFile {
    let mut bytes = b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 2 +X 4\n".to_vec();
    for _ in 0..8 {
        bytes.extend_from_slice(&[128, 96, 64, 129]);
    }
    let mut tmp = NamedTempFile::new().expect("temp hdr");
    tmp.write_all(&bytes).expect("write hdr");
    tmp
}

fn glyphglow() -> Command {
    Command::cargo_bin("glyphglow").expect("binary exists")
}

#[test]
fn headless_run_builds_the_full_scene() {
    let typeface = typeface_file();
    let environment = environment_file();
    glyphglow()
        .arg("--typeface")
        .arg(typeface.path())
        .arg("--environment")
        .arg(environment.path())
        .arg("--summary-only")
        .assert()
        .success()
        .stdout(contains("Scene: 2 text meshes, 1 cube(s), 1 light(s)"))
        .stdout(contains("Environment: 4x2"))
        .stdout(contains(
            "Passes: render, bloom(strength=5.00 radius=0.10 threshold=0.85)",
        ))
        .stdout(contains(" - N pos=(-2.00, 0.00, 0.00)"))
        .stdout(contains(" - 1 pos=(1.00, 0.00, 0.00)"))
        .stdout(contains("Frames rendered: 0"));
}

#[test]
fn scripted_keys_move_cube_light_and_camera() {
    let typeface = typeface_file();
    glyphglow()
        .arg("--typeface")
        .arg(typeface.path())
        .args(["--keys", "wwqdxW", "--summary-only"])
        .assert()
        .success()
        .stdout(contains(" - cube pos=(0.00, 0.20, 0.10)"))
        .stdout(contains(" - cube-light pos=(0.00, 0.20, 0.10)"))
        .stdout(contains("Camera pos=(-0.10, 0.00, 5.00)"));
}

#[test]
fn every_frame_renders_once() {
    let typeface = typeface_file();
    glyphglow()
        .arg("--typeface")
        .arg(typeface.path())
        .args(["--frames", "12", "--summary-only"])
        .assert()
        .success()
        .stdout(contains("Frames rendered: 12"));
}

#[test]
fn missing_typeface_degrades_to_an_empty_scene() {
    let environment = environment_file();
    glyphglow()
        .args(["--typeface", "/nonexistent/font.json", "--environment"])
        .arg(environment.path())
        .args(["--keys", "ww", "--frames", "5", "--summary-only"])
        .assert()
        .success()
        .stdout(contains("Scene: 0 text meshes, 0 cube(s), 0 light(s)"))
        .stdout(contains("Passes: none"))
        .stdout(contains("Environment: 4x2"))
        .stdout(contains("Frames rendered: 0"));
}

#[test]
fn glyph_missing_from_typeface_keeps_cube_and_light() {
    let mut face = NamedTempFile::new().expect("temp typeface");
    face.write_all(
        br#"{ "resolution": 1000, "glyphs": { "1": { "ha": 600, "o": "m 200 0 l 400 0 l 400 1000 l 200 1000 z" } } }"#,
    )
    .expect("write typeface");
    glyphglow()
        .arg("--typeface")
        .arg(face.path())
        .args(["--keys", "w", "--frames", "3", "--summary-only"])
        .assert()
        .success()
        .stdout(contains("Scene: 1 text meshes, 1 cube(s), 1 light(s)"))
        .stdout(contains(" - cube pos=(0.00, 0.10, 0.00)"))
        .stdout(contains("Frames rendered: 3"));
}

#[test]
fn missing_environment_keeps_the_scene() {
    let typeface = typeface_file();
    glyphglow()
        .arg("--typeface")
        .arg(typeface.path())
        .args(["--environment", "/nonexistent/sky.hdr", "--summary-only"])
        .assert()
        .success()
        .stdout(contains("Environment: none"))
        .stdout(contains("Scene: 2 text meshes"));
}

#[test]
fn config_file_overrides_defaults() {
    let typeface = typeface_file();
    let mut config = NamedTempFile::new().expect("temp config");
    config
        .write_all(br#"{ "controls": { "step": 0.5 }, "bloom": { "strength": 2.0 } }"#)
        .expect("write config");
    glyphglow()
        .arg("--config")
        .arg(config.path())
        .arg("--typeface")
        .arg(typeface.path())
        .args(["--keys", "w", "--summary-only"])
        .assert()
        .success()
        .stdout(contains(" - cube pos=(0.00, 0.50, 0.00)"))
        .stdout(contains("bloom(strength=2.00"));
}

#[test]
fn unknown_arguments_fail() {
    glyphglow()
        .arg("--bogus")
        .assert()
        .failure()
        .stderr(contains("Unknown argument: --bogus").and(contains("Usage: glyphglow")));
}
