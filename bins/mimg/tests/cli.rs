use assert_cmd::Command;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use predicates::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 120, 200])));
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageOutputFormat::Png).unwrap();

    let path = dir.join(name);
    std::fs::write(&path, buffer.into_inner()).unwrap();
    path
}

fn mimg(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mimg").unwrap();
    cmd.current_dir(dir.path());
    cmd
}

#[test]
fn detect_reports_format() {
    let dir = TempDir::new().unwrap();
    let path = write_png(dir.path(), "a.png", 4, 4);

    mimg(&dir)
        .args(["detect", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Format: png"))
        .stdout(predicate::str::contains("MIME: image/png"));
}

#[test]
fn info_json_has_dimensions() {
    let dir = TempDir::new().unwrap();
    let path = write_png(dir.path(), "a.png", 100, 50);

    mimg(&dir)
        .args(["info", path.to_str().unwrap(), "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"width\": 100"))
        .stdout(predicate::str::contains("\"height\": 50"));
}

#[test]
fn embed_prints_data_uri() {
    let dir = TempDir::new().unwrap();
    let path = write_png(dir.path(), "a.png", 2, 2);

    mimg(&dir)
        .args(["embed", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("data:image/png;base64,"));
}

#[test]
fn transform_writes_derived_image() {
    let dir = TempDir::new().unwrap();
    let path = write_png(dir.path(), "a.png", 100, 50);
    let out = dir.path().join("thumb.png");

    mimg(&dir)
        .args(["transform", path.to_str().unwrap(), "crop", "20", "20", "-o", out.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("20x20"));

    assert!(out.exists());
}

#[test]
fn unknown_transform_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_png(dir.path(), "a.png", 8, 8);
    let out = dir.path().join("out.png");

    mimg(&dir)
        .args(["transform", path.to_str().unwrap(), "rotate", "90", "-o", out.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not generate 'rotate'"));

    assert!(!out.exists());
}

#[test]
fn ingest_consumes_upload() {
    let dir = TempDir::new().unwrap();
    let upload = write_png(dir.path(), "upload.tmp", 3, 3);

    mimg(&dir)
        .args(["ingest", upload.to_str().unwrap(), "--name", "holiday.png", "--title", "Holiday"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"parent_id\": -1"))
        .stdout(predicate::str::contains("\"title\": \"Holiday\""))
        .stdout(predicate::str::contains(".png\""));

    assert!(!upload.exists());
}

#[test]
fn ingest_keep_leaves_upload() {
    let dir = TempDir::new().unwrap();
    let upload = write_png(dir.path(), "upload.tmp", 3, 3);

    mimg(&dir)
        .args(["ingest", upload.to_str().unwrap(), "--keep"])
        .assert()
        .success();

    assert!(upload.exists());
}

#[test]
fn base64_decode_round_trip() {
    let dir = TempDir::new().unwrap();
    let text = dir.path().join("gif.b64");
    std::fs::write(&text, "R0lGODlh\n").unwrap();
    let out = dir.path().join("out.gif");

    mimg(&dir)
        .args(["base64", "decode", text.to_str().unwrap(), "-o", out.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Decoded gif"));

    assert_eq!(std::fs::read(&out).unwrap(), b"GIF89a");
}

#[test]
fn missing_file_fails() {
    let dir = TempDir::new().unwrap();

    mimg(&dir)
        .args(["detect", "does-not-exist.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not read"));
}
