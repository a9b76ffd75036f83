use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use blockext_core::document::{
    BlockReference, Document, Entity, EntityKind, Line, Polyline, Shape,
};
use blockext_core::geometry::Point3;
use blockext_io::{DocumentLoader, DocumentSaver, JsonFacade};
use predicates::prelude::*;
use tempfile::{TempDir, tempdir};

fn blockext(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("blockext").expect("binary is built");
    cmd.current_dir(workdir).env_remove("BLOCKEXT_CONFIG");
    cmd
}

/// 块 FRAME 基点 (2,0)，内含 (2,0)-(6,3) 的矩形与一条位于中心线图层的长线。
fn write_frame_document(dir: &TempDir) -> PathBuf {
    let mut doc = Document::new();
    let geom = doc.ensure_layer("GEOM");
    let axis = doc.ensure_layer("i_Осевые линии");
    let frame = doc.define_block("FRAME", Point3::new(2.0, 0.0, 0.0));
    doc.add_to_block(
        frame,
        Entity::shape(
            geom,
            Shape::Polyline(Polyline {
                vertices: vec![
                    Point3::new(2.0, 0.0, 0.0),
                    Point3::new(6.0, 0.0, 0.0),
                    Point3::new(6.0, 3.0, 0.0),
                    Point3::new(2.0, 3.0, 0.0),
                ],
                is_closed: true,
            }),
        ),
    );
    doc.add_to_block(
        frame,
        Entity::shape(
            axis,
            Shape::Line(Line {
                start: Point3::new(-100.0, 1.5, 0.0),
                end: Point3::new(100.0, 1.5, 0.0),
            }),
        ),
    );
    doc.add_line(Point3::ORIGIN, Point3::new(1.0, 0.0, 0.0), "0");
    doc.add_block_reference(BlockReference::new(frame, Point3::new(10.0, 10.0, 0.0)), "0");

    let path = dir.path().join("frame.json");
    JsonFacade::new().save(&doc, &path).expect("save fixture");
    path
}

#[test]
fn demo_scene_reports_world_box() {
    let dir = tempdir().unwrap();
    blockext(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "MinPoint: (100,50,0) MaxPoint: (120,60,0)",
        ));
}

#[test]
fn demo_scene_reports_oriented_corners() {
    let dir = tempdir().unwrap();
    blockext(dir.path())
        .args(["--oriented", "--strategy", "local"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Corners: (120,60) (100,60) (100,50) (120,50)",
        ));
}

#[test]
fn document_bounds_are_written_back_with_outline() {
    let dir = tempdir().unwrap();
    let input = write_frame_document(&dir);
    let output = dir.path().join("out.json");

    blockext(dir.path())
        .arg("--document")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "MinPoint: (10,10,0) MaxPoint: (14,13,0)",
        ));

    let written = JsonFacade::new().load(&output).unwrap();
    assert_eq!(written.entities().count(), 3);
    let (_, outline) = written.entities().last().unwrap();
    match &outline.kind {
        EntityKind::Shape(Shape::Polyline(polyline)) => {
            assert!(polyline.is_closed);
            assert_eq!(polyline.vertices[0], Point3::new(10.0, 10.0, 0.0));
            assert_eq!(polyline.vertices[2], Point3::new(14.0, 13.0, 0.0));
        }
        other => panic!("expected outline polyline, got {other:?}"),
    }
}

#[test]
fn no_outline_leaves_document_untouched() {
    let dir = tempdir().unwrap();
    let input = write_frame_document(&dir);
    let output = dir.path().join("out.json");

    blockext(dir.path())
        .arg("--document")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .arg("--no-outline")
        .assert()
        .success();

    let written = JsonFacade::new().load(&output).unwrap();
    assert_eq!(written.entities().count(), 2);
}

#[test]
fn plain_shape_cannot_be_oriented() {
    let dir = tempdir().unwrap();
    let input = write_frame_document(&dir);

    blockext(dir.path())
        .arg("--document")
        .arg(&input)
        .args(["--entity", "0", "--oriented"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a block reference"));
}

#[test]
fn unknown_entity_fails() {
    let dir = tempdir().unwrap();
    blockext(dir.path())
        .args(["--entity", "4242"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("4242"));
}

#[test]
fn config_denylist_can_hide_everything() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("blockext.toml");
    fs::write(
        &config,
        r#"
[logging]
level = "warn"

[layers]
extra_denied = ["GEOM"]
"#,
    )
    .unwrap();

    blockext(dir.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}

#[test]
fn default_config_is_discovered_from_working_directory() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("config")).unwrap();
    fs::write(
        dir.path().join("config").join("default.toml"),
        "[layers]\nreserved = \"GEOM\"\n",
    )
    .unwrap();

    blockext(dir.path()).assert().failure();
}
