//! End-to-end CLI tests against a temporary addons tree and database.

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn modsync() -> Command {
    Command::cargo_bin("modsync").expect("modsync binary")
}

const SCHEMA: &str = r#"
[models."res.country".fields.code]
kind = "char"

[models."res.partner".fields.name]
kind = "char"
translate = true

[models."res.partner".fields.country_id]
kind = "many2one"
relation = "res.country"
"#;

const BASE_XML: &str = r#"<?xml version="1.0"?>
<openerp>
  <data>
    <record model="res.country" id="be"><field name="code">BE</field></record>
    <record model="res.country" id="fr"><field name="code">FR</field></record>
  </data>
</openerp>
"#;

const SALE_XML: &str = r#"<?xml version="1.0"?>
<openerp>
  <data>
    <record model="res.partner" id="customer">
      <field name="name">Customer</field>
      <field name="country_id" ref="base.be"/>
    </record>
  </data>
</openerp>
"#;

fn write_module(root: &Path, name: &str, manifest: &str, files: &[(&str, &str)]) {
    let dir = root.join("addons").join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("module.toml"), manifest).unwrap();
    for (rel, contents) in files {
        fs::write(dir.join(rel), contents).unwrap();
    }
}

/// `addons/{base,sale}` plus an empty database in `db/`.
fn create_workspace() -> TempDir {
    let td = tempfile::tempdir().expect("tempdir");
    let root = td.path();

    write_module(
        root,
        "base",
        "version = \"1.0\"\ndata = [\"data.xml\"]\n",
        &[("data.xml", BASE_XML)],
    );
    write_module(
        root,
        "sale",
        "version = \"1.0\"\ndepends = [\"base\"]\ndata = [\"sale.xml\"]\n",
        &[("sale.xml", SALE_XML)],
    );

    fs::create_dir_all(root.join("db")).unwrap();
    fs::write(root.join("db").join("schema.toml"), SCHEMA).unwrap();
    td
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).expect("valid json")
}

fn update(temp: &TempDir) -> Command {
    let mut cmd = modsync();
    cmd.current_dir(temp.path())
        .args(["update", "--addons", "addons", "--db", "db", "--out-dir", "out"]);
    cmd
}

#[test]
fn test_order_text_lists_dependencies_first() {
    let temp = create_workspace();

    modsync()
        .current_dir(temp.path())
        .args(["order", "--addons", "addons", "-i", "sale"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. base (depth 0) [-]"))
        .stdout(predicate::str::contains("2. sale (depth 1) [install]"));
}

#[test]
fn test_order_json_output() {
    let temp = create_workspace();

    let output = modsync()
        .current_dir(temp.path())
        .args(["order", "--addons", "addons", "--format", "json"])
        .output()
        .expect("run order");
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(json["schema"], "modsync.order.v1");
    assert_eq!(json["modules"][0]["name"], "base");
    assert_eq!(json["modules"][1]["name"], "sale");
    assert_eq!(json["modules"][1]["depth"], 1);
}

#[test]
fn test_order_missing_dependency_exits_2() {
    let temp = create_workspace();
    write_module(
        temp.path(),
        "stock",
        "depends = [\"ghost\"]\n",
        &[],
    );

    modsync()
        .current_dir(temp.path())
        .args(["order", "--addons", "addons"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn test_update_installs_and_writes_reports() {
    let temp = create_workspace();

    update(&temp).args(["-i", "sale"]).assert().success();

    let report = read_json(&temp.path().join("out/report.json"));
    assert_eq!(report["schema"], "modsync.report.v1");
    assert_eq!(report["status"], "success");
    assert_eq!(report["summary"]["created"], 3);
    assert_eq!(report["modules"][0]["name"], "base");
    assert_eq!(report["modules"][0]["mode"], "init");
    assert!(temp.path().join("out/report.md").exists());

    let state = read_json(&temp.path().join("db/state.json"));
    assert_eq!(state["modules"]["sale"], "1.0");
    assert!(state["provenance"]["sale"]["customer"].is_object());
}

#[test]
fn test_second_update_is_idempotent() {
    let temp = create_workspace();
    update(&temp).args(["-i", "sale"]).assert().success();

    update(&temp).arg("--all").assert().success();

    let report = read_json(&temp.path().join("out/report.json"));
    assert_eq!(report["summary"]["created"], 0);
    assert_eq!(report["summary"]["updated"], 0);
    assert_eq!(report["summary"]["unchanged"], 3);
    assert_eq!(report["modules"][1]["mode"], "update");
}

#[test]
fn test_dropped_record_is_deleted_on_update() {
    let temp = create_workspace();
    update(&temp).args(["-i", "all"]).assert().success();

    fs::write(
        temp.path().join("addons/base/data.xml"),
        r#"<openerp><data><record model="res.country" id="be"><field name="code">BE</field></record></data></openerp>"#,
    )
    .unwrap();
    update(&temp).args(["-u", "base"]).assert().success();

    let report = read_json(&temp.path().join("out/report.json"));
    assert_eq!(report["deletions"][0]["xml_id"], "base.fr");
    assert_eq!(report["deletions"][0]["outcome"]["status"], "deleted");
    let state = read_json(&temp.path().join("db/state.json"));
    assert!(state["provenance"]["base"]["fr"].is_null());
}

#[test]
fn test_failed_module_exits_1_and_reports() {
    let temp = create_workspace();
    fs::write(
        temp.path().join("addons/sale/sale.xml"),
        r#"<openerp><data><record model="res.partner" id="bad"><field name="country_id" ref="ghost"/></record></data></openerp>"#,
    )
    .unwrap();

    update(&temp).args(["-i", "sale"]).assert().code(1);

    let report = read_json(&temp.path().join("out/report.json"));
    assert_eq!(report["status"], "failed");
    assert_eq!(report["modules"][1]["status"], "failed");
    let state = read_json(&temp.path().join("db/state.json"));
    assert_eq!(state["modules"]["base"], "1.0");
    assert!(state["modules"]["sale"].is_null());
}

#[test]
fn test_config_file_supplies_paths() {
    let temp = create_workspace();
    fs::write(
        temp.path().join("modsync.toml"),
        "[paths]\naddons = \"addons\"\ndb = \"db\"\nout_dir = \"reports\"\n\n[modules]\ninstall = [\"base\"]\n",
    )
    .unwrap();

    modsync()
        .current_dir(temp.path())
        .arg("update")
        .assert()
        .success();

    let report = read_json(&temp.path().join("reports/report.json"));
    assert_eq!(report["modules"][0]["name"], "base");
    assert_eq!(report["modules"].as_array().map(Vec::len), Some(1));
}

#[test]
fn test_missing_schema_exits_1() {
    let temp = create_workspace();
    fs::remove_file(temp.path().join("db/schema.toml")).unwrap();

    update(&temp)
        .args(["-i", "base"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("schema.toml"));
}

#[test]
fn test_unknown_format_is_rejected() {
    let temp = create_workspace();

    modsync()
        .current_dir(temp.path())
        .args(["order", "--format", "yaml"])
        .assert()
        .failure();
}
