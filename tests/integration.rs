use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn harvest_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("harvest");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[storage]
data_dir = "{}/data"

[collection]
start_year = 2020
end_year = 2021

[decode]
workers = 2
"#,
        root.display()
    );

    let config_path = config_dir.join("harvest.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_harvest(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = harvest_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(["--progress", "off"])
        .args(args)
        .env_remove("HARVEST_DATA_DIR")
        .env_remove("HARVEST_START_YEAR")
        .env_remove("HARVEST_END_YEAR")
        .env_remove("HARVEST_BACKWARD")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run harvest binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
        for (name, body) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

fn store_artifact(root: &Path, window: &str, file: &str, blob: &[u8]) {
    let dir = root.join("data/zip").join(window);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(file), blob).unwrap();
}

const STORY: &str = "{\\rtf1\\ansi Bridge reopens after repairs\\par Le Monde\\par May 12, 2020 Tuesday\\par Dateline: Paris, France, May 12\\par Length: 300 words\\par Body\\par The bridge reopened on Tuesday.\\par Load-Date: May 13, 2020}";

#[test]
fn test_status_empty_tree() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_harvest(&config_path, &["status"]);
    assert!(success, "status failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("2020-01"));
    assert!(stdout.contains("2020-12"));
    assert!(stdout.contains("12 windows: 0 complete, 0 capped forward, 12 need work"));
}

#[test]
fn test_status_json_reflects_artifacts() {
    let (tmp, config_path) = setup_test_env();
    store_artifact(tmp.path(), "2020-05", "1-37.zip", b"z");
    for start in (1..1000).step_by(100) {
        store_artifact(
            tmp.path(),
            "2020-06",
            &format!("{}-{}.zip", start, start + 99),
            b"z",
        );
    }

    let (stdout, stderr, success) = run_harvest(&config_path, &["status", "--json"]);
    assert!(success, "status failed: stderr={}", stderr);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let windows = value.as_array().unwrap();
    assert_eq!(windows.len(), 12);
    assert_eq!(windows[4]["window"], "2020-05");
    assert_eq!(windows[4]["state"], "complete");
    assert_eq!(windows[5]["state"], "capped_forward");
    assert_eq!(windows[5]["forward_artifacts"], 10);
    assert_eq!(windows[6]["state"], "needs_work");
}

#[test]
fn test_process_writes_records() {
    let (tmp, config_path) = setup_test_env();
    store_artifact(
        tmp.path(),
        "2020-05",
        "1-2.zip",
        &zip_of(&[
            ("Bridge_doclist.rtf", "{\\rtf1 list}"),
            ("Bridge_reopens.RTF", STORY),
            ("No_date.RTF", "{\\rtf1 No date\\par Wire\\par \\par Body\\par x}"),
        ]),
    );

    let (stdout, stderr, success) = run_harvest(&config_path, &["process"]);
    assert!(success, "process failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("archives: 1 decoded, 0 unreadable"));
    assert!(stdout.contains("records: 1 written, 0 unchanged, 1 dropped"));

    let record_path = tmp
        .path()
        .join("data/json/2020-05-12/Bridge_reopens.RTF.json");
    let record: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&record_path).unwrap()).unwrap();
    assert_eq!(record["date"], "2020-05-12");
    assert_eq!(record["location"], "Paris");
    assert_eq!(record["country"], "France");
    assert_eq!(record["source"], "Le Monde");
    assert_eq!(record["title"], "Bridge reopens after repairs");
    assert_eq!(record["text"], "The bridge reopened on Tuesday.");
}

#[test]
fn test_process_is_idempotent() {
    let (tmp, config_path) = setup_test_env();
    store_artifact(
        tmp.path(),
        "2020-05",
        "1.zip",
        &zip_of(&[("Bridge_reopens.RTF", STORY)]),
    );

    let (stdout1, _, success1) = run_harvest(&config_path, &["process"]);
    assert!(success1);
    assert!(stdout1.contains("records: 1 written, 0 unchanged"));

    let (stdout2, _, success2) = run_harvest(&config_path, &["process"]);
    assert!(success2);
    assert!(stdout2.contains("records: 0 written, 1 unchanged"));
}

#[test]
fn test_process_survives_broken_archive() {
    let (tmp, config_path) = setup_test_env();
    store_artifact(tmp.path(), "2020-05", "1-100.zip", b"not a zip at all");
    store_artifact(
        tmp.path(),
        "2020-05",
        "101.zip",
        &zip_of(&[("Bridge_reopens.RTF", STORY)]),
    );

    let (stdout, stderr, success) = run_harvest(&config_path, &["process"]);
    assert!(success, "process failed: stderr={}", stderr);
    assert!(stdout.contains("archives: 1 decoded, 1 unreadable"));
}

#[test]
fn test_plan_output() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_harvest(&config_path, &["plan", "--total", "1234", "--backward"]);
    assert!(success);
    assert!(stdout.contains("1-100.zip"));
    assert!(stdout.contains("901-1000.zip"));
    assert!(stdout.contains("B201-234.zip"));
    assert!(stdout.contains("13 chunks, 1234 of 1234 results reachable"));

    let (stdout, _, success) = run_harvest(&config_path, &["plan", "--total", "1500"]);
    assert!(success);
    assert!(stdout.contains("10 chunks, 1000 of 1500 results reachable"));
    assert!(stdout.contains("enable backward extension"));
}

#[test]
fn test_collect_without_fetcher_fails_cleanly() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_harvest(&config_path, &["collect"]);
    assert!(!success, "collect should fail without a fetcher command");
    assert!(stderr.contains("fetcher.command"));
}

#[test]
fn test_invalid_year_range_rejected() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) =
        run_harvest(&config_path, &["collect", "--start", "2022", "--end", "2021"]);
    assert!(!success);
    assert!(stderr.contains("start_year"));
}
