use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

fn rollcall_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_rollcall"))
}

fn command(args: &[&str], home: &Path) -> Command {
    let mut cmd = Command::new(rollcall_bin());
    cmd.args(args)
        .env("ROLLCALL_HOME", home)
        .env_remove("ROLLCALL_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn run_cli(args: &[&str], home: &Path) -> Output {
    command(args, home)
        .output()
        .expect("failed to execute rollcall CLI")
}

/// Run with `input` piped to stdin, as a scanner decoder would.
fn run_cli_with_input(args: &[&str], home: &Path, input: &str) -> Output {
    let mut child = command(args, home)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn rollcall CLI");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(input.as_bytes())
        .expect("failed to write scanner input");
    child.wait_with_output().expect("failed to wait for rollcall CLI")
}

fn assert_success(output: &Output, what: &str) {
    assert!(
        output.status.success(),
        "{} failed\nstdout:\n{}\nstderr:\n{}",
        what,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn parse_json_output(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json_start = stdout.find(|c| c == '{' || c == '[').unwrap_or_else(|| {
        panic!(
            "no JSON payload found in output\nstdout:\n{}\nstderr:\n{}",
            stdout,
            String::from_utf8_lossy(&output.stderr)
        )
    });
    let mut deserializer = serde_json::Deserializer::from_str(&stdout[json_start..]);
    serde_json::Value::deserialize(&mut deserializer).unwrap_or_else(|err| {
        panic!(
            "failed to parse JSON output: {}\nstdout:\n{}\nstderr:\n{}",
            err,
            stdout,
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

/// One JSON object per scanned line.
fn parse_json_lines(output: &Output) -> Vec<ScanLine> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| line.starts_with('{'))
        .map(|line| {
            serde_json::from_str(line)
                .unwrap_or_else(|err| panic!("bad scan line {:?}: {}", line, err))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ScanLine {
    outcome: String,
    delegate_id: String,
    name: Option<String>,
    day: u8,
    purpose: String,
    tone: String,
    message: String,
    detail: Option<String>,
}

fn import_roster(home: &Path) {
    let csv = home.join("delegates.csv");
    fs::write(
        &csv,
        "id,name,organization\nevt-001,Asha Rao,Acme\nEVT-002,Ben Ode,\n",
    )
    .expect("write roster csv");
    let csv_arg = csv.to_string_lossy().to_string();
    let output = run_cli(&["roster", "import", &csv_arg], home);
    assert_success(&output, "roster import");
}

#[test]
fn test_config_json_reports_home_and_defaults() {
    let home = TempDir::new().expect("create temp dir");
    let output = run_cli(&["config", "--json"], home.path());
    assert_success(&output, "config --json");

    let value = parse_json_output(&output);
    assert_eq!(value["home"], home.path().to_string_lossy().to_string());
    assert_eq!(value["config"]["exists"], false);
    assert_eq!(value["sync_interval_secs"], 30);
    assert!(value["store_url"]
        .as_str()
        .expect("store_url")
        .ends_with("records.sqlite"));
    let users: Vec<String> =
        serde_json::from_value(value["permission_users"].clone()).expect("users");
    assert!(users.contains(&"Food".to_string()));
}

#[test]
fn test_roster_import_then_list_json() {
    let home = TempDir::new().expect("create temp dir");
    import_roster(home.path());

    let output = run_cli(&["roster", "list", "--json"], home.path());
    assert_success(&output, "roster list --json");
    let delegates = parse_json_output(&output);
    let delegates = delegates.as_array().expect("array of delegates");
    assert_eq!(delegates.len(), 2);
    assert_eq!(delegates[0]["id"], "EVT-001");
    assert_eq!(delegates[0]["organization"], "Acme");
    assert_eq!(delegates[1]["name"], "Ben Ode");
}

#[test]
fn test_scan_json_classifies_each_line() {
    let home = TempDir::new().expect("create temp dir");
    import_roster(home.path());

    let output = run_cli_with_input(
        &[
            "scan", "--day", "2", "--purpose", "Lunch", "--user", "Food", "--json",
        ],
        home.path(),
        " evt-001 \nEVT-001\n\nnope\n",
    );
    assert_success(&output, "scan --json");

    let lines = parse_json_lines(&output);
    let outcomes: Vec<&str> = lines.iter().map(|l| l.outcome.as_str()).collect();
    assert_eq!(outcomes, vec!["accepted", "duplicate-local", "invalid"]);

    assert_eq!(lines[0].delegate_id, "EVT-001");
    assert_eq!(lines[0].name.as_deref(), Some("Asha Rao"));
    assert_eq!(lines[0].day, 2);
    assert_eq!(lines[0].purpose, "Lunch");
    assert_eq!(lines[0].tone, "success");

    assert_eq!(lines[1].message, "Duplicate Entry!");
    assert!(lines[1]
        .detail
        .as_deref()
        .unwrap_or_default()
        .starts_with("Already recorded at"));

    assert_eq!(lines[2].delegate_id, "NOPE");
    assert_eq!(lines[2].message, "Invalid ID");
    assert_eq!(lines[2].tone, "error");
}

#[test]
fn test_offline_scan_is_queued_then_synced() {
    let home = TempDir::new().expect("create temp dir");
    import_roster(home.path());
    let scan_args = [
        "scan", "--day", "1", "--purpose", "Lunch", "--user", "Food", "--json",
    ];

    let mut offline_args = scan_args.to_vec();
    offline_args.push("--offline");
    let output = run_cli_with_input(&offline_args, home.path(), "EVT-002\nEVT-002\n");
    assert_success(&output, "scan --offline");
    let lines = parse_json_lines(&output);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].outcome, "queued");
    assert_eq!(lines[0].detail.as_deref(), Some("Will sync when online"));
    assert_eq!(lines[1].outcome, "duplicate-local");
    assert!(lines[1]
        .detail
        .as_deref()
        .unwrap_or_default()
        .starts_with("Already saved offline at"));

    let output = run_cli(&["queue", "--json"], home.path());
    assert_success(&output, "queue --json");
    let queue = parse_json_output(&output);
    assert_eq!(queue["pending"], 1);
    assert_eq!(queue["quarantined"], 0);
    assert_eq!(queue["entries"][0]["delegate_id"], "EVT-002");
    assert_eq!(queue["entries"][0]["day"], 1);

    let output = run_cli(&["sync", "--json"], home.path());
    assert_success(&output, "sync --json");
    let sync = parse_json_output(&output);
    assert_eq!(sync["result"], "synced");
    assert_eq!(sync["status"]["queue_length"], 0);
    assert_eq!(sync["status"]["is_syncing"], false);

    // Back online, the synced scan is a duplicate from the store's records.
    let output = run_cli_with_input(&scan_args, home.path(), "EVT-002\n");
    assert_success(&output, "scan after sync");
    let lines = parse_json_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].outcome, "duplicate-local");
}

#[test]
fn test_sync_with_empty_queue() {
    let home = TempDir::new().expect("create temp dir");
    let output = run_cli(&["sync", "--json"], home.path());
    assert_success(&output, "sync --json");
    let sync = parse_json_output(&output);
    assert_eq!(sync["result"], "empty");
}

#[test]
fn test_scan_rejects_purpose_outside_profile() {
    let home = TempDir::new().expect("create temp dir");
    import_roster(home.path());

    let output = run_cli(
        &[
            "scan", "--day", "1", "--purpose", "Kit", "--user", "Food", "--json",
        ],
        home.path(),
    );
    assert!(
        !output.status.success(),
        "scan unexpectedly succeeded\nstdout:\n{}",
        String::from_utf8_lossy(&output.stdout)
    );
    let error = parse_json_output(&output);
    assert_eq!(error["error"], "Food may not scan 'Kit' on day 1");
    let suggestions: Vec<String> =
        serde_json::from_value(error["suggestions"].clone()).expect("suggestions");
    assert!(suggestions.iter().any(|s| s.contains("Breakfast") || s.contains("Lunch")));
}

#[test]
fn test_config_file_supplies_operator() {
    let home = TempDir::new().expect("create temp dir");
    import_roster(home.path());
    fs::write(home.path().join("config.toml"), "user = \"Seargent\"\n").expect("write config");

    let output = run_cli_with_input(
        &["scan", "--day", "3", "--json"],
        home.path(),
        "EVT-001\n",
    );
    assert_success(&output, "scan with configured operator");
    let lines = parse_json_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].outcome, "accepted");
    assert_eq!(lines[0].purpose, "Attendance");
}
