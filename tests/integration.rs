use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn netref_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("netref");
    path
}

const SECTIONS: &[&str] = &[
    r#"{"rfc_number": 826, "section": "1", "title": "Introduction", "text": "The Address Resolution Protocol (ARP) maps protocol addresses to local network hardware addresses. ARP requests are broadcast on the local network."}"#,
    r#"{"rfc_number": 2328, "section": "1", "title": "Introduction", "text": "OSPF is a link-state routing protocol. OSPF routers flood link state advertisements within an area."}"#,
    r#"{"rfc_number": 2328, "section": "2", "title": "The Link-state Database", "text": "Each OSPF router maintains an identical link-state database describing the autonomous system topology."}"#,
    r#"{"rfc_number": 791, "section": "1", "title": "Overview", "text": "The Internet Protocol (IP) provides datagram delivery between hosts. IP addresses identify network interfaces."}"#,
];

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    fs::write(data_dir.join("sections.jsonl"), SECTIONS.join("\n")).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/netref.sqlite"

[corpus]
path = "{root}/data/sections.jsonl"

[retrieval]
mode = "hybrid"
final_limit = 5

[cache]
enabled = false
"#,
        root = root.display()
    );

    let config_path = config_dir.join("netref.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_netref(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = netref_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run netref binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn init(config_path: &Path) {
    let (stdout, stderr, success) = run_netref(config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success1) = run_netref(&config_path, &["init"]);
    assert!(success1, "First init failed");
    assert!(stdout.contains("initialized"));

    let (_, _, success2) = run_netref(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_index_build_then_verify() {
    let (tmp, config_path) = setup_test_env();
    init(&config_path);

    let (_, _, ok) = run_netref(&config_path, &["index", "verify"]);
    assert!(!ok, "verify should fail before a build");

    let (stdout, stderr, ok) = run_netref(&config_path, &["index", "build"]);
    assert!(ok, "build failed: {}", stderr);
    assert!(stdout.contains("sections:    4"));

    let (stdout, _, ok) = run_netref(&config_path, &["index", "verify"]);
    assert!(ok);
    assert!(stdout.contains("OK"));

    // Changing the corpus invalidates the stored manifest.
    let corpus = tmp.path().join("data/sections.jsonl");
    let mut body = fs::read_to_string(&corpus).unwrap();
    body.push_str(
        "\n{\"rfc_number\": 9293, \"section\": \"1\", \"title\": \"Purpose\", \"text\": \"TCP provides reliable byte streams.\"}",
    );
    fs::write(&corpus, body).unwrap();

    let (stdout, _, ok) = run_netref(&config_path, &["index", "verify"]);
    assert!(!ok);
    assert!(stdout.contains("out of date"));
    assert!(stdout.contains("section_count"));
}

#[test]
fn test_search_ranks_matching_document_first() {
    let (_tmp, config_path) = setup_test_env();
    init(&config_path);

    let (stdout, stderr, ok) = run_netref(&config_path, &["search", "link state database"]);
    assert!(ok, "search failed: {}", stderr);
    let first = stdout.lines().next().unwrap_or("");
    assert!(first.starts_with("1."), "unexpected output: {}", stdout);
    assert!(first.contains("RFC 2328"));

    let (stdout, _, ok) = run_netref(&config_path, &["search", "quantum entanglement"]);
    assert!(ok);
    assert!(stdout.contains("No results."));

    let (_, stderr, ok) = run_netref(&config_path, &["search", "arp", "--mode", "semantic"]);
    assert!(!ok);
    assert!(stderr.contains("unknown ranking mode"));
}

#[test]
fn test_route_and_ask() {
    let (_tmp, config_path) = setup_test_env();
    init(&config_path);

    let (stdout, _, ok) = run_netref(&config_path, &["route", "what is arp"]);
    assert!(ok);
    assert!(stdout.contains("intent:     DEFINE"), "{}", stdout);
    assert!(stdout.contains("target:     826"), "{}", stdout);

    let (stdout, _, ok) = run_netref(
        &config_path,
        &["route", "ospf stuck in exstart", "--vendor", "cisco"],
    );
    assert!(ok);
    assert!(stdout.contains("TROUBLESHOOT"), "{}", stdout);
    assert!(stdout.contains("ospf-neighbor-down"), "{}", stdout);

    let (stdout, _, ok) = run_netref(&config_path, &["ask", "what is arp", "--json"]);
    assert!(ok);
    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(v["answer"]["kind"], "definition");
    assert_eq!(v["answer"]["rfc_number"], 826);
}

#[test]
fn test_concept_lifecycle() {
    let (_tmp, config_path) = setup_test_env();
    init(&config_path);

    let (stdout, stderr, ok) = run_netref(&config_path, &["concept", "compile", "arp", "--save"]);
    assert!(ok, "compile failed: {}", stderr);
    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(v["card"]["definition"]["rfc_number"], 826);
    assert_eq!(v["saved"], true);

    let (stdout, _, ok) = run_netref(&config_path, &["concept", "get", "arp"]);
    assert!(ok);
    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(v["card"]["id"], "concept:arp:v1");
    assert_eq!(v["stale"], false);

    let (stdout, _, ok) = run_netref(&config_path, &["concept", "diff", "arp"]);
    assert!(ok);
    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(v["changed"], serde_json::json!({}));

    let (stdout, _, ok) = run_netref(&config_path, &["concept", "list"]);
    assert!(ok);
    assert!(stdout.contains("arp"));
    assert!(stdout.contains("root: "));

    let (stdout, _, ok) = run_netref(&config_path, &["concept", "tags"]);
    assert!(ok);
    assert!(stdout.contains("addressing"));

    let (stdout, _, ok) = run_netref(&config_path, &["concept", "delete", "arp"]);
    assert!(ok);
    assert!(stdout.contains("Deleted arp."));

    let (_, stderr, ok) = run_netref(&config_path, &["concept", "get", "arp"]);
    assert!(!ok);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_compile_failure_exits_nonzero_with_code() {
    let (_tmp, config_path) = setup_test_env();
    init(&config_path);

    let (_, stderr, ok) = run_netref(&config_path, &["concept", "compile", "xyz123nonexistent"]);
    assert!(!ok);
    assert!(
        stderr.contains("NO_MATCH") || stderr.contains("LOW_CONFIDENCE"),
        "stderr: {}",
        stderr
    );
}

#[test]
fn test_compile_many_reports_every_slug() {
    let (_tmp, config_path) = setup_test_env();
    init(&config_path);

    let (stdout, stderr, ok) = run_netref(
        &config_path,
        &[
            "concept",
            "compile-many",
            "arp",
            "ospf",
            "___bogus___",
            "--save",
            "--progress",
            "json",
        ],
    );
    assert!(!ok, "a failed slug should fail the command");
    assert!(stderr.contains("1 of 3 concepts failed"));
    assert!(stderr.contains("\"event\""), "json progress on stderr: {}", stderr);

    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(v["results"].as_array().unwrap().len(), 3);
    assert_eq!(v["saved_count"], 2);

    let (stdout, _, ok) = run_netref(&config_path, &["stats"]);
    assert!(ok);
    assert!(stdout.contains("Cards:       2"));
    assert!(stdout.contains("Stale:       0"));
}
