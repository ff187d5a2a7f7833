//! Integration tests driving the fsq binary against a temporary root

use assert_cmd::cargo;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Point the command at the temp root and keep user config out of the way
fn fsq(temp_dir: &TempDir) -> assert_cmd::Command {
    let mut cmd = cargo::cargo_bin_cmd!("fsq");
    cmd.env("HOME", temp_dir.path())
        .env("FSQ_ROOT", temp_dir.path().join("root"))
        .env_remove("FSQ_CONFIG")
        .env_remove("FSQ_LOCK")
        .env_remove("FSQ_TTL")
        .env_remove("FSQ_MAX_TRIES");
    cmd
}

fn setup(queue: &str) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("root")).unwrap();
    fsq(&temp_dir).args(["install", queue]).assert().success();
    temp_dir
}

fn enqueue(temp_dir: &TempDir, queue: &str, payload: &str, args: &[&str]) -> String {
    let output = fsq(temp_dir)
        .arg("enqueue")
        .arg(queue)
        .args(args)
        .write_stdin(payload)
        .output()
        .unwrap();
    assert!(output.status.success(), "enqueue failed: {output:?}");
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

#[test]
fn test_install_creates_queue() {
    let temp_dir = setup("q");
    let base = temp_dir.path().join("root/q");
    for sub in ["tmp", "queue", "done", "fail"] {
        assert!(base.join(sub).is_dir());
    }

    fsq(&temp_dir)
        .args(["install", "q"])
        .assert()
        .code(100)
        .stderr(predicates::str::contains("queue exists"));
}

#[test]
fn test_enqueue_from_stdin() {
    let temp_dir = setup("q");
    let id = enqueue(&temp_dir, "q", "hello", &["alpha", "beta"]);

    assert!(id.starts_with('_'));
    assert!(id.ends_with("_0_alpha_beta"));
    let item = temp_dir.path().join("root/q/queue").join(&id);
    assert_eq!(fs::read_to_string(item).unwrap(), "hello");
}

#[test]
fn test_enqueue_empty_and_file() {
    let temp_dir = setup("q");
    let payload = temp_dir.path().join("payload");
    fs::write(&payload, "from file").unwrap();

    fsq(&temp_dir).args(["enqueue", "-e", "q", "a"]).assert().success();
    fsq(&temp_dir)
        .args(["enqueue", "-f"])
        .arg(&payload)
        .args(["q", "b"])
        .assert()
        .success();

    let queue = temp_dir.path().join("root/q/queue");
    let mut contents: Vec<String> = entries(&queue)
        .iter()
        .map(|id| fs::read_to_string(queue.join(id)).unwrap())
        .collect();
    contents.sort();
    assert_eq!(contents, vec!["", "from file"]);
}

#[test]
fn test_enqueue_into_missing_queue_fails() {
    let temp_dir = setup("q");
    fsq(&temp_dir)
        .args(["enqueue", "-e", "absent"])
        .assert()
        .code(111)
        .stderr(predicates::str::contains("cannot enqueue"));
}

#[test]
fn test_scan_runs_worker_per_item() {
    let temp_dir = setup("q");
    let id = enqueue(&temp_dir, "q", "hello", &["alpha", "beta"]);
    let out = temp_dir.path().join("out");

    fsq(&temp_dir)
        .args(["scan", "q", "sh", "-c", r#"cat > "$0"; echo "$1 $2 $FSQ_ITEM_TRIES $FSQ_ITEM_ID" >> "$0""#])
        .arg(&out)
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(&out).unwrap(),
        format!("helloalpha beta 0 {id}\n")
    );
    assert!(entries(&temp_dir.path().join("root/q/queue")).is_empty());
    assert_eq!(entries(&temp_dir.path().join("root/q/done")), vec![id]);
}

#[test]
fn test_scan_exit_codes_route_items() {
    let temp_dir = setup("q");
    let retry = enqueue(&temp_dir, "q", "", &["111"]);
    let broken = enqueue(&temp_dir, "q", "", &["3"]);

    fsq(&temp_dir)
        .args(["scan", "q", "sh", "-c", r#"exit "$1""#, "worker"])
        .assert()
        .success();

    let queue = entries(&temp_dir.path().join("root/q/queue"));
    assert_eq!(queue.len(), 1);
    assert_ne!(queue[0], retry);
    assert!(queue[0].ends_with("_1_111"));
    assert_eq!(entries(&temp_dir.path().join("root/q/fail")), vec![broken]);
    assert!(entries(&temp_dir.path().join("root/q/done")).is_empty());
}

#[test]
fn test_scan_max_tries_escalates() {
    let temp_dir = setup("q");
    enqueue(&temp_dir, "q", "", &["x"]);

    for _ in 0..2 {
        fsq(&temp_dir)
            .args(["scan", "--max-tries", "2", "q", "sh", "-c", "exit 111"])
            .assert()
            .success();
    }

    assert!(entries(&temp_dir.path().join("root/q/queue")).is_empty());
    assert_eq!(entries(&temp_dir.path().join("root/q/fail")).len(), 1);
}

#[test]
fn test_scan_down_queue() {
    let temp_dir = setup("q");
    enqueue(&temp_dir, "q", "x", &["a"]);
    fsq(&temp_dir).args(["down", "q"]).assert().success();

    fsq(&temp_dir)
        .args(["scan", "q", "true"])
        .assert()
        .code(111)
        .stderr(predicates::str::contains("is down"));
    assert_eq!(entries(&temp_dir.path().join("root/q/queue")).len(), 1);

    fsq(&temp_dir).args(["scan", "--ignore-down", "q", "true"]).assert().success();
    assert_eq!(entries(&temp_dir.path().join("root/q/done")).len(), 1);

    fsq(&temp_dir).args(["up", "q"]).assert().success();
    assert!(!temp_dir.path().join("root/q/down").exists());
}

#[test]
fn test_scan_signaled_worker_fails_item_and_aborts() {
    let temp_dir = setup("q");
    let first = enqueue(&temp_dir, "q", "", &["a"]);
    enqueue(&temp_dir, "q", "", &["b"]);

    fsq(&temp_dir)
        .args(["scan", "q", "sh", "-c", "kill -9 $$"])
        .assert()
        .code(111)
        .stderr(predicates::str::contains("signal 9"));

    assert_eq!(entries(&temp_dir.path().join("root/q/fail")), vec![first]);
    assert_eq!(entries(&temp_dir.path().join("root/q/queue")).len(), 1);
}

#[test]
fn test_list_json() {
    let temp_dir = setup("q");
    let id = enqueue(&temp_dir, "q", "x", &["alpha"]);
    fs::write(temp_dir.path().join("root/q/queue/_junk"), "").unwrap();

    let output = fsq(&temp_dir).args(["list", "--json", "q"]).output().unwrap();
    assert!(output.status.success());
    let listed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);

    let good = listed.iter().find(|v| v["id"] == id.as_str()).unwrap();
    assert_eq!(good["tries"], 0);
    assert_eq!(good["arguments"], serde_json::json!(["alpha"]));
    let junk = listed.iter().find(|v| v["id"] == "_junk").unwrap();
    assert!(junk["error"].is_string());
}

#[test]
fn test_queues_and_hosts() {
    let temp_dir = setup("q");
    fsq(&temp_dir).args(["install", "other"]).assert().success();
    fsq(&temp_dir)
        .args(["install", "--host", "h1", "--host", "h2", "q"])
        .assert()
        .success();

    fsq(&temp_dir)
        .arg("queues")
        .assert()
        .success()
        .stdout("other\nq\n");
    fsq(&temp_dir)
        .args(["hosts", "q"])
        .assert()
        .success()
        .stdout("h1\nh2\n");

    fsq(&temp_dir)
        .args(["uninstall", "--host", "h1", "q"])
        .assert()
        .success();
    fsq(&temp_dir).args(["hosts", "q"]).assert().success().stdout("h2\n");
}

#[test]
fn test_host_dist() {
    let temp_dir = setup("q");
    fsq(&temp_dir)
        .args(["install", "--host", "h1", "--host", "h2", "q"])
        .assert()
        .success();
    let id = enqueue(&temp_dir, "q", "payload", &["a"]);

    fsq(&temp_dir).args(["host-dist", "--link", "q"]).assert().success();

    let root = temp_dir.path().join("root/q");
    assert_eq!(entries(&root.join("done")), vec![id.clone()]);
    for host in ["h1", "h2"] {
        let queue = root.join("hosts").join(host).join("queue");
        assert_eq!(entries(&queue), vec![id.clone()]);
        assert_eq!(fs::read_to_string(queue.join(&id)).unwrap(), "payload");
    }

    fsq(&temp_dir)
        .args(["scan", "--host", "h2", "q", "true"])
        .assert()
        .success();
    assert_eq!(entries(&root.join("hosts/h2/done")), vec![id]);
}

#[test]
fn test_host_dist_failure_retries_then_fails_item() {
    let temp_dir = setup("q");
    fsq(&temp_dir)
        .args(["install", "--host", "h1", "--host", "h2", "q"])
        .assert()
        .success();
    let root = temp_dir.path().join("root/q");
    fs::remove_dir(root.join("hosts/h2/tmp")).unwrap();
    enqueue(&temp_dir, "q", "payload", &["a"]);

    for _ in 0..4 {
        fsq(&temp_dir)
            .args(["host-dist", "--max-tries", "2", "q"])
            .assert()
            .success();
    }

    assert!(entries(&root.join("queue")).is_empty());
    assert!(entries(&root.join("done")).is_empty());
    let failed = entries(&root.join("fail"));
    assert_eq!(failed.len(), 1);
    assert!(failed[0].ends_with("_1_a"));
    // one copy per attempt, not one per run
    assert_eq!(entries(&root.join("hosts/h1/queue")).len(), 2);
}

#[test]
fn test_host_dist_unknown_host_aborts() {
    let temp_dir = setup("q");
    fsq(&temp_dir).args(["install", "--host", "h1", "q"]).assert().success();
    let id = enqueue(&temp_dir, "q", "payload", &["a"]);

    fsq(&temp_dir)
        .args(["host-dist", "q", "nope"])
        .assert()
        .code(111);
    assert_eq!(entries(&temp_dir.path().join("root/q/queue")), vec![id]);
}

#[test]
fn test_trigger_pull() {
    let temp_dir = setup("q");
    fsq(&temp_dir).args(["trigger", "q"]).assert().success();

    fsq(&temp_dir)
        .args(["pull", "--ignore-listener", "q"])
        .assert()
        .success();
    fsq(&temp_dir)
        .args(["pull", "q"])
        .assert()
        .code(111)
        .stderr(predicates::str::contains("no listener"));

    fsq(&temp_dir).args(["untrigger", "q"]).assert().success();
    assert!(!temp_dir.path().join("root/q/trigger").exists());
}

#[test]
fn test_bad_usage_exits_fail_perm() {
    let temp_dir = TempDir::new().unwrap();
    fsq(&temp_dir).args(["enqueue"]).assert().code(100);
    fsq(&temp_dir).args(["install", "../escape"]).assert().code(100);
}
