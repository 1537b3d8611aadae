use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_fanboardd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn fanboardd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn member_autosave_fires_exactly_once_after_five_net_changes() {
    let workspace = temp_dir("fanboard-autosave5");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "session.start",
        json!({ "contentType": "member", "subKey": "gen11" }),
    );

    let members = [
        "gen11-alya-amanda",
        "gen11-bella-safira",
        "gen11-dina-maharani",
        "gen11-intan-permata",
        "gen11-rara-savitri",
    ];
    for (i, member) in members.iter().enumerate() {
        let result = request_ok(
            &mut stdin,
            &mut reader,
            &format!("move-{i}"),
            "drag.over",
            json!({ "itemId": member, "overTargetId": "tier-s" }),
        );
        if i < 4 {
            assert_eq!(result["autosavedDraftId"], serde_json::Value::Null);
            assert_eq!(result["changeCounter"], (i + 1) as i64);
        } else {
            // Fifth net pool-size change: exactly one autosave, counter reset.
            assert!(result["autosavedDraftId"].as_i64().is_some());
            assert_eq!(result["changeCounter"], 0);
        }
    }

    let autosaves = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "drafts.list",
        json!({ "contentType": "member", "isAutoSave": true }),
    );
    let drafts = autosaves["drafts"].as_array().expect("drafts");
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0]["isAutoSave"], true);
    assert_eq!(drafts[0]["completionPercent"], 83); // 5 of 6 placed
}

#[test]
fn same_size_mutations_do_not_advance_the_counter() {
    let workspace = temp_dir("fanboard-nosize");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "session.start",
        json!({ "contentType": "member", "subKey": "gen11" }),
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "drag.over",
        json!({ "itemId": "gen11-alya-amanda", "overTargetId": "tier-s" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "drag.over",
        json!({ "itemId": "gen11-bella-safira", "overTargetId": "tier-s" }),
    );

    // Reorders inside a bucket and moves between buckets leave pool size
    // unchanged: the counter must not move, even though placements changed.
    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "drag.over",
        json!({ "itemId": "gen11-bella-safira", "overTargetId": "gen11-alya-amanda" }),
    );
    let shuffled = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "drag.over",
        json!({ "itemId": "gen11-alya-amanda", "overTargetId": "tier-b" }),
    );
    assert_eq!(shuffled["changeCounter"], 2);
    assert_eq!(shuffled["autosavedDraftId"], serde_json::Value::Null);
}

#[test]
fn setlist_threshold_is_two_and_caps_at_three_autosaves() {
    let workspace = temp_dir("fanboard-autosave2");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "session.start",
        json!({ "contentType": "setlist", "subKey": "theater-classics" }),
    );

    let songs = [
        "pesta-cahaya",
        "langit-senja",
        "dua-detik",
        "kota-kembang",
        "melodi-pertama",
        "sahabat-panggung",
    ];
    let mut autosave_ids = Vec::new();
    for (i, song) in songs.iter().enumerate() {
        let result = request_ok(
            &mut stdin,
            &mut reader,
            &format!("move-{i}"),
            "drag.over",
            json!({ "itemId": song, "overTargetId": "main-set" }),
        );
        if let Some(id) = result["autosavedDraftId"].as_i64() {
            autosave_ids.push(id);
        }
    }
    // Six placements at threshold 2: an autosave after every second one.
    assert_eq!(autosave_ids.len(), 3);

    // Two more placements from a fresh return cycle push a fourth autosave,
    // and the namespace keeps only the newest three.
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "item.returnToPool",
        json!({ "itemId": "pesta-cahaya" }),
    );
    let fourth = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "item.returnToPool",
        json!({ "itemId": "langit-senja" }),
    );
    let fourth_id = fourth["autosavedDraftId"].as_i64().expect("autosave");

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "drafts.list",
        json!({ "contentType": "setlist", "isAutoSave": true }),
    );
    let ids: Vec<i64> = listed["drafts"]
        .as_array()
        .expect("drafts")
        .iter()
        .map(|d| d["id"].as_i64().expect("id"))
        .collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], fourth_id);
    assert!(!ids.contains(&autosave_ids[0]));
}
