/*!
 * Driver Tests
 * JSON lines in, numbered replies and host events out
 */

use jobctl_kernel::api::{serve, Kernel, KernelHandle};
use jobctl_kernel::backend::{HeadlessPresenter, LoopbackBackend};
use jobctl_kernel::ipc::LocalPipeServer;
use jobctl_kernel::manifest::{ManifestResolver, StaticManifestSource};
use jobctl_kernel::process::ProcessManager;
use jobctl_kernel::{HostEvents, KernelConfig};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

const NATIVE: &str = r#"{"program": {"x86-64": {"url": "bin.nexe"}}}"#;

fn start() -> (KernelHandle, HostEvents, JoinHandle<()>) {
    let config = KernelConfig::default();
    let source = StaticManifestSource::new().with("sh.json", NATIVE);
    let resolver = ManifestResolver::from_config(Arc::new(source), &config);
    let (listener, events) = Kernel::listener();
    let manager = ProcessManager::builder(LoopbackBackend::new(), HeadlessPresenter::new())
        .with_listener(listener)
        .with_config(config)
        .build();
    let (kernel, handle) = Kernel::new(manager, resolver, Arc::new(LocalPipeServer::new()));
    (handle, events, kernel.start())
}

/// Serve `input` to completion and return the output lines
async fn run(input: &str) -> Vec<Value> {
    let (handle, events, task) = start();
    let mut output = Vec::new();
    serve(handle, events, input.as_bytes(), &mut output)
        .await
        .unwrap();
    // Serving consumed the only handle, so the loop stops
    task.await.unwrap();

    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn input(lines: &[Value]) -> String {
    lines.iter().map(|line| format!("{}\n", line)).collect()
}

fn replies(lines: &[Value]) -> BTreeMap<u64, Value> {
    lines
        .iter()
        .filter_map(|line| {
            let number = line.get("request")?.as_u64()?;
            Some((number, line.clone()))
        })
        .collect()
}

#[tokio::test]
async fn test_every_request_answered_at_end_of_input() {
    let lines = run("{\"op\":\"snapshot\"}\n{\"op\":\"getpgid\",\"pid\":5}\n").await;

    assert_eq!(lines.len(), 2);
    let replies = replies(&lines);
    assert_eq!(replies[&1]["response"], json!({"processes": [], "groups": []}));
    assert_eq!(replies[&2]["response"], json!({"pgid": -3}));
}

#[tokio::test]
async fn test_async_spawns_answered_before_exit() {
    let lines = run(concat!(
        "{\"op\":\"spawn\",\"argv\":[\"sh\"]}\n",
        "{\"op\":\"spawn\",\"argv\":[\"missing\"]}\n",
        "{\"op\":\"pipe\"}\n",
    ))
    .await;

    let replies = replies(&lines);
    assert_eq!(replies[&1]["response"], json!({"pid": 2}));
    assert_eq!(replies[&2]["response"], json!({"pid": -2}));
    assert_eq!(replies[&3]["response"], json!({"read": 1, "write": 2}));
    // The failed spawn is also reported as a host event
    assert!(lines
        .iter()
        .any(|line| line["event"] == "error" && line["command"] == "missing"));
}

#[tokio::test]
async fn test_satisfied_waits_answered_and_blocked_waits_abandoned() {
    let manifest: Value = serde_json::from_str(NATIVE).unwrap();
    let lines = run(&input(&[
        json!({"op": "spawn", "argv": ["sh"], "manifest": manifest}),
        json!({"op": "spawn", "caller": 2, "argv": ["ls"], "manifest": manifest}),
        json!({"op": "wait", "pid": 2}),
        json!({"op": "wait", "pid": -1}),
        json!({"op": "getpgid", "pid": 3}),
        json!({"event": "crashed", "handle": 1, "status": 9}),
        json!({"op": "wait", "pid": -1, "options": 1}),
    ]))
    .await;

    let replies = replies(&lines);
    assert_eq!(replies[&1]["response"], json!({"pid": 2}));
    assert_eq!(replies[&2]["response"], json!({"pid": 3}));
    assert_eq!(replies[&3]["response"], json!({"pid": 2, "status": 9}));
    assert_eq!(replies[&5]["response"], json!({"pgid": 2}));
    // ls was re-parented to init and is still running
    assert_eq!(replies[&6]["response"], json!({"pid": 0, "status": 0}));
    // The exact wait claimed sh and ls never exits, so this one stays blocked
    assert!(!replies.contains_key(&4));
    assert_eq!(replies.len(), 5);
}

#[tokio::test]
async fn test_malformed_lines_are_skipped_without_numbers() {
    let lines = run(concat!(
        "not json\n",
        "\n",
        "{\"op\":\"fork\"}\n",
        "{\"event\":\"exploded\",\"handle\":1}\n",
        "{\"op\":\"setsid\"}\n",
    ))
    .await;

    assert_eq!(lines, vec![json!({"request": 1, "response": {"sid": -3}})]);
}
