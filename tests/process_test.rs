/*!
 * Process Manager Tests
 * Spawn, exit bookkeeping, launch parameters and host notifications
 */

mod common;

use common::{plan, Harness, Notice};
use jobctl_kernel::backend::{BackendError, LoadProgress, Presentation, UnitMessage};
use jobctl_kernel::core::errno::Errno;
use jobctl_kernel::core::limits::{EXIT_CODE_NO_EXEC, INIT_PID};
use jobctl_kernel::manifest::ProgramKind;
use jobctl_kernel::process::{ProcessSnapshot, WaitOptions, WaitStatus};
use jobctl_kernel::SpawnError;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[test]
fn test_root_spawn_founds_group_and_session() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");

    assert_eq!(h.manager.getpgid(Some(a), None), Ok(a));
    assert_eq!(h.manager.getsid(Some(a), None), Ok(a));
    assert_eq!(
        h.manager.process(a),
        Some(ProcessSnapshot {
            pid: a,
            ppid: INIT_PID,
            pgid: a,
            exit_code: None,
            command: "sh".to_string(),
        })
    );
}

#[test]
fn test_child_inherits_group() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let b = h.spawn_child(a, "ls");

    assert_eq!(h.manager.getpgid(Some(b), None), h.manager.getpgid(Some(a), None));
    assert_eq!(h.manager.getsid(Some(b), None), Ok(a));
    assert_eq!(h.manager.process(b).map(|p| p.ppid), Some(a));

    let groups = h.manager.groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].members, vec![a, b]);
}

#[test]
fn test_pids_start_after_reserved_ids() {
    let mut h = Harness::new();
    assert_eq!(h.spawn_root("sh"), 2);
    assert_eq!(h.spawn_root("sh"), 3);
}

#[test]
fn test_failed_launch_leaves_no_record() {
    let mut h = Harness::new();
    h.backend.fail_next_launch("no sandbox");

    let result = h.manager.spawn(plan("sh", None, &[]));
    assert_eq!(
        result,
        Err(SpawnError::Backend(BackendError::LaunchFailed(
            "no sandbox".to_string()
        )))
    );
    assert_eq!(result.unwrap_err().errno(), Errno::ENOENT);
    assert!(h.manager.processes().is_empty());
    assert!(h.manager.groups().is_empty());
    assert_eq!(h.manager.foreground(), None);

    // The burnt pid is never handed out again
    let next = h.spawn_root("sh");
    assert_eq!(next, 3);
}

#[test]
fn test_disabled_kind_is_rejected_before_allocation() {
    let mut h = Harness::new();
    h.backend.disable(ProgramKind::Native);
    assert!(h.manager.spawn(plan("sh", None, &[])).is_err());
    assert_eq!(h.backend.launched_count(), 0);

    h.backend.enable(ProgramKind::Native);
    assert_eq!(h.spawn_root("sh"), 2);
}

#[test]
fn test_exit_deletes_empty_group() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    h.exit(a, 0);

    assert!(h.manager.groups().is_empty());
    assert_eq!(h.manager.getpgid(Some(a), None), Err(Errno::ESRCH));
    // Unreaped: still in the table with its code
    assert_eq!(h.manager.process(a).and_then(|p| p.exit_code), Some(0));
}

#[test]
fn test_group_survives_while_members_remain() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let b = h.spawn_child(a, "ls");
    h.exit(a, 0);

    let groups = h.manager.groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].pgid, a);
    assert_eq!(groups[0].members, vec![b]);
    assert_eq!(h.manager.getpgid(Some(b), None), Ok(a));
}

#[test]
fn test_exit_is_processed_once() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let handle = h.handle(a);

    assert!(h.manager.handle_exit(handle, 3).unwrap().is_some());
    assert_eq!(h.manager.handle_exit(handle, 9), Ok(None));
    assert_eq!(h.manager.process(a).and_then(|p| p.exit_code), Some(3));
    assert!(h.backend.is_terminated(handle));
}

#[test]
fn test_orphans_are_reparented_to_init() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let b = h.spawn_child(a, "sleep");
    h.exit(b, 4);
    h.exit(a, 0);

    assert_eq!(h.manager.process(b).map(|p| p.ppid), Some(INIT_PID));
    // The host (init) can now reap both
    assert_eq!(
        h.wait_now(b, WaitOptions::empty(), None),
        Ok(WaitStatus { pid: b, status: 4 })
    );
    assert_eq!(
        h.wait_now(a, WaitOptions::empty(), None),
        Ok(WaitStatus { pid: a, status: 0 })
    );
    assert!(h.manager.processes().is_empty());
}

#[test]
fn test_launch_parameters() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let b = h.spawn_with_env(Some(a), "vim", &["EDITOR=vi", "SRC=evil", "junk"]);

    let spec = h.backend.launch_of(b).unwrap();
    assert_eq!(spec.pid, b);
    assert_eq!(spec.ppid, a);
    assert_eq!(spec.param("EDITOR"), Some("vi"));
    assert_eq!(spec.param("SRC"), None);
    assert_eq!(spec.param("PROC_PID"), Some(b.to_string().as_str()));
    assert_eq!(spec.param("PROC_PPID"), Some(a.to_string().as_str()));
    assert_eq!(spec.param("arg0"), Some("vim"));
    assert_eq!(spec.param("PS_TTY_COLS"), Some("80"));
}

#[test]
fn test_resize_applies_to_later_spawns() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    h.manager.resize(jobctl_kernel::core::types::TtySize { cols: 132, rows: 43 });

    let posted = h.backend.posted_to(h.handle(a));
    assert!(matches!(posted.last(), Some(UnitMessage::Resize { size }) if size.cols == 132));

    let b = h.spawn_child(a, "top");
    let spec = h.backend.launch_of(b).unwrap();
    assert_eq!(spec.param("PS_TTY_COLS"), Some("132"));
    assert_eq!(spec.param("PS_TTY_ROWS"), Some("43"));
}

#[test]
fn test_presentation_from_env_hints() {
    let mut h = Harness::new();
    let a = h.spawn_with_env(None, "xterm", &["PROC_SPAWN_MODE=popup", "PROC_POPUP_WIDTH=800"]);
    let b = h.spawn_with_env(Some(a), "view", &["PROC_SPAWN_MODE=embed"]);
    let c = h.spawn_child(a, "ls");

    assert_eq!(
        h.backend.launch_of(a).unwrap().presentation,
        Presentation::Popup {
            width: 800,
            height: 400,
            title: "xterm".to_string()
        }
    );
    assert_eq!(
        h.backend.launch_of(b).unwrap().presentation,
        Presentation::Embedded {
            width: "100%".to_string(),
            height: "50%".to_string()
        }
    );
    assert_eq!(h.backend.launch_of(c).unwrap().presentation, Presentation::Inline);
}

#[test]
fn test_load_error_reports_and_exits_126() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let b = h.spawn_child(a, "broken");
    let handle = h.handle(b);

    let report = h
        .manager
        .handle_load_error(handle, "bad nexe")
        .unwrap()
        .unwrap();
    assert_eq!(report.status, EXIT_CODE_NO_EXEC);
    assert_eq!(
        h.listener.take(),
        vec![Notice::Error {
            command: "broken".to_string(),
            message: "bad nexe".to_string()
        }]
    );
    assert_eq!(
        h.wait_now(b, WaitOptions::empty(), Some(a)),
        Ok(WaitStatus {
            pid: b,
            status: EXIT_CODE_NO_EXEC
        })
    );
}

#[test]
fn test_root_notifications_only_for_roots() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let b = h.spawn_child(a, "ls");
    let progress = LoadProgress {
        url: "sh.nexe".to_string(),
        length_computable: true,
        loaded: 10,
        total: 100,
    };

    let (root, child) = (h.handle(a), h.handle(b));

    h.manager.handle_progress(root, &progress);
    h.manager.handle_progress(child, &progress);
    h.manager.handle_loaded(child);
    h.manager.handle_loaded(root);

    assert_eq!(
        h.listener.take(),
        vec![Notice::RootProgress(10), Notice::RootLoaded]
    );
}

#[test]
fn test_stdout_forwarded_from_live_units_only() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let handle = h.handle(a);

    h.manager.forward_stdout(handle, "$ ");
    h.exit(a, 0);
    h.manager.forward_stdout(handle, "late");

    assert_eq!(h.listener.take(), vec![Notice::Stdout("$ ".to_string())]);
}

#[test]
fn test_replies_to_terminated_units_are_dropped() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let handle = h.handle(a);
    h.exit(a, 0);

    h.manager
        .post_reply(handle, "1".to_string(), serde_json::json!({"pid": 5}));
    assert!(h.backend.posted_to(handle).is_empty());
}

proptest! {
    #[test]
    fn prop_pids_are_unique_and_increasing(ops in proptest::collection::vec(0u8..3, 1..40)) {
        let mut h = Harness::new();
        let mut issued: Vec<i32> = Vec::new();
        let mut live: Vec<i32> = Vec::new();

        for op in ops {
            let pid = match (op, live.last().copied()) {
                (1, Some(parent)) => h.spawn_child(parent, "child"),
                (2, Some(victim)) => {
                    h.exit(victim, 0);
                    live.pop();
                    continue;
                }
                _ => h.spawn_root("root"),
            };
            if let Some(last) = issued.last() {
                prop_assert!(pid > *last);
            }
            issued.push(pid);
            live.push(pid);
        }
    }
}
