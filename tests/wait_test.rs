/*!
 * Wait Tests
 * waitpid resolution: immediate reaping, queued waits and exit matching
 */

mod common;

use common::{ready, Harness};
use jobctl_kernel::core::errno::Errno;
use jobctl_kernel::process::{WaitOptions, WaitStatus};
use pretty_assertions::assert_eq;

const BLOCK: WaitOptions = WaitOptions::empty();
const WNOHANG: WaitOptions = WaitOptions::WNOHANG;

#[test]
fn test_wait_reaps_exited_child_once() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let b = h.spawn_child(a, "false");
    h.exit(b, 7);

    assert_eq!(h.wait_now(b, BLOCK, Some(a)), Ok(WaitStatus { pid: b, status: 7 }));
    assert_eq!(h.wait_now(b, BLOCK, Some(a)), Err(Errno::ECHILD));
    assert_eq!(h.manager.process(b), None);
}

#[test]
fn test_wnohang_then_blocking_any_child() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let b = h.spawn_child(a, "b");
    let c = h.spawn_child(a, "c");
    let before = h.manager.processes();

    assert_eq!(h.wait_now(-1, WNOHANG, Some(a)), Ok(WaitStatus::NOT_READY));
    assert_eq!(h.manager.processes(), before);
    assert_eq!(h.manager.pending_waits(), 0);

    h.exit(b, 3);
    assert_eq!(h.wait_now(-1, BLOCK, Some(a)), Ok(WaitStatus { pid: b, status: 3 }));

    // C is still running, so the next wait queues
    let mut rx = h.wait(-1, BLOCK, Some(a));
    assert_eq!(ready(&mut rx), None);
    h.exit(c, 0);
    assert_eq!(ready(&mut rx), Some(Ok(WaitStatus { pid: c, status: 0 })));
}

#[test]
fn test_queued_wait_reaps_on_exit() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let b = h.spawn_child(a, "sleep");

    let mut rx = h.wait(b, BLOCK, Some(a));
    assert_eq!(ready(&mut rx), None);
    assert_eq!(h.manager.pending_waits(), 1);

    let report = h.exit(b, 9).unwrap();
    assert_eq!(report.reaped, 1);
    assert_eq!(ready(&mut rx), Some(Ok(WaitStatus { pid: b, status: 9 })));
    assert_eq!(h.manager.process(b), None);
    assert_eq!(h.manager.pending_waits(), 0);
}

#[test]
fn test_wait_for_non_child_fails() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let b = h.spawn_child(a, "b");
    let c = h.spawn_child(b, "c");

    assert_eq!(h.wait_now(c, BLOCK, Some(a)), Err(Errno::ECHILD));
    assert_eq!(h.wait_now(99, BLOCK, Some(a)), Err(Errno::ECHILD));
}

#[test]
fn test_wait_zero_from_init_fails() {
    let mut h = Harness::new();
    h.spawn_root("sh");
    assert_eq!(h.wait_now(0, BLOCK, None), Err(Errno::ECHILD));
}

#[test]
fn test_wait_zero_means_callers_group() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let b = h.spawn_child(a, "job");
    let c = h.spawn_child(a, "other");
    h.manager.setpgid(Some(c), Some(c), Some(a)).unwrap();

    // C left A's group: an exit of C does not satisfy wait(0)
    let mut rx = h.wait(0, BLOCK, Some(a));
    h.exit(c, 1);
    assert_eq!(ready(&mut rx), None);

    h.exit(b, 2);
    assert_eq!(ready(&mut rx), Some(Ok(WaitStatus { pid: b, status: 2 })));
    // C stays a zombie for a later wait
    assert_eq!(h.wait_now(c, BLOCK, Some(a)), Ok(WaitStatus { pid: c, status: 1 }));
}

#[test]
fn test_wait_on_explicit_group() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let b = h.spawn_child(a, "b");
    let c = h.spawn_child(a, "c");
    h.manager.setpgid(Some(c), None, Some(a)).unwrap();

    h.exit(b, 5);
    assert_eq!(h.wait_now(-c, WNOHANG, Some(a)), Ok(WaitStatus::NOT_READY));
    h.exit(c, 6);
    assert_eq!(h.wait_now(-c, BLOCK, Some(a)), Ok(WaitStatus { pid: c, status: 6 }));
    assert_eq!(h.wait_now(-a, BLOCK, Some(a)), Ok(WaitStatus { pid: b, status: 5 }));
}

#[test]
fn test_only_parent_waits_are_satisfied() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let b = h.spawn_child(a, "b");
    let c = h.spawn_child(b, "c");

    // A waits on any child; C is B's child, not A's
    let mut rx = h.wait(-1, BLOCK, Some(a));
    let report = h.exit(c, 0).unwrap();
    assert_eq!(report.reaped, 0);
    assert_eq!(ready(&mut rx), None);
    assert_eq!(h.manager.process(c).and_then(|p| p.exit_code), Some(0));
}

#[test]
fn test_exact_pid_waiter_wins_over_any() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let b = h.spawn_child(a, "b");

    let mut any = h.wait(-1, BLOCK, Some(a));
    let mut exact = h.wait(b, BLOCK, Some(a));
    let report = h.exit(b, 4).unwrap();

    // Every matching waiter of the parent is answered, exact key first
    assert_eq!(report.reaped, 2);
    assert_eq!(ready(&mut exact), Some(Ok(WaitStatus { pid: b, status: 4 })));
    assert_eq!(ready(&mut any), Some(Ok(WaitStatus { pid: b, status: 4 })));
}

#[test]
fn test_waits_of_exiting_process_are_discarded() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let b = h.spawn_child(a, "b");
    h.spawn_child(b, "c");

    let mut rx = h.wait(-1, BLOCK, Some(b));
    assert_eq!(h.manager.pending_waits(), 1);
    h.exit(b, 0);
    assert_eq!(h.manager.pending_waits(), 0);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_host_waits_survive_exits() {
    let mut h = Harness::new();
    let a = h.spawn_root("sh");
    let b = h.spawn_root("sh");

    let mut rx = h.wait(b, BLOCK, None);
    h.exit(a, 0);
    assert_eq!(h.manager.pending_waits(), 1);
    h.exit(b, 2);
    assert_eq!(ready(&mut rx), Some(Ok(WaitStatus { pid: b, status: 2 })));
}

#[test]
fn test_error_encoding_on_the_wire() {
    assert_eq!(
        WaitStatus::encode(&Err(Errno::ECHILD)),
        WaitStatus { pid: -10, status: 0 }
    );
    assert_eq!(
        WaitStatus::encode(&Ok(WaitStatus { pid: 4, status: 1 })),
        WaitStatus { pid: 4, status: 1 }
    );
}
