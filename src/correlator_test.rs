use super::*;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;

fn caller() -> (Waiter, oneshot::Receiver<Result<Value, ClientError>>) {
    let (tx, rx) = oneshot::channel();
    (Waiter::Caller(tx), rx)
}

#[test]
fn allocation_starts_at_zero_and_skips_pending() {
    let mut c = Correlator::new();
    let first = c.allocate().unwrap();
    assert_eq!(first, 0);
    c.insert(first, Waiter::Ignore);

    let second = c.allocate().unwrap();
    assert_eq!(second, 1);
}

#[test]
fn settled_identifier_is_reused() {
    let mut c = Correlator::new();
    let id = c.allocate().unwrap();
    c.insert(id, Waiter::Ignore);
    c.resolve(id, true, json!(null));

    assert_eq!(c.allocate().unwrap(), id);
}

#[test]
fn concurrent_identifiers_are_unique() {
    let mut c = Correlator::new();
    let mut seen = HashSet::new();
    for _ in 0..5_000 {
        let id = c.allocate().unwrap();
        c.insert(id, Waiter::Ignore);
        assert!(seen.insert(id), "id {id} handed out twice");
    }
    assert_eq!(c.len(), 5_000);
}

#[test]
fn allocation_wraps_past_u16_max() {
    let mut c = Correlator::new();
    c.cursor = u16::MAX;
    let id = c.allocate().unwrap();
    c.insert(id, Waiter::Ignore);
    assert_eq!(id, u16::MAX);

    assert_eq!(c.allocate().unwrap(), 0);
}

#[test]
fn full_table_reports_max_request() {
    let mut c = Correlator::new();
    for _ in 0..ID_SPACE {
        let id = c.allocate().unwrap();
        c.insert(id, Waiter::Ignore);
    }
    assert!(matches!(c.allocate(), Err(ClientError::MaxRequest)));

    c.resolve(40_000, true, json!(null));
    assert_eq!(c.allocate().unwrap(), 40_000);
}

#[test]
fn resolve_delivers_success_and_rejection() {
    let mut c = Correlator::new();
    let (ok_waiter, mut ok_rx) = caller();
    let (err_waiter, mut err_rx) = caller();
    c.insert(1, ok_waiter);
    c.insert(2, err_waiter);

    let fine = c.resolve(1, true, json!("fine")).unwrap();
    let nope = c.resolve(2, false, json!("nope")).unwrap();
    assert!(fine.deliver().is_none());
    assert!(nope.deliver().is_none());

    assert_eq!(ok_rx.try_recv().unwrap().unwrap(), json!("fine"));
    let err = err_rx.try_recv().unwrap().unwrap_err();
    assert_eq!(err.rejection(), Some(&json!("nope")));
}

#[test]
fn late_duplicate_response_is_noop() {
    let mut c = Correlator::new();
    c.insert(7, Waiter::Ignore);
    assert!(c.resolve(7, true, json!(1)).is_some());
    assert!(c.resolve(7, true, json!(2)).is_none());
    assert!(c.is_empty());
}

#[test]
fn expire_times_out_due_entries_once() {
    let mut c = Correlator::new();
    let now = Instant::now();
    let (waiter, mut rx) = caller();
    let seq = c.insert(3, waiter);
    c.arm(3, seq, now + Duration::from_millis(10));
    c.arm(3, seq, now + Duration::from_millis(50));

    assert!(c.expire(now).is_empty());
    assert_eq!(c.next_deadline(), Some(now + Duration::from_millis(10)));

    let expired = c.expire(now + Duration::from_millis(10));
    assert_eq!(expired.len(), 1);
    for settled in expired {
        settled.deliver();
    }
    assert!(matches!(rx.try_recv().unwrap(), Err(ClientError::Timeout)));
    assert!(!c.is_pending(3));

    assert!(c.expire(now + Duration::from_millis(60)).is_empty());
    assert_eq!(c.next_deadline(), None);
}

#[test]
fn stale_deadline_does_not_hit_reused_identifier() {
    let mut c = Correlator::new();
    let now = Instant::now();
    let old = c.insert(5, Waiter::Ignore);
    c.arm(5, old, now + Duration::from_millis(10));
    c.resolve(5, true, json!(null));

    let fresh = c.insert(5, Waiter::Ignore);
    c.arm(5, fresh, now + Duration::from_millis(100));

    assert!(c.expire(now + Duration::from_millis(20)).is_empty());
    assert!(c.is_pending(5));
    assert_eq!(c.expire(now + Duration::from_millis(100)).len(), 1);
}

#[test]
fn fail_requires_matching_sequence() {
    let mut c = Correlator::new();
    let seq = c.insert(9, Waiter::Ignore);
    assert!(c.fail(9, seq + 1, ClientError::Dropped).is_none());
    assert!(c.is_pending(9));

    let settled = c.fail(9, seq, ClientError::Dropped).unwrap();
    assert!(matches!(settled.outcome, Err(ClientError::Dropped)));
}

#[test]
fn login_waiter_comes_back_from_deliver() {
    let mut c = Correlator::new();
    c.insert(0, Waiter::Login);
    let settled = c.resolve(0, false, json!("addr-1")).unwrap();
    let back = settled.deliver().expect("login is handled by the session");
    assert!(matches!(back.waiter, Waiter::Login));
}

#[test]
fn forget_login_keeps_other_waiters() {
    let mut c = Correlator::new();
    c.insert(0, Waiter::Login);
    c.insert(1, Waiter::Ignore);

    assert_eq!(c.forget_login(), 1);
    assert!(!c.is_pending(0));
    assert!(c.is_pending(1));
}

#[test]
fn settled_requests_do_not_accumulate_deadlines() {
    let mut c = Correlator::new();
    let now = Instant::now();
    for n in 0..100_000u32 {
        let id = c.allocate().unwrap();
        let seq = c.insert(id, Waiter::Ignore);
        c.arm(id, seq, now + Duration::from_secs(600));
        c.arm(id, seq, now + Duration::from_secs(10));
        assert!(c.resolve(id, true, json!(n)).is_some());
    }
    assert!(c.is_empty());
    assert!(c.deadlines.len() <= 2 * DEADLINE_SLACK, "heap kept {} stale deadlines", c.deadlines.len());
}

#[test]
fn sweep_keeps_deadlines_of_live_entries() {
    let mut c = Correlator::new();
    let now = Instant::now();
    let (waiter, mut rx) = caller();
    let live = c.allocate().unwrap();
    let live_seq = c.insert(live, waiter);
    c.arm(live, live_seq, now + Duration::from_millis(500));

    for _ in 0..1_000 {
        let id = c.allocate().unwrap();
        let seq = c.insert(id, Waiter::Ignore);
        c.arm(id, seq, now + Duration::from_millis(100));
        c.fail(id, seq, ClientError::Dropped);
    }
    assert!(c.deadlines.len() <= 2 * (DEADLINE_SLACK + 2));

    let expired = c.expire(now + Duration::from_millis(500));
    assert_eq!(expired.len(), 1);
    for settled in expired {
        settled.deliver();
    }
    assert!(matches!(rx.try_recv().unwrap(), Err(ClientError::Timeout)));
}
