use super::*;
use frames::RpcType;
use serde_json::json;

fn queued(path: &str, ticket: Option<u64>) -> Queued {
    Queued { rpc: Rpc::new(RpcType::Request, path, json!(null)), ticket }
}

fn drain_paths(outbox: &mut Outbox) -> Vec<String> {
    let mut paths = Vec::new();
    while let Some(entry) = outbox.pop() {
        paths.push(entry.rpc.path);
    }
    paths
}

#[test]
fn keeps_fifo_order() {
    let mut outbox = Outbox::new(8, OverflowPolicy::DropOldest);
    for path in ["a", "b", "c"] {
        assert!(matches!(outbox.push(queued(path, None)), Pushed::Accepted));
    }
    assert_eq!(outbox.len(), 3);
    assert_eq!(drain_paths(&mut outbox), vec!["a", "b", "c"]);
    assert!(outbox.is_empty());
}

#[test]
fn drop_oldest_evicts_head() {
    let mut outbox = Outbox::new(2, OverflowPolicy::DropOldest);
    outbox.push(queued("a", Some(1)));
    outbox.push(queued("b", Some(2)));

    let Pushed::Evicted(evicted) = outbox.push(queued("c", Some(3))) else {
        panic!("expected eviction");
    };
    assert_eq!(evicted.rpc.path, "a");
    assert_eq!(evicted.ticket, Some(1));
    assert_eq!(drain_paths(&mut outbox), vec!["b", "c"]);
}

#[test]
fn reject_new_hands_back_newcomer() {
    let mut outbox = Outbox::new(1, OverflowPolicy::RejectNew);
    outbox.push(queued("a", None));

    let Pushed::Rejected(rejected) = outbox.push(queued("b", Some(9))) else {
        panic!("expected rejection");
    };
    assert_eq!(rejected.rpc.path, "b");
    assert_eq!(drain_paths(&mut outbox), vec!["a"]);
}

#[test]
fn zero_capacity_rejects_everything() {
    let mut outbox = Outbox::new(0, OverflowPolicy::DropOldest);
    assert!(matches!(outbox.push(queued("a", None)), Pushed::Rejected(_)));
    assert!(outbox.is_empty());
}

#[test]
fn restore_puts_entry_back_at_head() {
    let mut outbox = Outbox::new(4, OverflowPolicy::DropOldest);
    outbox.push(queued("a", None));
    outbox.push(queued("b", None));

    let head = outbox.pop().expect("head");
    outbox.restore(head);
    assert_eq!(drain_paths(&mut outbox), vec!["a", "b"]);
}
