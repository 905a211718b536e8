use super::*;

fn pool(urls: &[&str]) -> AddressPool {
    AddressPool::new(urls.iter().map(|u| (*u).to_owned()).collect())
}

#[test]
fn first_entry_is_current() {
    let p = pool(&["wss://a", "wss://b"]);
    assert_eq!(p.current(), Some("wss://a"));
}

#[test]
fn empty_pool_has_no_current() {
    assert_eq!(AddressPool::default().current(), None);
}

#[test]
fn migrate_from_primary_keeps_primary_as_fallback() {
    let mut p = pool(&["wss://a", "wss://b"]);
    p.migrate("wss://backup:9000");

    assert_eq!(p.current(), Some("wss://backup:9000"));
    assert_eq!(p.urls(), ["wss://a", "wss://b", "wss://backup:9000"]);
}

#[test]
fn migrate_from_secondary_drops_stale_entry() {
    let mut p = pool(&["wss://a"]);
    p.migrate("wss://b");
    p.migrate("wss://c");

    assert_eq!(p.current(), Some("wss://c"));
    assert_eq!(p.urls(), ["wss://a", "wss://c"]);
}

#[test]
fn migrate_never_duplicates_target() {
    let mut p = pool(&["wss://a", "wss://b"]);
    p.migrate("wss://b");

    assert_eq!(p.current(), Some("wss://b"));
    assert_eq!(p.urls(), ["wss://a", "wss://b"]);
}

#[test]
fn migrate_into_empty_pool() {
    let mut p = AddressPool::default();
    p.migrate("wss://a");
    assert_eq!(p.current(), Some("wss://a"));
    assert_eq!(p.urls(), ["wss://a"]);
}

#[test]
fn select_switches_to_known_entry() {
    let mut p = pool(&["wss://a", "wss://b"]);
    p.select("wss://b");
    assert_eq!(p.current(), Some("wss://b"));
    assert_eq!(p.urls().len(), 2);
}

#[test]
fn select_appends_unknown_entry() {
    let mut p = pool(&["wss://a"]);
    p.select("wss://z");
    assert_eq!(p.current(), Some("wss://z"));
    assert_eq!(p.urls(), ["wss://a", "wss://z"]);
}
