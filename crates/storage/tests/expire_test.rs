use std::path::PathBuf;
use std::thread;
use std::time::{Duration, SystemTime};

use tempfile::{TempDir, tempdir};

use rivet_storage::{Registry, Rivet, Ttl};

/// Tolerância de agendamento nas comparações de TTL.
const EPS: Duration = Duration::from_millis(50);

fn durations_equal(a: Duration, b: Duration) -> bool {
    let diff = if a > b { a - b } else { b - a };
    diff <= EPS
}

fn remaining(ttl: Ttl) -> Duration {
    ttl.remaining()
        .unwrap_or_else(|| panic!("esperado TTL restante, obtido {ttl:?}"))
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("test_db.redb")
}

fn past(d: Duration) -> SystemTime {
    SystemTime::now() - d
}

#[test]
fn test_ttl() {
    let dir = tempdir().unwrap();
    let registry = Registry::new();
    let db = Rivet::open_default(&registry, db_path(&dir)).unwrap();

    db.set("foo", "bar").unwrap();
    assert!(db.expire("foo", Duration::from_secs(2)).unwrap());
    assert!(durations_equal(
        remaining(db.ttl("foo").unwrap()),
        Duration::from_secs(2)
    ));
    assert!(db.expire_at("foo", past(Duration::from_secs(5))).unwrap());
    assert_eq!(db.ttl("foo").unwrap(), Ttl::KeyNotFound);

    db.set("no expiration", "bar").unwrap();
    assert_eq!(db.ttl("no expiration").unwrap(), Ttl::NoExpiration);

    assert_eq!(db.ttl("no such key").unwrap(), Ttl::KeyNotFound);
    assert!(!db.expire("no such key", Duration::from_secs(2)).unwrap());
    assert_eq!(db.ttl("no such key").unwrap(), Ttl::KeyNotFound);
}

#[test]
fn test_ttl_sentinel_values() {
    let dir = tempdir().unwrap();
    let registry = Registry::new();
    let db = Rivet::open_default(&registry, db_path(&dir)).unwrap();

    db.set("plain", "v").unwrap();
    assert_eq!(db.ttl("plain").unwrap().as_millis(), -1);
    assert_eq!(db.ttl("missing").unwrap().as_millis(), -2);
}

#[test]
fn test_ttl_decreases_until_expired() {
    let dir = tempdir().unwrap();
    let registry = Registry::new();
    let db = Rivet::open_default(&registry, db_path(&dir)).unwrap();

    db.set("foo", "bar").unwrap();
    db.expire("foo", Duration::from_millis(300)).unwrap();
    let first = remaining(db.ttl("foo").unwrap());
    assert!(durations_equal(first, Duration::from_millis(300)));

    thread::sleep(Duration::from_millis(100));
    let second = remaining(db.ttl("foo").unwrap());
    assert!(second < first);

    thread::sleep(Duration::from_millis(250));
    assert_eq!(db.ttl("foo").unwrap(), Ttl::KeyNotFound);
    assert_eq!(db.get("foo").unwrap(), None);
    assert!(!db.exists("foo").unwrap());
    assert!(db.keys().unwrap().is_empty());
}

#[test]
fn test_plain_write_clears_ttl() {
    let dir = tempdir().unwrap();
    let registry = Registry::new();
    let db = Rivet::open_default(&registry, db_path(&dir)).unwrap();

    db.set("foo", "bar").unwrap();
    db.expire("foo", Duration::from_secs(1)).unwrap();
    assert!(durations_equal(
        remaining(db.ttl("foo").unwrap()),
        Duration::from_secs(1)
    ));

    db.set("foo", "bar").unwrap();
    assert_eq!(db.ttl("foo").unwrap(), Ttl::NoExpiration);
    assert!(db.expirations().unwrap().is_empty());
}

#[test]
fn test_negative_expire_removes_key() {
    let dir = tempdir().unwrap();
    let registry = Registry::new();
    let db = Rivet::open_default(&registry, db_path(&dir)).unwrap();

    db.set("a", "1").unwrap();
    db.set("b", "2").unwrap();
    db.expire_at("a", past(Duration::from_secs(1))).unwrap();

    assert_eq!(db.ttl("a").unwrap(), Ttl::KeyNotFound);
    assert_eq!(db.keys().unwrap(), vec!["b"]);
}

#[test]
fn test_expire_core() {
    let dir = tempdir().unwrap();
    let registry = Registry::new();
    let db1 = Rivet::open_default(&registry, db_path(&dir)).unwrap();
    let db2 = Rivet::open(&registry, db_path(&dir), "bucket").unwrap();

    db1.set("foo", "bar").unwrap();
    db2.set("baz", "bar").unwrap();
    db1.expire("foo", Duration::from_millis(100)).unwrap();
    db2.expire("baz", Duration::from_millis(300)).unwrap();
    assert_eq!(db1.keys().unwrap().len(), 1);
    assert_eq!(db2.keys().unwrap().len(), 1);

    thread::sleep(Duration::from_millis(150));
    assert_eq!(db1.keys().unwrap().len(), 0);
    assert_eq!(db2.keys().unwrap().len(), 1);

    thread::sleep(Duration::from_millis(200));
    assert_eq!(db1.keys().unwrap().len(), 0);
    assert_eq!(db2.keys().unwrap().len(), 0);

    db1.set("foo", "bar").unwrap();
    db1.expire("foo", Duration::from_secs(1)).unwrap();
    assert!(durations_equal(
        remaining(db1.ttl("foo").unwrap()),
        Duration::from_secs(1)
    ));
    db1.set("foo", "bar").unwrap();
    assert_eq!(db1.ttl("foo").unwrap(), Ttl::NoExpiration);
}

#[test]
fn test_same_key_in_two_buckets() {
    let dir = tempdir().unwrap();
    let registry = Registry::new();
    let db1 = Rivet::open_default(&registry, db_path(&dir)).unwrap();
    let db2 = db1.bucket("other").unwrap();

    db1.set("k", "1").unwrap();
    db2.set("k", "2").unwrap();
    db1.expire_at("k", past(Duration::from_secs(1))).unwrap();

    assert_eq!(db1.get("k").unwrap(), None);
    assert_eq!(db2.get("k").unwrap().as_deref(), Some("2"));
    assert_eq!(db2.ttl("k").unwrap(), Ttl::NoExpiration);
}

#[test]
fn test_keys_drops_expired_big() {
    let dir = tempdir().unwrap();
    let registry = Registry::new();
    let db = Rivet::open_default(&registry, db_path(&dir)).unwrap();

    for i in 0..1000 {
        let s = i.to_string();
        db.set_x_at(&s, &s, past(Duration::from_secs(1))).unwrap();
    }
    db.set_x("300", "yay", Duration::from_secs(500)).unwrap();

    assert_eq!(db.keys().unwrap(), vec!["300"]);
    // A enumeração também limpou os registros vencidos
    let entries = db.expirations().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key.as_ref(), b"300");
}

#[test]
fn test_keys_skip_expired_in_byte_order() {
    let dir = tempdir().unwrap();
    let registry = Registry::new();
    let db = Rivet::open_default(&registry, db_path(&dir)).unwrap();

    db.set("d", "4").unwrap();
    db.set_x("b", "2", Duration::from_secs(60)).unwrap();
    db.set_x_at("c", "3", past(Duration::from_millis(1))).unwrap();
    db.set("a", "1").unwrap();

    assert_eq!(db.keys().unwrap(), vec!["a", "b", "d"]);
}

#[test]
fn test_expired_then_rewritten() {
    let dir = tempdir().unwrap();
    let registry = Registry::new();
    let db = Rivet::open_default(&registry, db_path(&dir)).unwrap();

    db.set_x("foo", "bar", Duration::from_millis(200)).unwrap();
    thread::sleep(Duration::from_millis(250));
    assert_eq!(db.ttl("foo").unwrap(), Ttl::KeyNotFound);

    db.set("foo", "bar").unwrap();
    assert_eq!(db.ttl("foo").unwrap(), Ttl::NoExpiration);
    assert_eq!(db.get("foo").unwrap().as_deref(), Some("bar"));
}

#[test]
fn test_persist() {
    let dir = tempdir().unwrap();
    let registry = Registry::new();
    let db = Rivet::open_default(&registry, db_path(&dir)).unwrap();

    db.set_x("foo", "bar", Duration::from_secs(10)).unwrap();
    assert!(db.persist("foo").unwrap());
    assert_eq!(db.ttl("foo").unwrap(), Ttl::NoExpiration);
    assert!(!db.persist("foo").unwrap());
    assert!(!db.persist("missing").unwrap());

    db.set_x_at("old", "v", past(Duration::from_secs(1))).unwrap();
    assert!(!db.persist("old").unwrap());
    assert_eq!(db.get("old").unwrap(), None);
}

#[test]
fn test_expire_on_due_key_does_not_revive() {
    let dir = tempdir().unwrap();
    let registry = Registry::new();
    let db = Rivet::open_default(&registry, db_path(&dir)).unwrap();

    db.set_x_at("k", "stale", past(Duration::from_secs(1))).unwrap();
    assert!(!db.expire("k", Duration::from_secs(60)).unwrap());
    assert_eq!(db.ttl("k").unwrap(), Ttl::KeyNotFound);
    assert_eq!(db.get("k").unwrap(), None);
    assert!(db.expirations().unwrap().is_empty());

    db.set_x_at("k2", "stale", past(Duration::from_secs(1))).unwrap();
    assert!(!db.expire_at("k2", SystemTime::now() + Duration::from_secs(60)).unwrap());
    assert!(!db.exists("k2").unwrap());
}

#[test]
fn test_persist_on_due_key_does_not_revive() {
    let dir = tempdir().unwrap();
    let registry = Registry::new();
    let db = Rivet::open_default(&registry, db_path(&dir)).unwrap();

    db.set_x_at("k", "stale", past(Duration::from_secs(1))).unwrap();
    assert!(!db.persist("k").unwrap());
    assert_eq!(db.ttl("k").unwrap(), Ttl::KeyNotFound);
    assert!(db.keys().unwrap().is_empty());
    assert!(db.expirations().unwrap().is_empty());
}

#[test]
fn test_ttl_survives_restart() {
    let dir = tempdir().unwrap();
    let path = db_path(&dir);

    {
        let registry = Registry::new();
        let db = Rivet::open_default(&registry, &path).unwrap();
        db.set_x("session", "token", Duration::from_secs(60)).unwrap();
        db.set_x_at("stale", "v", past(Duration::from_secs(1))).unwrap();
        db.close();
        assert_eq!(registry.open_count(), 0);
    }

    let registry = Registry::new();
    let db = Rivet::open_default(&registry, &path).unwrap();
    assert!(durations_equal(
        remaining(db.ttl("session").unwrap()),
        Duration::from_secs(60)
    ));
    assert_eq!(db.get("stale").unwrap(), None);
    assert_eq!(db.keys().unwrap(), vec!["session"]);
}

#[test]
fn test_concurrent_handles() {
    let dir = tempdir().unwrap();
    let registry = Registry::new();
    let path = db_path(&dir);
    let db = Rivet::open_default(&registry, &path).unwrap();

    thread::scope(|s| {
        for t in 0..4 {
            let registry = registry.clone();
            let path = path.clone();
            s.spawn(move || {
                let view = Rivet::open_default(&registry, &path).unwrap();
                for i in 0..50 {
                    let key = format!("t{t}:{i}");
                    if i % 2 == 0 {
                        view.set_x_at(&key, "v", past(Duration::from_secs(1))).unwrap();
                        assert_eq!(view.get(&key).unwrap(), None);
                    } else {
                        view.set_x(&key, "v", Duration::from_secs(60)).unwrap();
                        assert!(view.ttl(&key).unwrap().remaining().is_some());
                    }
                }
            });
        }
    });

    assert_eq!(registry.ref_count(&path), 1);
    assert_eq!(db.keys().unwrap().len(), 4 * 25);
}

#[test]
fn test_close_and_reopen_across_threads() {
    let dir = tempdir().unwrap();
    let registry = Registry::new();
    let path = db_path(&dir);

    for round in 0..50 {
        thread::scope(|s| {
            for t in 0..2 {
                let registry = &registry;
                let path = &path;
                s.spawn(move || {
                    for i in 0..10 {
                        // Cada iteração abre e solta o único handle da thread
                        let db = Rivet::open_default(registry, path).unwrap();
                        db.set(format!("r{round}:t{t}:{i}"), "v").unwrap();
                    }
                });
            }
        });
    }

    assert_eq!(registry.open_count(), 0);
    let db = Rivet::open_default(&registry, &path).unwrap();
    assert_eq!(db.keys().unwrap().len(), 50 * 2 * 10);
}
