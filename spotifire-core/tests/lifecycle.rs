//! Object lifecycle tests: registry canonicalization, exactly-once release,
//! teardown and process exit.
//!
//! Tests cover:
//! - Three lookups of one handle sharing one shared object
//! - Concurrent get and concurrent dispose
//! - Serialized native calls across threads
//! - Session teardown with live facades, with and without process exit

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use parking_lot::Mutex;
use spotifire_core::{CoreError, NativeGate, NativeHandle, ObjectKind, Session, SessionConfig, SessionRef};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("spotifire_core=debug")
        .try_init();
}

/// Fake library kind that counts references per handle and checks that no two
/// native calls ever overlap.
#[derive(Default)]
struct Tracked {
    refs: Mutex<HashMap<usize, i64>>,
    add_refs: AtomicUsize,
    releases: AtomicUsize,
    inside: AtomicBool,
    overlaps: AtomicUsize,
}

impl Tracked {
    fn enter(&self) {
        if self.inside.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        thread::yield_now();
    }

    fn leave(&self) {
        self.inside.store(false, Ordering::SeqCst);
    }

    fn native_refs(&self, raw: usize) -> i64 {
        self.refs.lock().get(&raw).copied().unwrap_or(0)
    }
}

impl ObjectKind for Tracked {
    type State = ();
    const NAME: &'static str = "tracked";

    fn add_ref(&self, handle: NativeHandle) {
        self.enter();
        *self.refs.lock().entry(handle.as_raw()).or_default() += 1;
        self.add_refs.fetch_add(1, Ordering::SeqCst);
        self.leave();
    }

    fn release(&self, handle: NativeHandle) {
        self.enter();
        *self.refs.lock().entry(handle.as_raw()).or_default() -= 1;
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.leave();
    }

    fn attach(&self, _handle: NativeHandle, _session: &SessionRef) {}
}

fn session() -> Session {
    init_tracing();
    Session::with_gate(SessionConfig::default(), Arc::new(NativeGate::new())).unwrap()
}

#[test]
fn three_lookups_share_one_object() {
    let session = session();
    let registry = session.registry(Tracked::default);

    let f1 = registry.get(0xAA).unwrap();
    let f2 = registry.get(0xAA).unwrap();
    let f3 = registry.get(0xAA).unwrap();
    assert_eq!(f1, f2);
    assert_eq!(f2, f3);
    assert_eq!(registry.ref_count(0xAA), 3);
    assert_eq!(registry.kind().add_refs.load(Ordering::SeqCst), 1);

    f1.dispose();
    f2.dispose();
    assert_eq!(registry.kind().releases.load(Ordering::SeqCst), 0);
    assert!(f3.is_alive());

    f3.dispose();
    assert_eq!(registry.kind().releases.load(Ordering::SeqCst), 1);
    assert_eq!(registry.kind().native_refs(0xAA), 0);
    assert!(registry.is_empty());
}

#[test]
fn reacquire_after_release_creates_fresh_object() {
    let session = session();
    let registry = session.registry(Tracked::default);

    drop(registry.get(0x1).unwrap());
    let again = registry.get(0x1).unwrap();
    assert!(again.is_alive());
    assert_eq!(registry.kind().add_refs.load(Ordering::SeqCst), 2);
    assert_eq!(registry.kind().releases.load(Ordering::SeqCst), 1);
    assert_eq!(registry.kind().native_refs(0x1), 1);
}

#[test]
fn concurrent_get_constructs_once() {
    let session = session();
    let registry = session.registry(Tracked::default);
    let threads = 16;
    let barrier = Barrier::new(threads);

    let facades: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    registry.get(0xBEEF).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(registry.kind().add_refs.load(Ordering::SeqCst), 1);
    assert_eq!(registry.ref_count(0xBEEF), threads);
    assert!(facades.windows(2).all(|pair| pair[0] == pair[1]));

    drop(facades);
    assert_eq!(registry.kind().releases.load(Ordering::SeqCst), 1);
    assert_eq!(registry.kind().overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn concurrent_dispose_releases_once() {
    let session = session();
    let registry = session.registry(Tracked::default);

    for raw in 1..=50usize {
        let facade = registry.get(raw).unwrap();
        let barrier = Barrier::new(2);
        thread::scope(|scope| {
            for _ in 0..2 {
                scope.spawn(|| {
                    barrier.wait();
                    facade.dispose();
                });
            }
        });
        assert!(!facade.is_alive());
    }

    assert_eq!(registry.kind().releases.load(Ordering::SeqCst), 50);
    assert_eq!(registry.kind().overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn native_calls_never_overlap() {
    let session = session();
    let registry = session.registry(Tracked::default);

    thread::scope(|scope| {
        for t in 0..8usize {
            let registry = registry.clone();
            scope.spawn(move || {
                for i in 0..200usize {
                    let facade = registry.get(1 + (t * 7 + i) % 13).unwrap();
                    facade
                        .with_native(|kind, _, _| {
                            kind.enter();
                            kind.leave();
                        })
                        .unwrap();
                }
            });
        }
    });

    let kind = registry.kind();
    assert_eq!(kind.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(
        kind.add_refs.load(Ordering::SeqCst),
        kind.releases.load(Ordering::SeqCst)
    );
    assert!(registry.is_empty());
}

#[test]
fn raw_handle_release_balances_get() {
    let session = session();
    let registry = session.registry(Tracked::default);

    let handle = registry.get(0x42).unwrap().into_handle();
    assert_eq!(handle.as_raw(), 0x42);
    assert_eq!(registry.ref_count(0x42), 1);

    registry.release(0x42).unwrap();
    assert_eq!(registry.kind().releases.load(Ordering::SeqCst), 1);
    assert!(matches!(
        registry.release(0x42),
        Err(CoreError::DoubleRelease { .. })
    ));
}

#[test]
fn teardown_releases_live_objects() {
    let session = session();
    let registry = session.registry(Tracked::default);
    let a = registry.get(0x10).unwrap();
    let b = registry.get(0x11).unwrap();
    let b2 = registry.get(0x11).unwrap();

    assert_eq!(session.dispose_all(), 2);
    assert!(!a.is_alive());
    assert!(!b.is_alive());
    assert!(registry.is_empty());
    assert_eq!(registry.kind().releases.load(Ordering::SeqCst), 2);

    assert!(matches!(a.check_alive(), Err(CoreError::UseAfterDispose { .. })));
    drop((a, b, b2));
    assert_eq!(registry.kind().releases.load(Ordering::SeqCst), 2);
    assert_eq!(session.dispose_all(), 0);
}

#[test]
fn process_exit_teardown_skips_native_release() {
    let session = session();
    let registry = session.registry(Tracked::default);
    let facade = registry.get(0x99).unwrap();

    session.begin_process_exit();
    session.dispose_all();

    assert_eq!(facade.with_native(|_, h, _| h.as_raw()).unwrap(), 0);
    assert!(facade.check_alive().is_err());
    drop(facade);
    assert_eq!(registry.kind().releases.load(Ordering::SeqCst), 0);
    assert_eq!(registry.kind().native_refs(0x99), 1);
}

#[test]
fn dropping_session_releases_everything() {
    let session = session();
    let registry = session.registry(Tracked::default);
    let facade = registry.get(0x5).unwrap();

    drop(session);
    assert!(!facade.is_alive());
    assert_eq!(registry.kind().releases.load(Ordering::SeqCst), 1);
    assert!(matches!(registry.get(0x6), Err(CoreError::SessionClosed)));
    drop(facade);
    assert_eq!(registry.kind().releases.load(Ordering::SeqCst), 1);
}
