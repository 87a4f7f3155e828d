use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use klang::{live_resources, Engine, EngineConfig, EngineError, Resource, ResourceHandle, Status};
use klang::nodes::SplitterNode;

// The live-resource counter is process-global; serialize the tests that
// assert on it.
static COUNTER_GUARD: Mutex<()> = Mutex::new(());

static DESTRUCTS: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct Tracked {
    constructed: bool,
}

impl Resource for Tracked {
    fn destruct(&mut self) {
        assert!(self.constructed, "destruct must only run on constructed resources");
        DESTRUCTS.fetch_add(1, Ordering::SeqCst);
    }
}

fn construct_ok(tracked: &mut Tracked) -> Status {
    tracked.constructed = true;
    Ok(())
}

#[test]
fn emplace_and_clear_balance_the_counter() {
    let _guard = COUNTER_GUARD.lock().unwrap();
    let baseline = live_resources();

    let mut handle = ResourceHandle::<Tracked>::empty();
    assert!(handle.is_empty());
    assert!(handle.emplace(construct_ok).is_ok());
    assert!(!handle.is_empty());
    assert_eq!(live_resources(), baseline + 1);

    let destructs = DESTRUCTS.load(Ordering::SeqCst);
    handle.clear();
    assert!(handle.is_empty());
    assert_eq!(live_resources(), baseline);
    assert_eq!(DESTRUCTS.load(Ordering::SeqCst), destructs + 1);

    // Clearing an empty handle is a no-op.
    handle.clear();
    assert_eq!(live_resources(), baseline);
}

#[test]
fn drop_destructs_exactly_once() {
    let _guard = COUNTER_GUARD.lock().unwrap();
    let baseline = live_resources();
    let destructs = DESTRUCTS.load(Ordering::SeqCst);

    {
        let mut handle = ResourceHandle::<Tracked>::empty();
        assert!(handle.emplace(construct_ok).is_ok());
    }
    assert_eq!(live_resources(), baseline);
    assert_eq!(DESTRUCTS.load(Ordering::SeqCst), destructs + 1);
}

#[test]
fn take_transfers_ownership() {
    let _guard = COUNTER_GUARD.lock().unwrap();
    let baseline = live_resources();
    let destructs = DESTRUCTS.load(Ordering::SeqCst);

    let mut a = ResourceHandle::<Tracked>::empty();
    assert!(a.emplace(construct_ok).is_ok());
    let ptr = a.as_ptr();

    let b = a.take();
    assert!(a.is_empty());
    assert_eq!(b.as_ptr(), ptr);
    assert_eq!(live_resources(), baseline + 1);

    drop(a);
    // Only the holding handle destructs.
    assert_eq!(DESTRUCTS.load(Ordering::SeqCst), destructs);
    drop(b);
    assert_eq!(DESTRUCTS.load(Ordering::SeqCst), destructs + 1);
    assert_eq!(live_resources(), baseline);
}

#[test]
fn release_and_reset_round_trip() {
    let _guard = COUNTER_GUARD.lock().unwrap();
    let baseline = live_resources();

    let mut a = ResourceHandle::<Tracked>::empty();
    assert!(a.emplace(construct_ok).is_ok());
    let raw = a.release();
    assert!(a.is_empty());
    assert!(!raw.is_null());
    // Released storage is still accounted for.
    assert_eq!(live_resources(), baseline + 1);

    let mut b = ResourceHandle::<Tracked>::empty();
    b.reset(raw);
    assert_eq!(b.as_ptr(), raw);
    drop(b);
    assert_eq!(live_resources(), baseline);
}

#[test]
fn failed_construct_is_discarded_without_destruct() {
    let _guard = COUNTER_GUARD.lock().unwrap();
    let baseline = live_resources();
    let destructs = DESTRUCTS.load(Ordering::SeqCst);

    let mut handle = ResourceHandle::<Tracked>::empty();
    let status = handle.emplace(|_tracked| Err(EngineError::InvalidArgs));
    assert_eq!(status, Err(EngineError::InvalidArgs));
    // The storage is held for inspection until discarded.
    assert!(!handle.is_empty());
    assert_eq!(live_resources(), baseline + 1);

    handle.discard();
    assert!(handle.is_empty());
    assert_eq!(live_resources(), baseline);
    assert_eq!(DESTRUCTS.load(Ordering::SeqCst), destructs);
}

#[test]
fn engine_and_nodes_are_leak_free() {
    let _guard = COUNTER_GUARD.lock().unwrap();
    let baseline = live_resources();

    let mut engine = Engine::new();
    assert!(engine.init(EngineConfig::default()));
    assert_eq!(live_resources(), baseline + 1);

    {
        let mut splitter = SplitterNode::new();
        assert!(splitter.init(&engine, 2, 2));
        assert_eq!(live_resources(), baseline + 2);

        // A failed node init leaves nothing behind.
        let mut bad = SplitterNode::new();
        assert!(!bad.init(&engine, 0, 2));
        assert_eq!(live_resources(), baseline + 2);
    }
    assert_eq!(live_resources(), baseline + 1);

    drop(engine);
    assert_eq!(live_resources(), baseline);
}
