use std::time::Instant;

use common::bck::Bck;
use common::error::ApiError;
use tgt::core::nlp::NameLockRegistry;

#[test]
fn test_try_lock_is_exclusive() {
    let nlps = NameLockRegistry::new();
    let bck = Bck::ais("foo");

    let nlp = nlps.get(&bck);
    assert!(nlp.try_lock());
    assert!(!nlp.try_lock(), "second writer must be refused");
    assert!(!nlp.try_rlock(), "reader must not pass a writer");

    nlp.unlock();
    assert!(nlp.try_lock());
    nlp.unlock();
}

#[test]
fn test_readers_share_writers_wait() {
    let nlps = NameLockRegistry::new();
    let bck = Bck::ais("foo");
    let nlp = nlps.get(&bck);

    assert!(nlp.try_rlock());
    assert!(nlp.try_rlock(), "readers share");
    assert!(!nlp.try_lock(), "writer must not pass readers");

    nlp.runlock();
    assert!(!nlp.try_lock(), "one reader still holds");
    nlp.runlock();
    assert!(nlp.try_lock());
    nlp.unlock();
}

#[test]
fn test_busy_is_immediate() {
    let nlps = NameLockRegistry::new();
    let bck = Bck::ais("foo");
    let held = nlps.try_lock(&bck).unwrap();

    // non-blocking: the refusal must come back right away, never queue
    let start = Instant::now();
    let res = nlps.try_lock(&bck);
    assert!(start.elapsed().as_millis() < 1);
    assert!(matches!(res, Err(ApiError::BucketIsBusy(_))));

    held.release();
    nlps.try_lock(&bck).unwrap().release();
}

#[test]
fn test_downgrade() {
    let nlps = NameLockRegistry::new();
    let bck = Bck::ais("foo");
    let nlp = nlps.get(&bck);

    assert!(nlp.try_lock());
    nlp.downgrade();

    // now a read lock: other readers pass, writers don't
    assert!(nlp.try_rlock());
    assert!(!nlp.try_lock());

    nlp.runlock();
    nlp.runlock();
    assert!(nlp.try_lock());
    nlp.unlock();
}

#[test]
fn test_registry_returns_same_pair_per_bucket() {
    let nlps = NameLockRegistry::new();
    let foo = Bck::ais("foo");
    let bar = Bck::ais("bar");

    let a = nlps.get(&foo);
    let b = nlps.get(&foo);
    assert!(std::sync::Arc::ptr_eq(&a, &b));

    // distinct buckets are independent
    let c = nlps.get(&bar);
    assert!(a.try_lock());
    assert!(c.try_lock());
    a.unlock();
    c.unlock();
}

#[test]
fn test_held_lock_release_modes() {
    let nlps = NameLockRegistry::new();
    let bck = Bck::ais("foo");

    let w = nlps.try_lock(&bck).unwrap();
    w.release();

    let r1 = nlps.try_rlock(&bck).unwrap();
    let r2 = nlps.try_rlock(&bck).unwrap();
    r1.release();
    r2.release();

    // fully released: a writer can proceed
    nlps.try_lock(&bck).unwrap().release();
}
