use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use common::bck::Bck;
use common::error::ApiError;
use common::msg::Action;
use common::owner::SmapOwner;
use common::smap::Smap;
use tgt::core::mountpath::MountpathRegistry;
use tgt::core::notif::NotifCtx;
use tgt::core::xact::jogger::{JogCallback, Jogger, THROTTLE_NUM_OBJECTS};
use tgt::core::xact::{bck_copy, run_bck_xact, XactBase};

fn registry_with(
    dir: &tempfile::TempDir,
    n: usize,
    capacity_bytes: u64,
) -> Arc<MountpathRegistry> {
    let paths: Vec<PathBuf> = (0..n).map(|i| dir.path().join(format!("mp{}", i))).collect();
    Arc::new(MountpathRegistry::new(paths, capacity_bytes, 90, 95).unwrap())
}

fn seed_objects(registry: &MountpathRegistry, bck: &Bck, mpath_idx: usize, count: usize) {
    let mpath = &registry.available()[mpath_idx];
    let root = mpath.bucket_path(bck);
    fs::create_dir_all(&root).unwrap();
    for i in 0..count {
        fs::write(root.join(format!("obj-{:04}", i)), b"0123456789").unwrap();
    }
}

fn counting_callback() -> JogCallback {
    Arc::new(|_path, xact| {
        xact.objs_inc();
        Ok(())
    })
}

#[test]
fn test_jogger_visits_every_object() {
    let dir = tempfile::TempDir::new().unwrap();
    let registry = registry_with(&dir, 1, 0);
    let bck = Bck::ais("foo");
    seed_objects(&registry, &bck, 0, 10);

    let xact = XactBase::new("u1", Action::CopyBucket, Some(bck.clone()));
    let mpath = registry.available()[0].clone();
    let j = Jogger {
        bck_root: mpath.bucket_path(&bck),
        mpath,
        mountpaths: registry.clone(),
        xact: xact.clone(),
        callback: counting_callback(),
    };
    j.jog().unwrap();
    assert_eq!(xact.stats().objects, 10);
}

#[test]
fn test_jogger_missing_bucket_dir_is_a_noop() {
    let dir = tempfile::TempDir::new().unwrap();
    let registry = registry_with(&dir, 1, 0);
    let bck = Bck::ais("absent");

    let xact = XactBase::new("u1", Action::CopyBucket, Some(bck.clone()));
    let mpath = registry.available()[0].clone();
    let j = Jogger {
        bck_root: mpath.bucket_path(&bck),
        mpath,
        mountpaths: registry,
        xact: xact.clone(),
        callback: counting_callback(),
    };
    j.jog().unwrap();
    assert_eq!(xact.stats().objects, 0);
}

#[test]
fn test_jogger_stops_on_abort() {
    let dir = tempfile::TempDir::new().unwrap();
    let registry = registry_with(&dir, 1, 0);
    let bck = Bck::ais("foo");
    seed_objects(&registry, &bck, 0, 5);

    let xact = XactBase::new("u1", Action::CopyBucket, Some(bck.clone()));
    xact.abort();

    let mpath = registry.available()[0].clone();
    let j = Jogger {
        bck_root: mpath.bucket_path(&bck),
        mpath,
        mountpaths: registry,
        xact: xact.clone(),
        callback: counting_callback(),
    };
    let res = j.jog();
    assert!(matches!(res, Err(ApiError::Aborted(_))));
    assert_eq!(xact.stats().objects, 0, "cancelled at the first boundary");
}

#[test]
fn test_jogger_aborts_at_capacity_throttle() {
    let dir = tempfile::TempDir::new().unwrap();
    // 10-byte objects against a 100-byte budget: far beyond the OOS threshold
    let registry = registry_with(&dir, 1, 100);
    let bck = Bck::ais("foo");
    let count = THROTTLE_NUM_OBJECTS as usize + 10;
    seed_objects(&registry, &bck, 0, count);

    let cs = registry.refresh_cap();
    assert!(cs.oos);
    assert!(cs.err().is_some());

    let xact = XactBase::new("u1", Action::CopyBucket, Some(bck.clone()));
    let mpath = registry.available()[0].clone();
    let j = Jogger {
        bck_root: mpath.bucket_path(&bck),
        mpath,
        mountpaths: registry,
        xact: xact.clone(),
        callback: counting_callback(),
    };
    let res = j.jog();
    assert!(matches!(res, Err(ApiError::Aborted(_))));
    // the capacity poll fires at the throttle boundary, not before
    assert_eq!(xact.stats().objects, THROTTLE_NUM_OBJECTS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_bck_xact_copies_bucket() {
    let dir = tempfile::TempDir::new().unwrap();
    let registry = registry_with(&dir, 2, 0);
    let bck_from = Bck::ais("src");
    let bck_to = Bck::ais("dst");
    seed_objects(&registry, &bck_from, 0, 7);
    seed_objects(&registry, &bck_from, 1, 3);

    let xact = XactBase::new("u1", Action::CopyBucket, Some(bck_to.clone()));
    let notif_ctx = NotifCtx {
        http_client: reqwest::Client::new(),
        smap: Arc::new(SmapOwner::new(Smap::default(), dir.path().join("smap.json"))),
        node_id: "t1".to_string(),
    };

    run_bck_xact(
        xact.clone(),
        bck_from.clone(),
        registry.clone(),
        notif_ctx,
        bck_copy::callback(registry.clone(), bck_from.clone(), bck_to.clone()),
    )
    .await;

    assert!(xact.is_finished());
    assert!(xact.error().is_none());
    assert_eq!(xact.stats().objects, 10);

    // every object now exists under the destination bucket on its mountpath
    for (idx, expected) in [(0usize, 7usize), (1, 3)] {
        let mpath = &registry.available()[idx];
        let dst_root = mpath.bucket_path(&bck_to);
        let copied = walkdir_count(&dst_root);
        assert_eq!(copied, expected);
    }
}

fn walkdir_count(root: &std::path::Path) -> usize {
    if !root.exists() {
        return 0;
    }
    let mut n = 0;
    let mut stack = vec![root.to_path_buf()];
    while let Some(p) = stack.pop() {
        for entry in fs::read_dir(&p).unwrap() {
            let entry = entry.unwrap();
            if entry.file_type().unwrap().is_dir() {
                stack.push(entry.path());
            } else {
                n += 1;
            }
        }
    }
    n
}
