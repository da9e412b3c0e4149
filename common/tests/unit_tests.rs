use std::collections::BTreeSet;

use common::bck::{Bck, BucketProps, Provider};
use common::bmd::Bmd;
use common::error::ApiError;
use common::msg::{Action, ActionMsg};
use common::owner::BmdOwner;
use common::persist;
use common::smap::{hrw_ic, NodeRole, Smap, Snode};

fn proxy(id: &str) -> Snode {
    Snode {
        id: id.to_string(),
        role: NodeRole::Proxy,
        public_url: format!("http://{}", id),
        intra_control_url: format!("http://{}", id),
    }
}

fn smap_with_ic(ids: &[&str]) -> Smap {
    let mut smap = Smap::new("cluster-1".to_string(), proxy(ids[0]));
    for id in &ids[1..] {
        smap.pmap.insert(id.to_string(), proxy(id));
    }
    smap.ic = ids.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>();
    smap
}

#[test]
fn test_bck_uname_and_display() {
    let bck = Bck::ais("foo");
    assert_eq!(bck.uname(), "ais//foo");
    assert_eq!(bck.to_string(), "ais://foo");

    let cloud = Bck {
        name: "bar".to_string(),
        provider: Provider::Cloud,
        ns: "ns1".to_string(),
    };
    assert_eq!(cloud.uname(), "cloud/ns1/bar");
    assert_eq!(cloud.to_string(), "cloud://ns1/bar");
}

#[test]
fn test_bck_canonical_ordering() {
    // Lock-acquisition order for multi-bucket operations must be stable.
    let a = Bck::ais("alpha");
    let b = Bck::ais("beta");
    assert!(a < b);

    let mut pair = [b.clone(), a.clone()];
    pair.sort();
    assert_eq!(pair[0], a);
    assert_eq!(pair[1], b);
}

#[test]
fn test_bmd_version_bumps_by_exactly_one() {
    let bmd = Bmd::new("cluster-1".to_string());
    assert_eq!(bmd.version, 1);

    let bck = Bck::ais("foo");
    let v2 = bmd.add(&bck, BucketProps::new(Provider::Ais)).unwrap();
    assert_eq!(v2.version, 2);
    assert!(v2.exists(&bck));

    // add of an existing bucket is rejected and does not mutate
    assert!(matches!(
        v2.add(&bck, BucketProps::new(Provider::Ais)),
        Err(ApiError::BucketAlreadyExists(_))
    ));
    assert_eq!(v2.version, 2);

    let v3 = v2.del(&bck).unwrap();
    assert_eq!(v3.version, 3);
    assert!(!v3.exists(&bck));
}

#[test]
fn test_bmd_rename_moves_props() {
    let bmd = Bmd::new("cluster-1".to_string());
    let src = Bck::ais("src");
    let dst = Bck::ais("dst");

    let mut props = BucketProps::new(Provider::Ais);
    props.mirror.enabled = true;
    props.mirror.copies = 2;

    let v2 = bmd.add(&src, props.clone()).unwrap();
    let v3 = v2.rename(&src, &dst).unwrap();

    assert_eq!(v3.version, 3);
    assert!(!v3.exists(&src));
    assert_eq!(v3.get(&dst), Some(&props));

    assert!(matches!(
        v2.rename(&dst, &src),
        Err(ApiError::BucketDoesNotExist(_))
    ));
}

#[test]
fn test_hrw_ic_deterministic_and_stable() {
    let smap = smap_with_ic(&["p1", "p2", "p3"]);

    let owner = hrw_ic(&smap, "u42").unwrap().id.clone();
    for _ in 0..10 {
        assert_eq!(hrw_ic(&smap, "u42").unwrap().id, owner);
    }

    // removing a non-owner member must not move the key
    let mut smaller = smap.clone();
    let other = smap.ic.iter().find(|id| **id != owner).unwrap().clone();
    smaller.ic.remove(&other);
    assert_eq!(hrw_ic(&smaller, "u42").unwrap().id, owner);
}

#[test]
fn test_hrw_ic_spreads_keys() {
    let smap = smap_with_ic(&["p1", "p2", "p3"]);
    let mut owners = BTreeSet::new();
    for i in 0..64 {
        owners.insert(hrw_ic(&smap, &format!("uuid-{}", i)).unwrap().id.clone());
    }
    assert!(owners.len() > 1, "all keys landed on one IC member");
}

#[test]
fn test_smap_ic_invariants() {
    let smap = smap_with_ic(&["p1", "p2"]);
    assert!(!smap.ic.is_empty());
    for id in &smap.ic {
        assert!(smap.get_proxy(id).is_some(), "IC member {} not a proxy", id);
    }
    assert_eq!(smap.oldest_ic().unwrap().id, "p1");
}

#[test]
fn test_persist_roundtrip() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("bmd.json");

    let bmd = Bmd::new("cluster-1".to_string())
        .add(&Bck::ais("foo"), BucketProps::new(Provider::Ais))
        .unwrap();

    persist::save_atomic(&path, &bmd).unwrap();
    let loaded: Bmd = persist::load(&path).unwrap().unwrap();
    assert_eq!(loaded.version, bmd.version);
    assert!(loaded.exists(&Bck::ais("foo")));

    // no leftover temp file
    assert!(!path.with_extension("tmp").exists());

    let missing: Option<Bmd> = persist::load(&dir.path().join("absent.json")).unwrap();
    assert!(missing.is_none());
}

#[test]
fn test_bmd_owner_is_monotonic() {
    let dir = tempfile::TempDir::new().unwrap();
    let owner = BmdOwner::new(
        Bmd::new("cluster-1".to_string()),
        dir.path().join("bmd.json"),
    );

    let v2 = owner
        .get()
        .add(&Bck::ais("foo"), BucketProps::new(Provider::Ais))
        .unwrap();
    assert!(owner.synchronize(v2.clone()).unwrap());
    assert_eq!(owner.version(), 2);

    // re-installing the same or an older version is a no-op
    assert!(!owner.synchronize(v2).unwrap());
    assert_eq!(owner.version(), 2);

    // UUID mismatch is rejected
    let foreign = Bmd::new("other-cluster".to_string());
    assert!(owner.synchronize(foreign).is_err());
}

#[test]
fn test_action_wire_names() {
    let msg = ActionMsg::new(Action::MakeNCopies, serde_json::json!(3));
    let s = serde_json::to_string(&msg).unwrap();
    assert!(s.contains("\"make-n-copies\""));

    let back: ActionMsg = serde_json::from_str(&s).unwrap();
    assert_eq!(back.action, Action::MakeNCopies);
    assert_eq!(back.value, serde_json::json!(3));

    for (action, name) in [
        (Action::CreateBucket, "create-bucket"),
        (Action::RenameBucket, "rename-bucket"),
        (Action::CopyBucket, "copy-bucket"),
        (Action::SetBucketProps, "set-bprops"),
        (Action::EcEncode, "ec-encode"),
        (Action::MergeOwnershipTbl, "merge-ownership-table"),
        (Action::ListenToNotif, "listen-to-notif"),
    ] {
        assert_eq!(action.as_str(), name);
    }
}
