use reqwest::Client;

mod common;
use common::*;

use ::common::bck::{Bck, BucketProps, Provider};
use ::common::msg::Action;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_create_bucket_happy_path() -> anyhow::Result<()> {
    let p1 = TestProxy::primary("p1", 3).await?;
    let targets = start_targets(p1.url(), 3).await?;
    let client = Client::new();

    let smap = get_smap(&client, p1.url()).await?;
    assert_eq!(smap.tmap.len(), 3);

    let bmd_before = get_bmd(&client, p1.url()).await?;

    let msg = action_msg(Action::CreateBucket, serde_json::Value::Null);
    let uuid = bucket_action_uuid(&client, p1.url(), "foo", &msg).await?;
    assert!(!uuid.is_empty());

    // BMD bumped by exactly one and replicated to every target
    let bmd = get_bmd(&client, p1.url()).await?;
    assert_eq!(bmd.version, bmd_before.version + 1);
    let bck = Bck::ais("foo");
    assert!(bmd.exists(&bck));

    let targets_ref = &targets;
    let bck_ref = &bck;
    wait_until(5000, move || async move {
        Ok(targets_ref
            .iter()
            .all(|t| t.state.bmd.get().exists(bck_ref)))
    })
    .await?;

    for t in &targets {
        // metadata-only: no xaction was spawned, no transaction left behind
        assert!(t.state.xactions.find_uuid(&uuid).is_none());
        assert!(t.state.transactions.is_empty());
    }

    for t in targets {
        t.shutdown().await?;
    }
    p1.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_create_existing_bucket_rejected() -> anyhow::Result<()> {
    let p1 = TestProxy::primary("p1", 3).await?;
    let targets = start_targets(p1.url(), 2).await?;
    let client = Client::new();

    let msg = action_msg(Action::CreateBucket, serde_json::Value::Null);
    bucket_action_uuid(&client, p1.url(), "foo", &msg).await?;

    let (status, body) = post_bucket_action(&client, p1.url(), "foo", &msg).await?;
    assert_eq!(status, reqwest::StatusCode::CONFLICT);
    assert!(body.contains("already exists"), "unexpected body: {}", body);

    for t in targets {
        t.shutdown().await?;
    }
    p1.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rename_with_one_target_busy() -> anyhow::Result<()> {
    let p1 = TestProxy::primary("p1", 3).await?;
    let targets = start_targets(p1.url(), 3).await?;
    let client = Client::new();

    let src = Bck::ais("src");
    let msg = action_msg(Action::CreateBucket, serde_json::Value::Null);
    bucket_action_uuid(&client, p1.url(), "src", &msg).await?;
    let bmd_before = get_bmd(&client, p1.url()).await?;

    // one target holds the source name-lock for an ongoing operation
    let busy_nlp = targets[1].state.nlps.get(&src);
    assert!(busy_nlp.try_lock());

    let msg = action_msg(
        Action::RenameBucket,
        serde_json::to_value(Bck::ais("dst"))?,
    );
    let (status, body) = post_bucket_action(&client, p1.url(), "src", &msg).await?;
    assert_eq!(status, reqwest::StatusCode::CONFLICT, "body: {}", body);
    assert!(body.contains("busy"), "unexpected body: {}", body);

    // nothing was mutated
    let bmd = get_bmd(&client, p1.url()).await?;
    assert_eq!(bmd.version, bmd_before.version);
    assert!(!bmd.exists(&Bck::ais("dst")));

    // abort went to exactly the targets whose begin succeeded: every
    // transaction table is empty and their locks are free again
    for t in &targets {
        assert!(t.state.transactions.is_empty());
    }
    for idx in [0usize, 2] {
        let nlp = targets[idx].state.nlps.get(&src);
        assert!(nlp.try_lock(), "lock leaked on target {}", idx);
        nlp.unlock();
    }
    // the third one is still held by the "ongoing operation"
    assert!(!targets[1].state.nlps.get(&src).try_lock());
    busy_nlp.unlock();

    for t in targets {
        t.shutdown().await?;
    }
    p1.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_make_n_copies_blocked_by_capacity() -> anyhow::Result<()> {
    let p1 = TestProxy::primary("p1", 3).await?;
    // 10-byte objects against a tiny budget push usage far past the high watermark
    let tgt1 = TestTarget::start_with_capacity("t1", p1.url(), 2, 100).await?;
    let client = Client::new();

    let bar = Bck::ais("bar");
    let msg = action_msg(Action::CreateBucket, serde_json::Value::Null);
    bucket_action_uuid(&client, p1.url(), "bar", &msg).await?;
    let bmd_before = get_bmd(&client, p1.url()).await?;

    tgt1.seed_objects(&bar, 0, 80)?;
    let cs = tgt1.state.mountpaths.refresh_cap();
    assert!(cs.oos);

    let msg = action_msg(Action::MakeNCopies, serde_json::json!(2));
    let (status, body) = post_bucket_action(&client, p1.url(), "bar", &msg).await?;
    assert_eq!(
        status,
        reqwest::StatusCode::INSUFFICIENT_STORAGE,
        "body: {}",
        body
    );

    // begin failed; abort broadcast; BMD unchanged
    let bmd = get_bmd(&client, p1.url()).await?;
    assert_eq!(bmd.version, bmd_before.version);
    assert!(tgt1.state.transactions.is_empty());

    tgt1.shutdown().await?;
    p1.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_copy_bucket_rejected_while_rebalancing() -> anyhow::Result<()> {
    let p1 = TestProxy::primary("p1", 3).await?;
    let targets = start_targets(p1.url(), 2).await?;
    let client = Client::new();

    let msg = action_msg(Action::CreateBucket, serde_json::Value::Null);
    bucket_action_uuid(&client, p1.url(), "src", &msg).await?;
    let bmd_before = get_bmd(&client, p1.url()).await?;

    // cluster rebalance is active on one target
    targets[0]
        .state
        .xactions
        .renew(Action::Rebalance, None, "reb-1")
        .unwrap();

    let msg = action_msg(
        Action::CopyBucket,
        serde_json::to_value(Bck::ais("dst"))?,
    );
    let (status, body) = post_bucket_action(&client, p1.url(), "src", &msg).await?;
    assert!(!status.is_success());
    assert!(body.contains("cannot run"), "unexpected body: {}", body);

    let bmd = get_bmd(&client, p1.url()).await?;
    assert_eq!(bmd.version, bmd_before.version);
    for t in &targets {
        assert!(t.state.transactions.is_empty());
    }

    for t in targets {
        t.shutdown().await?;
    }
    p1.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ec_encode_and_mirror_change_never_overlap() -> anyhow::Result<()> {
    let p1 = TestProxy::primary("p1", 3).await?;
    let targets = start_targets(p1.url(), 2).await?;
    let client = Client::new();

    let foo = Bck::ais("foo");
    let msg = action_msg(Action::CreateBucket, serde_json::Value::Null);
    bucket_action_uuid(&client, p1.url(), "foo", &msg).await?;
    let bmd_before = get_bmd(&client, p1.url()).await?;

    // an EC encode is in flight on one target: a mirror change must not start
    targets[0]
        .state
        .xactions
        .renew(Action::EcEncode, Some(&foo), "ec-1")
        .unwrap();

    let msg = action_msg(Action::MakeNCopies, serde_json::json!(2));
    let (status, body) = post_bucket_action(&client, p1.url(), "foo", &msg).await?;
    assert!(!status.is_success());
    assert!(body.contains("cannot run"), "unexpected body: {}", body);

    // and the other way round: a running mirror change blocks a new encode
    targets[0]
        .state
        .xactions
        .find_uuid("ec-1")
        .unwrap()
        .finish(None);
    targets[1]
        .state
        .xactions
        .renew(Action::MakeNCopies, Some(&foo), "mnc-1")
        .unwrap();

    let msg = action_msg(Action::EcEncode, serde_json::Value::Null);
    let (status, body) = post_bucket_action(&client, p1.url(), "foo", &msg).await?;
    assert!(!status.is_success());
    assert!(body.contains("cannot run"), "unexpected body: {}", body);

    // nothing was mutated and every begin was rolled back
    let bmd = get_bmd(&client, p1.url()).await?;
    assert_eq!(bmd.version, bmd_before.version);
    for t in &targets {
        assert!(t.state.transactions.is_empty());
    }

    for t in targets {
        t.shutdown().await?;
    }
    p1.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_combined_mirror_and_ec_change_rejected() -> anyhow::Result<()> {
    let p1 = TestProxy::primary("p1", 3).await?;
    let targets = start_targets(p1.url(), 2).await?;
    let client = Client::new();

    let msg = action_msg(Action::CreateBucket, serde_json::Value::Null);
    bucket_action_uuid(&client, p1.url(), "foo", &msg).await?;
    let bmd_before = get_bmd(&client, p1.url()).await?;

    // one payload that would spawn both a mirror and an encode xaction
    let mut props = BucketProps::new(Provider::Ais);
    props.mirror.enabled = true;
    props.mirror.copies = 2;
    props.ec.enabled = true;
    props.ec.data_slices = 2;
    props.ec.parity_slices = 2;

    let msg = action_msg(Action::SetBucketProps, serde_json::to_value(&props)?);
    let (status, body) = post_bucket_action(&client, p1.url(), "foo", &msg).await?;
    assert!(!status.is_success());
    assert!(
        body.contains("in one transaction"),
        "unexpected body: {}",
        body
    );

    let bmd = get_bmd(&client, p1.url()).await?;
    assert_eq!(bmd.version, bmd_before.version);
    for t in &targets {
        assert!(t.state.transactions.is_empty());
    }

    for t in targets {
        t.shutdown().await?;
    }
    p1.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_make_n_copies_end_to_end() -> anyhow::Result<()> {
    let p1 = TestProxy::primary("p1", 3).await?;
    let targets = start_targets(p1.url(), 2).await?;
    let client = Client::new();

    let foo = Bck::ais("foo");
    let msg = action_msg(Action::CreateBucket, serde_json::Value::Null);
    bucket_action_uuid(&client, p1.url(), "foo", &msg).await?;

    for t in &targets {
        t.seed_objects(&foo, 0, 5)?;
    }

    let msg = action_msg(Action::MakeNCopies, serde_json::json!(2));
    let uuid = bucket_action_uuid(&client, p1.url(), "foo", &msg).await?;

    // the committed xaction mirrors every object onto the second mountpath
    let targets_ref = &targets;
    let foo_ref = &foo;
    wait_until(10_000, move || async move {
        Ok(targets_ref.iter().all(|t| t.count_objects(foo_ref, 1) == 5))
    })
    .await?;

    // the IC listener reaches terminal state once both targets report
    let client_ref = &client;
    let proxy_url = p1.url();
    let uuid_ref = uuid.as_str();
    wait_until(10_000, move || async move {
        let (status, resp) = xact_status(client_ref, proxy_url, uuid_ref).await?;
        Ok(status.is_success() && resp.map(|r| r.finished).unwrap_or(false))
    })
    .await?;

    let (_, resp) = xact_status(&client, p1.url(), &uuid).await?;
    let resp = resp.unwrap();
    assert!(resp.finished);
    assert!(resp.err.is_none());
    assert!(resp.stats.objects >= 10);

    // bucket props reflect the new replica count
    let bmd = get_bmd(&client, p1.url()).await?;
    let props = bmd.get(&foo).unwrap();
    assert_eq!(props.mirror.copies, 2);
    assert!(props.mirror.enabled);

    for t in targets {
        t.shutdown().await?;
    }
    p1.shutdown().await?;
    Ok(())
}
