mod common;

use cloudfusion::{CacheSelector, Outcome, Params, ResponseEnvelope, Runtime, SdkErrorKind};
use common::{config, runtime, xml, Scripted, Step};
use std::sync::Arc;

fn domain(resp: &ResponseEnvelope) -> &str {
    resp.document()
        .and_then(|d| d.text_at("ListDomainsResult/DomainName"))
        .unwrap_or("")
}

async fn cached_runtime(location: &str, steps: Vec<Step>) -> (Runtime, Arc<Scripted>) {
    let t = Scripted::new(steps);
    let cfg = config().with_cache(CacheSelector::Location(location.to_string()));
    (runtime(cfg, t.clone()).await, t)
}

async fn cached_call(rt: &mut Runtime, expiry: u64) -> ResponseEnvelope {
    rt.cache(expiry)
        .call("list_domains", Params::new())
        .await
        .unwrap()
        .into_response()
        .unwrap()
}

#[tokio::test]
async fn fresh_entry_is_served_without_sending() {
    let (mut rt, t) = cached_runtime(
        "apc",
        vec![Step::Respond(200, xml("first")), Step::Respond(200, xml("second"))],
    )
    .await;

    assert_eq!(domain(&cached_call(&mut rt, 3600).await), "first");
    assert_eq!(domain(&cached_call(&mut rt, 3600).await), "first");
    assert_eq!(t.sends(), 1);

    // uncached calls always go out
    rt.call("list_domains", Params::new()).await.unwrap();
    assert_eq!(t.sends(), 2);
}

#[tokio::test]
async fn different_arguments_use_different_entries() {
    let (mut rt, t) = cached_runtime("memory", vec![Step::Respond(200, xml("x"))]).await;
    rt.cache(60u64)
        .call("list_domains", Params::new().with("MaxNumberOfDomains", "1"))
        .await
        .unwrap();
    rt.cache(60u64)
        .call("list_domains", Params::new().with("MaxNumberOfDomains", "2"))
        .await
        .unwrap();
    assert_eq!(t.sends(), 2);
}

#[tokio::test]
async fn stale_entry_is_refreshed() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rt, t) = cached_runtime(
        dir.path().to_str().unwrap(),
        vec![Step::Respond(200, xml("old")), Step::Respond(200, xml("new"))],
    )
    .await;

    assert_eq!(domain(&cached_call(&mut rt, 0).await), "old");
    assert_eq!(domain(&cached_call(&mut rt, 0).await), "new");
    assert_eq!(t.sends(), 2);
}

#[tokio::test]
async fn stale_entry_survives_failed_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rt, t) = cached_runtime(
        dir.path().to_str().unwrap(),
        vec![
            Step::Respond(200, xml("old")),
            Step::Fail("connection refused".into()),
        ],
    )
    .await;

    assert_eq!(domain(&cached_call(&mut rt, 0).await), "old");
    let resp = cached_call(&mut rt, 0).await;
    assert_eq!(domain(&resp), "old");
    assert_eq!(resp.status, 200);
    assert_eq!(t.sends(), 2);
}

#[tokio::test]
async fn miss_with_transport_fault_is_an_error() {
    let (mut rt, _t) =
        cached_runtime("apc", vec![Step::Fail("connection refused".into())]).await;
    let err = rt
        .cache(60u64)
        .call("list_domains", Params::new())
        .await
        .unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn delete_cache_forces_a_resend() {
    let (mut rt, t) = cached_runtime(
        "pdo.sqlite::memory:",
        vec![Step::Respond(200, xml("first")), Step::Respond(200, xml("second"))],
    )
    .await;
    assert_eq!(rt.cache_backend().unwrap().name(), "sql");

    assert_eq!(domain(&cached_call(&mut rt, 3600).await), "first");
    let out = rt
        .delete_cache()
        .call("list_domains", Params::new())
        .await
        .unwrap();
    assert!(matches!(out, Outcome::CacheDeleted(true)));
    assert_eq!(t.sends(), 1);

    assert_eq!(domain(&cached_call(&mut rt, 3600).await), "second");
    assert_eq!(t.sends(), 2);
}

#[tokio::test]
async fn cache_without_location_is_config_error() {
    let t = Scripted::new(vec![Step::Respond(200, String::new())]);
    let mut rt = runtime(config(), t.clone()).await;
    let err = rt
        .cache(60u64)
        .call("list_domains", Params::new())
        .await
        .unwrap_err();
    assert!(err.is_config());
    assert_eq!(t.sends(), 0);
}

#[tokio::test]
async fn raw_request_cannot_be_cached() {
    let (mut rt, t) = cached_runtime("apc", vec![Step::Respond(200, String::new())]).await;
    let err = rt
        .cache(60u64)
        .call("list_domains", Params::new().with("returnRawRequest", true))
        .await
        .unwrap_err();
    assert!(err.is_config());
    assert_eq!(t.sends(), 0);
}

#[tokio::test]
async fn expiry_accepts_readable_durations() {
    let (mut rt, t) = cached_runtime(
        "memory",
        vec![Step::Respond(200, xml("first")), Step::Respond(200, xml("second"))],
    )
    .await;
    for _ in 0..2 {
        let resp = rt
            .cache_for("1 hour")
            .unwrap()
            .call("list_domains", Params::new())
            .await
            .unwrap()
            .into_response()
            .unwrap();
        assert_eq!(domain(&resp), "first");
    }
    assert_eq!(t.sends(), 1);
}

#[tokio::test]
async fn unreadable_expiry_is_rejected() {
    let (mut rt, t) = cached_runtime("memory", vec![Step::Respond(200, xml("x"))]).await;
    let err = rt.cache_for("soon-ish").unwrap_err();
    assert_eq!(err.kind, SdkErrorKind::Parse);

    // no modifier was left behind
    let out = rt.call("list_domains", Params::new()).await.unwrap();
    assert!(out.response().is_some());
    rt.call("list_domains", Params::new()).await.unwrap();
    assert_eq!(t.sends(), 2);
}
