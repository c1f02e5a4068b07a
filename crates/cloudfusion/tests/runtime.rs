mod common;

use cloudfusion::{
    CacheSelector, Credentials, Outcome, ParamValue, Params, Runtime, RuntimeConfig,
    SdkErrorKind, ServiceDescriptor, SignatureVersion,
};
use common::{config, fixed_context, form_value, runtime, service, xml, Scripted, Step};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn retries_until_success() {
    let t = Scripted::new(vec![
        Step::Respond(503, String::new()),
        Step::Respond(503, String::new()),
        Step::Respond(200, xml("users")),
    ]);
    let mut rt = runtime(config().with_max_retries(3), t.clone()).await;

    let start = Instant::now();
    let out = rt.call("list_domains", Params::new()).await.unwrap();
    let resp = out.into_response().unwrap();

    assert_eq!(t.sends(), 3);
    assert_eq!(resp.status, 200);
    assert!(resp.is_ok());
    // 100ms then 400ms of backoff
    let waited = start.elapsed();
    assert!(waited >= Duration::from_millis(500) && waited < Duration::from_millis(600));
}

#[tokio::test(start_paused = true)]
async fn internal_error_is_retried() {
    let t = Scripted::new(vec![
        Step::Respond(500, String::new()),
        Step::Respond(500, String::new()),
        Step::Respond(200, xml("users")),
    ]);
    let mut rt = runtime(config().with_max_retries(3), t.clone()).await;

    let resp = rt
        .call("list_domains", Params::new())
        .await
        .unwrap()
        .into_response()
        .unwrap();

    assert_eq!(t.sends(), 3);
    assert_eq!(resp.status, 200);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_retries() {
    let t = Scripted::new(vec![Step::Respond(503, String::new())]);
    let mut rt = runtime(config().with_max_retries(2), t.clone()).await;

    let resp = rt
        .call("list_domains", Params::new())
        .await
        .unwrap()
        .into_response()
        .unwrap();

    assert_eq!(t.sends(), 3);
    assert_eq!(resp.status, 503);
    assert!(!resp.is_ok());
}

#[tokio::test]
async fn other_errors_are_not_retried() {
    for status in [400, 403, 404, 502] {
        let t = Scripted::new(vec![Step::Respond(
            status,
            "<Error><Code>Nope</Code></Error>".to_string(),
        )]);
        let mut rt = runtime(config(), t.clone()).await;
        let resp = rt
            .call("list_domains", Params::new())
            .await
            .unwrap()
            .into_response()
            .unwrap();
        assert_eq!(t.sends(), 1, "status {status}");
        assert_eq!(resp.status, status);
        assert_eq!(resp.document().unwrap().text_at("Code"), Some("Nope"));
    }
}

#[tokio::test]
async fn transport_fault_is_a_hard_error() {
    let t = Scripted::new(vec![Step::Fail("connection refused".into())]);
    let mut rt = runtime(config(), t.clone()).await;
    let err = rt.call("list_domains", Params::new()).await.unwrap_err();
    assert!(err.is_transport());
    assert_eq!(err.operation.as_deref(), Some("ListDomains"));
    assert_eq!(t.sends(), 1);
}

#[tokio::test]
async fn response_body_is_parsed() {
    let t = Scripted::new(vec![Step::Respond(200, xml("users"))]);
    let mut rt = runtime(config(), t.clone()).await;
    let resp = rt
        .call("list_domains", Params::new())
        .await
        .unwrap()
        .into_response()
        .unwrap();
    let doc = resp.document().unwrap();
    assert_eq!(doc.text_at("ListDomainsResult/DomainName"), Some("users"));
    assert_eq!(resp.request_id(), Some("req-users"));
}

#[tokio::test]
async fn signed_body_carries_protocol_keys() {
    let t = Scripted::new(vec![Step::Respond(200, xml("x"))]);
    let mut rt = runtime(config(), t.clone()).await;
    rt.call("get_attributes", Params::new().with("ItemName", "item 1"))
        .await
        .unwrap();

    let req = &t.requests()[0];
    assert_eq!(req.method, "POST");
    assert_eq!(req.url, "https://sdb.amazonaws.com/");
    assert_eq!(form_value(&req.body, "Action"), Some("GetAttributes"));
    assert_eq!(form_value(&req.body, "Version"), Some("2009-04-15"));
    assert_eq!(form_value(&req.body, "AWSAccessKeyId"), Some("AKIDEXAMPLE"));
    assert_eq!(form_value(&req.body, "SignatureVersion"), Some("2"));
    assert_eq!(form_value(&req.body, "ItemName"), Some("item%201"));
    assert!(form_value(&req.body, "Signature").is_some());
    assert!(req.header("content-type").unwrap().starts_with("application/x-www-form-urlencoded"));
}

#[tokio::test]
async fn v3_operations_sign_headers() {
    let t = Scripted::new(vec![Step::Respond(200, String::new())]);
    let mut rt = runtime(config(), t.clone()).await;
    rt.call("get_send_quota", Params::new()).await.unwrap();

    let req = &t.requests()[0];
    let auth = req.header("x-amzn-authorization").unwrap();
    assert!(auth.starts_with("AWS3-HTTPS AWSAccessKeyId=AKIDEXAMPLE,Algorithm=HmacSHA256,"));
    assert!(req.header("date").is_some());
    assert!(req.header("x-amz-nonce").is_some());
    assert!(form_value(&req.body, "Signature").is_none());
}

#[tokio::test]
async fn raw_request_is_not_sent() {
    let t = Scripted::new(vec![Step::Respond(200, String::new())]);
    let mut rt = runtime(config(), t.clone()).await;

    let mut transport = BTreeMap::new();
    transport.insert("timeout".to_string(), ParamValue::from("9"));
    let mut headers = BTreeMap::new();
    headers.insert("x-trace-id".to_string(), ParamValue::from("t-1"));
    transport.insert("headers".to_string(), ParamValue::Map(headers));

    let params = Params::new()
        .with("DomainName", "users")
        .with("transport", ParamValue::Map(transport))
        .with("returnRawRequest", true);

    let Outcome::Prepared(req) = rt.call("list_domains", params).await.unwrap() else {
        panic!("expected a prepared request");
    };
    assert_eq!(t.sends(), 0);
    assert_eq!(req.timeout, Some(Duration::from_secs(9)));
    assert_eq!(req.header("x-trace-id"), Some("t-1"));
    assert!(!req.body.contains("transport"));
    assert!(!req.body.contains("returnRawRequest"));
    assert_eq!(form_value(&req.body, "DomainName"), Some("users"));
}

#[tokio::test]
async fn fixed_clock_signs_deterministically() {
    let t = Scripted::new(vec![Step::Respond(200, String::new())]);
    let mut rt = runtime(config(), t.clone())
        .await
        .with_clock(Arc::new(fixed_context));

    let params = || Params::new().with("b", "1").with("A", "2").with("returnRawRequest", "1");
    let a = rt.call("list_domains", params()).await.unwrap();
    let b = rt.call("list_domains", params()).await.unwrap();
    let (Outcome::Prepared(a), Outcome::Prepared(b)) = (a, b) else {
        panic!("expected prepared requests");
    };
    assert_eq!(a, b);
    assert_eq!(form_value(&a.body, "Timestamp"), Some("2010-05-20T14%3A03%3A07Z"));
    let keys: Vec<_> = a.body.split('&').map(|p| p.split('=').next().unwrap()).collect();
    let mut sorted = keys.clone();
    sorted.pop(); // Signature is appended last
    let mut expect = sorted.clone();
    expect.sort();
    assert_eq!(sorted, expect);
    assert!(keys.iter().position(|k| *k == "A") < keys.iter().position(|k| *k == "b"));
}

#[tokio::test]
async fn endpoint_overrides_apply() {
    let t = Scripted::new(vec![Step::Respond(200, String::new())]);
    let cfg = config()
        .with_hostname("localhost")
        .with_port(4566)
        .with_ssl(false);
    let mut rt = runtime(cfg, t.clone()).await;
    rt.call("list_domains", Params::new()).await.unwrap();
    assert_eq!(t.requests()[0].url, "http://localhost:4566/");
}

#[tokio::test]
async fn explicit_domain_and_version() {
    let t = Scripted::new(vec![Step::Respond(200, String::new())]);
    let mut rt = runtime(config(), t.clone()).await;
    rt.authenticate(
        "ListDomains",
        Params::new(),
        "sdb.eu-west-1.amazonaws.com",
        SignatureVersion::V2,
    )
    .await
    .unwrap();
    assert_eq!(t.requests()[0].url, "https://sdb.eu-west-1.amazonaws.com/");
}

#[tokio::test]
async fn actions_inherit_service_signature_version() {
    let t = Scripted::new(vec![Step::Respond(200, String::new())]);
    let svc = ServiceDescriptor::new("email", "2010-12-01", "email.us-east-1.amazonaws.com")
        .with_signature_version(SignatureVersion::V3);
    let mut rt = Runtime::with_transport(config(), svc, t.clone())
        .await
        .unwrap()
        .with_actions(&["GetSendQuota"]);

    rt.call("get_send_quota", Params::new()).await.unwrap();
    let req = &t.requests()[0];
    assert_eq!(req.url, "https://email.us-east-1.amazonaws.com/");
    assert!(req.header("x-amzn-authorization").is_some());
    assert!(form_value(&req.body, "Signature").is_none());
}

#[tokio::test]
async fn unknown_operation_is_config_error() {
    let t = Scripted::new(vec![Step::Respond(200, String::new())]);
    let mut rt = runtime(config(), t.clone()).await;
    let err = rt.call("drop_everything", Params::new()).await.unwrap_err();
    assert!(err.is_config());
    assert_eq!(t.sends(), 0);
}

#[tokio::test]
async fn missing_credentials_rejected_at_construction() {
    let t = Scripted::new(vec![Step::Respond(200, String::new())]);
    let cfg = RuntimeConfig::new(Credentials::new("", "secret"));
    let err = Runtime::with_transport(cfg, service(), t).await.unwrap_err();
    assert!(err.is_config());
}

#[tokio::test]
async fn unknown_cache_selector_rejected_at_construction() {
    let t = Scripted::new(vec![Step::Respond(200, String::new())]);
    let cfg = config().with_cache(CacheSelector::Location(String::new()));
    let err = Runtime::with_transport(cfg, service(), t).await.unwrap_err();
    assert_eq!(err.kind, SdkErrorKind::Config);
}
