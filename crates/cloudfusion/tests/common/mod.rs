#![allow(dead_code)]

use async_trait::async_trait;
use chrono::TimeZone;
use cloudfusion::{
    Credentials, HttpResponse, OperationRegistry, PreparedRequest, Runtime, RuntimeConfig,
    SdkError, SdkResult, ServiceDescriptor, SignatureVersion, SigningContext, Transport,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Step {
    Respond(u16, String),
    Fail(String),
}

impl Step {
    fn into_result(self) -> SdkResult<HttpResponse> {
        match self {
            Step::Respond(status, body) => {
                let mut headers = BTreeMap::new();
                headers.insert("content-type".to_string(), "text/xml".to_string());
                Ok(HttpResponse {
                    status,
                    headers,
                    body,
                })
            }
            Step::Fail(msg) => Err(SdkError::transport(msg)),
        }
    }
}

/// Plays back a fixed sequence of steps; the last step repeats forever.
pub struct Scripted {
    script: Mutex<VecDeque<Step>>,
    sent: Mutex<Vec<PreparedRequest>>,
}

impl Scripted {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sends(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for Scripted {
    async fn send(&self, request: &PreparedRequest) -> SdkResult<HttpResponse> {
        self.sent.lock().unwrap().push(request.clone());
        let step = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        };
        step.expect("script is empty").into_result()
    }
}

/// Decides delay and result from the request itself.
pub struct Routed<F>(pub F);

#[async_trait]
impl<F> Transport for Routed<F>
where
    F: Fn(&PreparedRequest) -> (u64, Step) + Send + Sync,
{
    async fn send(&self, request: &PreparedRequest) -> SdkResult<HttpResponse> {
        let (delay_ms, step) = (self.0)(request);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        step.into_result()
    }
}

pub fn xml(result: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\
         <ListDomainsResponse xmlns=\"http://sdb.amazonaws.com/doc/2009-04-15/\">\
         <ListDomainsResult><DomainName>{result}</DomainName></ListDomainsResult>\
         <ResponseMetadata><RequestId>req-{result}</RequestId></ResponseMetadata>\
         </ListDomainsResponse>"
    )
}

pub fn config() -> RuntimeConfig {
    RuntimeConfig::new(Credentials::new("AKIDEXAMPLE", "secret"))
}

pub fn service() -> ServiceDescriptor {
    ServiceDescriptor::new("sdb", "2009-04-15", "sdb.amazonaws.com")
}

pub fn registry() -> OperationRegistry {
    let mut r = OperationRegistry::from_actions(
        &["ListDomains", "GetAttributes", "PutAttributes"],
        SignatureVersion::V2,
    );
    r.register("get_send_quota", "GetSendQuota", SignatureVersion::V3);
    r
}

pub fn fixed_context() -> SigningContext {
    SigningContext::fixed(
        chrono::Utc.with_ymd_and_hms(2010, 5, 20, 14, 3, 7).unwrap(),
        "nonce123",
    )
}

pub async fn runtime(config: RuntimeConfig, transport: Arc<dyn Transport>) -> Runtime {
    Runtime::with_transport(config, service(), transport)
        .await
        .unwrap()
        .with_registry(registry())
}

/// Value of `key` in a form-encoded body.
pub fn form_value<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    body.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then_some(v)
    })
}
