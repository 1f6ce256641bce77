mod common;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use baas_transport::adapter::{
    FetchCall, FetchReply, RpcCompletion, RpcError, RpcHandle, RpcService, SandboxAdapter,
};
use baas_transport::config::{SessionConfig, Transport};
use baas_transport::net::Method as WireMethod;
use baas_transport::{codec, Error, Method, RequestOptions, Session};
use common::{reply, TestServer};
use http::HeaderMap;
use url::Url;

/// Answers fetches from a script and records every call.
#[derive(Default)]
struct ScriptedRpc {
    calls: Mutex<Vec<FetchCall>>,
    script: Mutex<VecDeque<Result<FetchReply, RpcError>>>,
    closed: AtomicBool,
}

impl ScriptedRpc {
    fn with(outcomes: Vec<Result<FetchReply, RpcError>>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(outcomes.into()),
            closed: AtomicBool::new(false),
        })
    }

    fn next(&self, call: FetchCall) -> Result<FetchReply, RpcError> {
        self.calls.lock().unwrap().push(call);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(RpcError::Other("script exhausted".into())))
    }
}

impl RpcService for ScriptedRpc {
    fn fetch(&self, call: FetchCall) -> Result<FetchReply, RpcError> {
        self.next(call)
    }

    fn make_fetch_call(&self, call: FetchCall, completion: RpcCompletion) -> RpcHandle {
        let (handle, signal) = RpcHandle::pair();
        let outcome = self.next(call);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            completion(outcome);
            signal.complete();
        });
        handle
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn ok_reply(url: &str, headers: &[(&'static str, &'static str)], body: &str) -> Result<FetchReply, RpcError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.append(*name, value.parse().unwrap());
    }
    Ok(FetchReply {
        final_url: Url::parse(url).unwrap(),
        status: 200,
        headers: map,
        content: body.as_bytes().to_vec(),
    })
}

fn reply_with_status(
    status: u16,
    headers: &[(&'static str, &'static str)],
    body: &[u8],
) -> Result<FetchReply, RpcError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.append(*name, value.parse().unwrap());
    }
    Ok(FetchReply {
        final_url: Url::parse("https://api.test/1/classes/Item/missing").unwrap(),
        status,
        headers: map,
        content: body.to_vec(),
    })
}

fn session_over(service: Arc<ScriptedRpc>) -> Session {
    let config = SessionConfig::builder()
        .timeout(Duration::from_secs(7))
        .build()
        .unwrap();
    Session::with_adapter(config, Arc::new(SandboxAdapter::new(service))).unwrap()
}

#[test]
fn sync_fetch_carries_prepared_request() {
    let service = ScriptedRpc::with(vec![ok_reply(
        "https://api.test/1/classes/Item?limit=2",
        &[],
        r#"{"results":[]}"#,
    )]);
    let session = session_over(service.clone());

    let mut response = session
        .get(
            "https://api.test/1/classes/Item",
            RequestOptions::new().form([("limit", "2")]).verify(false),
        )
        .unwrap();
    assert_eq!(response.json().unwrap()["results"], serde_json::json!([]));

    let calls = service.calls.lock().unwrap();
    let call = &calls[0];
    assert_eq!(call.method, WireMethod::Get);
    assert_eq!(call.url.as_str(), "https://api.test/1/classes/Item?limit=2");
    assert!(call.payload.is_none());
    assert_eq!(call.deadline, Some(Duration::from_secs(7)));
    assert!(!call.validate_certificate);
}

#[test]
fn put_sends_payload_and_delete_does_not() {
    let service = ScriptedRpc::with(vec![
        ok_reply("https://api.test/1/classes/Item/a", &[], "{}"),
        ok_reply("https://api.test/1/classes/Item/a", &[], "{}"),
    ]);
    let session = session_over(service.clone());

    session
        .put("https://api.test/1/classes/Item/a", RequestOptions::new().body(r#"{"score":3}"#))
        .unwrap();
    session
        .delete("https://api.test/1/classes/Item/a", RequestOptions::new().body("ignored"))
        .unwrap();

    let calls = service.calls.lock().unwrap();
    assert_eq!(calls[0].payload.as_deref(), Some(&br#"{"score":3}"#[..]));
    assert!(calls[1].payload.is_none());
}

#[test]
fn callback_runs_after_cookies_are_merged() {
    let service = ScriptedRpc::with(vec![ok_reply(
        "https://api.test/1/login",
        &[("set-cookie", "sid=rpc; Path=/")],
        r#"{"objectId":"u1","createdAt":"2020-01-01T00:00:00.000Z","updatedAt":"2020-01-01T00:00:00.000Z"}"#,
    )]);
    let session = session_over(service);
    let jar = session.cookie_jar();
    let (tx, rx) = mpsc::channel();

    let handle = session
        .request_with_callback(Method::Post, "https://api.test/1/login", RequestOptions::new(), move |outcome| {
            let merged = jar.read().unwrap().get("sid", None, None).unwrap().is_some();
            let mut response = outcome.unwrap();
            let user = codec::decode_response(&mut response, Some("_User")).unwrap();
            tx.send((merged, user)).unwrap();
        })
        .unwrap();
    handle.wait().unwrap();

    let (merged, user) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(merged);
    assert!(matches!(user, codec::WireValue::Entity(ref e) if e.kind == codec::RecordKind::User));
    assert_eq!(session.cookies().get("sid", None, None).unwrap(), Some("rpc"));
}

#[test]
fn platform_failures_are_classified() {
    let service = ScriptedRpc::with(vec![
        Err(RpcError::ResponseTooLarge),
        Err(RpcError::SslCertificate("bad chain".into())),
        Err(RpcError::DeadlineExceeded),
    ]);
    let session = session_over(service);

    let err = session.get("https://api.test/big", RequestOptions::new()).unwrap_err();
    assert!(matches!(err, Error::ResponseTooLarge));
    let err = session.get("https://api.test/tls", RequestOptions::new()).unwrap_err();
    assert!(matches!(err, Error::Ssl(_)));

    let (tx, rx) = mpsc::channel();
    let handle = session
        .request_with_callback(Method::Get, "https://api.test/slow", RequestOptions::new(), move |outcome| {
            tx.send(outcome.map(|r| r.status)).unwrap();
        })
        .unwrap();
    handle.wait().unwrap();
    assert!(matches!(rx.recv().unwrap(), Err(Error::Timeout)));
}

#[test]
fn empty_gzip_error_reply_keeps_the_response() {
    let service = ScriptedRpc::with(vec![reply_with_status(
        404,
        &[("content-encoding", "gzip"), ("set-cookie", "sid=gone; Path=/")],
        b"",
    )]);
    let session = session_over(service);

    let err = session
        .get("https://api.test/1/classes/Item/missing", RequestOptions::new())
        .unwrap_err();
    let Error::Http(http) = err else {
        panic!("expected an HTTP error");
    };
    assert_eq!(http.status(), 404);
    assert_eq!(http.code, Some(404));
    assert_eq!(http.message, "404 Client Error: Not Found");

    let mut response = *http.response;
    assert_eq!(response.content().unwrap(), Some(&b""[..]));
    assert_eq!(session.cookies().get("sid", None, None).unwrap(), Some("gone"));
}

#[test]
fn close_reaches_the_fetch_service() {
    let service = ScriptedRpc::with(Vec::new());
    let session = session_over(service.clone());

    session.close();
    assert!(service.closed.load(Ordering::SeqCst));
}

#[test]
fn invalid_url_never_reaches_the_platform() {
    let service = ScriptedRpc::with(Vec::new());
    let session = session_over(service.clone());

    let err = session
        .request_with_callback(Method::Get, "api.test/x", RequestOptions::new(), |_| {
            panic!("callback must not run");
        })
        .unwrap_err();
    assert!(matches!(err, Error::MissingSchema(_)));
    assert!(service.calls.lock().unwrap().is_empty());
}

#[test]
fn tokio_fetch_service_over_loopback() {
    let server = TestServer::serve(vec![
        reply("200 OK", &[("Content-Type", "text/plain; charset=utf-8")], "small".as_bytes()),
        reply("200 OK", &[], &[b'x'; 64]),
    ]);
    let config = SessionConfig::builder()
        .transport(Transport::SandboxedRpc)
        .max_response_bytes(16)
        .use_system_proxy(false)
        .build()
        .unwrap();
    let session = Session::with_config(config).unwrap();

    let mut response = session.get(&server.url("/small"), RequestOptions::new()).unwrap();
    assert_eq!(response.text().unwrap(), "small");

    let (tx, rx) = mpsc::channel();
    let handle = session
        .request_with_callback(Method::Get, &server.url("/large"), RequestOptions::new(), move |outcome| {
            tx.send(outcome.map(|r| r.status)).unwrap();
        })
        .unwrap();
    handle.wait().unwrap();
    assert!(matches!(rx.recv().unwrap(), Err(Error::ResponseTooLarge)));

    session.close();
    let err = session.get(&server.url("/small"), RequestOptions::new()).unwrap_err();
    assert!(matches!(err, Error::Request(_)));
}
