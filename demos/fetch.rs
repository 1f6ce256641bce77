use std::sync::mpsc;
use std::time::Duration;

use baas_transport::config::{SessionConfig, Transport};
use baas_transport::{codec, Method, RequestOptions, Session};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/json".to_string());
    let transport = match std::env::args().nth(2).as_deref() {
        Some("sandbox") => Transport::SandboxedRpc,
        _ => Transport::Direct,
    };

    // Application credentials go in as plain default headers.
    let config = SessionConfig::builder()
        .user_agent("baas-transport-demo/0.1")
        .timeout(Duration::from_secs(20))
        .transport(transport)
        .build()?;
    let session = Session::with_config(config)?;

    // Synchronous request: blocks until the body has been read.
    let mut response = session.get(&url, RequestOptions::new())?;
    println!("{} {} in {:?}", response.status, response.reason, response.elapsed);
    match codec::decode_response(&mut response, None) {
        Ok(value) => println!("{}", codec::encode_to_string(&value)?),
        Err(e) => println!("body is not JSON ({e}): {} bytes", response.content()?.map_or(0, <[u8]>::len)),
    }

    // Callback request: the outcome arrives on another thread.
    let (tx, rx) = mpsc::channel();
    let handle = session.request_with_callback(Method::Get, &url, RequestOptions::new(), move |outcome| {
        let summary = match outcome {
            Ok(response) => format!("callback got {}", response.status),
            Err(e) => format!("callback failed: {e}"),
        };
        let _ = tx.send(summary);
    })?;
    handle.wait()?;
    println!("{}", rx.recv()?);

    for cookie in &session.cookies() {
        println!("cookie {}={} ({}{})", cookie.name, cookie.value, cookie.domain, cookie.path);
    }

    session.close();
    Ok(())
}
