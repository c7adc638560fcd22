use http::StatusCode;
use keel::{Config, Container, Context, DispatchBuilder, Route, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

fn greet(ctx: &mut Context) {
    let name = ctx.path_param("name").to_owned();
    ctx.respond_with_json(StatusCode::OK, &format!("hello {name}"));
}

async fn roundtrip(addr: std::net::SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn serves_requests_and_drains_on_shutdown() {
    let dispatcher = DispatchBuilder::new(Container::new(), Config::default())
        .route(Route::get("/greet/{name}", greet))
        .build()
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();

    let server = tokio::spawn(Server::bind(addr).serve_listener(listener, dispatcher, async {
        let _ = stopped.await;
    }));

    let ok = roundtrip(addr, "GET /greet/ada HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n").await;
    assert!(ok.starts_with("HTTP/1.1 200 OK"), "{ok}");
    assert!(ok.to_ascii_lowercase().contains("correlation-id: "), "{ok}");
    assert!(ok.ends_with("\"hello ada\""), "{ok}");

    let missing = roundtrip(addr, "GET /nope HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n").await;
    assert!(missing.starts_with("HTTP/1.1 404 Not Found"), "{missing}");

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}

async fn start(limit: usize) -> (std::net::SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<Result<(), keel::Error>>) {
    let dispatcher = DispatchBuilder::new(Container::new(), Config::default())
        .route(Route::post("/greet/{name}", greet))
        .build()
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();

    let server = tokio::spawn(Server::bind(addr).body_limit(limit).serve_listener(listener, dispatcher, async {
        let _ = stopped.await;
    }));

    (addr, stop, server)
}

#[tokio::test]
async fn declared_length_over_the_limit_is_refused_unread() {
    let (addr, stop, server) = start(1024).await;

    let response = roundtrip(
        addr,
        "POST /greet/ada HTTP/1.1\r\nHost: test\r\nContent-Type: application/json\r\nContent-Length: 5000000000\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 413 Payload Too Large"), "{response}");
    assert!(response.contains("/http/request-entity-too-large"), "{response}");
    assert!(response.contains(r#""contentLength":5000000000,"maximumContentLength":1024"#), "{response}");

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn streamed_body_over_the_limit_is_refused() {
    let (addr, stop, server) = start(16).await;

    let chunk = "x".repeat(40);
    let raw = format!(
        "POST /greet/ada HTTP/1.1\r\nHost: test\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n{:x}\r\n{chunk}\r\n0\r\n\r\n",
        chunk.len()
    );
    let response = roundtrip(addr, &raw).await;

    assert!(response.starts_with("HTTP/1.1 413 Payload Too Large"), "{response}");
    assert!(response.contains(r#""contentLength":17,"maximumContentLength":16"#), "{response}");

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}
