//! Live socket tests against a real listener.
//!
//! The client side speaks just enough of the websocket protocol to upgrade
//! and read unmasked text frames from the server.

use axum::Router;
use axum::http::StatusCode;
use hotserve::build::{BuildPlugin, EventSink};
use hotserve::{
    BuildEvent, BuildResult, Compiler, DevServer, DevServerOptions, OutputFileSystem, Stats,
    TargetConfig,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct ScriptedCompiler {
    sink: Mutex<Option<EventSink>>,
}

impl ScriptedCompiler {
    fn finish(&self, hash: &str) {
        let result = BuildResult::Single(Stats {
            target: TargetConfig::new("/out"),
            hash: hash.to_string(),
            built_at: Some(1_700_000_000_000),
            time: Some(3),
            errors: Vec::new(),
            warnings: Vec::new(),
        });
        let sink = self.sink.lock();
        sink.as_ref()
            .expect("compiler is not watching")
            .send(BuildEvent::Done(Arc::new(result)))
            .expect("tracker is gone");
    }
}

impl Compiler for ScriptedCompiler {
    fn targets(&self) -> Vec<TargetConfig> {
        vec![TargetConfig::new("/out")]
    }

    fn set_output_file_system(&self, _fs: Arc<dyn OutputFileSystem>) {}

    fn apply_plugin(&self, _target: Option<usize>, _plugin: BuildPlugin) {}

    fn watch(&self, sink: EventSink) -> hotserve::Result<()> {
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn invalidate(&self) {}

    fn close(&self) {}
}

async fn listen() -> (Arc<ScriptedCompiler>, DevServer, SocketAddr) {
    let compiler = Arc::new(ScriptedCompiler::default());
    let server = DevServer::new(compiler.clone(), DevServerOptions::default()).unwrap();
    let app = server.layer(Router::new().fallback(|| async { StatusCode::NOT_FOUND }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (compiler, server, addr)
}

/// Open a socket on `path` and complete the upgrade handshake.
async fn connect(addr: SocketAddr, path: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let handshake = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {addr}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         \r\n"
    );
    stream.write_all(handshake.as_bytes()).await.unwrap();

    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        head.push(stream.read_u8().await.unwrap());
    }
    let head = String::from_utf8(head).unwrap();
    assert!(head.starts_with("HTTP/1.1 101"), "unexpected handshake: {head}");
    assert!(
        head.to_ascii_lowercase()
            .contains("sec-websocket-accept: s3pplmbitxaq9kygzzhzrbk+xoo="),
        "unexpected handshake: {head}"
    );

    stream
}

/// Read one text frame and decode its JSON body.
async fn next_frame(stream: &mut TcpStream) -> Value {
    let read = async {
        let first = stream.read_u8().await.unwrap();
        assert_eq!(first, 0x81, "expected a final text frame");

        let second = stream.read_u8().await.unwrap();
        assert_eq!(second & 0x80, 0, "server frames are not masked");
        let len = match second & 0x7f {
            126 => u64::from(stream.read_u16().await.unwrap()),
            127 => stream.read_u64().await.unwrap(),
            len => u64::from(len),
        };

        let mut payload = vec![0; usize::try_from(len).unwrap()];
        stream.read_exact(&mut payload).await.unwrap();
        serde_json::from_slice(&payload).unwrap()
    };
    tokio::time::timeout(TIMEOUT, read).await.expect("frame")
}

async fn wait_for_connections(server: &DevServer, count: usize) {
    let hub = server.hub().expect("hot reload is enabled");
    tokio::time::timeout(TIMEOUT, async {
        while hub.connection_count() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {count} connections, have {}", hub.connection_count()));
}

#[tokio::test]
async fn test_build_status_reaches_live_socket() {
    let (compiler, server, addr) = listen().await;

    let mut client = connect(addr, "/hot").await;
    wait_for_connections(&server, 1).await;

    compiler.finish("abc123");

    let hash = next_frame(&mut client).await;
    assert_eq!(hash["action"], "hash");
    assert_eq!(hash["payload"]["hash"], "abc123");

    let ok = next_frame(&mut client).await;
    assert_eq!(ok["action"], "ok");
    assert!(ok["payload"]["timestamp"].is_i64());

    drop(client);
    wait_for_connections(&server, 0).await;
}

#[tokio::test]
async fn test_late_socket_receives_replay() {
    let (compiler, server, addr) = listen().await;

    compiler.finish("def456");
    server.wait_ready().await;
    assert!(server.hub().and_then(|hub| hub.stats()).is_some());

    let mut client = connect(addr, "/hot").await;

    let hash = next_frame(&mut client).await;
    assert_eq!(hash["action"], "hash");
    assert_eq!(hash["payload"]["hash"], "def456");
    assert_eq!(next_frame(&mut client).await["action"], "ok");

    server.close();
    wait_for_connections(&server, 0).await;
}
