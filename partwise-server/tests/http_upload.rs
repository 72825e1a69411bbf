//! End-to-end tests over a real socket: HTTP client -> server -> memory store

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Body, Frame};
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use partwise_core::{ObjectKey, UploadConfig};
use partwise_engine::{MemoryStore, ObjectStore, StoreOp, Uploader};
use partwise_server::PartwiseServer;
use sha2::{Digest, Sha256};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

const PART_SIZE: u64 = 64 * 1024;

struct TestServer {
    addr: SocketAddr,
    store: Arc<MemoryStore>,
    _shutdown: oneshot::Sender<()>,
}

async fn start_server() -> TestServer {
    let store = Arc::new(MemoryStore::with_min_part_size(PART_SIZE).recording());
    let shared: Arc<dyn ObjectStore> = store.clone();
    let uploader = Uploader::new(shared, UploadConfig::with_part_size(PART_SIZE)).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    let server = PartwiseServer::new(Arc::new(uploader));
    tokio::spawn(async move {
        server
            .serve_listener(listener, async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });

    TestServer {
        addr,
        store,
        _shutdown: tx,
    }
}

async fn send<B>(addr: SocketAddr, req: Request<B>) -> (StatusCode, serde_json::Value)
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let response = sender.send_request(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

fn test_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

#[tokio::test]
async fn put_with_content_length_round_trips() {
    let server = start_server().await;
    let data = test_data(200_000);

    let req = Request::put("/objects/backups/db.dump")
        .header("host", "localhost")
        .body(Full::new(Bytes::from(data.clone())))
        .unwrap();
    let (status, json) = send(server.addr, req).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["size"], 200_000);
    assert_eq!(json["parts"], 4);

    let stored = server
        .store
        .object(&ObjectKey::new("backups/db.dump").unwrap())
        .unwrap();
    assert_eq!(Sha256::digest(&stored.data), Sha256::digest(&data));
}

#[tokio::test]
async fn chunked_put_streams_to_eof() {
    let server = start_server().await;
    let data = test_data(150_000);

    // Uneven chunks without a Content-Length
    let chunks: Vec<Result<Frame<Bytes>, Infallible>> = data
        .chunks(7_001)
        .map(|chunk| Ok(Frame::data(Bytes::copy_from_slice(chunk))))
        .collect();
    let body = StreamBody::new(futures::stream::iter(chunks));

    let req = Request::put("/objects/stream.bin")
        .header("host", "localhost")
        .body(body)
        .unwrap();
    let (status, json) = send(server.addr, req).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["parts"], 3);

    let stored = server
        .store
        .object(&ObjectKey::new("stream.bin").unwrap())
        .unwrap();
    assert_eq!(&stored.data[..], &data[..]);
}

#[tokio::test]
async fn form_upload_over_socket() {
    let server = start_server().await;
    let data = test_data(70_000);
    let boundary = "----partwise-boundary";

    let mut body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"photo.png\"\r\n\
         Content-Type: image/png\r\n\r\n",
        b = boundary
    )
    .into_bytes();
    body.extend_from_slice(&data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    let req = Request::post("/upload")
        .header("host", "localhost")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Full::new(Bytes::from(body)))
        .unwrap();
    let (status, json) = send(server.addr, req).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["key"], "photo.png");
    assert_eq!(json["parts"], 2);

    let stored = server
        .store
        .object(&ObjectKey::new("photo.png").unwrap())
        .unwrap();
    assert_eq!(&stored.data[..], &data[..]);
}

#[tokio::test]
async fn store_failure_is_reported_and_cleaned_up() {
    let server = start_server().await;
    server
        .store
        .inject(partwise_engine::Fault::permanent(StoreOp::UploadPart).on_part(2));

    let req = Request::put("/objects/fails.bin")
        .header("host", "localhost")
        .body(Full::new(Bytes::from(test_data(100_000))))
        .unwrap();
    let (status, json) = send(server.addr, req).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["kind"], "part_upload");
    assert_eq!(server.store.count(StoreOp::Abort), 1);
    assert_eq!(server.store.count(StoreOp::Complete), 0);
    assert_eq!(server.store.pending_uploads(), 0);
}

#[tokio::test]
async fn health_over_socket() {
    let server = start_server().await;

    let req = Request::get("/health")
        .header("host", "localhost")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let (status, json) = send(server.addr, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["part_size"], PART_SIZE);
}
