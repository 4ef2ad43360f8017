//! End-to-end tests for dRPC over real Unix domain sockets.
//!
//! Each test runs a [`DomainSocketServer`] in a temporary socket directory and
//! talks to it through the public client API.

use async_trait::async_trait;
use drpc_core::message::{marshal, unmarshal};
use drpc_core::{
    make_call, server_socket_path, unimplemented_method, CancellationToken, Call,
    ClientConnection, DaosStatus, DomainSocketClient, DomainSocketServer, DrpcConfig, DrpcError,
    Method, Module, ModuleId, Request, Result, RetryableRequest, ServerState, Session, Status,
    StatusResponse,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Management module used by the tests.
///
/// `PING_RANK` echoes its body. `POOL_CREATE` reports `DER_BUSY` for the
/// first `busy_replies` calls and success afterwards. `SMD_DEVS` replies with
/// a body too large for one message.
#[derive(Clone, Default)]
struct TestMgmtModule {
    pool_creates: Arc<AtomicUsize>,
    busy_replies: usize,
}

#[async_trait]
impl Module for TestMgmtModule {
    fn id(&self) -> ModuleId {
        ModuleId::MGMT
    }

    async fn handle_call(&self, _session: &Session, method: Method, body: &[u8]) -> Result<Vec<u8>> {
        match method {
            Method::PING_RANK => Ok(body.to_vec()),
            Method::POOL_CREATE => {
                let _req: serde_json::Value = unmarshal(body)?;
                let seen = self.pool_creates.fetch_add(1, Ordering::SeqCst);
                let status = if seen < self.busy_replies {
                    DaosStatus::BUSY
                } else {
                    DaosStatus::SUCCESS
                };
                marshal(&StatusResponse::new(status))
            }
            Method::SMD_DEVS => Ok(vec![b'd'; DrpcConfig::MAX_MSG_SIZE]),
            other => Err(unimplemented_method(other)),
        }
    }
}

struct TestEnv {
    _dir: TempDir,
    server: DomainSocketServer,
}

fn start_server(module: TestMgmtModule) -> TestEnv {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut server = DomainSocketServer::new(server_socket_path(dir.path())).unwrap();
    server.register_module(module).unwrap();
    server.start().unwrap();
    TestEnv { _dir: dir, server }
}

#[tokio::test]
async fn test_echo_sequence_increments_per_send() {
    let env = start_server(TestMgmtModule::default());
    let mut client = ClientConnection::new(env.server.socket_path());
    client.connect().await.unwrap();

    for expected in 1..=3 {
        let body = format!("ping {}", expected).into_bytes();
        let mut call = Call::new(Method::PING_RANK, body.clone());
        let resp = client.send_msg(&mut call).await.unwrap();

        assert_eq!(call.sequence, expected);
        assert_eq!(resp.sequence, expected);
        assert_eq!(resp.status, Status::Success);
        assert_eq!(resp.body, body);
    }

    client.close().unwrap();
}

#[tokio::test]
async fn test_unknown_module_then_valid_call_on_same_connection() {
    let env = start_server(TestMgmtModule::default());
    let mut client = ClientConnection::new(env.server.socket_path());
    client.connect().await.unwrap();

    let mut call = Call::new(Method::NOTIFY_READY, Vec::new());
    let resp = client.send_msg(&mut call).await.unwrap();
    assert_eq!(resp.status, Status::UnknownModule);

    let mut call = Call {
        module: ModuleId::MGMT.id(),
        method: 299,
        sequence: 0,
        body: Vec::new(),
    };
    let resp = client.send_msg(&mut call).await.unwrap();
    assert_eq!(resp.status, Status::UnknownMethod);

    let mut call = Call::new(Method::PING_RANK, b"alive".to_vec());
    let resp = client.send_msg(&mut call).await.unwrap();
    assert_eq!(resp.status, Status::Success);
    assert_eq!(resp.body, b"alive");
    assert_eq!(resp.sequence, 3);
}

#[tokio::test]
async fn test_large_bodies() {
    let env = start_server(TestMgmtModule::default());
    let mut client = ClientConnection::new(env.server.socket_path());
    client.connect().await.unwrap();

    let body = vec![0x5a; 9000];
    let mut call = Call::new(Method::PING_RANK, body.clone());
    let resp = client.send_msg(&mut call).await.unwrap();
    assert_eq!(resp.status, Status::Success);
    assert_eq!(resp.body, body);

    // An oversized reply is reported, not sent.
    let mut call = Call::new(Method::SMD_DEVS, Vec::new());
    let resp = client.send_msg(&mut call).await.unwrap();
    assert_eq!(resp.status, Status::FailedMarshal);
    assert_eq!(resp.sequence, call.sequence);

    let mut call = Call::new(Method::PING_RANK, b"still usable".to_vec());
    let resp = client.send_msg(&mut call).await.unwrap();
    assert_eq!(resp.body, b"still usable");
}

#[tokio::test]
async fn test_connect_to_missing_socket_fails() {
    let dir = TempDir::new().unwrap();
    let mut client = ClientConnection::new(dir.path().join("daos_engine_0.sock"));

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, DrpcError::Connect { .. }));
    assert!(!err.is_temporary());
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_shutdown_without_sessions() {
    let mut env = start_server(TestMgmtModule::default());
    assert_eq!(env.server.state(), ServerState::Started);

    env.server.shutdown();
    tokio::time::timeout(Duration::from_secs(2), env.server.wait_stopped())
        .await
        .expect("accept loop should exit");
    assert_eq!(env.server.state(), ServerState::Stopped);
    assert_eq!(env.server.session_count(), 0);

    let mut client = ClientConnection::new(env.server.socket_path());
    assert!(client.connect().await.is_err());
}

#[tokio::test]
async fn test_live_session_survives_shutdown() {
    let mut env = start_server(TestMgmtModule::default());
    let mut client = ClientConnection::new(env.server.socket_path());
    client.connect().await.unwrap();

    let mut call = Call::new(Method::PING_RANK, Vec::new());
    client.send_msg(&mut call).await.unwrap();

    env.server.shutdown();
    env.server.wait_stopped().await;

    // Existing sessions keep running until their connection ends.
    let mut call = Call::new(Method::PING_RANK, b"after".to_vec());
    let resp = client.send_msg(&mut call).await.unwrap();
    assert_eq!(resp.body, b"after");
}

#[tokio::test]
async fn test_concurrent_sessions() {
    let env = start_server(TestMgmtModule::default());

    let mut tasks = Vec::new();
    for i in 0..8 {
        let path = env.server.socket_path().to_path_buf();
        tasks.push(tokio::spawn(async move {
            let mut client = ClientConnection::new(path);
            client.connect().await.unwrap();
            for _ in 0..5 {
                let body = format!("client {}", i).into_bytes();
                let mut call = Call::new(Method::PING_RANK, body.clone());
                let resp = client.send_msg(&mut call).await.unwrap();
                assert_eq!(resp.body, body);
            }
            client.close().unwrap();
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_make_call_against_server() {
    let env = start_server(TestMgmtModule::default());
    let client = DomainSocketClient::new(env.server.socket_path());
    let cancel = CancellationToken::new();

    let resp = make_call(
        &cancel,
        &client,
        Method::PING_RANK,
        &Request::Plain(serde_json::json!({"rank": 0})),
    )
    .await
    .unwrap();
    let body: serde_json::Value = resp.decode_body().unwrap();
    assert_eq!(body["rank"], 0);
    assert!(!client.lock().await.is_connected());

    let err = make_call(&cancel, &client, Method::LIST_POOLS, &Request::<()>::Empty)
        .await
        .unwrap_err();
    assert!(matches!(err, DrpcError::BadResponseStatus(Status::UnknownMethod)));
}

#[tokio::test]
async fn test_make_call_retries_busy_engine() {
    let module = TestMgmtModule {
        busy_replies: 2,
        ..Default::default()
    };
    let creates = module.pool_creates.clone();
    let env = start_server(module);
    let client = DomainSocketClient::new(env.server.socket_path());

    let request = RetryableRequest::new(serde_json::json!({"uuid": "p1"}), [DaosStatus::BUSY])
        .with_retry_after(Duration::from_millis(10));
    let resp = make_call(
        &CancellationToken::new(),
        &client,
        Method::POOL_CREATE,
        &request.into(),
    )
    .await
    .unwrap();

    assert_eq!(StatusResponse::from_body(&resp.body), Some(DaosStatus::SUCCESS));
    assert_eq!(creates.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_make_call_without_server() {
    let dir = TempDir::new().unwrap();
    let client = DomainSocketClient::new(dir.path().join("daos_engine_0.sock"));

    let err = make_call(
        &CancellationToken::new(),
        &client,
        Method::PING_RANK,
        &Request::<()>::Empty,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DrpcError::DataPlaneNotStarted { .. }));
}
