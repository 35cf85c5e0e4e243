//! Startup and graceful shutdown behaviour of the dual listener.

mod common;

use auth_service::config::StartupPolicy;
use auth_service::grpc::{proto::auth::HealthRequest, AuthServiceImpl};
use auth_service::server::{GatewayListener, GatewayOptions, RpcListener};
use common::{free_port, port_is_closed, SlowAuthService, TestApp, EXPECTED_HEALTH_JSON};
use service_core::grpc::GrpcServerBuilder;
use service_core::shutdown::{ShutdownReason, ShutdownSignal};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn idle_shutdown_is_prompt_and_clean() {
    let app = TestApp::spawn().await;

    // Leave a pooled keep-alive connection open on the gateway.
    let client = reqwest::Client::new();
    let response = client.get(app.http_url("/api/v1/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let (grpc_port, http_port) = (app.grpc_port, app.http_port);
    let started = Instant::now();
    let report = app.stop().await;

    assert!(report.is_clean(), "unexpected report: {report:?}");
    assert_eq!(report.reason, Some(ShutdownReason::Requested));
    assert!(started.elapsed() < Duration::from_secs(5));

    assert!(port_is_closed(grpc_port).await);
    assert!(port_is_closed(http_port).await);
}

#[tokio::test]
async fn in_flight_http_request_finishes_within_timeout() {
    let app = TestApp::spawn_with(
        SlowAuthService {
            delay: Duration::from_millis(300),
        },
        |config| config.gateway_shutdown_timeout = Duration::from_secs(3),
    )
    .await;

    let url = app.http_url("/api/v1/health");
    let request = tokio::spawn(async move { reqwest::get(url).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let report = app.stop().await;

    let response = request.await.unwrap().expect("in-flight request should complete");
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), EXPECTED_HEALTH_JSON);
    assert!(report.is_clean(), "unexpected report: {report:?}");
}

#[tokio::test]
async fn slow_http_request_is_cut_off_at_timeout() {
    let delay = Duration::from_secs(5);
    let app = TestApp::spawn_with(SlowAuthService { delay }, |config| {
        config.gateway_shutdown_timeout = Duration::from_millis(200)
    })
    .await;

    let url = app.http_url("/api/v1/health");
    let request = tokio::spawn(async move { reqwest::get(url).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = Instant::now();
    let report = app.stop().await;

    assert!(started.elapsed() < Duration::from_secs(4));
    match &report.gateway {
        Err(err) => assert!(err.is_shutdown_timeout(), "unexpected error: {err}"),
        Ok(()) => panic!("gateway should report a shutdown timeout"),
    }
    assert!(request.await.unwrap().is_err(), "connection should be closed");
}

#[tokio::test]
async fn in_flight_grpc_call_is_drained() {
    let app = TestApp::spawn_with(
        SlowAuthService {
            delay: Duration::from_millis(300),
        },
        |_| {},
    )
    .await;

    let mut client = app.grpc_client().await;
    let call = tokio::spawn(async move { client.health(HealthRequest {}).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let report = app.stop().await;

    let response = call.await.unwrap().expect("in-flight call should complete");
    assert_eq!(response.into_inner().status, "OK");
    assert!(report.rpc.is_ok(), "unexpected report: {report:?}");
}

#[tokio::test]
async fn rpc_bind_failure_leaves_process_running() {
    // Accepts TCP into its backlog but never speaks HTTP/2.
    let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let occupied = holder.local_addr().unwrap().port();

    let app = TestApp::spawn_unchecked(AuthServiceImpl::new(), |config| {
        config.grpc_port = occupied;
        config.gateway_dial_timeout = Duration::from_millis(300);
        config.startup_policy = StartupPolicy::Independent;
    });
    let http_port = app.http_port;

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!app.is_finished(), "server should keep running");
    assert!(port_is_closed(http_port).await, "gateway must not bind without a live upstream");

    let report = app.stop().await;
    match &report.rpc {
        Err(err) => assert!(err.is_bind(), "unexpected error: {err}"),
        Ok(()) => panic!("gRPC listener should have failed to bind"),
    }
    match &report.gateway {
        Err(err) => assert!(err.is_dial(), "unexpected error: {err}"),
        Ok(()) => panic!("gateway should have failed to dial"),
    }
    drop(holder);
}

#[tokio::test]
async fn all_or_nothing_stops_on_startup_failure() {
    let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let occupied = holder.local_addr().unwrap().port();

    let app = TestApp::spawn_unchecked(AuthServiceImpl::new(), |config| {
        config.grpc_port = occupied;
        config.startup_policy = StartupPolicy::AllOrNothing;
    });

    let report = app.join().await;

    assert_eq!(report.reason, Some(ShutdownReason::StartupFailure));
    assert!(report.rpc.as_ref().is_err_and(|e| e.is_bind()));
    drop(holder);
}

#[tokio::test]
async fn gateway_dial_failure_never_binds() {
    let dead_port = free_port();
    let http_port = free_port();

    let result = GatewayListener::start(
        ([127, 0, 0, 1], http_port).into(),
        &format!("http://127.0.0.1:{}", dead_port),
        GatewayOptions::default(),
        ShutdownSignal::new(),
    )
    .await;

    match result {
        Err(err) => assert!(err.is_dial(), "unexpected error: {err}"),
        Ok(_) => panic!("dial to a closed port should fail"),
    }
    assert!(port_is_closed(http_port).await);
}

#[tokio::test]
async fn signal_before_gateway_start_is_clean() {
    let app = TestApp::spawn_unchecked(AuthServiceImpl::new(), |_| {});
    let report = app.stop().await;

    assert_eq!(report.reason, Some(ShutdownReason::Requested));
    assert!(report.gateway.is_ok());
}

#[tokio::test]
async fn gateway_rejects_upstream_that_is_not_grpc() {
    let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let silent = holder.local_addr().unwrap();
    let http_port = free_port();

    let started = Instant::now();
    let result = GatewayListener::start(
        ([127, 0, 0, 1], http_port).into(),
        &format!("http://{}", silent),
        GatewayOptions {
            connect_timeout: Duration::from_millis(300),
            ..Default::default()
        },
        ShutdownSignal::new(),
    )
    .await;

    match result {
        Err(err) => assert!(err.is_dial(), "unexpected error: {err}"),
        Ok(_) => panic!("dial to a silent socket should fail"),
    }
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(port_is_closed(http_port).await);
    drop(holder);
}

#[tokio::test]
async fn listeners_on_ephemeral_ports_serve_health() {
    let loopback: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let shutdown = ShutdownSignal::new();

    let rpc = RpcListener::start(
        GrpcServerBuilder::new("auth-service").with_reflection(false),
        loopback,
        Arc::new(AuthServiceImpl::new()),
        shutdown.clone(),
    )
    .await
    .expect("gRPC listener should start");

    let gateway = GatewayListener::start(
        loopback,
        &format!("http://{}", rpc.local_addr()),
        GatewayOptions::default(),
        shutdown.clone(),
    )
    .await
    .expect("gateway should start");
    assert_ne!(gateway.local_addr().port(), 0);

    let response = reqwest::get(format!("http://{}/api/v1/health", gateway.local_addr()))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), EXPECTED_HEALTH_JSON);

    shutdown.trigger(ShutdownReason::Requested);
    let (rpc, gateway) = tokio::join!(rpc.shutdown(), gateway.shutdown(Duration::from_secs(2)));
    assert!(rpc.is_ok(), "unexpected rpc result: {rpc:?}");
    assert!(gateway.is_ok(), "unexpected gateway result: {gateway:?}");
}
