//! Demo harness binary: drives `ec_aggregate` against in-memory mock
//! adapters on a timer, exposing the same health/metrics endpoints the
//! teacher's `main.rs` does. Not the aggregation engine's production
//! entry point — that is the library function `ec_aggregate`
//! (spec.md §6, "the aggregation core is not a CLI").

use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use clap::Parser;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

use ec_aggregate::config::{init_logging, Args};
use ec_aggregate::driver::{AggregationDriver, CancellationToken};
use ec_aggregate::metrics::AggregationMetrics;
use ec_aggregate::model::{ObjectClass, ObjectId};
use ec_aggregate::ports::PoolContainerHandles;
use ec_aggregate::test_support::{
    MockArrayStore, MockLeadershipOracle, MockObjectIterator, MockPeerRpcClient,
    MockRemoteObjectStore,
};

#[tokio::main]
async fn main() -> ec_aggregate::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    info!("starting EC aggregation harness");

    let handles = PoolContainerHandles {
        pool_uuid: Uuid::new_v4(),
        coh_uuid: Uuid::new_v4(),
        cont_uuid: Uuid::new_v4(),
        svc_ranks: vec![0],
        pool_map_version: 1,
    };

    let oca = ObjectClass::new(4, 1, 8, 1)
        .map_err(|e| ec_aggregate::Error::Config(e.to_string()))?;
    let oid = ObjectId::new(Uuid::new_v4(), 4);
    let iterator = MockObjectIterator::new().with_object(oid, oca);

    let store = MockArrayStore::new();
    let remote = MockRemoteObjectStore::default();
    let rpc = MockPeerRpcClient::default();
    let leadership = MockLeadershipOracle::default();
    let metrics =
        AggregationMetrics::new().map_err(|e| ec_aggregate::Error::Config(e.to_string()))?;
    let cancel = CancellationToken::new();

    let metrics_addr: SocketAddr = args
        .metrics_addr
        .parse()
        .map_err(|e| ec_aggregate::Error::Config(format!("invalid metrics_addr: {e}")))?;
    let health_addr: SocketAddr = args
        .health_addr
        .parse()
        .map_err(|e| ec_aggregate::Error::Config(format!("invalid health_addr: {e}")))?;

    let metrics_registry = metrics.registry().clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(health_addr).await {
            error!(error = %e, "health server exited");
        }
    });
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(metrics_addr, metrics_registry).await {
            error!(error = %e, "metrics server exited");
        }
    });

    loop {
        let driver = AggregationDriver {
            handles: &handles,
            iterator: &iterator,
            store: &store,
            remote: &remote,
            rpc: &rpc,
            leadership: &leadership,
            metrics: Some(&metrics),
            cancel: cancel.clone(),
        };

        match ec_aggregate::ec_aggregate(&driver, (args.epoch_lo, args.epoch_hi)).await {
            Ok(report) => info!(?report, "aggregation pass complete"),
            Err(e) => error!(error = %e, "aggregation pass failed fatally"),
        }

        if args.once {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_secs(args.poll_interval_seconds)).await;
    }

    Ok(())
}

async fn run_health_server(addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "health server listening");
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        tokio::spawn(async move {
            let service = service_fn(|_req: Request<Incoming>| async {
                Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(b"ok"))))
            });
            if let Err(err) = hyper::server::conn::http1::Builder::new()
                .serve_connection(io, service)
                .await
            {
                error!(error = %err, "health connection error");
            }
        });
    }
}

async fn run_metrics_server(
    addr: SocketAddr,
    registry: prometheus::Registry,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "metrics server listening");
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let registry = registry.clone();
        tokio::spawn(async move {
            let service = service_fn(move |_req: Request<Incoming>| {
                let registry = registry.clone();
                async move {
                    use prometheus::Encoder;
                    let encoder = prometheus::TextEncoder::new();
                    let families = registry.gather();
                    let mut buf = Vec::new();
                    let _ = encoder.encode(&families, &mut buf);
                    Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(buf))))
                }
            });
            if let Err(err) = hyper::server::conn::http1::Builder::new()
                .serve_connection(io, service)
                .await
            {
                error!(error = %err, "metrics connection error");
            }
        });
    }
}
