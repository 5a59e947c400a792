use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

lazy_static! {
    pub static ref EVENTS_DISPATCHED: IntCounterVec = IntCounterVec::new(
        Opts::new("informer_events_dispatched_total", "Events applied to the local store"),
        &["kind", "event"]
    )
    .expect("metric can not be created");

    pub static ref HANDLER_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("informer_handler_failures_total", "Handler invocations that failed or panicked"),
        &["kind", "event"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_RESTARTS: IntCounterVec = IntCounterVec::new(
        Opts::new("informer_watch_restarts_total", "Watch or list failures, by reason"),
        &["kind", "reason"]
    )
    .expect("metric can not be created");

    pub static ref RELISTS: IntCounterVec = IntCounterVec::new(
        Opts::new("informer_relists_total", "Relists after the initial list"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref QUEUE_DEPTH: IntGaugeVec = IntGaugeVec::new(
        Opts::new("informer_queue_depth", "Keys with a pending delta"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

fn register_custom_metrics() {
    REGISTER.call_once(|| {
        let collectors: [Box<dyn prometheus::core::Collector>; 5] = [
            Box::new(EVENTS_DISPATCHED.clone()),
            Box::new(HANDLER_FAILURES.clone()),
            Box::new(WATCH_RESTARTS.clone()),
            Box::new(RELISTS.clone()),
            Box::new(QUEUE_DEPTH.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                error!("collector can not be registered: {e}");
            }
        }
    });
}

/// Text exposition of every informer metric.
pub fn render() -> String {
    register_custom_metrics();

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {e}");
    }
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {e}");
            String::default()
        }
    }
}

/// Serves `/metrics` until `shutdown` fires.
pub async fn start_server(
    port: u16,
    shutdown: CancellationToken,
) {
    register_custom_metrics();

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);
    let bound = warp::serve(metrics_route).try_bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
        shutdown.cancelled().await;
    });
    match bound {
        Ok((addr, server)) => {
            info!(%addr, "metrics endpoint listening");
            server.await;
        }
        Err(e) => error!(port, "metrics endpoint could not bind: {e}"),
    }
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(render())
}
