//! Prometheus metrics for the proxy, scraped over a plain HTTP endpoint.

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::OnceLock;

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

pub struct Metrics {
    pub registry: Registry,

    // Connection metrics
    pub connections_total: IntCounter,
    pub connections_active: IntGauge,
    pub connections_closed: IntCounter,

    // Query metrics
    pub queries_total: IntCounterVec,
    pub query_duration_seconds: HistogramVec,
    pub query_errors_total: IntCounterVec,

    // Routing metrics
    pub queries_routed_total: IntCounterVec,
    pub scatter_queries_total: IntCounter,

    // Backend health
    pub health_check_total: IntCounterVec,
    pub backend_up: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let connections_total = IntCounter::new(
            "artemis_connections_total",
            "Total number of client connections accepted",
        )
        .unwrap();

        let connections_active = IntGauge::new(
            "artemis_connections_active",
            "Current number of active client connections",
        )
        .unwrap();

        let connections_closed = IntCounter::new(
            "artemis_connections_closed_total",
            "Total number of client connections closed",
        )
        .unwrap();

        let queries_total = IntCounterVec::new(
            Opts::new("artemis_queries_total", "Total number of queries processed"),
            &["type"],
        )
        .unwrap();

        let query_duration_seconds = HistogramVec::new(
            HistogramOpts::new("artemis_query_duration_seconds", "Query latency in seconds")
                .buckets(vec![
                    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
                    5.0, 10.0,
                ]),
            &["type", "group"],
        )
        .unwrap();

        let query_errors_total = IntCounterVec::new(
            Opts::new("artemis_query_errors_total", "Total number of query errors"),
            &["type"],
        )
        .unwrap();

        let queries_routed_total = IntCounterVec::new(
            Opts::new(
                "artemis_queries_routed_total",
                "Total number of queries routed by target",
            ),
            &["target"],
        )
        .unwrap();

        let scatter_queries_total = IntCounter::new(
            "artemis_scatter_queries_total",
            "Total number of fan-out (multi-group) queries",
        )
        .unwrap();

        let health_check_total = IntCounterVec::new(
            Opts::new(
                "artemis_health_check_total",
                "Total number of health probes by result",
            ),
            &["result"],
        )
        .unwrap();

        let backend_up = IntGaugeVec::new(
            Opts::new("artemis_backend_up", "Whether a backend is UP (1) or DOWN (0)"),
            &["addr"],
        )
        .unwrap();

        registry
            .register(Box::new(connections_total.clone()))
            .unwrap();
        registry
            .register(Box::new(connections_active.clone()))
            .unwrap();
        registry
            .register(Box::new(connections_closed.clone()))
            .unwrap();
        registry.register(Box::new(queries_total.clone())).unwrap();
        registry
            .register(Box::new(query_duration_seconds.clone()))
            .unwrap();
        registry
            .register(Box::new(query_errors_total.clone()))
            .unwrap();
        registry
            .register(Box::new(queries_routed_total.clone()))
            .unwrap();
        registry
            .register(Box::new(scatter_queries_total.clone()))
            .unwrap();
        registry
            .register(Box::new(health_check_total.clone()))
            .unwrap();
        registry.register(Box::new(backend_up.clone())).unwrap();

        Self {
            registry,
            connections_total,
            connections_active,
            connections_closed,
            queries_total,
            query_duration_seconds,
            query_errors_total,
            queries_routed_total,
            scatter_queries_total,
            health_check_total,
            backend_up,
        }
    }

    pub fn record_query(&self, query_type: &str, group: &str, duration_secs: f64) {
        self.queries_total.with_label_values(&[query_type]).inc();
        self.query_duration_seconds
            .with_label_values(&[query_type, group])
            .observe(duration_secs);
    }

    pub fn record_query_error(&self, error_type: &str) {
        self.query_errors_total
            .with_label_values(&[error_type])
            .inc();
    }

    pub fn record_connection_accepted(&self) {
        self.connections_total.inc();
        self.connections_active.inc();
    }

    pub fn record_connection_closed(&self) {
        self.connections_active.dec();
        self.connections_closed.inc();
    }

    pub fn record_route(&self, target: &str, is_scatter: bool) {
        self.queries_routed_total.with_label_values(&[target]).inc();
        if is_scatter {
            self.scatter_queries_total.inc();
        }
    }

    pub fn record_health_check(&self, result: &str) {
        self.health_check_total.with_label_values(&[result]).inc();
    }

    pub fn set_backend_up(&self, addr: &str, up: bool) {
        self.backend_up
            .with_label_values(&[addr])
            .set(if up { 1 } else { 0 });
    }

    /// Render everything in Prometheus text format
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(addr: &str) -> anyhow::Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tracing::{error, info};

    async fn handle_request(
        req: Request<hyper::body::Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        match req.uri().path() {
            "/metrics" => {
                let body = metrics().gather();
                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                    .body(Full::new(Bytes::from(body)))
                    .unwrap())
            }
            "/health" => Ok(Response::builder()
                .status(StatusCode::OK)
                .body(Full::new(Bytes::from("OK")))
                .unwrap()),
            _ => Ok(Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Full::new(Bytes::from("Not Found")))
                .unwrap()),
        }
    }

    let addr: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "metrics server listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!(error = %e, "metrics connection error");
            }
        });
    }
}
