use std::net::SocketAddr;

use actix_web::{
    get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use clap::Parser;
use kube::Client;
use prometheus::{Encoder, TextEncoder};
use tokio::time::Duration;
use tracing::*;

use pubsubplus_operator::controllers::{eventbroker, State};
use pubsubplus_operator::telemetry::{self, LogFormat};
use pubsubplus_operator::Metrics;

#[derive(Debug, clap::Parser)]
struct Arguments {
    /// Address the metrics and health server listens on
    #[arg(long = "bind-address", env = "BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    bind_address: SocketAddr,

    /// Seconds to wait before retrying a failed reconcile
    #[arg(
        long = "error-requeue-seconds",
        env = "ERROR_REQUEUE_SECONDS",
        default_value_t = 30
    )]
    error_requeue_seconds: u64,

    /// Seconds to wait after scaling a broker StatefulSet before checking it again
    #[arg(
        long = "scale-requeue-seconds",
        env = "SCALE_REQUEUE_SECONDS",
        default_value_t = 60
    )]
    scale_requeue_seconds: u64,

    /// Format of the log lines written to stdout
    #[arg(long = "log-format", env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let metrics = c.metrics();
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    match encoder.encode(&metrics, &mut buffer) {
        Ok(()) => HttpResponse::Ok().body(buffer),
        Err(err) => {
            error!("Failed to encode metrics: {err}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[get("/")]
async fn index(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Arguments = Arguments::parse();

    telemetry::init(args.log_format)?;

    // Initialize Kubernetes controller state
    let state = State::new(
        Duration::from_secs(args.error_requeue_seconds),
        Duration::from_secs(args.scale_requeue_seconds),
    );
    let client = Client::try_default().await?;
    let reconcile_metrics = Metrics::default().register(&state.registry)?;
    let controller = eventbroker::run(client, reconcile_metrics, state.clone());
    tokio::pin!(controller);

    // Start web server
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(index)
            .service(health)
            .service(metrics)
    })
    .bind(args.bind_address)?
    .shutdown_timeout(5)
    .run();

    tokio::pin!(server);

    // Both runtimes implements graceful shutdown, so poll until both are done
    tokio::join!(controller, server).1?;
    Ok(())
}
