use std::future::IntoFuture;

use clap::Parser;
use pulsecast::{
    Broker, Config, HttpSource, Relay, Result, logging,
    transport::{self, EventsState},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_PULSE_URL: &str = "https://jsonplaceholder.typicode.com/todos/1";

#[derive(Parser, Debug)]
#[command(name = "pulsecast")]
#[command(about = "Relays an upstream JSON endpoint to server-sent-event clients", long_about = None)]
struct Args {
    /// Upstream endpoint polled for pulses
    #[arg(long, env = "PULSE_URL", default_value = DEFAULT_PULSE_URL)]
    pulse_url: String,

    /// HTTP listen port
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
}

impl Args {
    fn pulse_url(&self) -> &str {
        match self.pulse_url.trim() {
            "" => DEFAULT_PULSE_URL,
            url => url,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();
    let args = Args::parse();
    let config = Config::default();

    let broker = Broker::start(&config);
    let shutdown = CancellationToken::new();

    let source = HttpSource::new(args.pulse_url(), config.fetch_timeout)?;
    let relay = Relay::new(
        source,
        broker.handle(),
        config.pulse_interval,
        shutdown.clone(),
    );
    let relay_task = tokio::spawn(relay.run());

    let app = transport::router(EventsState::new(broker.handle(), config.client_queue_size));
    let listener = TcpListener::bind(("0.0.0.0", args.port)).await?;
    info!("http server running at http://localhost:{}", args.port);

    tokio::spawn(cancel_on_ctrl_c(shutdown.clone()));

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();

    // Open streams only end once the broker is gone.
    let broker_stop = async move {
        shutdown.cancelled().await;
        broker.stop().await
    };

    let (served, stopped) = tokio::join!(server, broker_stop);
    served?;
    stopped?;
    relay_task.await?;
    info!("shutdown complete");
    Ok(())
}

async fn cancel_on_ctrl_c(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "unable to listen for shutdown signal");
        return;
    }
    info!("shutdown requested");
    token.cancel();
}
