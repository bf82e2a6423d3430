//! SockJS gateway binary.
//!
//! Serves the XHR polling, XHR streaming, and JSONP transports with an echo
//! application behind them: every message a client sends is written back.

use clap::Parser;
use sockjs_http::SockJsServer;
use sockjs_session::{ConnectionHandler, SockJsSocket};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::GatewayConfig;
use logging::GatewayLogFormatter;

/// SockJS session gateway running an echo application
#[derive(Parser, Debug)]
#[command(name = "sockjs-gateway", version, about = "SockJS HTTP transports with an echo application")]
struct Args {
    /// Listen address, e.g. 0.0.0.0:8081
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Base path for the transports, e.g. /echo
    #[arg(long)]
    prefix: Option<String>,

    /// Session timeout with no listener attached, e.g. 5s
    #[arg(long)]
    session_timeout: Option<humantime::Duration>,

    /// Heartbeat period, e.g. 25s
    #[arg(long)]
    heartbeat_period: Option<humantime::Duration>,

    /// Byte budget of one streaming response
    #[arg(long)]
    max_bytes_streaming: Option<usize>,

    /// Do not set the JSESSIONID cookie
    #[arg(long)]
    no_jsessionid: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

impl Args {
    /// Explicit flags win over file and environment settings
    fn apply_to(&self, config: &mut GatewayConfig) {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(prefix) = &self.prefix {
            config.prefix = prefix.clone();
        }
        if let Some(timeout) = self.session_timeout {
            config.session_timeout = timeout.into();
        }
        if let Some(period) = self.heartbeat_period {
            config.heartbeat_period = period.into();
        }
        if let Some(max_bytes) = self.max_bytes_streaming {
            config.max_bytes_streaming = max_bytes;
        }
        if self.no_jsessionid {
            config.insert_jsessionid = false;
        }
    }
}

/// Writes every inbound message back to its sender
fn echo_handler() -> Arc<dyn ConnectionHandler> {
    Arc::new(|mut socket: SockJsSocket| {
        component_debug!("echo", "Connection {} opened", socket.id());
        tokio::spawn(async move {
            while let Some(message) = socket.recv().await {
                if socket.write(message).is_err() {
                    break;
                }
            }
            component_debug!("echo", "Connection {} finished", socket.id());
        });
    })
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("sockjs_gateway={}", args.log_level).parse()?)
        .add_directive(format!("sockjs_http={}", args.log_level).parse()?)
        .add_directive(format!("sockjs_session={}", args.log_level).parse()?)
        .add_directive(format!("sockjs_wire={}", args.log_level).parse()?);

    let formatter = GatewayLogFormatter::new("sockjs");

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(true)
        .event_format(formatter)
        .init();

    component_info!("main", "Starting SockJS gateway v{}", env!("CARGO_PKG_VERSION"));

    let mut gateway_config = GatewayConfig::load_from_file(&args.config)?;
    args.apply_to(&mut gateway_config);

    if gateway_config.max_bytes_streaming == 0 {
        anyhow::bail!("max_bytes_streaming must be greater than zero");
    }

    component_info!(
        "main",
        "Session config: timeout={:?}, heartbeat={:?}, max_bytes_streaming={}",
        gateway_config.session_timeout,
        gateway_config.heartbeat_period,
        gateway_config.max_bytes_streaming
    );

    let server = SockJsServer::new(gateway_config.transport_config(), echo_handler());
    let registry = server.registry();

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => component_info!("main", "Received Ctrl-C, shutting down"),
            Err(e) => component_error!("main", "Failed to listen for Ctrl-C: {}", e),
        }
    };

    if let Err(e) = server.serve(gateway_config.bind, shutdown).await {
        component_error!("http", "Server failed: {}", e);
        return Err(e);
    }

    if !registry.is_empty() {
        component_warn!("main", "{} sessions still registered at shutdown", registry.len());
    }
    component_info!("main", "SockJS gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "sockjs-gateway",
            "--bind",
            "0.0.0.0:9000",
            "--session-timeout",
            "30s",
            "--no-jsessionid",
        ]);
        let mut config = GatewayConfig::default();
        args.apply_to(&mut config);

        assert_eq!(config.bind, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.session_timeout, Duration::from_secs(30));
        assert!(!config.insert_jsessionid);
        assert_eq!(config.prefix, "/echo");
    }

    #[tokio::test]
    async fn test_echo_handler_writes_back() {
        let server = SockJsServer::new(Default::default(), echo_handler());
        let app = server.router();

        let poll = || {
            Request::builder()
                .method("POST")
                .uri("/echo/000/e1/xhr")
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(poll()).await.unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"o\n");

        let send = Request::builder()
            .method("POST")
            .uri("/echo/000/e1/xhr_send")
            .body(Body::from("[\"echo me\"]"))
            .unwrap();
        let response = app.clone().oneshot(send).await.unwrap();
        assert_eq!(response.status(), 204);

        let response = app.clone().oneshot(poll()).await.unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"a[\"echo me\"]\n");
    }
}
