//! Server initialization
//!
//! Tracing setup and the `serve_stdio!` entry-point macro.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable selecting the log output format
pub const LOG_FORMAT_VAR: &str = "LOG_FORMAT";

/// Log output format for a server's stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Parse a `LOG_FORMAT` value. Anything other than `json` is plain text.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }

    pub fn from_env() -> Self {
        Self::parse(std::env::var(LOG_FORMAT_VAR).ok().as_deref())
    }
}

/// Filter used when `RUST_LOG` is unset or unparseable
fn default_filter(crate_name: &str) -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::try_new(format!("{}=info", crate_name))?)
}

/// Initialize tracing for an MCP server
///
/// Logs go to stderr; stdout carries the protocol. `RUST_LOG` replaces the
/// `<crate_name>=info` default entirely when it is set.
pub fn init_tracing(crate_name: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => default_filter(crate_name)?,
    };
    let registry = tracing_subscriber::registry().with(filter);

    match LogFormat::from_env() {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?,
    }

    Ok(())
}

/// Generate a `#[tokio::main]` entry point serving a server over stdio
///
/// `$constructor` is called with no arguments and returns
/// `Result<Server, E>` where `E` converts into `anyhow::Error`. A
/// constructor error is logged and ends the process before the transport
/// is opened, so a broken configuration never serves requests.
///
/// The expansion names `tokio`, `rmcp`, `tracing` and `anyhow`, which the
/// calling crate must depend on.
///
/// ```rust,ignore
/// mcp_common::serve_stdio!(QueryMcpServer::try_new, "query_mcp");
/// ```
#[macro_export]
macro_rules! serve_stdio {
    ($constructor:path, $crate_name:expr) => {
        #[tokio::main]
        async fn main() -> anyhow::Result<()> {
            use rmcp::ServiceExt;

            $crate::init_tracing($crate_name)?;
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                "Starting {} MCP Server",
                $crate_name
            );

            let server = match $constructor() {
                Ok(server) => server,
                Err(e) => {
                    let e = anyhow::Error::from(e);
                    tracing::error!("Refusing to start: {:#}", e);
                    return Err(e);
                }
            };
            let service = server.serve(rmcp::transport::stdio()).await?;
            service.waiting().await?;

            tracing::info!("Server shutting down");
            Ok(())
        }
    };
}
