use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::util::env::{EnvErr, Var};
use crate::var;

pub type Result<T> = core::result::Result<T, TelemetryErr>;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryErr {
    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error(transparent)]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct Telemetry {
    pub filter: String,
    pub format: LogFormat,
}

impl Telemetry {
    pub async fn new(format: LogFormat) -> Result<Telemetry> {
        let filter = var!(Var::LogFilter).await?.to_owned();
        Ok(Self { filter, format })
    }

    /// Installs the global subscriber.
    ///
    /// Logs go to stderr so that command output on stdout stays machine readable.
    pub fn register(self) -> Result<Self> {
        let filter = EnvFilter::try_new(&self.filter)?;
        let registry = tracing_subscriber::registry().with(filter);

        match self.format {
            LogFormat::Pretty => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_line_number(true),
                )
                .try_init()?,
            LogFormat::Json => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_current_span(true),
                )
                .try_init()?,
        }

        Ok(self)
    }

    pub fn shutdown(self) {
        tracing::debug!(filter = self.filter, "telemetry shut down");
    }
}
