use anyhow::{bail, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// A validated `tracing` filter directive, e.g. `xds_reconciler=debug,warn`.
#[derive(Clone, Debug)]
pub struct LogFilter(String);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

// === impl LogFilter ===

impl std::str::FromStr for LogFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        EnvFilter::try_new(s)?;
        Ok(Self(s.to_string()))
    }
}

impl LogFilter {
    fn env_filter(&self) -> EnvFilter {
        // Validated on parse.
        EnvFilter::try_new(&self.0).unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

// === impl LogFormat ===

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            _ => bail!("invalid log format: {s}"),
        }
    }
}

impl LogFormat {
    /// Installs the global subscriber. Logs are written to stderr so that
    /// command output on stdout stays machine readable.
    pub fn try_init(self, filter: LogFilter) -> Result<()> {
        let registry = tracing_subscriber::registry().with(filter.env_filter());
        match self {
            Self::Plain => registry
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()?,
            Self::Json => registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()?,
        }
        Ok(())
    }
}
