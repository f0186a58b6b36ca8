use crate::{
    admin::Admin,
    calc::{metrics::UpdateMetrics, ActiveRulesCalculator},
    input::{read_updates, Source},
    process::process,
    ActiveSet, EndpointMatchCounts, LocalEndpointFilter,
};
use anyhow::{bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::net::SocketAddr;
use tokio::{
    net::TcpListener,
    sync::{mpsc, watch},
};
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(
    name = "policy-agent",
    about = "Computes the policies and profiles that apply to local endpoints"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "policy_agent=info,warn",
        env = "POLICY_AGENT_LOG"
    )]
    log_level: LogFilter,

    #[clap(long, value_enum, default_value = "plain")]
    log_format: LogFormat,

    /// Only endpoints on this host are considered local.
    ///
    /// When unset, every endpoint is local.
    #[clap(long, env = "HOSTNAME")]
    hostname: Option<String>,

    #[clap(long, default_value = "0.0.0.0:9990")]
    admin_addr: SocketAddr,

    /// Path to newline-delimited JSON updates, or `-` for stdin.
    #[clap(long, default_value = "-")]
    updates: Source,

    #[clap(long, default_value = "1024")]
    update_queue_size: usize,
}

/// A validated `tracing-subscriber` filter directive.
#[derive(Clone, Debug)]
pub struct LogFilter(String);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            hostname,
            admin_addr,
            updates,
            update_queue_size,
        } = self;

        log_format.try_init(&log_level)?;

        if update_queue_size == 0 {
            bail!("--update-queue-size must be positive");
        }

        let filter = match hostname {
            Some(hostname) => {
                info!(%hostname, "Tracking local endpoints");
                LocalEndpointFilter::new(hostname)
            }
            None => {
                warn!("No hostname configured; all endpoints are considered local");
                LocalEndpointFilter::any_host()
            }
        };

        let active = ActiveSet::default();
        let mut prom = <Registry>::default();
        let calc = UpdateMetrics::register(
            ActiveRulesCalculator::new(active.clone(), EndpointMatchCounts::default()),
            prom.sub_registry_with_prefix("calc"),
        );

        let (ready_tx, ready_rx) = watch::channel(false);
        let listener = TcpListener::bind(admin_addr).await?;
        let admin = tokio::spawn(
            Admin::new(prom, ready_rx, active)
                .serve(listener)
                .instrument(info_span!("admin")),
        );

        let reader = updates.open().await?;
        let (updates_tx, updates_rx) = mpsc::channel(update_queue_size);
        tokio::spawn(
            async move {
                if let Err(error) = read_updates(reader, updates_tx).await {
                    warn!(%error, "Failed to read updates");
                }
            }
            .instrument(info_span!("updates")),
        );
        tokio::spawn(
            process(updates_rx, filter, calc, ready_tx).instrument(info_span!("calc")),
        );

        // Keep serving the active set until shutdown, even after the updates are exhausted.
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("Shutting down");
            }
            res = admin => {
                res??;
                bail!("Admin server exited");
            }
        }

        Ok(())
    }
}

// === impl LogFilter ===

impl std::str::FromStr for LogFilter {
    type Err = tracing_subscriber::filter::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EnvFilter::try_new(s)?;
        Ok(Self(s.to_string()))
    }
}

impl LogFilter {
    fn to_env_filter(&self) -> EnvFilter {
        // Validated when parsed.
        EnvFilter::new(&self.0)
    }
}

// === impl LogFormat ===

impl LogFormat {
    pub fn try_init(self, filter: &LogFilter) -> Result<()> {
        let builder = tracing_subscriber::fmt().with_env_filter(filter.to_env_filter());
        let res = match self {
            Self::Plain => builder.try_init(),
            Self::Json => builder.json().try_init(),
        };
        res.map_err(|error| anyhow::anyhow!("failed to initialize logging: {}", error))
    }
}
