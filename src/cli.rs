use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::error::PfstatsError;
use crate::model::prefix::AddressPrefix;
use crate::state::FlowFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pfstatsd",
    version,
    about = "Per-interval pf traffic accounting into rrdcached"
)]
pub struct Cli {
    /// Local network, `addr[/len]`; traffic is split by whether its source is inside it
    #[arg(short = 'n', long)]
    pub network: String,

    /// Interfaces that get their own series, comma separated
    #[arg(short = 'i', long, value_delimiter = ',')]
    pub interfaces: Vec<String>,

    /// Only count states untouched by NAT
    #[arg(short = 's', long, conflicts_with = "translated_only")]
    pub simple: bool,

    /// Only count NAT-translated states
    #[arg(long)]
    pub translated_only: bool,

    /// Compute and log updates without contacting rrdcached
    #[arg(short = 'd', long)]
    pub dry_run: bool,

    /// Debug-level logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Stay in the foreground and print a report line per cycle
    #[arg(short = 'f', long)]
    pub foreground: bool,

    /// Directory holding the RRD files
    #[arg(short = 'r', long, default_value = "/var/db/rrd")]
    pub rrd_dir: PathBuf,

    /// rrdcached control socket
    #[arg(long, default_value = "/var/run/rrd/rrdcached.sock")]
    pub rrdcached: PathBuf,

    /// pf control device
    #[arg(long, default_value = "/dev/pf")]
    pub pf_device: PathBuf,

    /// Also send per-cycle counters to this statsd `host:port`
    #[arg(long)]
    pub statsd: Option<String>,

    /// Sampling interval in seconds [default: 1.0]
    #[arg(long, default_value_t = 1.0, value_parser = validate_interval)]
    pub interval: f64,

    /// rrdcached socket timeout in seconds [default: 2.0]
    #[arg(long, default_value_t = 2.0, value_parser = validate_sink_timeout)]
    pub sink_timeout: f64,

    /// Foreground report format
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Tsv,
    Json,
}

fn validate_interval(s: &str) -> Result<f64, String> {
    let val: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if val.is_nan() || val < 0.1 {
        Err("interval must be at least 0.1 seconds".to_string())
    } else if val > 60.0 {
        Err("interval must be at most 60 seconds".to_string())
    } else {
        Ok(val)
    }
}

fn validate_sink_timeout(s: &str) -> Result<f64, String> {
    let val: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if val.is_nan() || val < 0.1 {
        Err("sink-timeout must be at least 0.1 seconds".to_string())
    } else if val > 30.0 {
        Err("sink-timeout must be at most 30 seconds".to_string())
    } else {
        Ok(val)
    }
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub local: AddressPrefix,
    pub interfaces: Vec<String>,
    pub filter: FlowFilter,
    pub dry_run: bool,
    pub foreground: bool,
    pub rrd_dir: PathBuf,
    pub rrdcached: PathBuf,
    pub pf_device: PathBuf,
    pub statsd: Option<String>,
    pub interval: Duration,
    pub sink_timeout: Duration,
    pub format: OutputFormat,
}

impl Cli {
    /// Parse the network prefix and normalise the rest into a [`Config`].
    pub fn resolve(self) -> Result<Config, PfstatsError> {
        let local = AddressPrefix::parse(&self.network)?;

        let mut interfaces: Vec<String> = Vec::with_capacity(self.interfaces.len());
        for name in self.interfaces {
            let name = name.trim();
            if name.is_empty() || interfaces.iter().any(|i| i == name) {
                continue;
            }
            interfaces.push(name.to_string());
        }

        let filter = if self.simple {
            FlowFilter::SimpleOnly
        } else if self.translated_only {
            FlowFilter::TranslatedOnly
        } else {
            FlowFilter::All
        };

        if let Some(target) = &self.statsd {
            validate_statsd(target)?;
        }

        Ok(Config {
            local,
            interfaces,
            filter,
            dry_run: self.dry_run,
            foreground: self.foreground,
            rrd_dir: self.rrd_dir,
            rrdcached: self.rrdcached,
            pf_device: self.pf_device,
            statsd: self.statsd,
            interval: Duration::from_secs_f64(self.interval),
            sink_timeout: Duration::from_secs_f64(self.sink_timeout),
            format: self.format,
        })
    }
}

// Literal addresses are checked here; host names are resolved when the
// client is created.
fn validate_statsd(target: &str) -> Result<(), PfstatsError> {
    if target.parse::<SocketAddr>().is_ok() {
        return Ok(());
    }
    match target.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
        _ => Err(PfstatsError::InvalidAddress(format!(
            "statsd target '{target}' is not host:port"
        ))),
    }
}
