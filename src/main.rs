use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

use pfstatsd::cli::{Cli, Config};
use pfstatsd::error::PfstatsError;
use pfstatsd::model::traffic::ScopeSet;
use pfstatsd::monitor::Monitor;
use pfstatsd::output::ReportWriter;
use pfstatsd::privilege;
use pfstatsd::sink::statsd::{self, StatsdClient};
use pfstatsd::state::Accountant;

/// Global shutdown flag, set by signal handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(
            libc::SIGTERM,
            signal_handler as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGINT,
            signal_handler as *const () as libc::sighandler_t,
        );
    }
}

fn exit_code(err: &PfstatsError) -> i32 {
    match err {
        PfstatsError::InvalidAddress(_)
        | PfstatsError::InvalidPrefixLength(_)
        | PfstatsError::InsufficientPermission(_) => 1,
        PfstatsError::PfDevice(_)
        | PfstatsError::StateQuery(_)
        | PfstatsError::Decode { .. }
        | PfstatsError::Ordering { .. } => 2,
        PfstatsError::Rrdcached(_) | PfstatsError::SinkIo(_) => 3,
        PfstatsError::Serialization(_) | PfstatsError::Fatal(_) => 4,
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        cli.resolve().and_then(run)
    }));

    match result {
        Ok(Ok(())) => std::process::exit(0),
        Ok(Err(e)) => {
            eprintln!("error: {e}");
            std::process::exit(exit_code(&e));
        }
        Err(_) => {
            eprintln!("error: fatal: unexpected panic");
            std::process::exit(4);
        }
    }
}

fn run(config: Config) -> Result<(), PfstatsError> {
    // 0. Install signal handlers for graceful shutdown.
    install_signal_handlers();

    // 1. Open the state source (requires root).
    let source = privilege::open_pf_device(&config.pf_device)?;

    // 2. Scopes and accounting.
    let scopes = ScopeSet::new(&config.rrd_dir, &config.interfaces);
    log::info!(
        "local network {}, {} interface scope(s), filter {:?}",
        config.local,
        scopes.interfaces().len(),
        config.filter
    );
    let accountant = Accountant::new(config.local, config.filter, scopes);

    // 3. Sinks.
    let sink = privilege::open_sink(config.dry_run, &config.rrdcached, config.sink_timeout)?;
    let mut monitor = Monitor::new(source, sink, accountant);
    if let Some(target) = &config.statsd {
        let client = StatsdClient::new(target, statsd::DEFAULT_PREFIX)?;
        log::info!("sending counters to statsd at {}", client.target());
        monitor = monitor.with_statsd(client);
    }

    // 4. Warm-up snapshot before detaching so startup errors reach the terminal.
    monitor.prime()?;

    if !config.foreground {
        if unsafe { libc::daemon(0, 0) } != 0 {
            return Err(PfstatsError::Fatal(format!(
                "daemon: {}",
                io::Error::last_os_error()
            )));
        }
        return monitor.run(config.interval, &SHUTDOWN_REQUESTED, |_| Ok(()));
    }

    // 5. Foreground: one report line per cycle.
    let mut report = ReportWriter::new(config.format, io::stdout().lock());
    monitor.run(config.interval, &SHUTDOWN_REQUESTED, |outcome| {
        report.write(outcome)
    })
}
