use std::path::Path;
use std::time::Duration;

use crate::error::PfstatsError;
use crate::sink::{DryRunSink, RrdcachedClient, SeriesSink};
use crate::system::PfDevice;

/// Check that we are running as root. The pf device requires it.
pub fn check_root() -> Result<(), PfstatsError> {
    if unsafe { libc::getuid() } != 0 {
        return Err(PfstatsError::InsufficientPermission(
            "must be run as root to read pf state".to_string(),
        ));
    }
    Ok(())
}

/// Open the pf device at `path` after the root check.
pub fn open_pf_device(path: &Path) -> Result<PfDevice, PfstatsError> {
    check_root()?;
    let dev = PfDevice::open(path)?;
    log::info!("opened pf device {}", dev.path().display());
    Ok(dev)
}

/// Pick the series sink: a logger in dry-run mode, rrdcached otherwise.
///
/// The rrdcached connection is established eagerly so a missing daemon is
/// reported at startup rather than on the first cycle.
pub fn open_sink(
    dry_run: bool,
    socket: &Path,
    timeout: Duration,
) -> Result<Box<dyn SeriesSink>, PfstatsError> {
    if dry_run {
        log::info!("dry run: rrdcached will not be contacted");
        return Ok(Box::new(DryRunSink));
    }
    let client = RrdcachedClient::connect(socket, timeout)?;
    log::info!("connected to rrdcached at {}", socket.display());
    Ok(Box::new(client))
}
