pub mod pf;
pub mod pfsync;

use crate::error::PfstatsError;
use crate::model::Snapshot;

pub use self::pf::PfDevice;

/// Anything that can produce a point-in-time copy of the packet filter's
/// state table.
///
/// Each call returns an independent, id-sorted snapshot. Errors are fatal to
/// the caller's run loop.
pub trait StateSource {
    fn acquire(&mut self) -> Result<Snapshot, PfstatsError>;
}

impl<T: StateSource + ?Sized> StateSource for Box<T> {
    fn acquire(&mut self) -> Result<Snapshot, PfstatsError> {
        (**self).acquire()
    }
}
