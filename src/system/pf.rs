use std::path::{Path, PathBuf};

#[cfg(target_os = "openbsd")]
use std::io;
#[cfg(target_os = "openbsd")]
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use crate::error::PfstatsError;
use crate::model::Snapshot;

use super::StateSource;
use super::pfsync;

// ---------------------------------------------------------------------------
// DIOCGETSTATES ioctl (OpenBSD <net/pfvar.h>)
// ---------------------------------------------------------------------------

// BSD _IOC encoding: direction bits [31:29] | size [28:16] | group [15:8] | number [7:0]
#[cfg_attr(not(target_os = "openbsd"), allow(dead_code))]
const fn ioc(dir: u32, group: u8, num: u8, size: u32) -> u64 {
    (dir | ((size & 0x1FFF) << 16) | ((group as u32) << 8) | num as u32) as u64
}

const IOC_OUT: u32 = 0x40000000;
const IOC_IN: u32 = 0x80000000;
const IOC_INOUT: u32 = IOC_IN | IOC_OUT;

/// `sizeof(struct pfioc_states)` on LP64.
const PFIOC_STATES_SIZE: usize = 16;

#[cfg_attr(not(target_os = "openbsd"), allow(dead_code))]
const DIOCGETSTATES: u64 = ioc(IOC_INOUT, b'D', 25, PFIOC_STATES_SIZE as u32); // _IOWR('D', 25, struct pfioc_states)

const _: () = assert!(DIOCGETSTATES == 0xC010_4419);

/// Upper bound on the state buffer.
#[cfg_attr(not(target_os = "openbsd"), allow(dead_code))]
const MAX_STATE_BUFFER: usize = 1 << 30;

#[cfg(target_os = "openbsd")]
#[repr(C)]
struct pfioc_states {
    ps_len: libc::size_t,
    ps_buf: *mut libc::c_char,
}

#[cfg(target_os = "openbsd")]
const _: () = assert!(std::mem::size_of::<pfioc_states>() == PFIOC_STATES_SIZE);

/// What to do after one DIOCGETSTATES round.
#[cfg_attr(not(target_os = "openbsd"), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fit {
    /// The kernel filled `n` bytes and the buffer had room to spare.
    Done(usize),
    /// The state table is empty.
    Empty,
    /// Retry with a buffer of this many bytes.
    Grow(usize),
}

/// Decide the next step given the buffer length offered and the length the
/// kernel reported back.
///
/// The kernel reports the size it needs when the buffer is too small, so a
/// result only counts once it leaves at least a `pfioc_states` worth of slack;
/// otherwise the table may have grown between the size probe and the copy.
#[cfg_attr(not(target_os = "openbsd"), allow(dead_code))]
fn fit(offered: usize, returned: usize) -> Result<Fit, PfstatsError> {
    if returned + PFIOC_STATES_SIZE < offered {
        return Ok(Fit::Done(returned));
    }
    if returned == 0 {
        return Ok(Fit::Empty);
    }
    let base = if offered == 0 { returned } else { offered };
    let next = base.saturating_mul(2);
    if next > MAX_STATE_BUFFER {
        return Err(PfstatsError::StateQuery(std::io::Error::other(format!(
            "state table needs more than {MAX_STATE_BUFFER} bytes"
        ))));
    }
    Ok(Fit::Grow(next))
}

/// Handle on the pf control device.
///
/// Keeps the state buffer and its last good size across acquisitions so a
/// steady-state table is fetched with a single ioctl.
#[cfg_attr(not(target_os = "openbsd"), allow(dead_code))]
pub struct PfDevice {
    #[cfg(target_os = "openbsd")]
    fd: OwnedFd,
    path: PathBuf,
    buffer: Vec<u8>,
    len_hint: usize,
}

impl PfDevice {
    /// Open the pf device read-only.
    #[cfg(target_os = "openbsd")]
    pub fn open(path: &Path) -> Result<Self, PfstatsError> {
        use std::os::unix::ffi::OsStrExt;

        let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
            .map_err(|_| PfstatsError::PfDevice(format!("invalid device path {}", path.display())))?;

        let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDONLY) };
        if fd < 0 {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::EACCES) | Some(libc::EPERM) => PfstatsError::InsufficientPermission(
                    format!("open {}: {err} (run as root)", path.display()),
                ),
                _ => PfstatsError::PfDevice(format!("open {}: {err}", path.display())),
            });
        }

        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
            path: path.to_path_buf(),
            buffer: Vec::new(),
            len_hint: 0,
        })
    }

    #[cfg(not(target_os = "openbsd"))]
    pub fn open(path: &Path) -> Result<Self, PfstatsError> {
        Err(PfstatsError::PfDevice(format!(
            "{}: pf state tables are only available on OpenBSD",
            path.display()
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fetch the raw state table, growing the buffer until it fits.
    #[cfg(target_os = "openbsd")]
    fn fetch(&mut self) -> Result<&[u8], PfstatsError> {
        let mut len = self.len_hint;
        loop {
            if self.buffer.len() < len {
                self.buffer.resize(len, 0);
            }
            let mut ps = pfioc_states {
                ps_len: len,
                ps_buf: self.buffer.as_mut_ptr() as *mut libc::c_char,
            };
            unsafe {
                if libc::ioctl(
                    self.fd.as_raw_fd(),
                    DIOCGETSTATES as libc::c_ulong,
                    &mut ps as *mut pfioc_states,
                ) != 0 {
                    return Err(PfstatsError::StateQuery(io::Error::last_os_error()));
                }
            }
            match fit(len, ps.ps_len)? {
                Fit::Done(n) => {
                    self.len_hint = len;
                    return Ok(&self.buffer[..n]);
                }
                Fit::Empty => return Ok(&[]),
                Fit::Grow(next) => {
                    log::debug!("state buffer {len} bytes too small, growing to {next}");
                    len = next;
                }
            }
        }
    }

    #[cfg(not(target_os = "openbsd"))]
    fn fetch(&mut self) -> Result<&[u8], PfstatsError> {
        Err(PfstatsError::PfDevice(format!(
            "{}: unsupported platform",
            self.path.display()
        )))
    }
}

impl StateSource for PfDevice {
    fn acquire(&mut self) -> Result<Snapshot, PfstatsError> {
        let raw = self.fetch()?;
        let records = pfsync::decode_states(raw)?;
        Snapshot::from_unsorted(records)
    }
}
