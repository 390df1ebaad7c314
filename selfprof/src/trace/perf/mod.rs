//! # Linux perf_event Sampling Session
//!
//! Opens one software CPU-clock event per online CPU for the calling process,
//! with `inherit` so threads spawned afterwards are sampled too, and maps a
//! ring buffer for each. Samples carry `IP | TID | CALLCHAIN`.
//!
//! ```text
//!  CPU0 fd ── ring ─┐
//!  CPU1 fd ── ring ─┼──► PerfRecordStream::process ──► deliver(RawRecord)
//!  CPUn fd ── ring ─┘         poll(100ms) + drain
//!      ▲
//!      └── PerfControl::stop: PERF_EVENT_IOC_DISABLE on every fd, raise stop flag
//! ```
//!
//! The binary must keep frame pointers (`-C force-frame-pointers=yes`) for the
//! kernel's callchain walker to see past the leaf frame.

#![allow(unsafe_code)]

pub mod decode;
pub mod ring_buffer;

use std::fs;
use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use perf_event_data::endian::Little;
use perf_event_data::parse::ParseConfig;
use perf_event_open_sys::bindings::{
    perf_event_attr, PERF_COUNT_SW_CPU_CLOCK, PERF_FLAG_FD_CLOEXEC, PERF_SAMPLE_CALLCHAIN,
    PERF_SAMPLE_IP, PERF_SAMPLE_TID, PERF_TYPE_SOFTWARE,
};

use self::decode::decode_record;
use self::ring_buffer::RingBuffer;
use super::{
    NameClaim, OpenedSession, RawRecord, RecordStream, SessionConfig, SessionControl,
    SessionRegistry, TraceProvider,
};
use crate::domain::{CpuId, StartFailure};
use crate::profiling::online_cpus;

const POLL_TIMEOUT_MS: libc::c_int = 100;
const PARANOID_PATH: &str = "/proc/sys/kernel/perf_event_paranoid";
const MAX_SAMPLE_RATE_PATH: &str = "/proc/sys/kernel/perf_event_max_sample_rate";

/// Sample body layout: `ip`, `pid`/`tid`, then the callchain
const SAMPLE_TYPE: u64 =
    PERF_SAMPLE_IP as u64 | PERF_SAMPLE_TID as u64 | PERF_SAMPLE_CALLCHAIN as u64;

/// Samples the calling process through `perf_event_open(2)`
#[derive(Debug, Clone, Default)]
pub struct PerfProvider {
    registry: SessionRegistry,
}

impl PerfProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TraceProvider for PerfProvider {
    fn open(&self, name: &str, config: &SessionConfig) -> Result<OpenedSession, StartFailure> {
        config.validate()?;
        check_max_sample_rate(config.frequency_hz)?;
        let claim = self.registry.claim(name)?;

        let mut attr = build_attr(config);
        let cpus =
            online_cpus().map_err(|e| StartFailure::Os(io::Error::other(format!("{e:#}"))))?;
        let page_size = page_size()?;

        let mut fds = Vec::with_capacity(cpus.len());
        let mut rings = Vec::with_capacity(cpus.len());
        for &cpu in &cpus {
            let fd = PerfFd::open(&mut attr, cpu)?;
            rings.push(RingBuffer::map(fd.raw(), page_size, config.buffer_pages)?);
            fds.push(fd);
        }
        for fd in &fds {
            fd.enable()?;
        }

        info!(
            "Session '{name}': sampling {} CPUs at {} Hz ({} pages per ring)",
            cpus.len(),
            config.frequency_hz,
            config.buffer_pages
        );

        let shared = Arc::new(PerfShared {
            fds,
            stopped: AtomicBool::new(false),
        });
        Ok(OpenedSession {
            control: Box::new(PerfControl {
                shared: Arc::clone(&shared),
                claim: Some(claim),
            }),
            stream: Box::new(PerfRecordStream {
                shared,
                rings,
                parse_config: ParseConfig::from(attr),
                max_depth: config.max_stack_depth,
            }),
        })
    }
}

fn build_attr(config: &SessionConfig) -> perf_event_attr {
    let mut attr = perf_event_attr::default();
    attr.size = std::mem::size_of::<perf_event_attr>() as u32;
    attr.type_ = PERF_TYPE_SOFTWARE;
    attr.config = PERF_COUNT_SW_CPU_CLOCK as u64;
    attr.sample_type = SAMPLE_TYPE;
    attr.sample_freq = config.frequency_hz;
    attr.sample_max_stack = u16::try_from(config.max_stack_depth).unwrap_or(u16::MAX);

    attr.set_disabled(1);
    attr.set_freq(1);
    attr.set_inherit(1);
    attr.set_sample_id_all(1);
    attr.set_exclude_kernel(1);
    attr.set_exclude_hv(1);
    attr
}

fn check_max_sample_rate(frequency_hz: u64) -> Result<(), StartFailure> {
    if let Ok(contents) = fs::read_to_string(MAX_SAMPLE_RATE_PATH) {
        if let Ok(max_rate) = contents.trim().parse::<u64>() {
            if frequency_hz > max_rate {
                return Err(StartFailure::InvalidConfig(format!(
                    "requested frequency {frequency_hz} Hz exceeds kernel max {max_rate} \
                     (see {MAX_SAMPLE_RATE_PATH})"
                )));
            }
        }
    }
    Ok(())
}

fn page_size() -> io::Result<usize> {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).map_err(|_| io::Error::last_os_error())
}

/// Current `perf_event_paranoid` level, if readable
#[must_use]
pub fn paranoid_level() -> Option<i32> {
    fs::read_to_string(PARANOID_PATH).ok()?.trim().parse().ok()
}

/// Owned perf event file descriptor
#[derive(Debug)]
struct PerfFd(RawFd);

impl PerfFd {
    fn open(attr: &mut perf_event_attr, cpu: CpuId) -> Result<Self, StartFailure> {
        let fd = unsafe {
            perf_event_open_sys::perf_event_open(
                attr,
                0,
                cpu.0 as libc::c_int,
                -1,
                PERF_FLAG_FD_CLOEXEC as libc::c_ulong,
            )
        };
        if fd < 0 {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::EACCES | libc::EPERM) => StartFailure::PermissionDenied(format!(
                    "perf_event_open on {cpu} denied ({err}); {PARANOID_PATH} is {} and must \
                     be <= 2 for self-profiling, or grant CAP_PERFMON",
                    paranoid_level().map_or_else(|| "unreadable".to_string(), |l| l.to_string())
                )),
                _ => StartFailure::Os(err),
            });
        }
        debug!("Opened perf event fd {fd} on {cpu}");
        Ok(Self(fd))
    }

    fn raw(&self) -> RawFd {
        self.0
    }

    fn enable(&self) -> io::Result<()> {
        check_ioctl(unsafe { perf_event_open_sys::ioctls::ENABLE(self.0, 0) })
    }

    fn disable(&self) -> io::Result<()> {
        check_ioctl(unsafe { perf_event_open_sys::ioctls::DISABLE(self.0, 0) })
    }
}

fn check_ioctl(rc: libc::c_int) -> io::Result<()> {
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl Drop for PerfFd {
    fn drop(&mut self) {
        unsafe { libc::close(self.0) };
    }
}

/// State shared by the control and stream halves
struct PerfShared {
    fds: Vec<PerfFd>,
    stopped: AtomicBool,
}

struct PerfControl {
    shared: Arc<PerfShared>,
    claim: Option<NameClaim>,
}

impl SessionControl for PerfControl {
    fn stop(&mut self) -> io::Result<()> {
        let mut first_error = None;
        for fd in &self.shared.fds {
            if let Err(e) = fd.disable() {
                warn!("Failed to disable perf event fd {}: {e}", fd.raw());
                first_error.get_or_insert(e);
            }
        }
        // The stream exits on the flag alone, so a failed disable cannot strand it
        self.shared.stopped.store(true, Ordering::Release);
        self.claim.take();
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for PerfControl {
    fn drop(&mut self) {
        // Dropped without an explicit stop: the stream must still terminate
        if self.claim.is_some() {
            let _ = self.stop();
        }
    }
}

struct PerfRecordStream {
    shared: Arc<PerfShared>,
    rings: Vec<RingBuffer>,
    parse_config: ParseConfig<Little>,
    max_depth: usize,
}

impl PerfRecordStream {
    /// Drain every ring once. Returns `false` if `deliver` asked to stop.
    fn drain(&mut self, deliver: &mut dyn FnMut(RawRecord) -> bool) -> bool {
        let max_depth = self.max_depth;
        let parse_config = &self.parse_config;
        let mut receiving = true;
        for ring in &mut self.rings {
            ring.for_each_record(|header, bytes| {
                if let Some(record) = decode_record(header, bytes, parse_config, max_depth) {
                    receiving = deliver(record);
                }
                receiving
            });
            if !receiving {
                return false;
            }
        }
        true
    }
}

impl RecordStream for PerfRecordStream {
    fn process(&mut self, deliver: &mut dyn FnMut(RawRecord) -> bool) -> io::Result<()> {
        let mut pollfds: Vec<libc::pollfd> = self
            .shared
            .fds
            .iter()
            .map(|fd| libc::pollfd {
                fd: fd.raw(),
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();

        loop {
            // Read the flag before draining so the last drain happens after the disable
            let stopping = self.shared.stopped.load(Ordering::Acquire);
            if !self.drain(deliver) || stopping {
                return Ok(());
            }

            let rc = unsafe {
                libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, POLL_TIMEOUT_MS)
            };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
        }
    }
}
