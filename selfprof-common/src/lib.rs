//! # Shared Data Structures (Kernel ↔ Userspace)
//!
//! The parts of the `perf_event_open(2)` ABI that the record reader touches
//! directly. The event attributes, the syscall and the record bodies come from
//! `perf-event-open-sys` / `perf-event-data`; what is left here is the memory
//! layout of the ring buffer itself.
//!
//! ## Key Types
//!
//! - [`PerfEventMmapPage`] - Ring buffer control page (`data_head` / `data_tail`)
//! - [`PerfEventHeader`] - Per-record header (`type`, `misc`, `size`)

#![no_std]

/// Userspace virtual addresses on x86_64 and aarch64 (48-bit VA) are below this.
/// Anything at or above it is a kernel address or a callchain context marker.
pub const USER_ADDR_LIMIT: u64 = 0x0000_8000_0000_0000;

/// Maximum number of stack frames the kernel collects per sample
/// (`/proc/sys/kernel/perf_event_max_stack` default).
pub const MAX_STACK_DEPTH: usize = 127;

/// `struct perf_event_mmap_page`: the first page of every ring buffer mapping
///
/// Only `data_head` (written by the kernel) and `data_tail` (written by the
/// reader) are used; the padding keeps them at their kernel offsets (0x400).
#[repr(C)]
pub struct PerfEventMmapPage {
    pub version: u32,
    pub compat_version: u32,
    pub lock: u32,
    pub index: u32,
    pub offset: i64,
    pub time_enabled: u64,
    pub time_running: u64,
    pub capabilities: u64,
    pub pmc_width: u16,
    pub time_shift: u16,
    pub time_mult: u32,
    pub time_offset: u64,
    pub time_zero: u64,
    pub size: u32,
    pub reserved: [u8; 948],
    pub data_head: u64,
    pub data_tail: u64,
    pub data_offset: u64,
    pub data_size: u64,
}

/// `struct perf_event_header`: precedes each record in the ring buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerfEventHeader {
    /// Record type (`PERF_RECORD_*`)
    pub type_: u32,
    pub misc: u16,
    /// Total record size in bytes, header included
    pub size: u16,
}

/// Size of [`PerfEventHeader`] in bytes
pub const HEADER_SIZE: usize = core::mem::size_of::<PerfEventHeader>();

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    #[test]
    fn mmap_page_head_tail_offsets() {
        assert_eq!(offset_of!(PerfEventMmapPage, data_head), 0x400);
        assert_eq!(offset_of!(PerfEventMmapPage, data_tail), 0x408);
    }

    #[test]
    fn header_is_eight_bytes() {
        assert_eq!(HEADER_SIZE, 8);
        assert_eq!(offset_of!(PerfEventHeader, size), 6);
    }
}
