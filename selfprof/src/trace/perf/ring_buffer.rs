//! Consumer side of a perf mmap ring buffer
//!
//! The kernel appends records and advances `data_head`; the reader parses
//! everything between its position and the head, then publishes its position
//! through `data_tail` so the kernel may reuse the space.

#![allow(unsafe_code)]

use std::io;
use std::os::fd::RawFd;
use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, Ordering};

use selfprof_common::{PerfEventHeader, PerfEventMmapPage, HEADER_SIZE};

pub struct RingBuffer {
    /// Metadata page followed by the data pages
    base: NonNull<u8>,
    page_size: usize,
    data_size: u64,
    mmap_size: usize,
    position: u64,
    /// Reused copy of the record being handed out, header included
    record: Vec<u8>,
}

// The mapping is only touched by the thread that owns the buffer; the kernel
// side is synchronized through data_head/data_tail with fences.
unsafe impl Send for RingBuffer {}

impl RingBuffer {
    /// Map `data_pages` (a power of two) data pages plus the metadata page of `fd`
    ///
    /// # Errors
    /// A mapping size that overflows `usize`, or `mmap` failure (commonly
    /// `EPERM` when exceeding `perf_event_mlock_kb`)
    pub fn map(fd: RawFd, page_size: usize, data_pages: usize) -> io::Result<Self> {
        let data_size = data_pages.checked_mul(page_size);
        let mmap_size = data_size.and_then(|size| size.checked_add(page_size));
        let (Some(data_size), Some(mmap_size)) = (data_size, mmap_size) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("ring buffer of {data_pages} pages of {page_size} bytes is too large"),
            ));
        };

        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                mmap_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let base = NonNull::new(base.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned null"))?;

        Ok(Self {
            base,
            page_size,
            data_size: data_size as u64,
            mmap_size,
            position: 0,
            record: Vec::new(),
        })
    }

    /// Hand every pending record (header included) to `f`, advancing the
    /// tail after each one. Stops early when `f` returns `false`.
    pub fn for_each_record<F>(&mut self, mut f: F)
    where
        F: FnMut(&PerfEventHeader, &[u8]) -> bool,
    {
        let mut record = std::mem::take(&mut self.record);
        loop {
            let head = self.read_head();
            if head == self.position {
                break;
            }

            let data = self.data_slice();
            let pos = (self.position % self.data_size) as usize;

            copy_wrapped(data, pos, HEADER_SIZE, &mut record);
            let header: PerfEventHeader =
                unsafe { ptr::read_unaligned(record.as_ptr().cast::<PerfEventHeader>()) };

            let record_size = usize::from(header.size);
            if record_size < HEADER_SIZE
                || record_size > data.len()
                || record_size as u64 > head - self.position
            {
                // Corrupt header: skip everything the kernel has published
                self.position = head;
                self.write_tail(head);
                break;
            }

            copy_wrapped(data, pos, record_size, &mut record);
            let keep_going = f(&header, &record);

            self.position += record_size as u64;
            self.write_tail(self.position);
            if !keep_going {
                break;
            }
        }
        self.record = record;
    }

    fn page(&self) -> *mut PerfEventMmapPage {
        self.base.as_ptr().cast::<PerfEventMmapPage>()
    }

    fn read_head(&self) -> u64 {
        let head = unsafe { ptr::read_volatile(ptr::addr_of!((*self.page()).data_head)) };
        fence(Ordering::Acquire);
        head
    }

    fn write_tail(&self, value: u64) {
        fence(Ordering::Release);
        unsafe { ptr::write_volatile(ptr::addr_of_mut!((*self.page()).data_tail), value) };
    }

    fn data_slice(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                self.base.as_ptr().add(self.page_size),
                self.data_size as usize,
            )
        }
    }
}

impl Drop for RingBuffer {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base.as_ptr().cast::<libc::c_void>(), self.mmap_size);
        }
    }
}

/// Copy `len` bytes starting at `pos` into `out`, wrapping at the end of `data`.
/// `len` must not exceed `data.len()`.
fn copy_wrapped(data: &[u8], pos: usize, len: usize, out: &mut Vec<u8>) {
    out.clear();
    let first = (data.len() - pos).min(len);
    out.extend_from_slice(&data[pos..pos + first]);
    out.extend_from_slice(&data[..len - first]);
}
