//! # Symbol Resolution and Address Translation
//!
//! Converts the raw instruction pointers found in sampled callchains into
//! display names. Every frame of every accepted sample passes through here,
//! so resolution is cached per address.
//!
//! ## Sources of names
//!
//! 1. **DWARF** (`gimli` + `addr2line`): function name of the innermost
//!    (possibly inlined) frame covering the address
//! 2. **ELF symbol table** (`object`): the function symbol whose
//!    `[address, address + size)` covers the address, for binaries built
//!    without debug info but not stripped
//! 3. **Placeholder**: [`UNKNOWN_SYMBOL`] when neither knows the address, or
//!    when the address lies outside the main executable's code sections
//!    (shared libraries, vDSO, JIT code, gaps between sections)
//!
//! Rust names are demangled with `rustc-demangle` in alternate form, which
//! drops the trailing hash (`_ZN3foo3bar17h0123456789abcdefE` → `foo::bar`).
//!
//! ## PIE (Position Independent Executable)
//!
//! Debug info is expressed in link-time addresses, while samples carry
//! runtime addresses. For PIE executables the kernel picks a random load base
//! (ASLR), so:
//!
//! ```text
//! link-time address = runtime address - load base
//! ```
//!
//! The load base is the start of the executable's first mapping in
//! `/proc/self/maps` (see [`memory_maps`]). Non-PIE executables are loaded at
//! their link-time addresses and need no adjustment.
//!
//! ## Threading
//!
//! [`SymbolResolver::resolve`] takes `&mut self`: the underlying service is
//! not assumed reentrant, and the borrow checker serializes callers. The
//! dispatcher owns its resolver on the consumer thread.
//!
//! ## Limitations
//!
//! - Shared library frames are not symbolized
//! - Stripped binaries resolve every frame to the placeholder

pub mod memory_maps;
pub mod resolver;
pub mod symbolizer;

pub use memory_maps::{parse_memory_maps, MemoryRange};
pub use resolver::{StaticResolver, SymbolResolver, UNKNOWN_SYMBOL};
pub use symbolizer::ElfSymbolizer;
