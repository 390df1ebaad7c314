use addr2line::Context;
use anyhow::{Context as _, Result};
use gimli::{EndianArcSlice, RunTimeEndian};
use log::{debug, info, warn};
use object::{Object, ObjectKind, ObjectSection, ObjectSymbol as _, SectionKind, SymbolKind};
use rustc_demangle::demangle;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::memory_maps::{parse_memory_maps, MemoryRange};
use super::resolver::{SymbolResolver, UNKNOWN_SYMBOL};
use crate::aggregation::call_tree::bounded;

/// Resolves addresses inside one ELF executable to function names
///
/// Includes a cache so each unique address is looked up once, which matters
/// because hot loops produce the same return addresses over and over.
pub struct ElfSymbolizer {
    /// `None` when the binary has no usable DWARF
    dwarf: Option<Context<EndianArcSlice<RunTimeEndian>>>,
    /// Function symbols sorted by start address
    symbols: Vec<FunctionSymbol>,
    /// Link-time `[start, end)` of every executable section
    text: Vec<(u64, u64)>,
    /// Where the executable is mapped; addresses outside it are not ours
    memory_range: Option<MemoryRange>,
    /// Subtracted from runtime addresses (non-zero only for PIE)
    load_bias: u64,
    cache: HashMap<u64, Arc<str>>,
    unknown: Arc<str>,
}

impl ElfSymbolizer {
    /// Symbolizer for the currently running executable
    ///
    /// # Errors
    /// Returns an error if the executable cannot be located, read or parsed
    pub fn for_current_process() -> Result<Self> {
        let exe = std::env::current_exe().context("Failed to locate current executable")?;
        let exe_str = exe.to_str().context("Executable path is not valid UTF-8")?;

        let memory_range = match parse_memory_maps(exe_str) {
            Ok(range) => Some(range),
            Err(e) => {
                warn!("{e:#}; addresses will be used without rebasing");
                None
            }
        };

        Self::new(&exe, memory_range)
    }

    /// Create a symbolizer for `binary_path`, mapped at `memory_range` if known
    ///
    /// # Errors
    /// Returns an error if the binary file cannot be read or parsed
    pub fn new<P: AsRef<Path>>(
        binary_path: P,
        memory_range: Option<MemoryRange>,
    ) -> Result<Self> {
        let binary_path = binary_path.as_ref();
        let binary_data = fs::read(binary_path)
            .with_context(|| format!("Failed to read binary file {}", binary_path.display()))?;

        let obj_file =
            object::File::parse(&*binary_data).context("Failed to parse object file")?;

        let endian = if obj_file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let load_section =
            |id: gimli::SectionId| -> Result<EndianArcSlice<RunTimeEndian>, gimli::Error> {
                let data = obj_file
                    .section_by_name(id.name())
                    .and_then(|section| section.uncompressed_data().ok())
                    .unwrap_or(std::borrow::Cow::Borrowed(&[][..]));
                Ok(EndianArcSlice::new(Arc::from(&*data), endian))
            };

        let dwarf = match gimli::Dwarf::load(&load_section).and_then(Context::from_dwarf) {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                warn!("DWARF unavailable ({e}); falling back to the symbol table");
                None
            }
        };

        let symbols = function_symbols(&obj_file);
        let text = text_ranges(&obj_file);

        // PIE executables are ET_DYN and linked at 0; the kernel slides them
        let load_bias = match (obj_file.kind(), memory_range) {
            (ObjectKind::Dynamic, Some(range)) => range.start,
            _ => 0,
        };

        info!(
            "Symbolizer ready for {}: {} symbols, DWARF {}, load bias 0x{load_bias:x}",
            binary_path.display(),
            symbols.len(),
            if dwarf.is_some() { "present" } else { "absent" },
        );

        Ok(Self {
            dwarf,
            symbols,
            text,
            memory_range,
            load_bias,
            cache: HashMap::new(),
            unknown: Arc::from(UNKNOWN_SYMBOL),
        })
    }

    /// Translate a runtime address into the executable's link-time address space
    ///
    /// Returns `None` for addresses outside the executable's mapping.
    #[must_use]
    pub fn file_address(&self, addr: u64) -> Option<u64> {
        match self.memory_range {
            Some(range) if !range.contains(addr) => None,
            _ => addr.checked_sub(self.load_bias),
        }
    }

    /// Look up a link-time address, DWARF first, then the symbol table
    ///
    /// Only addresses inside an executable section can name a function.
    #[must_use]
    pub fn lookup(&self, file_addr: u64) -> Option<Arc<str>> {
        if !self.in_text(file_addr) {
            return None;
        }
        self.lookup_dwarf(file_addr)
            .or_else(|| self.lookup_symbol(file_addr))
    }

    fn in_text(&self, file_addr: u64) -> bool {
        self.text
            .iter()
            .any(|&(start, end)| start <= file_addr && file_addr < end)
    }

    fn lookup_dwarf(&self, file_addr: u64) -> Option<Arc<str>> {
        let ctx = self.dwarf.as_ref()?;
        let mut frames = ctx.find_frames(file_addr).skip_all_loads().ok()?;

        // Innermost (possibly inlined) frame comes first
        while let Ok(Some(frame)) = frames.next() {
            if let Some(raw) = frame.function.as_ref().and_then(|f| f.raw_name().ok()) {
                let name = Self::demangle_symbol(&raw);
                return Some(Arc::from(bounded(&name)));
            }
        }
        None
    }

    fn lookup_symbol(&self, file_addr: u64) -> Option<Arc<str>> {
        let idx = self.symbols.partition_point(|sym| sym.start <= file_addr);
        let sym = self.symbols.get(idx.checked_sub(1)?)?;
        sym.contains(file_addr).then(|| Arc::clone(&sym.name))
    }

    /// Demangle a Rust symbol name
    #[must_use]
    pub fn demangle_symbol(symbol: &str) -> String {
        format!("{:#}", demangle(symbol))
    }
}

impl SymbolResolver for ElfSymbolizer {
    fn resolve(&mut self, addr: u64) -> Arc<str> {
        if let Some(cached) = self.cache.get(&addr) {
            return Arc::clone(cached);
        }

        let name = self
            .file_address(addr)
            .and_then(|file_addr| self.lookup(file_addr))
            .unwrap_or_else(|| Arc::clone(&self.unknown));

        debug!("Resolved 0x{addr:x} -> {name}");
        self.cache.insert(addr, Arc::clone(&name));
        name
    }
}

/// A function's link-time extent from the symbol table
#[derive(Debug, Clone)]
struct FunctionSymbol {
    start: u64,
    /// Zero for symbols the linker emitted without a size
    size: u64,
    name: Arc<str>,
}

impl FunctionSymbol {
    fn contains(&self, addr: u64) -> bool {
        if self.size == 0 {
            return addr == self.start;
        }
        addr >= self.start && addr - self.start < self.size
    }
}

/// Named text symbols, demangled and sorted by address
fn function_symbols(obj_file: &object::File<'_>) -> Vec<FunctionSymbol> {
    let mut symbols: Vec<FunctionSymbol> = obj_file
        .symbols()
        .filter(|sym| sym.kind() == SymbolKind::Text && sym.address() != 0)
        .filter_map(|sym| {
            let name = sym.name().ok().filter(|n| !n.is_empty())?;
            let demangled = ElfSymbolizer::demangle_symbol(name);
            Some(FunctionSymbol {
                start: sym.address(),
                size: sym.size(),
                name: Arc::from(bounded(&demangled)),
            })
        })
        .collect();
    symbols.sort_by_key(|sym| sym.start);
    symbols.dedup_by_key(|sym| sym.start);
    symbols
}

/// Link-time ranges of the executable's code sections
fn text_ranges(obj_file: &object::File<'_>) -> Vec<(u64, u64)> {
    obj_file
        .sections()
        .filter(|section| section.kind() == SectionKind::Text && section.size() > 0)
        .filter_map(|section| {
            let start = section.address();
            Some((start, start.checked_add(section.size())?))
        })
        .collect()
}
