use std::ops::Range;
use std::sync::Arc;

use crate::aggregation::call_tree::bounded;

/// Display name used for any address that cannot be resolved
pub const UNKNOWN_SYMBOL: &str = "<unknown>";

/// Maps a sampled instruction address to a display name
///
/// Resolution never fails: unresolvable addresses yield [`UNKNOWN_SYMBOL`].
/// Resolving the same address twice yields the same name.
pub trait SymbolResolver: Send {
    fn resolve(&mut self, addr: u64) -> Arc<str>;
}

impl<R: SymbolResolver + ?Sized> SymbolResolver for Box<R> {
    fn resolve(&mut self, addr: u64) -> Arc<str> {
        (**self).resolve(addr)
    }
}

/// Fixed table of function address ranges, used by scripted sessions and tests
#[derive(Debug, Clone)]
pub struct StaticResolver {
    /// `(start, end, name)` sorted by start, ranges are half-open
    functions: Vec<(u64, u64, Arc<str>)>,
    unknown: Arc<str>,
}

impl StaticResolver {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Range<u64>, S)>,
        S: AsRef<str>,
    {
        let mut functions: Vec<(u64, u64, Arc<str>)> = entries
            .into_iter()
            .map(|(range, name)| (range.start, range.end, Arc::from(bounded(name.as_ref()))))
            .collect();
        functions.sort_by_key(|(start, _, _)| *start);
        Self {
            functions,
            unknown: Arc::from(UNKNOWN_SYMBOL),
        }
    }
}

impl SymbolResolver for StaticResolver {
    fn resolve(&mut self, addr: u64) -> Arc<str> {
        let idx = self.functions.partition_point(|(start, _, _)| *start <= addr);
        match idx.checked_sub(1).map(|i| &self.functions[i]) {
            Some((_, end, name)) if addr < *end => Arc::clone(name),
            _ => Arc::clone(&self.unknown),
        }
    }
}
