use selfprof::symbolization::{ElfSymbolizer, SymbolResolver, UNKNOWN_SYMBOL};

#[test]
fn test_symbolizer_creation() {
    let binary_path = env!("CARGO_BIN_EXE_selfprof");

    let symbolizer = ElfSymbolizer::new(binary_path, None);
    assert!(
        symbolizer.is_ok(),
        "Failed to create symbolizer: {:?}",
        symbolizer.err()
    );
}

#[test]
fn test_symbolizer_resolves_function_names() {
    let binary_path = env!("CARGO_BIN_EXE_selfprof");
    let mut symbolizer =
        ElfSymbolizer::new(binary_path, None).expect("Failed to create symbolizer");

    // Function addresses straight from the symbol table, as link-time addresses
    let Ok(nm_output) = std::process::Command::new("nm")
        .args(["-C", binary_path])
        .output()
    else {
        eprintln!("Skipping test: nm not available");
        return;
    };
    let symbols = String::from_utf8_lossy(&nm_output.stdout);

    let mut resolved_any = false;
    for line in symbols.lines().filter(|l| l.contains(" T ")).take(20) {
        let Some(addr) = line
            .split_whitespace()
            .next()
            .and_then(|a| u64::from_str_radix(a, 16).ok())
        else {
            continue;
        };
        let name = symbolizer.resolve(addr);
        if &*name != UNKNOWN_SYMBOL {
            resolved_any = true;
            break;
        }
    }

    assert!(resolved_any, "No function address from nm resolved to a name");
}

#[test]
fn test_resolution_is_idempotent() {
    let binary_path = env!("CARGO_BIN_EXE_selfprof");
    let mut symbolizer =
        ElfSymbolizer::new(binary_path, None).expect("Failed to create symbolizer");

    for addr in [0x0, 0x1000, 0xdead_beef, u64::MAX] {
        let first = symbolizer.resolve(addr);
        let second = symbolizer.resolve(addr);
        assert_eq!(first, second);
    }
}

#[test]
fn test_addresses_outside_code_are_unknown() {
    let binary_path = env!("CARGO_BIN_EXE_selfprof");
    let mut symbolizer =
        ElfSymbolizer::new(binary_path, None).expect("Failed to create symbolizer");

    for addr in [0x0, 0xdead_beef, u64::MAX] {
        assert_eq!(
            &*symbolizer.resolve(addr),
            UNKNOWN_SYMBOL,
            "0x{addr:x} should not name a function"
        );
    }
}

#[test]
fn test_missing_binary_fails() {
    assert!(ElfSymbolizer::new("/nonexistent/binary", None).is_err());
}
