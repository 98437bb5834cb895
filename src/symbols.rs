//! Address-to-name resolution for report rendering
//!
//! Resolution failure is expected (stripped code, trampolines, addresses
//! outside any known object) and is reported as `None`, never as an error.
//!
//! Resolvers:
//! - `ProcessResolver`: addresses of the running process (`backtrace`)
//! - `DwarfResolver`: addresses of an on-disk binary (`addr2line`, with the
//!   ELF/Mach-O symbol table as fallback)
//! - `SymbolTable`: an explicit address -> name map
//! - `AddressResolver`: names every node by its hex address

use crate::call_node::CallSiteId;
use crate::error::{ProfilerError, Result};
use object::{Object, ObjectSection, ObjectSymbol};
use std::collections::HashMap;
use std::ffi::c_void;
use std::fs::{self, File};
use std::path::Path;
use tracing::debug;

/// Resolves a call site to a human-readable function name
pub trait SymbolResolver {
    fn resolve(&self, site: CallSiteId) -> Option<String>;
}

impl<R: SymbolResolver + ?Sized> SymbolResolver for &R {
    fn resolve(&self, site: CallSiteId) -> Option<String> {
        (**self).resolve(site)
    }
}

impl<R: SymbolResolver + ?Sized> SymbolResolver for Box<R> {
    fn resolve(&self, site: CallSiteId) -> Option<String> {
        (**self).resolve(site)
    }
}

/// Resolver for code addresses of the current process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessResolver;

impl ProcessResolver {
    pub fn new() -> Self {
        Self
    }
}

impl SymbolResolver for ProcessResolver {
    fn resolve(&self, site: CallSiteId) -> Option<String> {
        let mut name = None;
        backtrace::resolve(site.address() as usize as *mut c_void, |symbol| {
            if name.is_none() {
                // Alternate formatting drops the trailing hash of Rust symbols
                name = symbol.name().map(|n| format!("{:#}", n));
            }
        });
        name
    }
}

/// Resolver backed by the debug info and symbol table of a binary
pub struct DwarfResolver {
    /// addr2line context for DWARF lookups
    context: addr2line::Context<gimli::EndianRcSlice<gimli::RunTimeEndian>>,
    /// (address, name) from the object symbol table, sorted by address
    symbols: Vec<(u64, String)>,
    /// Runtime address minus link-time address
    load_bias: u64,
}

impl DwarfResolver {
    /// Load debug info and symbols from an ELF or Mach-O binary
    pub fn load(binary_path: &Path) -> Result<Self> {
        let load_error = |reason: String| ProfilerError::SymbolLoad {
            path: binary_path.to_path_buf(),
            reason,
        };

        if !binary_path.exists() {
            return Err(load_error("binary does not exist".to_string()));
        }

        let file = File::open(binary_path)?;
        // SAFETY: the mapping is only read while parsing below; section data is
        // copied out before the map is dropped.
        let mmap = unsafe { memmap2::Mmap::map(&file) }?;

        let object = object::File::parse(&*mmap)
            .map_err(|e| load_error(format!("failed to parse object file: {}", e)))?;

        let endian = if object.is_little_endian() {
            gimli::RunTimeEndian::Little
        } else {
            gimli::RunTimeEndian::Big
        };

        let load_section = |id: gimli::SectionId| -> std::result::Result<
            gimli::EndianRcSlice<gimli::RunTimeEndian>,
            gimli::Error,
        > {
            let data = object
                .section_by_name(id.name())
                .and_then(|section| section.uncompressed_data().ok())
                .unwrap_or(std::borrow::Cow::Borrowed(&[]));
            let bytes: std::rc::Rc<[u8]> = std::rc::Rc::from(data.into_owned());
            Ok(gimli::EndianRcSlice::new(bytes, endian))
        };

        let dwarf = gimli::Dwarf::load(load_section)
            .map_err(|e| load_error(format!("failed to load DWARF sections: {}", e)))?;
        let context = addr2line::Context::from_dwarf(dwarf)
            .map_err(|e| load_error(format!("failed to create DWARF context: {}", e)))?;

        let mut symbols: Vec<(u64, String)> = object
            .symbols()
            .chain(object.dynamic_symbols())
            .filter(|symbol| symbol.kind() == object::SymbolKind::Text && symbol.address() != 0)
            .filter_map(|symbol| {
                let name = symbol.name().ok()?;
                Some((symbol.address(), demangle_symbol(name)))
            })
            .collect();
        symbols.sort_by_key(|(address, _)| *address);
        symbols.dedup_by_key(|(address, _)| *address);

        debug!(
            path = %binary_path.display(),
            symbols = symbols.len(),
            "loaded symbol information"
        );

        Ok(Self {
            context,
            symbols,
            load_bias: 0,
        })
    }

    /// Subtract `bias` from every address before lookup
    pub fn with_load_bias(mut self, bias: u64) -> Self {
        self.load_bias = bias;
        self
    }

    /// Name of the outermost (non-inlined) function containing `address`
    fn dwarf_function(&self, address: u64) -> Option<String> {
        let mut frames = self.context.find_frames(address).skip_all_loads().ok()?;
        let mut outermost = None;
        while let Ok(Some(frame)) = frames.next() {
            if let Some(function) = frame.function {
                if let Ok(name) = function.demangle() {
                    outermost = Some(name.into_owned());
                }
            }
        }
        outermost
    }

    /// Nearest symbol-table entry at or below `address`
    fn table_function(&self, address: u64) -> Option<String> {
        let index = match self.symbols.binary_search_by_key(&address, |(a, _)| *a) {
            Ok(index) => index,
            Err(0) => return None,
            Err(index) => index - 1,
        };
        self.symbols.get(index).map(|(_, name)| name.clone())
    }
}

impl SymbolResolver for DwarfResolver {
    fn resolve(&self, site: CallSiteId) -> Option<String> {
        let address = site.address().checked_sub(self.load_bias)?;
        self.dwarf_function(address)
            .or_else(|| self.table_function(address))
    }
}

/// Explicit address -> name map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    names: HashMap<CallSiteId, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the name of a call site
    pub fn insert<S: Into<String>>(&mut self, site: CallSiteId, name: S) {
        self.names.insert(site, name.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Parse `<address> <name>` lines; `#` starts a comment line
    ///
    /// The name is the rest of the line, so demangled names with spaces
    /// survive.
    pub fn parse(content: &str) -> Result<Self> {
        let mut table = Self::new();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parse_error = |reason: String| ProfilerError::SymbolMapParse {
                line: index + 1,
                reason,
            };

            let (address, name) = line
                .split_once(char::is_whitespace)
                .ok_or_else(|| parse_error(format!("missing name after '{}'", line)))?;
            let site: CallSiteId = address
                .parse()
                .map_err(|e| parse_error(format!("invalid address '{}': {}", address, e)))?;
            table.insert(site, name.trim());
        }

        Ok(table)
    }

    /// Read and parse a symbol map file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve(&self, site: CallSiteId) -> Option<String> {
        self.names.get(&site).cloned()
    }
}

impl<S: Into<String>> FromIterator<(CallSiteId, S)> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = (CallSiteId, S)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (site, name) in iter {
            table.insert(site, name);
        }
        table
    }
}

/// Names every call site by its hex address
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressResolver;

impl SymbolResolver for AddressResolver {
    fn resolve(&self, site: CallSiteId) -> Option<String> {
        Some(site.to_string())
    }
}

/// Demangle a Rust or C++ symbol name, leaving anything else untouched
pub fn demangle_symbol(symbol: &str) -> String {
    addr2line::demangle_auto(std::borrow::Cow::Borrowed(symbol), None).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn compile_test_binary() -> (TempDir, std::path::PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let src_file = temp_dir.path().join("test.rs");
        let bin_file = temp_dir.path().join("test_bin");

        fs::write(&src_file, "fn main() { println!(\"test\"); }").unwrap();

        Command::new("rustc")
            .arg(&src_file)
            .arg("-o")
            .arg(&bin_file)
            .arg("-g")
            .status()
            .unwrap();

        (temp_dir, bin_file)
    }

    #[test]
    fn test_dwarf_resolver_loads() {
        let (_temp_dir, bin_file) = compile_test_binary();
        let result = DwarfResolver::load(&bin_file);
        assert!(result.is_ok(), "Should load symbols: {:?}", result.err());
    }

    #[test]
    fn test_dwarf_resolver_missing_binary() {
        let result = DwarfResolver::load(Path::new("/nonexistent/calltree/binary"));
        assert!(matches!(result, Err(ProfilerError::SymbolLoad { .. })));
    }

    #[test]
    fn test_dwarf_resolver_unknown_address_is_none() {
        let (_temp_dir, bin_file) = compile_test_binary();
        let resolver = DwarfResolver::load(&bin_file).unwrap();
        assert_eq!(resolver.resolve(CallSiteId::new(0)), None);
    }

    #[test]
    fn test_dwarf_resolver_bias_underflow_is_none() {
        let (_temp_dir, bin_file) = compile_test_binary();
        let resolver = DwarfResolver::load(&bin_file)
            .unwrap()
            .with_load_bias(0x1000);
        assert_eq!(resolver.resolve(CallSiteId::new(0x10)), None);
    }

    #[inline(never)]
    fn resolvable_marker_function() -> u32 {
        std::hint::black_box(7)
    }

    #[test]
    fn test_process_resolver_names_own_function() {
        let address = resolvable_marker_function as usize as u64;
        assert_eq!(resolvable_marker_function(), 7);
        let name = ProcessResolver::new().resolve(CallSiteId::new(address));
        if let Some(name) = name {
            assert!(name.contains("resolvable_marker_function"), "got {name}");
        }
    }

    #[test]
    fn test_process_resolver_null_is_none() {
        assert_eq!(ProcessResolver::new().resolve(CallSiteId::new(0)), None);
    }

    #[test]
    fn test_symbol_table_parse() {
        let table = SymbolTable::parse(
            "# symbols\n0x1000 main\n4097  std::vec::Vec<T>::push\n\n",
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve(CallSiteId::new(0x1000)).as_deref(), Some("main"));
        assert_eq!(
            table.resolve(CallSiteId::new(4097)).as_deref(),
            Some("std::vec::Vec<T>::push")
        );
        assert_eq!(table.resolve(CallSiteId::new(1)), None);
    }

    #[test]
    fn test_symbol_table_parse_errors() {
        assert!(matches!(
            SymbolTable::parse("0x1000"),
            Err(ProfilerError::SymbolMapParse { line: 1, .. })
        ));
        assert!(matches!(
            SymbolTable::parse("main 0x1000\n"),
            Err(ProfilerError::SymbolMapParse { line: 1, .. })
        ));
    }

    #[test]
    fn test_symbol_table_from_iter() {
        let table: SymbolTable = vec![(CallSiteId::new(1), "a"), (CallSiteId::new(2), "b")]
            .into_iter()
            .collect();
        assert_eq!(table.resolve(CallSiteId::new(2)).as_deref(), Some("b"));
    }

    #[test]
    fn test_address_resolver() {
        assert_eq!(
            AddressResolver.resolve(CallSiteId::new(0xbeef)).as_deref(),
            Some("0xbeef")
        );
    }

    #[test]
    fn test_boxed_resolver_delegates() {
        let boxed: Box<dyn SymbolResolver> = Box::new(AddressResolver);
        assert_eq!(boxed.resolve(CallSiteId::new(1)).as_deref(), Some("0x1"));
    }

    #[test]
    fn test_demangle_symbol() {
        assert_eq!(demangle_symbol("main"), "main");
        assert_eq!(
            demangle_symbol("_ZN4core3fmt5write17h1234567890abcdefE"),
            "core::fmt::write"
        );
    }
}
