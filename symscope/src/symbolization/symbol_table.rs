use addr2line::Context;
use gimli::{EndianArcSlice, RunTimeEndian};
use log::debug;
use object::{
    Object, ObjectSection, ObjectSymbol, ObjectSymbolTable, SectionFlags, SymbolKind,
};
use rustc_demangle::demangle;
use std::borrow::Cow;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::domain::{SourceLocation, SymbolTableError};
use crate::symbolization::debug_file;

type DwarfContext = Context<EndianArcSlice<RunTimeEndian>>;

/// Allocatable section of the image, in link-time addresses
#[derive(Debug, Clone, Copy)]
struct SectionRange {
    address: u64,
    size: u64,
}

impl SectionRange {
    fn contains(&self, offset: u64) -> bool {
        offset >= self.address && offset - self.address < self.size
    }
}

#[derive(Debug, Clone)]
struct FunctionSymbol {
    address: u64,
    size: u64,
    name: String,
}

/// Outcome of a lookup inside one image
#[derive(Debug, Clone, Default)]
pub struct OffsetLookup {
    /// Location of the begin offset, `None` if it did not resolve
    pub begin: Option<SourceLocation>,
    /// Line of the end offset, `None` if no end was asked for or it did not resolve
    pub end_line: Option<u32>,
}

/// Decoded symbol table and DWARF line information of one object file
///
/// Not safe for concurrent use: owners wrap it in a mutex and serialize
/// every lookup on the same table.
pub struct SymbolTable {
    ctx: Option<DwarfContext>,
    sections: Vec<SectionRange>,
    /// Sorted by address
    symbols: Vec<FunctionSymbol>,
}

impl SymbolTable {
    /// Open and decode the object file at `path`
    ///
    /// The image must parse as an object file, carry a symbol table (the
    /// dynamic one is accepted for stripped images), and yield at least one
    /// function symbol. Compressed debug sections are decompressed on load.
    ///
    /// # Errors
    /// Returns the first validation step that failed. Nothing acquired up to
    /// that point outlives the call.
    pub fn load(path: &str) -> Result<Self, SymbolTableError> {
        let data = fs::read(path)
            .map_err(|source| SymbolTableError::Read { path: path.to_string(), source })?;
        let obj = object::File::parse(&*data)
            .map_err(|source| SymbolTableError::Format { path: path.to_string(), source })?;

        let table = obj
            .symbol_table()
            .or_else(|| obj.dynamic_symbol_table())
            .ok_or_else(|| SymbolTableError::NoSymbolTable(path.to_string()))?;
        if table.symbols().next().is_none() {
            return Err(SymbolTableError::EmptySymbolTable(path.to_string()));
        }

        let mut symbols: Vec<FunctionSymbol> = table
            .symbols()
            .filter(|sym| sym.kind() == SymbolKind::Text && sym.is_definition())
            .filter(|sym| sym.address() != 0)
            .filter_map(|sym| {
                let name = sym.name().ok().filter(|name| !name.is_empty())?;
                Some(FunctionSymbol { address: sym.address(), size: sym.size(), name: name.to_string() })
            })
            .collect();
        if symbols.is_empty() {
            return Err(SymbolTableError::NoSymbols(path.to_string()));
        }
        symbols.sort_by_key(|sym| sym.address);

        let sections = obj
            .sections()
            .filter(|section| is_allocated(section.flags(), section.address()))
            .map(|section| SectionRange { address: section.address(), size: section.size() })
            .collect();

        let ctx = if has_debug_info(&obj) {
            load_dwarf(path, &obj)
        } else {
            load_separate_dwarf(path, &obj)
        };

        debug!("Read {} function symbols for {path}", symbols.len());
        Ok(Self { ctx, sections, symbols })
    }

    /// Resolve `begin` (and `end`, unless zero) given as link-time offsets
    ///
    /// The begin offset is looked up in the first allocatable section that
    /// contains it and yields a location. The end offset is only resolved
    /// when it lies in that same section.
    #[must_use]
    pub fn lookup(&self, begin: u64, end: u64) -> OffsetLookup {
        for section in self.sections.iter().filter(|section| section.contains(begin)) {
            let Some(location) = self.nearest_line(begin) else {
                continue;
            };
            let end_line = if end != 0 && section.contains(end) {
                self.nearest_line(end).map(|end_location| end_location.line)
            } else {
                None
            };
            return OffsetLookup { begin: Some(location), end_line };
        }
        OffsetLookup::default()
    }

    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Whether line information was loaded, from the object or its debug file
    #[must_use]
    pub fn has_dwarf(&self) -> bool {
        self.ctx.is_some()
    }

    fn nearest_line(&self, pc: u64) -> Option<SourceLocation> {
        let frames = self.ctx.as_ref().map(|ctx| dwarf_frames(ctx, pc)).unwrap_or_default();
        let mut location = outermost_frame(frames).unwrap_or_default();
        if location.function.is_none() {
            location.function = self.symbol_for(pc).map(|sym| format!("{:#}", demangle(&sym.name)));
        }

        let found = location.function.is_some() || location.file.is_some() || location.line != 0;
        found.then_some(location)
    }

    fn symbol_for(&self, pc: u64) -> Option<&FunctionSymbol> {
        let idx = self.symbols.partition_point(|sym| sym.address <= pc);
        let sym = self.symbols.get(idx.checked_sub(1)?)?;
        (sym.size == 0 || pc - sym.address < sym.size).then_some(sym)
    }
}

/// Walk an inline chain (innermost frame first) out to the real call site.
///
/// Every outer frame carries the location at which the frame inside it was
/// inlined, so the last frame names the non-inlined function and the line in
/// it that led to `pc`.
fn outermost_frame<I>(frames: I) -> Option<SourceLocation>
where
    I: IntoIterator<Item = SourceLocation>,
{
    frames.into_iter().last()
}

fn dwarf_frames(ctx: &DwarfContext, pc: u64) -> Vec<SourceLocation> {
    let mut frames = Vec::new();

    if let Ok(mut frame_iter) = ctx.find_frames(pc).skip_all_loads() {
        while let Ok(Some(frame)) = frame_iter.next() {
            let function = frame
                .function
                .as_ref()
                .and_then(|f| f.demangle().ok().map(Cow::into_owned));
            let (file, line) = frame.location.map_or((None, 0), |loc| {
                (loc.file.map(std::string::ToString::to_string), loc.line.unwrap_or(0))
            });
            frames.push(SourceLocation { file, function, line });
        }
    }

    frames
}

fn has_debug_info(obj: &object::File<'_>) -> bool {
    obj.section_by_name(".debug_info").is_some_and(|section| section.size() > 0)
}

/// DWARF from the separate debug file of a stripped object
fn load_separate_dwarf(path: &str, obj: &object::File<'_>) -> Option<DwarfContext> {
    let data = debug_file::find(Path::new(path), obj)?;
    let debug_obj = match object::File::parse(&*data) {
        Ok(debug_obj) => debug_obj,
        Err(e) => {
            debug!("Debug file of {path} is not an object file: {e}");
            return None;
        }
    };
    if !has_debug_info(&debug_obj) {
        debug!("Debug file of {path} carries no .debug_info");
        return None;
    }
    load_dwarf(path, &debug_obj)
}

fn load_dwarf(path: &str, obj: &object::File<'_>) -> Option<DwarfContext> {
    match dwarf_context(obj) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            debug!("DWARF of {path} unusable, falling back to symbols: {e}");
            None
        }
    }
}

fn dwarf_context(obj: &object::File<'_>) -> Result<DwarfContext, gimli::Error> {
    let endian =
        if obj.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

    let load_section =
        |id: gimli::SectionId| -> Result<EndianArcSlice<RunTimeEndian>, gimli::Error> {
            let data = obj
                .section_by_name(id.name())
                .and_then(|section| section.uncompressed_data().ok())
                .unwrap_or(Cow::Borrowed(&[][..]));
            Ok(EndianArcSlice::new(Arc::from(&*data), endian))
        };

    let dwarf = gimli::Dwarf::load(&load_section)?;
    Context::from_dwarf(dwarf)
}

fn is_allocated(flags: SectionFlags, address: u64) -> bool {
    match flags {
        SectionFlags::Elf { sh_flags } => sh_flags & u64::from(object::elf::SHF_ALLOC) != 0,
        _ => address != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn synthetic_table() -> SymbolTable {
        SymbolTable {
            ctx: None,
            sections: vec![
                SectionRange { address: 0x1000, size: 0x1000 },
                SectionRange { address: 0x4000, size: 0x100 },
            ],
            symbols: vec![
                FunctionSymbol { address: 0x1000, size: 0x80, name: "first".to_string() },
                FunctionSymbol { address: 0x1100, size: 0, name: "second".to_string() },
                FunctionSymbol {
                    address: 0x4000,
                    size: 0x10,
                    name: "_ZN4core3ptr13drop_in_place17h0123456789abcdefE".to_string(),
                },
            ],
        }
    }

    fn location(function: &str, file: &str, line: u32) -> SourceLocation {
        SourceLocation {
            file: Some(file.to_string()),
            function: Some(function.to_string()),
            line,
        }
    }

    #[test]
    fn test_outermost_frame_reports_call_site() {
        // helper() inlined into run() at line 40, run() inlined into main() at line 7
        let frames = vec![
            location("helper", "/usr/include/helper.h", 12),
            location("run", "src/run.c", 40),
            location("main", "src/main.c", 7),
        ];
        assert_eq!(outermost_frame(frames), Some(location("main", "src/main.c", 7)));
    }

    #[test]
    fn test_outermost_frame_without_inlining() {
        let frames = vec![location("main", "src/main.c", 3)];
        assert_eq!(outermost_frame(frames), Some(location("main", "src/main.c", 3)));
        assert_eq!(outermost_frame(Vec::new()), None);
    }

    #[test]
    fn test_symbol_fallback() {
        let table = synthetic_table();
        let loc = table.nearest_line(0x1010).unwrap();
        assert_eq!(loc.function.as_deref(), Some("first"));
        assert_eq!(loc.file, None);
        assert_eq!(loc.line, 0);

        // Sized symbol does not cover the gap before the next one
        assert!(table.nearest_line(0x1090).is_none());
        // Unsized symbol covers everything up to the next symbol
        assert_eq!(table.nearest_line(0x1800).unwrap().function.as_deref(), Some("second"));
        // Demangled
        assert_eq!(
            table.nearest_line(0x4004).unwrap().function.as_deref(),
            Some("core::ptr::drop_in_place")
        );
    }

    #[test]
    fn test_lookup_outside_sections() {
        let table = synthetic_table();
        let result = table.lookup(0x3000, 0);
        assert!(result.begin.is_none());
        assert!(result.end_line.is_none());
    }

    #[test]
    fn test_range_end_in_other_section() {
        let table = synthetic_table();
        let result = table.lookup(0x1010, 0x4004);
        assert!(result.begin.is_some());
        assert!(result.end_line.is_none());
    }

    #[test]
    fn test_range_end_outside_any_section() {
        let table = synthetic_table();
        let result = table.lookup(0x1010, 0x9000_0000);
        assert!(result.begin.is_some());
        assert_eq!(result.end_line, None);
    }

    #[test]
    fn test_range_within_one_section() {
        let table = synthetic_table();
        let result = table.lookup(0x1010, 0x1800);
        assert_eq!(result.begin.unwrap().function.as_deref(), Some("first"));
        // symbol-only hit: resolved, but no line information
        assert_eq!(result.end_line, Some(0));
    }

    #[test]
    fn test_load_missing_file() {
        let err = SymbolTable::load("/nonexistent/libnothing.so").err().unwrap();
        assert!(matches!(err, SymbolTableError::Read { .. }));
    }

    #[test]
    fn test_load_non_object_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "definitely not an ELF image").unwrap();
        let err = SymbolTable::load(file.path().to_str().unwrap()).err().unwrap();
        assert!(matches!(err, SymbolTableError::Format { .. }));
    }

    #[test]
    fn test_load_own_executable() {
        let exe = std::env::current_exe().unwrap();
        let table = SymbolTable::load(exe.to_str().unwrap()).unwrap();
        assert!(table.symbol_count() > 0);
        assert!(table.has_dwarf());
    }
}
