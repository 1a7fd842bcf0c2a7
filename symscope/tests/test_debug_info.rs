use object::{Object, ObjectSection, ObjectSymbol, SectionFlags};
use std::path::{Path, PathBuf};
use std::process::Command;
use symscope::symbolization::SymbolTable;

const FIXTURE_SOURCE: &str = "\
int fixture_fn(int x)
{
    return x * 3 + 1;
}
";

/// Lines of `fixture_fn` in `FIXTURE_SOURCE`
const FIXTURE_LINES: std::ops::RangeInclusive<u32> = 1..=4;

fn run(program: &str, args: &[&str]) -> bool {
    match Command::new(program).args(args).output() {
        Ok(output) if output.status.success() => true,
        Ok(output) => {
            println!("⚠️  {program} {args:?} failed: {}", String::from_utf8_lossy(&output.stderr));
            false
        }
        Err(e) => {
            println!("⚠️  {program} not available: {e}");
            false
        }
    }
}

/// Compile the fixture into `dir/name` with extra compiler flags
fn build_fixture(dir: &Path, name: &str, flags: &[&str]) -> Option<PathBuf> {
    let source = dir.join("fixture.c");
    std::fs::write(&source, FIXTURE_SOURCE).unwrap();
    let output = dir.join(name);

    let mut args = vec!["-shared", "-fPIC", "-g", "-O0"];
    args.extend_from_slice(flags);
    args.extend_from_slice(&["-o", output.to_str().unwrap(), source.to_str().unwrap()]);
    run("cc", &args).then_some(output)
}

fn fixture_fn_addr(path: &Path) -> u64 {
    let data = std::fs::read(path).unwrap();
    let file = object::File::parse(&*data).unwrap();
    file.symbols()
        .chain(file.dynamic_symbols())
        .find(|sym| sym.name().is_ok_and(|name| name == "fixture_fn"))
        .map(|sym| sym.address())
        .expect("fixture exports fixture_fn")
}

fn assert_resolves_to_source(table: &SymbolTable, addr: u64) {
    let location = table.lookup(addr, 0).begin.expect("fixture_fn resolves");
    println!("  fixture_fn -> {}", location.describe());
    let file = location.file.as_deref().expect("file from DWARF");
    assert!(file.ends_with("fixture.c"), "unexpected file {file}");
    assert!(FIXTURE_LINES.contains(&location.line), "unexpected line {}", location.line);
    assert_eq!(location.function.as_deref(), Some("fixture_fn"));
}

#[test]
fn test_separate_debug_file_via_debuglink() {
    let dir = tempfile::tempdir().unwrap();
    let Some(lib) = build_fixture(dir.path(), "libfixture.so", &[]) else {
        println!("⚠️  No C compiler, skipping");
        return;
    };
    let addr = fixture_fn_addr(&lib);
    let lib_str = lib.to_str().unwrap();
    let debug = dir.path().join("libfixture.so.debug");

    if !run("objcopy", &["--only-keep-debug", lib_str, debug.to_str().unwrap()])
        || !run("strip", &["--strip-debug", lib_str])
    {
        println!("⚠️  binutils missing, skipping");
        return;
    }

    // Stripped and unlinked: function names only
    let stripped = SymbolTable::load(lib_str).unwrap();
    assert!(!stripped.has_dwarf());
    let location = stripped.lookup(addr, 0).begin.unwrap();
    assert_eq!(location.function.as_deref(), Some("fixture_fn"));
    assert_eq!(location.file, None);
    assert_eq!(location.line, 0);

    assert!(run("objcopy", &[&format!("--add-gnu-debuglink={}", debug.display()), lib_str]));
    let linked = SymbolTable::load(lib_str).unwrap();
    assert!(linked.has_dwarf());
    assert_resolves_to_source(&linked, addr);
}

#[test]
fn test_debuglink_with_wrong_checksum_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let Some(lib) = build_fixture(dir.path(), "libfixture.so", &[]) else {
        println!("⚠️  No C compiler, skipping");
        return;
    };
    let lib_str = lib.to_str().unwrap();
    let debug = dir.path().join("libfixture.so.debug");
    if !run("objcopy", &["--only-keep-debug", lib_str, debug.to_str().unwrap()])
        || !run("strip", &["--strip-debug", lib_str])
        || !run("objcopy", &[&format!("--add-gnu-debuglink={}", debug.display()), lib_str])
    {
        println!("⚠️  binutils missing, skipping");
        return;
    }

    // Same name, different contents
    let mut tampered = std::fs::read(&debug).unwrap();
    tampered.extend_from_slice(b"tampered");
    std::fs::write(&debug, tampered).unwrap();

    let table = SymbolTable::load(lib_str).unwrap();
    assert!(!table.has_dwarf());
}

#[test]
fn test_compressed_debug_sections() {
    let dir = tempfile::tempdir().unwrap();
    let Some(lib) = build_fixture(dir.path(), "libfixture-gz.so", &["-gz=zlib"]) else {
        println!("⚠️  Compiler without -gz=zlib, skipping");
        return;
    };

    let data = std::fs::read(&lib).unwrap();
    let file = object::File::parse(&*data).unwrap();
    let compressed = file.section_by_name(".debug_info").is_some_and(|section| {
        matches!(section.flags(), SectionFlags::Elf { sh_flags }
            if sh_flags & u64::from(object::elf::SHF_COMPRESSED) != 0)
    });
    if !compressed {
        println!("⚠️  Toolchain ignored -gz=zlib, skipping");
        return;
    }

    let table = SymbolTable::load(lib.to_str().unwrap()).unwrap();
    assert!(table.has_dwarf());
    assert_resolves_to_source(&table, fixture_fn_addr(&lib));
}
