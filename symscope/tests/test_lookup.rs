use symscope::registry::phdr;
use symscope::{Addr2line, Addr2lineConfig, ObjectImage, LT_OBJECT_TOKEN};

const MARKER_LINE: u32 = line!() + 2;
#[inline(never)]
fn marker_function() -> u32 {
    std::hint::black_box(MARKER_LINE)
}

fn marker_addr() -> usize {
    std::hint::black_box(marker_function as usize)
}

fn exe_path() -> String {
    std::env::current_exe().unwrap().to_string_lossy().into_owned()
}

/// Loader entry whose readable segments contain `addr`
fn mapping_of(addr: usize) -> phdr::LoadedObject {
    phdr::loaded_objects()
        .into_iter()
        .find(|object| object.address_span().is_some_and(|(begin, end)| begin <= addr && addr < end))
        .expect("address is mapped")
}

#[test]
fn test_load_time_objects_report_their_bias() {
    let service = Addr2line::new(Addr2lineConfig::default());
    println!("Tracking {} load-time objects", service.loadtime_objects().len());

    let targets = [("main program", marker_addr()), ("libc", libc::getpid as usize)];
    for (what, addr) in targets {
        let owner = service.lookup_so(addr);
        assert!(owner.is_some(), "{what} address {addr:#x} not owned by any object");
        let owner = owner.unwrap();
        println!("  {what}: {owner:?}");
        assert_eq!(owner.base_addr(), mapping_of(addr).bias);
        assert_eq!(owner.token(), LT_OBJECT_TOKEN);
    }
}

#[test]
fn test_marker_resolves_to_its_line() {
    let service = Addr2line::new(Addr2lineConfig::default());
    let result = service.lookup_addr(marker_addr());
    println!("{}", result.format(marker_addr()));

    assert!(result.found);
    assert_eq!(result.location.line, MARKER_LINE);
    let file = result.location.file.as_deref().unwrap();
    assert!(file.ends_with("test_lookup.rs"), "unexpected file {file}");
    let function = result.location.function.as_deref().unwrap();
    assert!(function.contains("marker_function"), "unexpected function {function}");
    assert_eq!(marker_function(), MARKER_LINE);
}

#[test]
fn test_so_lookup_matches_combined_lookup() {
    let service = Addr2line::new(Addr2lineConfig::default());
    let addr = marker_addr();
    let combined = service.lookup_addr(addr);
    let handle = combined.object.clone().unwrap();

    let direct = service.so_lookup_addr(addr - handle.base_addr(), &handle, combined.token());
    assert!(direct.found);
    assert_eq!(direct.object_name, handle.name());
    assert_eq!(direct.location, combined.location);
}

#[test]
fn test_range_with_end_outside_any_section() {
    let service = Addr2line::new(Addr2lineConfig::default());
    let begin = marker_addr();

    let result = service.lookup_addr_range(begin, begin + 0x4000_0000);
    assert!(result.found_begin);
    assert!(!result.found_end);
    assert_eq!(result.location.line, MARKER_LINE);
    assert_eq!(result.end_line, 0);

    let handle = result.object.clone().unwrap();
    let base = handle.base_addr();
    let direct =
        service.so_lookup_addr_range(begin - base, begin - base + 0x4000_0000, &handle, result.token());
    assert!(direct.found_begin && !direct.found_end);
    assert_eq!(direct.end_line, 0);
}

#[test]
fn test_range_within_one_function() {
    let service = Addr2line::new(Addr2lineConfig::default());
    let begin = marker_addr();

    let result = service.lookup_addr_range(begin, begin + 1);
    assert!(result.found_begin);
    assert!(result.found_end);
    assert!(result.end_line >= MARKER_LINE);
}

#[test]
fn test_overlapping_decoy_does_not_capture_address() {
    let addr = marker_addr();
    let mapped = mapping_of(addr);
    let (begin, end) = mapped.address_span().unwrap();

    // Same range, but based so that `addr` falls before the first section
    let decoy = ObjectImage::load(&exe_path(), addr - 16, begin, end).unwrap();
    let real = ObjectImage::load(&exe_path(), mapped.bias, begin, end).unwrap();
    let service = Addr2line::from_images(Addr2lineConfig::default(), vec![decoy, real]);
    assert_eq!(service.overlap_count(), 1);

    let result = service.lookup_addr(addr);
    assert!(result.found);
    assert_eq!(result.base_addr(), Some(mapped.bias));
    assert_eq!(result.location.line, MARKER_LINE);
}

#[test]
fn test_run_time_decoy_does_not_shadow_load_time_owner() {
    let addr = marker_addr();
    let mapped = mapping_of(addr);
    let (begin, end) = mapped.address_span().unwrap();

    let real = ObjectImage::load(&exe_path(), mapped.bias, begin, end).unwrap();
    let service = Addr2line::from_images(Addr2lineConfig::default(), vec![real]);
    let decoy = ObjectImage::load(&exe_path(), addr - 16, begin, end).unwrap();
    let decoy = service.track_runtime_object(decoy, 1);
    assert_eq!(service.overlap_count(), 1);

    let result = service.lookup_addr(addr);
    assert!(result.found);
    assert!(!result.object.as_ref().unwrap().same_object(&decoy));
    assert_eq!(result.token(), LT_OBJECT_TOKEN);
}

#[test]
fn test_unmapped_address_is_a_miss() {
    let service = Addr2line::new(Addr2lineConfig::default());
    let result = service.lookup_addr(0x8);
    assert!(!result.found);
    assert!(result.object_name().is_none());

    let range = service.lookup_addr_range(0x8, 0x10);
    assert!(!range.found_begin && !range.found_end);
}

const HELPER_FIRST_LINE: u32 = line!() + 1;
#[inline(always)]
fn inlined_helper(x: u64) -> u64 {
    x.wrapping_mul(31) ^ 7
}
const HELPER_LAST_LINE: u32 = line!() - 1;

const CALL_LINE: u32 = line!() + 4;
#[inline(never)]
fn inline_caller(x: u64) -> u64 {
    let seed = std::hint::black_box(x);
    let mixed = inlined_helper(seed);
    std::hint::black_box(mixed)
}

#[test]
fn test_inlined_call_reports_outer_call_site() {
    let service = Addr2line::new(Addr2lineConfig::default());
    assert_eq!(inline_caller(1), 24);
    let start = std::hint::black_box(inline_caller as usize);

    let mut lines = Vec::new();
    for addr in start..start + 512 {
        let result = service.lookup_addr(addr);
        let Some(function) = result.location.function.as_deref().filter(|_| result.found) else {
            break;
        };
        assert!(!function.contains("inlined_helper"), "inner frame {function} reported at {addr:#x}");
        if !function.contains("inline_caller") {
            break;
        }
        lines.push(result.location.line);
    }

    println!("inline_caller lines: {lines:?}");
    assert!(lines.contains(&CALL_LINE), "call line {CALL_LINE} never reported");
    assert!(
        lines.iter().all(|line| !(HELPER_FIRST_LINE..=HELPER_LAST_LINE).contains(line)),
        "helper body lines reported"
    );
}
