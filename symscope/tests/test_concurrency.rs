use crossbeam_channel::{unbounded, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use symscope::registry::phdr;
use symscope::{Addr2line, Addr2lineConfig, ObjectImage, LT_OBJECT_TOKEN};

const FAKE_BASE: usize = 0x0300_0000_0000_0000;
const READERS: usize = 4;
const OPEN_CLOSE_CYCLES: usize = 16;

const MARKER_LINE: u32 = line!() + 2;
#[inline(never)]
fn marker_function() -> u32 {
    std::hint::black_box(MARKER_LINE)
}

fn marker_addr() -> usize {
    std::hint::black_box(marker_function as usize)
}

enum Event {
    ReaderDone { lookups: usize, runtime_hits: usize },
    WriterDone,
}

#[test]
fn test_lookups_race_with_open_and_close() {
    let service = Arc::new(Addr2line::new(Addr2lineConfig::default()));
    let marker = marker_addr();
    let owner = service.lookup_so(marker).expect("main program is tracked");
    let bias = owner.base_addr();
    let span = owner.end_addr() - owner.begin_addr();
    let exe = std::env::current_exe().unwrap().to_string_lossy().into_owned();

    // Same image relocated far away; it is only ever mapped as a run-time object
    let fake_marker = FAKE_BASE + (marker - bias);
    let fake_begin = FAKE_BASE + (owner.begin_addr() - bias);

    let expected = service.lookup_addr(marker);
    assert!(expected.found);

    let stop = Arc::new(AtomicBool::new(false));
    let (tx, rx) = unbounded();

    for _ in 0..READERS {
        let service = Arc::clone(&service);
        let stop = Arc::clone(&stop);
        let tx = tx.clone();
        let expected = expected.location.clone();
        thread::spawn(move || {
            let mut lookups = 0;
            let mut runtime_hits = 0;
            while !stop.load(Ordering::Acquire) {
                let hit = service.lookup_addr(marker);
                assert!(hit.found);
                assert_eq!(hit.token(), LT_OBJECT_TOKEN);
                assert_eq!(hit.location, expected);

                let fake = service.lookup_addr(fake_marker);
                if fake.found {
                    runtime_hits += 1;
                    assert_ne!(fake.token(), LT_OBJECT_TOKEN);
                    assert_eq!(fake.base_addr(), Some(FAKE_BASE));
                    assert_eq!(fake.location.line, MARKER_LINE);
                }
                lookups += 2;
            }
            tx.send(Event::ReaderDone { lookups, runtime_hits }).unwrap();
        });
    }

    {
        let service = Arc::clone(&service);
        let tx = tx.clone();
        thread::spawn(move || {
            for cookie in 0..OPEN_CLOSE_CYCLES {
                let image =
                    ObjectImage::load(&exe, FAKE_BASE, fake_begin, fake_begin + span).unwrap();
                let handle = service.track_runtime_object(image, cookie);
                assert!(service.so_still_loaded(handle.token()));
                thread::sleep(Duration::from_millis(2));
                assert!(service.object_closed(cookie));
                assert!(!service.so_still_loaded(handle.token()));
            }
            tx.send(Event::WriterDone).unwrap();
        });
    }
    drop(tx);

    // A lock that never hands over shows up as a timeout here
    let timeout = Duration::from_secs(120);
    match rx.recv_timeout(timeout) {
        Ok(Event::WriterDone) => {}
        Ok(Event::ReaderDone { .. }) => panic!("reader finished before the writer"),
        Err(RecvTimeoutError::Timeout) => panic!("writer did not finish, lock starvation?"),
        Err(RecvTimeoutError::Disconnected) => panic!("a thread panicked"),
    }
    stop.store(true, Ordering::Release);

    let mut total = 0;
    for _ in 0..READERS {
        match rx.recv_timeout(timeout) {
            Ok(Event::ReaderDone { lookups, runtime_hits }) => {
                println!("Reader: {lookups} lookups, {runtime_hits} run-time hits");
                total += lookups;
            }
            Ok(Event::WriterDone) => unreachable!(),
            Err(e) => panic!("reader did not finish: {e}"),
        }
    }
    assert!(total > 0);

    assert!(service.runtime_objects().is_empty());
    assert_eq!(service.retired_objects().len(), OPEN_CLOSE_CYCLES);
    assert!(!service.lookup_addr(fake_marker).found);
}

#[test]
fn test_lookups_from_many_threads_agree() {
    let service = Arc::new(Addr2line::new(Addr2lineConfig::default()));
    let targets = [marker_addr(), libc::getpid as usize];
    let expected: Vec<_> = targets.iter().map(|addr| service.lookup_addr(*addr).location).collect();
    println!("Loader reports {} objects", phdr::loaded_objects().len());

    let (tx, rx) = unbounded();
    for _ in 0..8 {
        let service = Arc::clone(&service);
        let tx = tx.clone();
        thread::spawn(move || {
            let locations: Vec<_> =
                (0..64).flat_map(|_| targets.map(|addr| service.lookup_addr(addr).location)).collect();
            tx.send(locations).unwrap();
        });
    }
    drop(tx);

    let mut threads = 0;
    while let Ok(locations) = rx.recv_timeout(Duration::from_secs(60)) {
        for pair in locations.chunks(2) {
            assert_eq!(pair, expected.as_slice());
        }
        threads += 1;
    }
    assert_eq!(threads, 8);
}
