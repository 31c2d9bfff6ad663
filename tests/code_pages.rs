//! Code page, arena and critical section behaviour through the public API.

use std::sync::Arc;
use std::thread;

use vasm::config::JitConfig;
use vasm::jit::probe::{self, AddThunk};
use vasm::jit::{CodeArena, CodeBuffer, CodePage, CriticalSection, ErrorKind, HostProcessor, JitError};

#[test]
fn test_page_plus_one_spans_two_pages() {
    let ps = CodePage::minimum_page_size();
    let page = CodePage::new(ps + 1, None);
    assert!(page.size() >= 2 * ps);
    assert_eq!(page.size() % ps, 0);
}

#[test]
fn test_shared_section_orders_writes_before_finalize() {
    const THREADS: usize = 12;
    const CHUNK: usize = 40;

    // An emitter-level section shared by several pages' writers.
    let section = Arc::new(CriticalSection::new());
    let page = CodePage::new(THREADS * CHUNK, None);

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let section = Arc::clone(&section);
            let page = page.grab();
            thread::spawn(move || {
                let _held = section.enter();
                let mut writer = page.writer();
                for (j, byte) in (0..CHUNK).map(|j| (j, (i * 7 + j) as u8)) {
                    writer.write_at(i * CHUNK + j, &[byte]).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    section.with(|| page.finalize()).unwrap();
    for i in 0..THREADS {
        let expected: Vec<u8> = (0..CHUNK).map(|j| (i * 7 + j) as u8).collect();
        assert_eq!(page.read(i * CHUNK, CHUNK).unwrap(), expected);
    }
}

#[test]
fn test_finalized_page_rejects_writes() {
    let page = CodePage::new(32, None);
    let mut buf = CodeBuffer::new();
    buf.emit_bytes(&[0xCC; 8]);
    buf.commit(&page).unwrap();
    page.finalize().unwrap();
    page.finalize().unwrap();

    let err = buf.commit(&page).unwrap_err();
    assert!(matches!(err, JitError::PageFinalized));
    assert_eq!(err.kind(), ErrorKind::ContractViolation);
    assert_eq!(page.read(0, 8).unwrap(), vec![0xCC; 8]);
}

#[test]
fn test_thunk_survives_arena_and_handles() {
    let cpu = HostProcessor::host();
    let arena = CodeArena::new(&JitConfig::default());

    let mut buf = CodeBuffer::new();
    probe::emit_add_thunk(&cpu, &mut buf).unwrap();
    let slices: Vec<_> = (0..4).map(|_| arena.install(buf.code()).unwrap()).collect();
    assert_eq!(arena.page_count(), 1);

    unsafe {
        assert!(slices[0].entry::<AddThunk>().is_none());
    }
    arena.seal().unwrap();
    drop(arena);

    // The arena is gone; the slices still keep the page mapped.
    for (i, slice) in slices.iter().enumerate() {
        let add: AddThunk = unsafe { slice.entry() }.unwrap();
        assert_eq!(add(i as i64, 100), 100 + i as i64);
    }
    assert_eq!(slices[0].page().references(), 4);
}

#[test]
fn test_thunk_runs_while_another_page_is_written() {
    let cpu = HostProcessor::host();
    let code = CodePage::new(64, None);
    let offset = probe::install_add_thunk(&cpu, &code).unwrap();
    code.finalize().unwrap();
    let add: AddThunk = unsafe { code.entry(offset) }.unwrap();

    let scratch = CodePage::new(64, None);
    let mut writer = scratch.writer();
    writer.append(&[0xAA; 4]).unwrap();
    assert_eq!(add(20, 22), 42);
    writer.append(&[0xBB; 4]).unwrap();
    assert_eq!(add(-5, 2), -3);
    drop(writer);

    assert_eq!(scratch.read(0, 8).unwrap(), [[0xAA; 4], [0xBB; 4]].concat());
}

#[test]
fn test_thunk_called_from_other_threads() {
    let cpu = HostProcessor::host();
    let page = CodePage::new(64, None);
    let offset = probe::install_add_thunk(&cpu, &page).unwrap();
    page.finalize().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let page = page.grab();
            thread::spawn(move || {
                let add: AddThunk = unsafe { page.entry(offset) }.unwrap();
                add(i, i)
            })
        })
        .collect();
    let results: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results, vec![0, 2, 4, 6]);
}
