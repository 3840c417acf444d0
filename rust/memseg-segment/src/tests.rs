use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;

use memseg_common::error::{ErrorCategory, ErrorKind};
use memseg_layout::value::{
    ADDRESS, BOOLEAN, BYTE, CHAR, DOUBLE, FLOAT, INT, INT_UNALIGNED, LONG, SHORT,
};
use memseg_layout::{ByteOrder, MemoryLayout};
use memseg_page_alloc::page_buffer::PageBuffer;

use crate::{
    Arena, Charset, MapMode, MemorySegment, RestrictedAccess, ScopeKind, SegmentAllocator,
    SegmentKind,
};

fn category<T: std::fmt::Debug>(result: memseg_common::Result<T>) -> ErrorCategory {
    result.unwrap_err().category()
}

#[test]
fn test_write_read_close() {
    let arena = Arena::of_confined();
    let segment = arena.allocate(40, 4).unwrap();
    assert_eq!(segment.kind(), SegmentKind::Native);
    assert_eq!(segment.scope(), arena.scope());
    assert!(!segment.is_read_only());

    for i in 0..10 {
        segment.set_at_index(&INT, i, i as i32).unwrap();
    }
    let values: Vec<i32> = (0..10)
        .map(|i| segment.get_at_index(&INT, i).unwrap())
        .collect();
    assert_eq!(values, (0..10).collect::<Vec<i32>>());

    arena.close().unwrap();
    assert!(!arena.scope().is_alive());
    assert_eq!(category(segment.get_at_index::<i32>(&INT, 0)), ErrorCategory::Lifetime);
    assert_eq!(category(segment.set_at_index(&INT, 0, 1i32)), ErrorCategory::Lifetime);
    assert_eq!(category(segment.fill(0)), ErrorCategory::Lifetime);
    assert_eq!(category(arena.close()), ErrorCategory::Lifetime);
    assert_eq!(category(arena.allocate(8, 8)), ErrorCategory::Lifetime);
}

#[test]
fn test_slices_share_memory_and_lifetime() {
    let arena = Arena::of_confined();
    let segment = arena.allocate(64, 8).unwrap();
    let slice = segment.as_slice(16, 16).unwrap();
    slice.set(&LONG, 8, -1i64).unwrap();
    assert_eq!(segment.get::<i64>(&LONG, 24).unwrap(), -1);

    let again = slice.as_slice(0, 16).unwrap();
    assert_eq!(again, slice);
    assert_eq!(again.byte_size(), slice.byte_size());
    assert_eq!(again.get::<i64>(&LONG, 8).unwrap(), -1);

    assert_eq!(category(segment.as_slice(65, 0)), ErrorCategory::OutOfBounds);
    assert_eq!(category(segment.as_slice(60, 5)), ErrorCategory::OutOfBounds);
    assert!(segment.as_slice(64, 0).unwrap().is_empty());
    assert_eq!(segment.as_slice_from(40).unwrap().byte_size(), 24);

    arena.close().unwrap();
    assert_eq!(category(again.get::<i64>(&LONG, 0)), ErrorCategory::Lifetime);
}

#[test]
fn test_bounds_property() {
    let arena = Arena::of_confined();
    let size = 97;
    let segment = arena.allocate(size, 8).unwrap();
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    for _ in 0..2000 {
        let offset = rng.u64(0..size + 16);
        let result = segment.get::<i32>(&INT_UNALIGNED, offset);
        if offset + 4 <= size {
            assert!(result.is_ok(), "offset {offset}");
        } else {
            assert_eq!(category(result), ErrorCategory::OutOfBounds, "offset {offset}");
        }
    }
    assert_eq!(
        category(segment.get::<i32>(&INT_UNALIGNED, u64::MAX - 1)),
        ErrorCategory::OutOfBounds
    );
}

#[test]
fn test_alignment_property() {
    let arena = Arena::of_confined();
    let segment = arena.allocate(128, 16).unwrap();
    let address = segment.address();
    for offset in 0..64 {
        let expect = |alignment: u64, outcome: memseg_common::Result<()>| {
            if (address + offset) % alignment == 0 {
                assert!(outcome.is_ok(), "offset {offset}, alignment {alignment}");
            } else {
                assert_eq!(category(outcome), ErrorCategory::Misaligned);
            }
        };
        expect(2, segment.get::<i16>(&SHORT, offset).map(drop));
        expect(4, segment.get::<i32>(&INT, offset).map(drop));
        expect(8, segment.get::<i64>(&LONG, offset).map(drop));
        expect(8, segment.set(&DOUBLE, offset, 0.5f64));
        assert!(segment.get::<i32>(&INT_UNALIGNED, offset).is_ok());
    }
    assert_eq!(
        category(segment.as_slice_aligned(4, 8, 8)),
        ErrorCategory::Misaligned
    );
    assert!(segment.as_slice_aligned(8, 8, 8).is_ok());
    assert_eq!(category(segment.as_slice_aligned(8, 8, 3)), ErrorCategory::InvalidArgument);
}

#[test]
fn test_value_round_trips() {
    let arena = Arena::of_confined();
    let segment = arena.allocate(16, 8).unwrap();
    let mut rng = fastrand::Rng::with_seed(42);
    for _ in 0..200 {
        let b = rng.i8(..);
        segment.set(&BYTE, 1, b).unwrap();
        assert_eq!(segment.get::<i8>(&BYTE, 1).unwrap(), b);

        let c = rng.u16(..);
        segment.set(&CHAR, 2, c).unwrap();
        assert_eq!(segment.get::<u16>(&CHAR, 2).unwrap(), c);

        let s = rng.i16(..);
        segment.set(&SHORT, 6, s).unwrap();
        assert_eq!(segment.get::<i16>(&SHORT, 6).unwrap(), s);

        let i = rng.i32(..);
        segment.set(&INT, 4, i).unwrap();
        assert_eq!(segment.get::<i32>(&INT, 4).unwrap(), i);

        let f = f32::from_bits(rng.u32(..));
        segment.set(&FLOAT, 12, f).unwrap();
        assert_eq!(segment.get::<f32>(&FLOAT, 12).unwrap().to_bits(), f.to_bits());

        let l = rng.i64(..);
        segment.set(&LONG, 8, l).unwrap();
        assert_eq!(segment.get::<i64>(&LONG, 8).unwrap(), l);

        let d = f64::from_bits(rng.u64(..));
        segment.set(&DOUBLE, 0, d).unwrap();
        assert_eq!(segment.get::<f64>(&DOUBLE, 0).unwrap().to_bits(), d.to_bits());
    }
    segment.set(&BOOLEAN, 3, true).unwrap();
    assert!(segment.get::<bool>(&BOOLEAN, 3).unwrap());
    segment.set(&BYTE, 3, 2u8).unwrap();
    assert!(segment.get::<bool>(&BOOLEAN, 3).unwrap());
}

#[test]
fn test_carrier_mismatch() {
    let segment = Arena::of_auto().allocate(8, 8).unwrap();
    assert_eq!(category(segment.get::<i64>(&INT, 0)), ErrorCategory::InvalidArgument);
    assert_eq!(category(segment.set(&DOUBLE, 0, 1.0f32)), ErrorCategory::InvalidArgument);
}

#[test]
fn test_byte_order() {
    let segment = Arena::of_auto().allocate(8, 8).unwrap();
    let big = INT.with_order(ByteOrder::BigEndian);
    segment.set(&big, 0, 0x0102_0304i32).unwrap();
    assert_eq!(segment.to_vec::<u8>().unwrap()[..4], [1, 2, 3, 4]);
    assert_eq!(segment.get::<i32>(&big, 0).unwrap(), 0x0102_0304);

    let little = INT.with_order(ByteOrder::LittleEndian);
    assert_eq!(segment.get::<i32>(&little, 0).unwrap(), 0x0403_0201);
}

#[test]
fn test_read_only() {
    let segment = Arena::of_auto().allocate(8, 8).unwrap();
    segment.set(&LONG, 0, 5i64).unwrap();
    let view = segment.as_read_only();
    assert!(view.is_read_only());
    assert_eq!(view.get::<i64>(&LONG, 0).unwrap(), 5);
    assert_eq!(category(view.set(&LONG, 0, 6i64)), ErrorCategory::ReadOnly);
    assert_eq!(category(view.fill(0)), ErrorCategory::ReadOnly);
    assert_eq!(
        category(MemorySegment::copy(&segment, 0, &view, 0, 8)),
        ErrorCategory::ReadOnly
    );
    assert!(view.as_slice(0, 4).unwrap().is_read_only());
    assert_eq!(view, segment);
}

#[test]
fn test_fill_and_copy() {
    let arena = Arena::of_confined();
    let a = arena.allocate(16, 1).unwrap();
    let b = arena.allocate(16, 1).unwrap();
    a.fill(0xab).unwrap();
    b.copy_from(&a).unwrap();
    assert!(b.to_vec::<u8>().unwrap().iter().all(|&x| x == 0xab));

    assert_eq!(category(MemorySegment::copy(&a, 8, &b, 0, 9)), ErrorCategory::OutOfBounds);
    assert_eq!(category(MemorySegment::copy(&a, 0, &b, 8, 9)), ErrorCategory::OutOfBounds);
    MemorySegment::copy(&a, 16, &b, 16, 0).unwrap();
}

#[test]
fn test_copy_overlapping() {
    let segment = MemorySegment::of_vec((0u8..16).collect::<Vec<_>>());
    MemorySegment::copy(&segment, 0, &segment, 4, 8).unwrap();
    assert_eq!(
        segment.to_vec::<u8>().unwrap(),
        [0, 1, 2, 3, 0, 1, 2, 3, 4, 5, 6, 7, 12, 13, 14, 15]
    );

    let segment = MemorySegment::of_vec((0u8..16).collect::<Vec<_>>());
    MemorySegment::copy(&segment, 4, &segment, 0, 8).unwrap();
    assert_eq!(
        segment.to_vec::<u8>().unwrap(),
        [4, 5, 6, 7, 8, 9, 10, 11, 8, 9, 10, 11, 12, 13, 14, 15]
    );
}

#[test]
fn test_copy_elements_swaps_bytes() {
    let arena = Arena::of_confined();
    let src = arena.allocate_from_slice(&[0x0102i16, 0x0304]).unwrap();
    let dst = arena.allocate(4, 2).unwrap();
    let swapped = SHORT.with_order(if ByteOrder::NATIVE == ByteOrder::BigEndian {
        ByteOrder::LittleEndian
    } else {
        ByteOrder::BigEndian
    });
    MemorySegment::copy_elements(&src, &SHORT, 0, &dst, &swapped, 0, 2).unwrap();
    assert_eq!(dst.get_at_index::<i16>(&swapped, 1).unwrap(), 0x0304);
    assert_eq!(dst.get_at_index::<i16>(&SHORT, 0).unwrap(), 0x0201);

    assert_eq!(
        category(MemorySegment::copy_elements(&src, &SHORT, 0, &dst, &INT, 0, 1)),
        ErrorCategory::InvalidArgument
    );
    assert_eq!(
        category(MemorySegment::copy_elements(&src, &SHORT, 0, &dst, &SHORT, 0, 3)),
        ErrorCategory::OutOfBounds
    );
}

#[test]
fn test_at_index_requires_contiguous_elements() {
    let segment = Arena::of_auto().allocate(64, 16).unwrap();
    let padded = INT.with_byte_alignment(8).unwrap();
    assert_eq!(
        category(segment.get_at_index::<i32>(&padded, 0)),
        ErrorCategory::InvalidArgument
    );
}

#[test]
fn test_mismatch() {
    let a = MemorySegment::of_bytes(b"hello world");
    let b = MemorySegment::of_bytes(b"hello world");
    assert_eq!(a.mismatch(&a).unwrap(), None);
    assert_eq!(a.mismatch(&b).unwrap(), None);

    let c = MemorySegment::of_bytes(b"hello_world");
    assert_eq!(a.mismatch(&c).unwrap(), Some(5));

    let prefix = MemorySegment::of_bytes(b"hello");
    assert_eq!(a.mismatch(&prefix).unwrap(), Some(5));
    assert_eq!(prefix.mismatch(&a).unwrap(), Some(5));

    let empty = MemorySegment::of_bytes(b"");
    assert_eq!(empty.mismatch(&empty).unwrap(), None);
    assert_eq!(empty.mismatch(&a).unwrap(), Some(0));

    assert_eq!(
        MemorySegment::mismatch_ranges(&a, 6, 11, &c, 6, 11).unwrap(),
        None
    );
    assert_eq!(
        MemorySegment::mismatch_ranges(&a, 0, 6, &c, 0, 6).unwrap(),
        Some(5)
    );
    assert!(MemorySegment::mismatch_ranges(&a, 6, 5, &c, 0, 1).is_err());
    assert!(MemorySegment::mismatch_ranges(&a, 0, 12, &c, 0, 1).is_err());
}

#[test]
fn test_mismatch_random_position() {
    let mut rng = fastrand::Rng::with_seed(7);
    for _ in 0..50 {
        let len = rng.usize(1..200);
        let data: Vec<u8> = (0..len).map(|_| rng.u8(..)).collect();
        let k = rng.usize(0..len);
        let mut other = data.clone();
        other[k] = other[k].wrapping_add(1);
        let a = MemorySegment::of_vec(data);
        let b = MemorySegment::of_vec(other);
        assert_eq!(a.mismatch(&b).unwrap(), Some(k as u64));
    }
}

#[test]
fn test_heap_segments() {
    let segment = MemorySegment::of_vec(vec![0u16; 8]);
    assert_eq!(segment.kind(), SegmentKind::Heap);
    assert!(!segment.is_native());
    assert_eq!(segment.address(), 0);
    assert_eq!(segment.byte_size(), 16);
    assert_eq!(segment.max_byte_alignment(), 2);
    assert!(segment.is_accessible_by(thread::current().id()));

    segment.set(&SHORT, 2, 9i16).unwrap();
    assert_eq!(segment.get::<i16>(&SHORT, 2).unwrap(), 9);
    // A u16 vector cannot back int-aligned accesses.
    assert_eq!(category(segment.get::<i32>(&INT, 4)), ErrorCategory::Misaligned);
    assert!(segment.get::<i32>(&INT_UNALIGNED, 4).is_ok());

    // Heap segments are not addresses.
    let cell = Arena::of_auto().allocate(8, 8).unwrap();
    assert_eq!(
        category(cell.set(&ADDRESS, 0, segment.clone())),
        ErrorCategory::InvalidArgument
    );

    // Equality is about the storage, not the contents.
    let twin = MemorySegment::of_vec(vec![0u16; 8]);
    assert_ne!(segment, twin);
    assert_eq!(segment.as_slice(0, 4).unwrap(), segment);
    assert!(segment.as_overlapping_slice(&twin).is_none());
    assert_eq!(category(segment.segment_offset(&twin)), ErrorCategory::Unsupported);
}

#[test]
fn test_heap_segment_moves_across_threads() {
    let segment = MemorySegment::of_vec(vec![1i64, 2, 3]);
    let remote = segment.clone();
    let sum = thread::spawn(move || {
        (0..3)
            .map(|i| remote.get_at_index::<i64>(&LONG, i).unwrap())
            .sum::<i64>()
    })
    .join()
    .unwrap();
    assert_eq!(sum, 6);
}

#[test]
fn test_overlap_and_offsets() {
    let arena = Arena::of_confined();
    let segment = arena.allocate(32, 8).unwrap();
    let a = segment.as_slice(0, 16).unwrap();
    let b = segment.as_slice(8, 16).unwrap();
    let overlap = a.as_overlapping_slice(&b).unwrap();
    assert_eq!(a.segment_offset(&overlap).unwrap(), 8);
    assert_eq!(overlap.byte_size(), 8);
    assert_eq!(b.segment_offset(&a).unwrap(), -8);

    let c = segment.as_slice(16, 16).unwrap();
    assert!(a.as_overlapping_slice(&c).is_none());
    assert!(segment.as_overlapping_slice(&MemorySegment::of_bytes(&[0; 4])).is_none());
}

#[test]
fn test_elements() {
    let arena = Arena::of_confined();
    let segment = arena.allocate_from_slice(&[1i32, 2, 3, 4, 5, 6]).unwrap();
    let pair = MemoryLayout::struct_layout([INT, INT]).unwrap();
    let sums: Vec<i32> = segment
        .elements(&pair)
        .unwrap()
        .map(|e| e.get::<i32>(&INT, 0).unwrap() + e.get::<i32>(&INT, 4).unwrap())
        .collect();
    assert_eq!(sums, [3, 7, 11]);

    let triple_long = MemoryLayout::sequence_layout(2, LONG).unwrap();
    assert!(segment.elements(&triple_long).is_err());
    let five = MemoryLayout::padding_layout(5).unwrap();
    assert!(segment.elements(&five).is_err());
}

#[test]
fn test_strings() {
    let arena = Arena::of_confined();
    let segment = arena.allocate(64, 4).unwrap();
    for charset in [
        Charset::Utf8,
        Charset::Utf16Le,
        Charset::Utf16Be,
        Charset::Utf32Le,
        Charset::Utf32Be,
    ] {
        segment.fill(0xff).unwrap();
        segment.set_string(4, "grüße", charset).unwrap();
        assert_eq!(segment.get_string(4, charset).unwrap(), "grüße");
    }

    segment.fill(b'x').unwrap();
    assert_eq!(category(segment.get_string(0, Charset::Utf8)), ErrorCategory::OutOfBounds);
    assert_eq!(
        category(segment.set_string(60, "long", Charset::Utf8)),
        ErrorCategory::OutOfBounds
    );
}

#[test]
fn test_address_round_trip() {
    let arena = Arena::of_confined();
    let target = arena.allocate(16, 8).unwrap();
    let holder = arena.allocate(ADDRESS.byte_size(), ADDRESS.byte_alignment()).unwrap();
    holder.set(&ADDRESS, 0, target.clone()).unwrap();

    let raw: MemorySegment = holder.get(&ADDRESS, 0).unwrap();
    assert_eq!(raw, target);
    assert_eq!(raw.byte_size(), 0);
    assert_eq!(raw.scope().kind(), ScopeKind::Global);

    let sized = unsafe { ADDRESS.with_target_layout(MemoryLayout::sequence_layout(2, LONG).unwrap()) }
        .unwrap();
    let wide: MemorySegment = holder.get(&sized, 0).unwrap();
    assert_eq!(wide.byte_size(), 16);
    wide.set(&LONG, 8, 11i64).unwrap();
    assert_eq!(target.get::<i64>(&LONG, 8).unwrap(), 11);

    holder.set(&ADDRESS, 0, MemorySegment::null()).unwrap();
    let null: MemorySegment = holder.get(&ADDRESS, 0).unwrap();
    assert_eq!(null, MemorySegment::null());
}

#[test]
fn test_confined_segments_reject_other_threads() {
    let arena = Arena::of_confined();
    let segment = arena.allocate(8, 8).unwrap();
    assert!(arena.is_owned_by(thread::current().id()));
    let shared = Arc::new(arena);

    let remote_arena = shared.clone();
    let remote = segment.clone();
    thread::spawn(move || {
        assert!(!remote.is_accessible_by(thread::current().id()));
        assert!(!remote_arena.is_owned_by(thread::current().id()));
        assert_eq!(category(remote.get::<i64>(&LONG, 0)), ErrorCategory::WrongThread);
        assert_eq!(category(remote.set(&LONG, 0, 1i64)), ErrorCategory::WrongThread);
        assert_eq!(category(remote.as_slice(0, 4)), ErrorCategory::WrongThread);
        assert_eq!(category(remote_arena.close()), ErrorCategory::WrongOwner);
        assert_eq!(category(remote_arena.allocate(8, 8)), ErrorCategory::WrongThread);
    })
    .join()
    .unwrap();

    assert!(shared.scope().is_alive());
    segment.set(&LONG, 0, 3i64).unwrap();
    shared.close().unwrap();
}

#[test]
fn test_shared_segments_cross_threads() {
    let arena = Arc::new(Arena::of_shared());
    let segment = arena.allocate(8 * 4, 8).unwrap();
    let workers: Vec<_> = (0..4u64)
        .map(|i| {
            let slot = segment.as_slice(i * 8, 8).unwrap();
            thread::spawn(move || slot.set(&LONG, 0, i as i64 * 100).unwrap())
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(segment.get_at_index::<i64>(&LONG, 3).unwrap(), 300);

    let closer = arena.clone();
    thread::spawn(move || closer.close().unwrap()).join().unwrap();
    assert_eq!(category(segment.get::<i64>(&LONG, 0)), ErrorCategory::Lifetime);
}

/// Runs `work` on a fresh shared arena from a second thread while this
/// thread closes the arena, and fails if the close does not come back.
fn close_during(rounds: usize, work: fn(Vec<MemorySegment>)) {
    for round in 0..rounds {
        let arenas = [Arena::of_shared(), Arena::of_shared()];
        let segments: Vec<_> = arenas
            .iter()
            .map(|arena| arena.allocate(64, 8).unwrap())
            .collect();
        let worker = thread::spawn(move || work(segments));
        thread::sleep(std::time::Duration::from_micros(fastrand::u64(0..500)));

        let (done, closed) = mpsc::channel();
        thread::spawn(move || {
            for arena in &arenas {
                arena.close().unwrap();
            }
            done.send(()).unwrap();
        });
        assert!(
            closed.recv_timeout(std::time::Duration::from_secs(5)).is_ok(),
            "close did not return in round {round}"
        );
        worker.join().unwrap();
    }
}

#[test]
fn test_close_while_copying_within_a_segment() {
    close_during(20, |segments| {
        let segment = &segments[0];
        loop {
            match MemorySegment::copy(segment, 0, segment, 32, 32)
                .and_then(|()| segment.mismatch(segment).map(drop))
            {
                Ok(()) => {}
                Err(e) => {
                    assert_eq!(e.category(), ErrorCategory::Lifetime);
                    return;
                }
            }
        }
    });
}

#[test]
fn test_close_while_copying_across_arenas() {
    close_during(20, |segments| {
        let (a, b) = (segments[0].clone(), segments[1].clone());
        let reverse = thread::spawn(move || {
            while MemorySegment::copy_elements(&b, &LONG, 0, &a, &LONG, 0, 8).is_ok() {}
        });
        while MemorySegment::copy(&segments[0], 0, &segments[1], 0, 64).is_ok() {}
        reverse.join().unwrap();
    });
}

#[test]
fn test_shared_close_races_with_readers() {
    let arena = Arc::new(Arena::of_shared());
    let segment = arena.allocate(4096, 8).unwrap();
    segment.fill(1).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let segment = segment.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut rng = fastrand::Rng::new();
                loop {
                    match segment.get::<i64>(&LONG, rng.u64(0..512) * 8) {
                        // Reads never observe released memory.
                        Ok(value) => assert_eq!(value, 0x0101_0101_0101_0101),
                        Err(e) => {
                            assert_eq!(e.category(), ErrorCategory::Lifetime);
                            return;
                        }
                    }
                    if stop.load(Ordering::Relaxed) {
                        return;
                    }
                }
            })
        })
        .collect();

    thread::sleep(std::time::Duration::from_millis(20));
    arena.close().unwrap();
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn test_while_alive_holds_shared_arena_open() {
    let arena = Arc::new(Arena::of_shared());
    let segment = arena.allocate(8, 8).unwrap();
    let held = arena
        .scope()
        .while_alive(|| {
            let closer = arena.clone();
            let err = thread::spawn(move || closer.close().unwrap_err())
                .join()
                .unwrap();
            assert!(matches!(err.kind(), ErrorKind::ScopeAcquired { .. }));
            segment.get::<i64>(&LONG, 0).unwrap()
        })
        .unwrap();
    assert_eq!(held, 0);
    arena.close().unwrap();
    assert!(arena.scope().while_alive(|| ()).is_err());
}

#[test]
fn test_automatic_arena_lives_with_its_segments() {
    let arena = Arena::of_auto();
    assert_eq!(arena.kind(), ScopeKind::Automatic);
    assert_eq!(category(arena.close()), ErrorCategory::Unsupported);
    let segment = arena.allocate(16, 8).unwrap();
    let scope = segment.scope().clone();
    drop(arena);
    segment.set(&LONG, 8, 4i64).unwrap();
    assert_eq!(segment.get::<i64>(&LONG, 8).unwrap(), 4);
    assert!(scope.is_alive());
}

#[test]
fn test_global_arena() {
    let global = Arena::global();
    assert_eq!(global.kind(), ScopeKind::Global);
    assert_eq!(category(global.close()), ErrorCategory::Unsupported);
    let segment = global.allocate(8, 8).unwrap();
    let remote = segment.clone();
    thread::spawn(move || remote.set(&LONG, 0, 8i64).unwrap())
        .join()
        .unwrap();
    assert_eq!(segment.get::<i64>(&LONG, 0).unwrap(), 8);
}

#[test]
fn test_drop_closes_arena() {
    let segment = {
        let arena = Arena::of_confined();
        arena.allocate(8, 8).unwrap()
    };
    assert!(!segment.scope().is_alive());
    assert_eq!(category(segment.get::<i64>(&LONG, 0)), ErrorCategory::Lifetime);
}

#[test]
fn test_allocation_arguments() {
    let arena = Arena::of_confined();
    assert_eq!(category(arena.allocate(8, 0)), ErrorCategory::InvalidArgument);
    assert_eq!(category(arena.allocate(8, 12)), ErrorCategory::InvalidArgument);
    assert_eq!(category(arena.allocate(u64::MAX, 8)), ErrorCategory::InvalidArgument);

    let empty = arena.allocate(0, 1).unwrap();
    assert!(empty.is_empty());
    let aligned = arena.allocate(24, 256).unwrap();
    assert_eq!(aligned.address() % 256, 0);
    assert!(aligned.max_byte_alignment() >= 256);
    assert!(aligned.to_vec::<u8>().unwrap().iter().all(|&b| b == 0));
}

#[test]
fn test_page_threshold() {
    let page_size = PageBuffer::page_size() as u64;
    let arena = Arena::builder()
        .shared()
        .zero_fill(false)
        .page_threshold(page_size)
        .label("pages")
        .build();
    assert_eq!(arena.options().label.as_deref(), Some("pages"));
    let big = arena.allocate(page_size * 2 + 1, 64).unwrap();
    assert_eq!(big.address() % page_size, 0);
    assert!(big.to_vec::<u8>().unwrap().iter().all(|&b| b == 0));
    let small = arena.allocate(16, 8).unwrap();
    small.fill(3).unwrap();
    arena.close().unwrap();
    assert!(!big.scope().is_alive());
}

#[cfg(unix)]
#[test]
fn test_mapped_segments() {
    use std::io::Write;

    let mut file = tempfile::tempfile().unwrap();
    file.write_all(&[0u8; 8192]).unwrap();

    let arena = Arena::of_confined();
    let segment = arena.map_file(&file, 4100, 64, MapMode::ReadWrite).unwrap();
    assert!(segment.is_mapped());
    assert!(segment.is_native());
    segment.set(&INT_UNALIGNED, 0, 0x1234_5678i32).unwrap();
    segment.load().unwrap();
    segment.is_loaded().unwrap();
    segment.force().unwrap();
    segment.unload().unwrap();

    let reader = arena.map_file(&file, 4100, 4, MapMode::ReadOnly).unwrap();
    assert!(reader.is_read_only());
    assert_eq!(reader.get::<i32>(&INT_UNALIGNED, 0).unwrap(), 0x1234_5678);
    assert_eq!(category(reader.set(&BYTE, 0, 1i8)), ErrorCategory::ReadOnly);

    assert_eq!(category(arena.map_file(&file, 8190, 4, MapMode::ReadOnly)), ErrorCategory::Io);

    let native = arena.allocate(8, 8).unwrap();
    assert_eq!(category(native.load()), ErrorCategory::Unsupported);
    assert_eq!(category(native.force()), ErrorCategory::Unsupported);

    arena.close().unwrap();
    assert_eq!(category(segment.force()), ErrorCategory::Lifetime);
}

#[test]
fn test_null_segment() {
    let null = MemorySegment::null();
    assert_eq!(null.address(), 0);
    assert!(null.is_empty());
    assert_eq!(category(null.get::<u8>(&BYTE, 0)), ErrorCategory::OutOfBounds);
    assert_eq!(null.mismatch(&MemorySegment::null()).unwrap(), None);

    let restricted = unsafe { RestrictedAccess::new() };
    assert_eq!(restricted.of_address(0), null);
}
