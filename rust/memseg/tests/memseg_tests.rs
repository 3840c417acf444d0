use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use memseg::layout::value::{ADDRESS, BYTE, INT, LONG};
use memseg::{
    Arena, ErrorCategory, FunctionDescriptor, LayoutHandles, MemoryLayout, MemorySegment,
    PathElement, RestrictedAccess, SegmentAllocator, SlicingAllocator,
};

fn point() -> MemoryLayout {
    MemoryLayout::struct_layout([INT.with_name("x"), INT.with_name("y")]).unwrap()
}

#[test]
fn test_tagged_record_layout() {
    let record = MemoryLayout::struct_layout([
        MemoryLayout::from(BYTE.with_name("kind")),
        MemoryLayout::padding_layout(3).unwrap(),
        MemoryLayout::from(INT.with_name("value")),
    ])
    .unwrap();
    assert_eq!(record.byte_size(), 8);
    assert_eq!(record.byte_alignment(), 4);
    assert_eq!(
        record.byte_offset(&[PathElement::group_element("value")]).unwrap(),
        4
    );

    let arena = Arena::of_confined();
    let segment = arena.allocate_layout(&record).unwrap();
    let kind = record.var_handle(&[PathElement::group_element("kind")]).unwrap();
    let value = record.var_handle(&[PathElement::group_element("value")]).unwrap();
    kind.set(&segment, 0, &[], 3i8).unwrap();
    value.set(&segment, 0, &[], -17i32).unwrap();
    assert_eq!(segment.get::<i8>(&BYTE, 0).unwrap(), 3);
    assert_eq!(segment.get::<i32>(&INT, 4).unwrap(), -17);
}

#[test]
fn test_int_array_until_close() {
    let arena = Arena::of_confined();
    let segment = arena.allocate(40, 4).unwrap();
    for i in 0..10 {
        segment.set_at_index(&INT, i, i as i32).unwrap();
    }
    let values: Vec<i32> = (0..10)
        .map(|i| segment.get_at_index(&INT, i).unwrap())
        .collect();
    assert_eq!(values, (0..10).collect::<Vec<_>>());

    arena.close().unwrap();
    let err = segment.get_at_index::<i32>(&INT, 0).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Lifetime);
}

#[test]
fn test_array_element_handle() {
    let points = MemoryLayout::sequence_layout(4, point()).unwrap();
    assert_eq!(points.byte_size(), 32);

    let arena = Arena::of_confined();
    let segment = arena.allocate_layout(&points).unwrap();
    segment.set(&INT, 16, 77i32).unwrap();

    let x = point()
        .array_element_var_handle(&[PathElement::group_element("x")])
        .unwrap();
    assert_eq!(x.coordinates(), 1);
    assert_eq!(x.get::<i32>(&segment, 0, &[2]).unwrap(), 77);
    x.set(&segment, 0, &[3], 5i32).unwrap();
    assert_eq!(segment.get::<i32>(&INT, 24).unwrap(), 5);

    // The fifth element lies past the end of the segment.
    let err = x.get::<i32>(&segment, 0, &[4]).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::OutOfBounds);
}

#[test]
fn test_linked_list_across_threads() {
    let node = MemoryLayout::struct_layout([
        MemoryLayout::from(LONG.with_name("value")),
        MemoryLayout::from(ADDRESS.with_name("next")),
    ])
    .unwrap();
    let arena = Arc::new(Arena::of_shared());
    let nodes = arena.allocate_array(&node, 8).unwrap();
    let value = node
        .array_element_var_handle(&[PathElement::group_element("value")])
        .unwrap();
    let next = node
        .array_element_var_handle(&[PathElement::group_element("next")])
        .unwrap();
    for i in 0..8u64 {
        value.set(&nodes, 0, &[i], (i * i) as i64).unwrap();
        let target = if i + 1 < 8 {
            nodes.as_slice(node.byte_size() * (i + 1), node.byte_size()).unwrap()
        } else {
            MemorySegment::null()
        };
        next.set(&nodes, 0, &[i], target).unwrap();
    }

    let head = nodes.clone();
    let element = unsafe { ADDRESS.with_target_layout(node.clone()) }.unwrap();
    let sum = thread::spawn(move || {
        let mut sum = 0i64;
        let mut current = head;
        while current != MemorySegment::null() {
            sum += current.get::<i64>(&LONG, 0).unwrap();
            current = current.get::<MemorySegment>(&element, 8).unwrap();
        }
        sum
    })
    .join()
    .unwrap();
    assert_eq!(sum, (0..8i64).map(|i| i * i).sum::<i64>());

    arena.close().unwrap();
    assert!(value.get::<i64>(&nodes, 0, &[0]).is_err());
}

#[test]
fn test_scratch_space_from_slicing_allocator() {
    let arena = Arena::of_confined();
    let scratch = SlicingAllocator::new(arena.allocate(256, 16).unwrap());
    let header = scratch.allocate_layout(&point()).unwrap();
    let body = scratch
        .allocate_array(&MemoryLayout::from(LONG), 4)
        .unwrap();
    assert_eq!(scratch.segment().segment_offset(&body).unwrap(), 8);
    header.fill(0xff).unwrap();
    body.fill(0).unwrap();
    assert_eq!(header.get::<i32>(&INT, 4).unwrap(), -1);
    assert!(header.as_overlapping_slice(&body).is_none());

    arena.close().unwrap();
    let err = body.get::<i64>(&LONG, 0).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Lifetime);
}

#[test]
fn test_foreign_memory_with_cleanup() {
    let owner = Arena::of_confined();
    let memory = owner.allocate(32, 8).unwrap();
    memory.set(&LONG, 24, 9i64).unwrap();

    let released = Arc::new(AtomicUsize::new(0));
    let restricted = unsafe { RestrictedAccess::new() };
    {
        let borrower = Arena::of_confined();
        let counter = released.clone();
        let view = restricted
            .reinterpret_in(
                &restricted.of_address(memory.address()),
                32,
                &borrower,
                Some(Box::new(move |_: MemorySegment| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .unwrap();
        assert_eq!(view.get::<i64>(&LONG, 24).unwrap(), 9);
    }
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert_eq!(memory.get::<i64>(&LONG, 24).unwrap(), 9);
}

#[test]
fn test_function_descriptor_layouts() {
    let callback = FunctionDescriptor::of(INT, [ADDRESS, ADDRESS]).unwrap();
    let sort = FunctionDescriptor::of_void([
        MemoryLayout::from(ADDRESS),
        MemoryLayout::from(LONG),
        MemoryLayout::from(LONG),
        MemoryLayout::from(unsafe {
            ADDRESS.with_target_layout(MemoryLayout::sequence_layout(0, BYTE).unwrap())
        }
        .unwrap()),
    ])
    .unwrap();
    assert_eq!(callback.argument_layouts().len(), 2);
    assert_eq!(callback.return_layout(), Some(&MemoryLayout::from(INT)));
    assert!(sort.return_layout().is_none());
    assert_eq!(sort.drop_return_layout(), sort);
    assert!(
        FunctionDescriptor::of_void([MemoryLayout::padding_layout(4).unwrap()]).is_err()
    );
}

#[cfg(unix)]
#[test]
fn test_mapped_file_round_trip() {
    use std::io::{Read, Seek, SeekFrom, Write};

    use memseg::MapMode;

    let mut file = tempfile::tempfile().unwrap();
    file.write_all(&[0u8; 4096]).unwrap();
    {
        let arena = Arena::of_shared();
        let mapped = arena.map_file(&file, 0, 4096, MapMode::ReadWrite).unwrap();
        let mut rng = fastrand::Rng::with_seed(11);
        let values: Vec<i64> = (0..512).map(|_| rng.i64(..)).collect();
        mapped.copy_from_slice(0, &values).unwrap();
        mapped.force().unwrap();
        assert_eq!(mapped.to_vec::<i64>().unwrap(), values);
    }
    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.read_to_end(&mut bytes).unwrap();
    let heap = MemorySegment::of_vec(bytes);
    let arena = Arena::of_confined();
    let reader = arena.map_file(&file, 0, 4096, MapMode::ReadOnly).unwrap();
    assert_eq!(heap.mismatch(&reader).unwrap(), None);
}
