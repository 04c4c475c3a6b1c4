mod common;

use common::{memory_world, pass, ramp};
use sonority::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counting_destructor(world: &SonorityWorld, buffer: BufferId) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    world
        .set_buffer_destructor(buffer, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    count
}

#[test]
fn test_delete_while_current_defers_free() {
    let (world, memory) = memory_world(1, 4);
    let buffer = world.create_buffer(1, ramp(8)).unwrap();
    let freed = counting_destructor(&world, buffer);
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();
    world.play(source).unwrap();
    pass(&world, &memory);
    assert_eq!(world.buffer_state(buffer).unwrap(), BufferState::Processed);

    assert_eq!(world.delete_buffer(buffer).unwrap(), BufferDeletion::Deferred);
    assert!(!world.is_buffer(buffer));
    assert!(world.engine().buffers().exists(buffer));
    assert_eq!(freed.load(Ordering::SeqCst), 0);
    assert!(world.delete_buffer(buffer).is_err());

    // The deleted buffer keeps playing to its end.
    assert_eq!(pass(&world, &memory), vec![4, 5, 6, 7]);
    assert_eq!(freed.load(Ordering::SeqCst), 1);
    assert!(!world.engine().buffers().exists(buffer));
    assert!(
        world
            .poll_events()
            .contains(&MixerEvent::BufferReleased { buffer })
    );

    pass(&world, &memory);
    assert_eq!(freed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_buffer_shared_by_two_sources_waits_for_both() {
    let (world, memory) = memory_world(1, 4);
    let buffer = world.create_buffer(1, ramp(8)).unwrap();
    let freed = counting_destructor(&world, buffer);
    let a = world.create_source().unwrap();
    let b = world.create_source().unwrap();
    world.queue_buffers(a, &[buffer]).unwrap();
    world.queue_buffers(b, &[buffer]).unwrap();

    assert_eq!(world.delete_buffer(buffer).unwrap(), BufferDeletion::Deferred);
    world.delete_source(a).unwrap();
    assert_eq!(freed.load(Ordering::SeqCst), 0);
    world.delete_source(b).unwrap();
    assert_eq!(freed.load(Ordering::SeqCst), 1);
    pass(&world, &memory);
    assert_eq!(freed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unused_buffer_deletes_immediately() {
    let (world, _memory) = memory_world(1, 4);
    let buffer = world.create_buffer(1, ramp(8)).unwrap();
    let freed = counting_destructor(&world, buffer);
    assert_eq!(world.buffer_state(buffer).unwrap(), BufferState::Unused);
    assert_eq!(world.delete_buffer(buffer).unwrap(), BufferDeletion::Deleted);
    assert_eq!(freed.load(Ordering::SeqCst), 1);
    assert!(world.buffer_state(buffer).is_err());
}

#[test]
fn test_buffer_states_follow_the_cursor() {
    let (world, memory) = memory_world(1, 4);
    let first = world.create_buffer(1, ramp(4)).unwrap();
    let second = world.create_buffer(1, ramp(4)).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[first, second]).unwrap();
    assert_eq!(world.buffer_state(first).unwrap(), BufferState::Pending);
    assert_eq!(world.buffer_state(second).unwrap(), BufferState::Pending);

    world.play(source).unwrap();
    assert_eq!(world.buffer_state(first).unwrap(), BufferState::Processed);
    assert_eq!(world.buffer_state(second).unwrap(), BufferState::Pending);

    pass(&world, &memory);
    assert_eq!(world.buffer_state(first).unwrap(), BufferState::Unused);
    assert_eq!(world.buffer_state(second).unwrap(), BufferState::Processed);

    pass(&world, &memory);
    assert_eq!(world.buffer_state(second).unwrap(), BufferState::Unused);
}

#[test]
fn test_queue_invariants_hold() {
    let (world, memory) = memory_world(1, 4);
    let buffers: Vec<_> = (0..3)
        .map(|_| world.create_buffer(1, ramp(4)).unwrap())
        .collect();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &buffers).unwrap();
    world.play(source).unwrap();

    let check = |world: &SonorityWorld| {
        let engine = world.engine();
        let context = engine.context(world.context_id()).unwrap();
        assert!(context.has_source(source));
        let position = world.source_position(source).unwrap();
        let queued = world.source_buffers(source).unwrap().len();
        assert!(position.entry <= queued.max(1));
        assert!(world.buffers_processed(source).unwrap() <= queued.max(1));
    };

    check(&world);
    assert!(matches!(
        world.unqueue_buffers(source, 1),
        Err(SonorityError::InvalidValue(_))
    ));
    assert_eq!(world.source_buffers(source).unwrap(), buffers);

    pass(&world, &memory);
    check(&world);
    assert_eq!(world.buffers_processed(source).unwrap(), 1);
    assert!(world.unqueue_buffers(source, 2).is_err());
    assert_eq!(world.source_buffers(source).unwrap(), buffers);

    assert_eq!(world.unqueue_buffers(source, 1).unwrap(), vec![buffers[0]]);
    check(&world);
    assert_eq!(world.buffers_processed(source).unwrap(), 0);
    assert_eq!(world.source_buffers(source).unwrap(), buffers[1..].to_vec());

    // Playback continues from the rebased cursor.
    assert_eq!(pass(&world, &memory), vec![0, 1, 2, 3]);
    check(&world);
    assert_eq!(
        world.source_position(source).unwrap(),
        PlayPosition { entry: 1, frame: 0 }
    );
}

#[test]
fn test_recycle_processed_buffer() {
    let (world, memory) = memory_world(1, 4);
    let buffer = world.create_buffer(1, ramp(4)).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();
    world.play(source).unwrap();
    pass(&world, &memory);
    assert_eq!(world.source_state(source).unwrap(), SourceState::Stopped);

    // Recycle the processed buffer onto the back of the queue.
    let recycled = world.unqueue_buffers(source, 1).unwrap();
    assert_eq!(recycled, vec![buffer]);
    assert!(world.source_buffers(source).unwrap().is_empty());
    world.set_buffer_data(buffer, 1, vec![9; 4]).unwrap();
    world.queue_buffers(source, &recycled).unwrap();
    world.play(source).unwrap();
    assert_eq!(pass(&world, &memory), vec![9; 4]);
}

#[test]
fn test_queue_rejects_bad_buffers_atomically() {
    let (world, _memory) = memory_world(1, 4);
    let good = world.create_buffer(1, ramp(4)).unwrap();
    let wrong_rate = world
        .engine()
        .buffers()
        .create_static(BufferFormat::mono(22050), ramp(4))
        .unwrap();
    let source = world.create_source().unwrap();

    assert!(matches!(
        world.queue_buffers(source, &[good, wrong_rate]),
        Err(SonorityError::AudioFormat(_))
    ));
    assert!(matches!(
        world.queue_buffers(source, &[good, BufferId::from_raw(u64::MAX)]),
        Err(SonorityError::InvalidName(_))
    ));
    assert!(world.source_buffers(source).unwrap().is_empty());
    assert_eq!(world.buffer_state(good).unwrap(), BufferState::Unused);
}

#[test]
fn test_queue_edits_need_an_idle_source() {
    let (world, _memory) = memory_world(1, 4);
    let buffer = world.create_buffer(1, ramp(8)).unwrap();
    let other = world.create_buffer(1, ramp(8)).unwrap();
    let source = world.create_source().unwrap();
    world.set_source_buffer(source, Some(buffer)).unwrap();
    world.play(source).unwrap();

    assert!(matches!(
        world.set_source_buffer(source, Some(other)),
        Err(SonorityError::InvalidOperation(_))
    ));
    assert!(matches!(
        world.set_buffer_data(buffer, 1, ramp(2)),
        Err(SonorityError::InvalidOperation(_))
    ));

    world.stop(source).unwrap();
    world.set_source_buffer(source, None).unwrap();
    assert!(world.source_buffers(source).unwrap().is_empty());
    assert_eq!(world.buffer_state(buffer).unwrap(), BufferState::Unused);
}

#[test]
fn test_whole_frames_required() {
    let (world, _memory) = memory_world(2, 4);
    assert!(matches!(
        world.create_buffer(2, vec![1, 2, 3]),
        Err(SonorityError::AudioFormat(_))
    ));
}

#[test]
fn test_shutdown_releases_everything() {
    let (world, memory) = memory_world(1, 4);
    let buffer = world.create_buffer(1, ramp(16)).unwrap();
    let freed = counting_destructor(&world, buffer);
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();
    world.play(source).unwrap();
    pass(&world, &memory);
    world.delete_buffer(buffer).unwrap();

    let events = world.engine().events();
    drop(world);
    assert_eq!(freed.load(Ordering::SeqCst), 1);
    let events: Vec<_> = events.try_iter().collect();
    assert!(events.contains(&MixerEvent::BufferReleased { buffer }));
    assert_eq!(events.last(), Some(&MixerEvent::MixerStopped));
}
