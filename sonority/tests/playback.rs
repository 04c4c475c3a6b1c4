mod common;

use common::{memory_world, pass, ramp};
use sonority::*;

#[test]
fn test_stop_is_idempotent_on_idle_sources() {
    let (world, memory) = memory_world(1, 4);
    let buffer = world.create_buffer(1, ramp(16)).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();

    assert!(!world.stop(source).unwrap());
    assert_eq!(world.source_state(source).unwrap(), SourceState::Initial);
    assert_eq!(world.engine().scheduled_sources(), 0);

    assert!(world.play(source).unwrap());
    assert_eq!(world.engine().scheduled_sources(), 1);
    assert!(world.stop(source).unwrap());
    assert_eq!(world.source_state(source).unwrap(), SourceState::Stopped);
    assert!(!world.stop(source).unwrap());

    pass(&world, &memory);
    assert_eq!(world.engine().scheduled_sources(), 0);
    assert!(!world.stop(source).unwrap());
    assert_eq!(world.engine().scheduled_sources(), 0);
}

#[test]
fn test_play_with_empty_queue_stops() {
    let (world, _memory) = memory_world(1, 4);
    let source = world.create_source().unwrap();
    assert!(!world.play(source).unwrap());
    assert_eq!(world.source_state(source).unwrap(), SourceState::Stopped);
    assert_eq!(world.engine().scheduled_sources(), 0);
}

#[test]
fn test_play_twice_keeps_one_node() {
    let (world, _memory) = memory_world(1, 4);
    let buffer = world.create_buffer(1, ramp(16)).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();
    assert!(world.play(source).unwrap());
    assert!(!world.play(source).unwrap());
    assert_eq!(world.engine().scheduled_sources(), 1);
}

#[test]
fn test_play_while_playing_keeps_position() {
    let (world, memory) = memory_world(1, 4);
    let first = world.create_buffer(1, ramp(8)).unwrap();
    let second = world.create_buffer(1, (10..18).collect()).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[first, second]).unwrap();
    world.play(source).unwrap();
    for _ in 0..3 {
        pass(&world, &memory);
    }
    let before = world.source_position(source).unwrap();
    assert_eq!(before, PlayPosition { entry: 1, frame: 4 });

    assert!(!world.play(source).unwrap());
    assert_eq!(world.source_position(source).unwrap(), before);
    assert_eq!(world.buffer_state(first).unwrap(), BufferState::Unused);
    assert_eq!(pass(&world, &memory), vec![14, 15, 16, 17]);
}

#[test]
fn test_pause_holds_position() {
    let (world, memory) = memory_world(1, 4);
    let buffer = world.create_buffer(1, ramp(16)).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();
    world.play(source).unwrap();
    assert_eq!(pass(&world, &memory), vec![0, 1, 2, 3]);

    assert!(world.pause(source).unwrap());
    assert!(!world.pause(source).unwrap());
    assert_eq!(pass(&world, &memory), vec![0; 4]);
    assert_eq!(world.source_position(source).unwrap().frame, 4);
    assert!(world.engine().is_scheduled(world.context_id(), source));

    world.play(source).unwrap();
    assert_eq!(pass(&world, &memory), vec![4, 5, 6, 7]);
}

#[test]
fn test_rewind_returns_to_initial() {
    let (world, memory) = memory_world(1, 4);
    let buffer = world.create_buffer(1, ramp(16)).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();
    world.play(source).unwrap();
    pass(&world, &memory);

    world.rewind(source).unwrap();
    assert_eq!(world.source_state(source).unwrap(), SourceState::Initial);
    assert_eq!(pass(&world, &memory), vec![0; 4]);
    assert_eq!(world.engine().scheduled_sources(), 0);
    assert_eq!(world.source_state(source).unwrap(), SourceState::Initial);
    assert_eq!(world.buffer_state(buffer).unwrap(), BufferState::Pending);

    world.play(source).unwrap();
    assert_eq!(pass(&world, &memory), vec![0, 1, 2, 3]);
}

#[test]
fn test_restart_after_completion() {
    let (world, memory) = memory_world(1, 4);
    let buffer = world.create_buffer(1, ramp(4)).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();
    world.play(source).unwrap();
    assert_eq!(pass(&world, &memory), vec![0, 1, 2, 3]);
    assert_eq!(world.source_state(source).unwrap(), SourceState::Stopped);

    world.play(source).unwrap();
    assert_eq!(pass(&world, &memory), vec![0, 1, 2, 3]);
}

#[test]
fn test_seek_before_play_sets_start() {
    let (world, memory) = memory_world(1, 4);
    let buffer = world.create_buffer(1, ramp(10)).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();

    world.seek(source, 6).unwrap();
    world.play(source).unwrap();
    assert_eq!(pass(&world, &memory), vec![6, 7, 8, 9]);
    assert_eq!(world.source_state(source).unwrap(), SourceState::Stopped);
}

#[test]
fn test_seek_while_playing_applies_after_pass() {
    let (world, memory) = memory_world(1, 4);
    let first = world.create_buffer(1, ramp(8)).unwrap();
    let second = world.create_buffer(1, vec![100, 101, 102, 103, 104, 105]).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[first, second]).unwrap();
    world.play(source).unwrap();
    assert_eq!(pass(&world, &memory), vec![0, 1, 2, 3]);

    // Frames count from the head of the queue.
    world.seek(source, 10).unwrap();
    assert_eq!(pass(&world, &memory), vec![4, 5, 6, 7]);
    assert_eq!(
        world.source_position(source).unwrap(),
        PlayPosition { entry: 1, frame: 2 }
    );
    assert_eq!(pass(&world, &memory), vec![102, 103, 104, 105]);
}

#[test]
fn test_seek_while_paused_applies_on_resume() {
    let (world, memory) = memory_world(1, 4);
    let buffer = world.create_buffer(1, ramp(16)).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();
    world.play(source).unwrap();
    assert_eq!(pass(&world, &memory), vec![0, 1, 2, 3]);

    world.pause(source).unwrap();
    world.seek(source, 12).unwrap();
    assert_eq!(pass(&world, &memory), vec![0; 4]);

    assert!(world.play(source).unwrap());
    assert_eq!(pass(&world, &memory), vec![12, 13, 14, 15]);
}

#[test]
fn test_unqueue_drops_seek_into_removed_buffer() {
    let (world, memory) = memory_world(1, 4);
    let a = world.create_buffer(1, vec![1; 4]).unwrap();
    let b = world.create_buffer(1, vec![2; 4]).unwrap();
    let c = world.create_buffer(1, vec![3; 8]).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[a, b, c]).unwrap();
    world.play(source).unwrap();
    assert_eq!(pass(&world, &memory), vec![1; 4]);
    assert_eq!(pass(&world, &memory), vec![2; 4]);

    world.seek(source, 1).unwrap();
    assert_eq!(world.unqueue_buffers(source, 1).unwrap(), vec![a]);
    assert_eq!(pass(&world, &memory), vec![3; 4]);
    assert_eq!(pass(&world, &memory), vec![3; 4]);
    assert_eq!(world.source_state(source).unwrap(), SourceState::Stopped);
}

#[test]
fn test_seek_past_end_fails() {
    let (world, _memory) = memory_world(1, 4);
    let buffer = world.create_buffer(1, ramp(10)).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();
    assert!(matches!(
        world.seek(source, 10),
        Err(SonorityError::InvalidValue(_))
    ));
}

#[test]
fn test_seek_rejects_streams() {
    let (world, _memory) = memory_world(1, 4);
    let stream = world.create_streaming_buffer(1).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[stream]).unwrap();
    assert!(matches!(
        world.seek(source, 0),
        Err(SonorityError::InvalidOperation(_))
    ));
}

#[test]
fn test_suspend_freezes_sources() {
    let (world, memory) = memory_world(1, 4);
    let buffer = world.create_buffer(1, ramp(16)).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();
    world.play(source).unwrap();

    world.suspend().unwrap();
    assert_eq!(pass(&world, &memory), vec![0; 4]);
    assert_eq!(world.source_position(source).unwrap().frame, 0);

    world.process().unwrap();
    assert_eq!(pass(&world, &memory), vec![0, 1, 2, 3]);
}

#[test]
fn test_stop_all() {
    let (world, memory) = memory_world(1, 4);
    let buffer = world.create_buffer(1, ramp(16)).unwrap();
    let sources: Vec<_> = (0..3)
        .map(|_| {
            let source = world.create_source().unwrap();
            world.queue_buffers(source, &[buffer]).unwrap();
            world.play(source).unwrap();
            source
        })
        .collect();
    world.stop_all().unwrap();
    for source in sources {
        assert_eq!(world.source_state(source).unwrap(), SourceState::Stopped);
    }
    assert_eq!(pass(&world, &memory), vec![0; 4]);
    assert_eq!(world.engine().scheduled_sources(), 0);
}

#[test]
fn test_device_failure_does_not_stop_mixing() {
    let memory = MemoryBackend::failing(DeviceFormat::new(1, common::RATE), 4);
    let desc = SonorityWorldDesc::new()
        .channels(1)
        .block_size(4)
        .synchronous(true);
    let world = SonorityWorld::with_device(desc, Box::new(memory.clone())).unwrap();
    let buffer = world.create_buffer(1, ramp(16)).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();
    world.play(source).unwrap();

    for expected in [4, 8] {
        let report = world.update().unwrap().unwrap();
        assert!(report.device_error);
        assert_eq!(report.sources_mixed, 1);
        assert_eq!(world.source_position(source).unwrap().frame, expected);
    }
    assert_eq!(memory.write_count(), 2);
    let failures = world
        .poll_events()
        .into_iter()
        .filter(|event| matches!(event, MixerEvent::DeviceWriteFailed { .. }))
        .count();
    assert_eq!(failures, 2);
}

#[test]
fn test_paused_output_drops_chunks() {
    let (world, memory) = memory_world(1, 4);
    let buffer = world.create_buffer(1, ramp(16)).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();
    world.play(source).unwrap();

    world.pause_output().unwrap();
    assert!(pass(&world, &memory).is_empty());
    world.resume_output().unwrap();
    assert_eq!(pass(&world, &memory), vec![4, 5, 6, 7]);
}

#[test]
fn test_attribute_changes_apply_next_pass() {
    let (world, memory) = memory_world(1, 2);
    let buffer = world.create_buffer(1, vec![1000; 8]).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();
    world.play(source).unwrap();
    assert_eq!(pass(&world, &memory), vec![1000, 1000]);

    world.set_source_gain(source, 0.5).unwrap();
    assert_eq!(pass(&world, &memory), vec![500, 500]);

    world.set_source_gain_range(source, 0.75, 1.0).unwrap();
    assert_eq!(pass(&world, &memory), vec![750, 750]);
}
