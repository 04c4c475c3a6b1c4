mod common;

use common::RATE;
use sonority::*;
use std::time::{Duration, Instant};

fn wait_for(world: &SonorityWorld, what: impl Fn(&MixerEvent) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if world.poll_events().iter().any(&what) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

fn threaded_world(block: usize) -> (SonorityWorld, MemoryBackend) {
    let _ = env_logger::builder().is_test(true).try_init();
    let memory = MemoryBackend::new(DeviceFormat::new(1, RATE), block);
    let desc = SonorityWorldDesc::new().channels(1).block_size(block);
    let world = SonorityWorld::with_device(desc, Box::new(memory.clone())).unwrap();
    (world, memory)
}

#[test]
fn test_background_thread_plays_to_completion() {
    let (world, memory) = threaded_world(64);
    assert!(!world.is_synchronous());
    assert_eq!(world.update().unwrap(), None);

    let buffer = world.create_buffer(1, vec![1234; 256]).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();
    world.play(source).unwrap();

    assert!(wait_for(&world, |event| {
        matches!(event, MixerEvent::SourceCompleted { source: s, .. } if *s == source)
    }));
    assert_eq!(world.source_state(source).unwrap(), SourceState::Stopped);
    let played = memory.samples().iter().filter(|&&s| s == 1234).count();
    assert_eq!(played, 256);
}

#[test]
fn test_switching_modes() {
    let (mut world, memory) = threaded_world(32);
    world.set_synchronous(true).unwrap();
    assert!(world.is_synchronous());

    let buffer = world.create_buffer(1, vec![5; 64]).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();
    world.play(source).unwrap();

    // No thread is running, so nothing moves until update.
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(world.source_position(source).unwrap().frame, 0);
    memory.clear();
    world.update().unwrap();
    assert_eq!(memory.samples(), vec![5; 32]);

    world.set_synchronous(false).unwrap();
    assert!(wait_for(&world, |event| {
        matches!(event, MixerEvent::SourceCompleted { .. })
    }));
}

#[test]
fn test_edits_while_mixing() {
    let (world, _memory) = threaded_world(16);
    let buffer = world.create_buffer(1, vec![1; 1024]).unwrap();
    let sources: Vec<_> = (0..8)
        .map(|_| {
            let source = world.create_source().unwrap();
            world.queue_buffers(source, &[buffer]).unwrap();
            world.set_source_looping(source, true).unwrap();
            world.play(source).unwrap();
            source
        })
        .collect();

    for round in 0..50 {
        for (i, &source) in sources.iter().enumerate() {
            let position = Vec3::new(round as f32, i as f32, 0.0);
            world.set_source_position(source, position).unwrap();
            if (round + i) % 7 == 0 {
                world.pause(source).unwrap();
                world.play(source).unwrap();
            }
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    for &source in &sources {
        world.stop(source).unwrap();
        world.delete_source(source).unwrap();
    }
    assert_eq!(world.delete_buffer(buffer).unwrap(), BufferDeletion::Deleted);
    assert!(!world.poll_events().iter().any(MixerEvent::is_error));
}

#[test]
fn test_held_mixer_makes_no_progress() {
    let (world, _memory) = threaded_world(16);
    let buffer = world.create_buffer(1, vec![1; 4096]).unwrap();
    let source = world.create_source().unwrap();
    world.queue_buffers(source, &[buffer]).unwrap();

    let guard = world.engine().pause_mixer();
    world.play(source).unwrap();
    let before = world.source_position(source).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(world.source_position(source).unwrap(), before);
    drop(guard);

    let deadline = Instant::now() + Duration::from_secs(5);
    while world.source_position(source).unwrap() == before && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_ne!(world.source_position(source).unwrap(), before);
}
