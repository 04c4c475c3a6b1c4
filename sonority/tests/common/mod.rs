#![allow(dead_code)]

use sonority::*;

pub const RATE: u32 = 48000;

/// A synchronous world recording into memory.
pub fn memory_world(channels: u16, block: usize) -> (SonorityWorld, MemoryBackend) {
    let _ = env_logger::builder().is_test(true).try_init();
    let memory = MemoryBackend::new(DeviceFormat::new(channels, RATE), block);
    let desc = SonorityWorldDesc::new()
        .channels(channels)
        .block_size(block)
        .synchronous(true);
    let world = SonorityWorld::with_device(desc, Box::new(memory.clone())).unwrap();
    world.poll_events();
    (world, memory)
}

/// Run one pass and return the samples it wrote.
pub fn pass(world: &SonorityWorld, memory: &MemoryBackend) -> Vec<i16> {
    memory.clear();
    world.update().unwrap().unwrap();
    memory.samples()
}

pub fn ramp(frames: i16) -> Vec<i16> {
    (0..frames).collect()
}
