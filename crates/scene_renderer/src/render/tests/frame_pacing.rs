//! Frame pacing against a simulated GPU timeline
//!
//! The simulated GPU executes submissions strictly in order and only when a
//! fence wait forces it to (or when the test ticks it), which is the worst
//! case for the CPU racing ahead.

use std::collections::VecDeque;

use ash::vk;

use crate::render::backends::vulkan::state::frame_sync::{FrameBackend, FrameSynchronizer};
use crate::render::backends::vulkan::VulkanResult;

struct SimulatedGpu {
    acquire_order: Vec<u32>,
    acquired: usize,
    current_image: Option<u32>,
    fences: Vec<bool>,
    pending: VecDeque<(usize, u32)>,
    completed: Vec<(usize, u32)>,
    max_pending: usize,
    presented: Vec<u32>,
}

impl SimulatedGpu {
    fn new(frames_in_flight: usize, acquire_order: Vec<u32>) -> Self {
        Self {
            acquire_order,
            acquired: 0,
            current_image: None,
            fences: vec![true; frames_in_flight],
            pending: VecDeque::new(),
            completed: Vec::new(),
            max_pending: 0,
            presented: Vec::new(),
        }
    }

    /// Finish the oldest submission, if any
    fn tick(&mut self) {
        if let Some((slot, image)) = self.pending.pop_front() {
            self.fences[slot] = true;
            self.completed.push((slot, image));
        }
    }
}

impl FrameBackend for SimulatedGpu {
    fn acquire_next_image(&mut self, _slot: usize) -> VulkanResult<u32> {
        let image = self.acquire_order[self.acquired % self.acquire_order.len()];
        self.acquired += 1;
        self.current_image = Some(image);
        Ok(image)
    }

    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
        while !self.fences[slot] {
            assert!(!self.pending.is_empty(), "waiting on slot {} that nothing will signal", slot);
            self.tick();
        }
        Ok(())
    }

    fn reset_slot(&mut self, slot: usize) -> VulkanResult<()> {
        assert!(self.fences[slot], "slot {} reset while its work is in flight", slot);
        self.fences[slot] = false;
        Ok(())
    }

    fn submit(&mut self, slot: usize, _command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let image = self.current_image.take().expect("submit without acquire");
        assert!(!self.fences[slot], "slot {} submitted without reset", slot);
        assert!(
            self.pending.iter().all(|&(_, busy)| busy != image),
            "image {} reused while the GPU still renders it",
            image
        );
        self.pending.push_back((slot, image));
        self.max_pending = self.max_pending.max(self.pending.len());
        Ok(())
    }

    fn present(&mut self, _slot: usize, image_index: u32) -> VulkanResult<()> {
        self.presented.push(image_index);
        Ok(())
    }
}

fn run_frames(sync: &mut FrameSynchronizer, gpu: &mut SimulatedGpu, frames: usize, tick_every: Option<usize>) {
    for frame in 0..frames {
        let ticket = sync.begin_frame(gpu).unwrap();

        // Uniforms for this image may be rewritten now; the GPU must be done with it.
        assert!(gpu.pending.iter().all(|&(_, image)| image != ticket.image_index));

        sync.submit_and_present(gpu, ticket, vk::CommandBuffer::null())
            .unwrap();

        if let Some(every) = tick_every {
            if frame % every == 0 {
                gpu.tick();
            }
        }
    }
}

#[test]
fn test_never_more_than_n_frames_in_flight() {
    for frames_in_flight in 1..=4 {
        let mut gpu = SimulatedGpu::new(frames_in_flight, vec![0, 1, 2]);
        let mut sync = FrameSynchronizer::new(frames_in_flight, 3).unwrap();

        run_frames(&mut sync, &mut gpu, 60, None);

        assert!(gpu.max_pending <= frames_in_flight);
        assert_eq!(gpu.presented.len(), 60);
    }
}

#[test]
fn test_next_frame_blocks_on_oldest_submission() {
    let frames_in_flight = 2;
    let mut gpu = SimulatedGpu::new(frames_in_flight, vec![0, 1, 2]);
    let mut sync = FrameSynchronizer::new(frames_in_flight, 3).unwrap();

    run_frames(&mut sync, &mut gpu, frames_in_flight, None);
    assert_eq!(gpu.pending.len(), frames_in_flight);
    assert!(gpu.completed.is_empty());

    // The third frame reuses slot 0, so its first submission must complete first.
    let ticket = sync.begin_frame(&mut gpu).unwrap();
    assert_eq!(ticket.slot, 0);
    assert_eq!(gpu.completed, vec![(0, 0)]);
    assert_eq!(gpu.pending.len(), frames_in_flight - 1);
}

#[test]
fn test_out_of_order_images_are_never_reused_while_busy() {
    // With three slots and three images an image can come back while the
    // slot that rendered it is not the current one.
    let order = vec![0, 1, 0, 2, 2, 1, 0, 1, 2, 2, 0, 0];
    let mut gpu = SimulatedGpu::new(3, order.clone());
    let mut sync = FrameSynchronizer::new(3, 3).unwrap();

    run_frames(&mut sync, &mut gpu, order.len() * 4, Some(3));

    assert!(gpu.max_pending <= 3);
    assert_eq!(&gpu.presented[..order.len()], order.as_slice());
}

#[test]
fn test_images_cycle_through_swapchain() {
    let image_count = 3u32;
    let mut gpu = SimulatedGpu::new(2, (0..image_count).collect());
    let mut sync = FrameSynchronizer::new(2, image_count as usize).unwrap();

    run_frames(&mut sync, &mut gpu, 30, Some(1));

    for window in gpu.presented.chunks(image_count as usize) {
        let mut seen = window.to_vec();
        seen.sort_unstable();
        assert_eq!(seen, (0..image_count).collect::<Vec<_>>());
    }
    // Slot and image indices are distinct: image 2 was last rendered by slot 0 or 1, not slot 2.
    assert!(sync.image_owner(2).is_some_and(|slot| slot < 2));
}
