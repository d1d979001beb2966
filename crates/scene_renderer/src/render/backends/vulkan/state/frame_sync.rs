//! Frame pacing
//!
//! N frame slots rotate `current = (current + 1) % N`. Each slot owns an
//! acquire semaphore, a render-finished semaphore and a fence created
//! signaled. One frame runs:
//!
//! 1. acquire the next swapchain image with the slot's acquire semaphore
//!    (the image index is unrelated to the slot index)
//! 2. wait for the slot's fence, and for the fence of whichever slot last
//!    rendered the acquired image, then reset the slot's fence
//! 3. the caller updates that image's uniforms and records its command buffer
//! 4. submit waiting on the acquire semaphore at color-attachment output,
//!    signaling render-finished and the slot's fence
//! 5. present waiting on render-finished
//!
//! Step 2 is what keeps the CPU at most N frames ahead and keeps an image's
//! buffers from being rewritten while the GPU still reads them. The GPU side
//! sits behind [`FrameBackend`] so the protocol can be driven by a simulated
//! timeline in tests.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::backends::vulkan::state::sync::FrameSync;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// GPU operations the synchronizer sequences, addressed by frame slot
pub trait FrameBackend {
    /// Acquire the next presentable image, signaling the slot's acquire semaphore
    fn acquire_next_image(&mut self, slot: usize) -> VulkanResult<u32>;

    /// Block until the slot's previous submission has completed
    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()>;

    /// Unsignal the slot's fence before it is submitted again
    fn reset_slot(&mut self, slot: usize) -> VulkanResult<()>;

    /// Submit `command_buffer` with the slot's semaphores and fence
    fn submit(&mut self, slot: usize, command_buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Present `image_index` once the slot's rendering has finished
    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<()>;
}

/// The frame slot and swapchain image of a frame in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTicket {
    /// Frame slot index in `0..frames_in_flight`
    pub slot: usize,
    /// Swapchain image index in `0..image_count`
    pub image_index: u32,
}

/// Tracks frame slots and which slot last used each swapchain image
#[derive(Debug)]
pub struct FrameSynchronizer {
    frames_in_flight: usize,
    current: usize,
    images_in_flight: Vec<Option<usize>>,
}

impl FrameSynchronizer {
    /// Synchronizer for `frames_in_flight` slots over `image_count` swapchain images
    pub fn new(frames_in_flight: usize, image_count: usize) -> VulkanResult<Self> {
        if frames_in_flight == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "at least one frame in flight is required".to_string(),
            });
        }
        Ok(Self {
            frames_in_flight,
            current: 0,
            images_in_flight: vec![None; image_count],
        })
    }

    /// Acquire an image and wait until both the slot and the image are free
    pub fn begin_frame<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> VulkanResult<FrameTicket> {
        let slot = self.current;
        let image_index = backend.acquire_next_image(slot)?;

        let owner = self
            .images_in_flight
            .get(image_index as usize)
            .copied()
            .ok_or(VulkanError::ResourceNotFound {
                id: u64::from(image_index),
            })?;

        backend.wait_for_slot(slot)?;
        if let Some(owner) = owner.filter(|&owner| owner != slot) {
            log::trace!("Image {} still owned by slot {}, waiting", image_index, owner);
            backend.wait_for_slot(owner)?;
        }
        backend.reset_slot(slot)?;

        self.images_in_flight[image_index as usize] = Some(slot);
        Ok(FrameTicket { slot, image_index })
    }

    /// Submit the recorded frame, present it and advance to the next slot
    pub fn submit_and_present<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        ticket: FrameTicket,
        command_buffer: vk::CommandBuffer,
    ) -> VulkanResult<()> {
        if ticket.slot != self.current {
            return Err(VulkanError::InvalidOperation {
                reason: format!("frame slot {} submitted while slot {} is current", ticket.slot, self.current),
            });
        }

        backend.submit(ticket.slot, command_buffer)?;
        backend.present(ticket.slot, ticket.image_index)?;

        self.current = (self.current + 1) % self.frames_in_flight;
        Ok(())
    }

    /// Slot the next frame will use
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Number of frame slots
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Slot that last submitted `image_index`, if any
    pub fn image_owner(&self, image_index: u32) -> Option<usize> {
        self.images_in_flight.get(image_index as usize).copied().flatten()
    }
}

/// [`FrameBackend`] over a real swapchain and queues
pub struct SwapchainFrameBackend<'a> {
    device: &'a Device,
    loader: &'a SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    frames: &'a [FrameSync],
}

impl<'a> SwapchainFrameBackend<'a> {
    /// Borrow the objects one frame needs
    pub fn new(
        device: &'a Device,
        loader: &'a SwapchainLoader,
        swapchain: vk::SwapchainKHR,
        graphics_queue: vk::Queue,
        present_queue: vk::Queue,
        frames: &'a [FrameSync],
    ) -> Self {
        Self {
            device,
            loader,
            swapchain,
            graphics_queue,
            present_queue,
            frames,
        }
    }

    fn frame(&self, slot: usize) -> VulkanResult<&'a FrameSync> {
        self.frames
            .get(slot)
            .ok_or(VulkanError::ResourceNotFound { id: slot as u64 })
    }
}

impl FrameBackend for SwapchainFrameBackend<'_> {
    fn acquire_next_image(&mut self, slot: usize) -> VulkanResult<u32> {
        let frame = self.frame(slot)?;
        let (image_index, suboptimal) = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                frame.image_available.handle(),
                vk::Fence::null(),
            )
        }
        .map_err(VulkanError::from_vk)?;

        if suboptimal {
            return Err(VulkanError::SwapchainOutOfDate);
        }
        Ok(image_index)
    }

    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
        self.frame(slot)?.in_flight.wait()
    }

    fn reset_slot(&mut self, slot: usize) -> VulkanResult<()> {
        self.frame(slot)?.in_flight.reset()
    }

    fn submit(&mut self, slot: usize, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let frame = self.frame(slot)?;

        let wait_semaphores = [frame.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [frame.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], frame.in_flight.handle())
        }
        .map_err(VulkanError::from_vk)
    }

    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
        let frame = self.frame(slot)?;

        let wait_semaphores = [frame.render_finished.handle()];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let suboptimal =
            unsafe { self.loader.queue_present(self.present_queue, &present_info) }.map_err(VulkanError::from_vk)?;
        if suboptimal {
            return Err(VulkanError::SwapchainOutOfDate);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Images come back in a fixed order; every slot is always signaled
    struct Scripted {
        images: Vec<u32>,
        next: usize,
        calls: Vec<String>,
    }

    impl FrameBackend for Scripted {
        fn acquire_next_image(&mut self, slot: usize) -> VulkanResult<u32> {
            let image = self.images[self.next % self.images.len()];
            self.next += 1;
            self.calls.push(format!("acquire {} -> {}", slot, image));
            Ok(image)
        }
        fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
            self.calls.push(format!("wait {}", slot));
            Ok(())
        }
        fn reset_slot(&mut self, slot: usize) -> VulkanResult<()> {
            self.calls.push(format!("reset {}", slot));
            Ok(())
        }
        fn submit(&mut self, slot: usize, _: vk::CommandBuffer) -> VulkanResult<()> {
            self.calls.push(format!("submit {}", slot));
            Ok(())
        }
        fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
            self.calls.push(format!("present {} {}", slot, image_index));
            Ok(())
        }
    }

    #[test]
    fn test_zero_frames_in_flight_rejected() {
        assert!(FrameSynchronizer::new(0, 3).is_err());
    }

    #[test]
    fn test_frame_sequence_and_rotation() {
        let mut backend = Scripted {
            images: vec![0, 1, 2],
            next: 0,
            calls: Vec::new(),
        };
        let mut sync = FrameSynchronizer::new(2, 3).unwrap();

        for _ in 0..3 {
            let ticket = sync.begin_frame(&mut backend).unwrap();
            sync.submit_and_present(&mut backend, ticket, vk::CommandBuffer::null())
                .unwrap();
        }

        assert_eq!(
            backend.calls,
            vec![
                "acquire 0 -> 0",
                "wait 0",
                "reset 0",
                "submit 0",
                "present 0 0",
                "acquire 1 -> 1",
                "wait 1",
                "reset 1",
                "submit 1",
                "present 1 1",
                "acquire 0 -> 2",
                "wait 0",
                "reset 0",
                "submit 0",
                "present 0 2",
            ]
        );
        assert_eq!(sync.current_slot(), 1);
        assert_eq!(sync.image_owner(2), Some(0));
    }

    #[test]
    fn test_out_of_order_image_waits_on_its_owner() {
        // Slot 1 acquires image 0, which slot 0 rendered last.
        let mut backend = Scripted {
            images: vec![0, 0],
            next: 0,
            calls: Vec::new(),
        };
        let mut sync = FrameSynchronizer::new(2, 2).unwrap();

        let first = sync.begin_frame(&mut backend).unwrap();
        sync.submit_and_present(&mut backend, first, vk::CommandBuffer::null())
            .unwrap();
        backend.calls.clear();

        let second = sync.begin_frame(&mut backend).unwrap();
        assert_eq!(second, FrameTicket { slot: 1, image_index: 0 });
        assert_eq!(backend.calls, vec!["acquire 1 -> 0", "wait 1", "wait 0", "reset 1"]);
        assert_eq!(sync.image_owner(0), Some(1));
    }

    #[test]
    fn test_image_index_out_of_range() {
        let mut backend = Scripted {
            images: vec![5],
            next: 0,
            calls: Vec::new(),
        };
        let mut sync = FrameSynchronizer::new(2, 3).unwrap();
        assert!(matches!(
            sync.begin_frame(&mut backend),
            Err(VulkanError::ResourceNotFound { id: 5 })
        ));
    }

    #[test]
    fn test_ticket_must_match_current_slot() {
        let mut backend = Scripted {
            images: vec![0],
            next: 0,
            calls: Vec::new(),
        };
        let mut sync = FrameSynchronizer::new(2, 1).unwrap();
        let stale = FrameTicket { slot: 1, image_index: 0 };
        assert!(sync
            .submit_and_present(&mut backend, stale, vk::CommandBuffer::null())
            .is_err());
    }
}
