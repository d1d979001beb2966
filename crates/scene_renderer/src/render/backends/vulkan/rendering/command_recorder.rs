//! Scene command recording
//!
//! [`SceneRecorder::record`] replays every model into a command sink:
//!
//! ```text
//! begin
//!   begin render pass (clear color, depth 1.0)
//!   bind pipeline
//!   for each model
//!     push transform                         (push-constant mode)
//!     for each mesh
//!       bind vertex buffer, bind index buffer
//!       bind [per-frame set, texture set]    (+ the model's dynamic offset in dynamic-uniform mode)
//!       draw indexed (full index count)
//!   end render pass
//! end
//! ```
//!
//! Nothing is skipped; an empty scene records only the cleared pass. The
//! sink is a trait so the sequence can be checked without a device.

use ash::vk;

use crate::foundation::math::Mat4;
use crate::render::backends::vulkan::resources::descriptor_set::TRANSFORM_PUSH_CONSTANT_SIZE;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Destination for recorded draw commands
pub trait DrawCommandSink {
    /// Start recording
    fn begin(&mut self) -> VulkanResult<()>;

    /// Begin `render_pass` on `framebuffer`
    fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) -> VulkanResult<()>;

    /// Bind a graphics pipeline
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline);

    /// Push constant bytes
    fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, offset: u32, bytes: &[u8]);

    /// Bind a vertex buffer at binding 0
    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer);

    /// Bind a 32-bit index buffer
    fn bind_index_buffer(&mut self, buffer: vk::Buffer);

    /// Bind descriptor sets starting at set 0
    fn bind_descriptor_sets(&mut self, layout: vk::PipelineLayout, sets: &[vk::DescriptorSet], dynamic_offsets: &[u32]);

    /// Draw `index_count` indices as one instance
    fn draw_indexed(&mut self, index_count: u32);

    /// End the current render pass
    fn end_render_pass(&mut self) -> VulkanResult<()>;

    /// Finish recording
    fn end(&mut self) -> VulkanResult<()>;
}

/// Buffers and texture of one mesh draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshDraw {
    /// Vertex buffer
    pub vertex_buffer: vk::Buffer,
    /// Index buffer (u32 indices)
    pub index_buffer: vk::Buffer,
    /// Number of indices
    pub index_count: u32,
    /// Texture handle
    pub texture_id: usize,
}

/// A mesh the recorder can draw
pub trait DrawableMesh {
    /// Buffers and counts for the draw call
    fn draw(&self) -> MeshDraw;
}

/// A model the recorder can draw
pub trait DrawableModel {
    /// Mesh type
    type Mesh: DrawableMesh;

    /// World transform
    fn transform(&self) -> &Mat4;

    /// Meshes in draw order
    fn meshes(&self) -> &[Self::Mesh];
}

/// Texture handle to descriptor set lookup
pub trait TextureBindings {
    /// Descriptor set for `texture_id`, if it exists
    fn texture_set(&self, texture_id: usize) -> Option<vk::DescriptorSet>;
}

/// How each model's transform reaches the vertex shader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformBinding<'a> {
    /// 64-byte push constant before the model's meshes
    PushConstant,
    /// Dynamic uniform record per model
    DynamicUniform {
        /// Byte offset of each model's record, indexed by model
        offsets: &'a [u32],
    },
}

/// Per-image state the recorder binds
#[derive(Debug, Clone, Copy)]
pub struct SceneFrame<'a> {
    /// Render pass
    pub render_pass: vk::RenderPass,
    /// Framebuffer of the acquired image
    pub framebuffer: vk::Framebuffer,
    /// Swapchain extent
    pub extent: vk::Extent2D,
    /// Background color
    pub clear_color: [f32; 4],
    /// Graphics pipeline
    pub pipeline: vk::Pipeline,
    /// Pipeline layout
    pub pipeline_layout: vk::PipelineLayout,
    /// Per-frame descriptor set of the acquired image
    pub frame_set: vk::DescriptorSet,
    /// Transform delivery
    pub transform: TransformBinding<'a>,
}

impl SceneFrame<'_> {
    /// Color clear followed by depth 1.0 / stencil 0
    pub fn clear_values(&self) -> [vk::ClearValue; 2] {
        [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ]
    }
}

/// Records the scene into a [`DrawCommandSink`]
pub struct SceneRecorder;

impl SceneRecorder {
    /// Record every mesh of every model for one swapchain image
    pub fn record<S, M, T>(sink: &mut S, frame: &SceneFrame<'_>, models: &[M], textures: &T) -> VulkanResult<()>
    where
        S: DrawCommandSink + ?Sized,
        M: DrawableModel,
        T: TextureBindings + ?Sized,
    {
        sink.begin()?;

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: frame.extent,
        };
        sink.begin_render_pass(frame.render_pass, frame.framebuffer, render_area, &frame.clear_values())?;
        sink.bind_pipeline(frame.pipeline);

        for (model_index, model) in models.iter().enumerate() {
            let dynamic_offsets: &[u32] = match frame.transform {
                TransformBinding::PushConstant => {
                    let bytes: &[u8] = bytemuck::cast_slice(model.transform().as_slice());
                    debug_assert_eq!(bytes.len() as u32, TRANSFORM_PUSH_CONSTANT_SIZE);
                    sink.push_constants(frame.pipeline_layout, vk::ShaderStageFlags::VERTEX, 0, bytes);
                    &[]
                }
                TransformBinding::DynamicUniform { offsets } => offsets
                    .get(model_index..=model_index)
                    .ok_or(VulkanError::CapacityExceeded {
                        what: "dynamic model uniforms",
                        limit: offsets.len(),
                    })?,
            };

            for mesh in model.meshes() {
                let draw = mesh.draw();
                let texture_set = textures
                    .texture_set(draw.texture_id)
                    .ok_or(VulkanError::ResourceNotFound {
                        id: draw.texture_id as u64,
                    })?;

                sink.bind_vertex_buffer(draw.vertex_buffer);
                sink.bind_index_buffer(draw.index_buffer);
                sink.bind_descriptor_sets(
                    frame.pipeline_layout,
                    &[frame.frame_set, texture_set],
                    dynamic_offsets,
                );
                sink.draw_indexed(draw.index_count);
            }
        }

        sink.end_render_pass()?;
        sink.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[derive(Debug, PartialEq)]
    enum Command {
        Begin,
        BeginRenderPass,
        BindPipeline,
        PushConstants(Vec<u8>),
        BindVertex(u64),
        BindIndex(u64),
        BindSets(Vec<u64>, Vec<u32>),
        DrawIndexed(u32),
        EndRenderPass,
        End,
    }

    #[derive(Default)]
    struct Log(Vec<Command>);

    impl DrawCommandSink for Log {
        fn begin(&mut self) -> VulkanResult<()> {
            self.0.push(Command::Begin);
            Ok(())
        }
        fn begin_render_pass(
            &mut self,
            _: vk::RenderPass,
            _: vk::Framebuffer,
            _: vk::Rect2D,
            _: &[vk::ClearValue],
        ) -> VulkanResult<()> {
            self.0.push(Command::BeginRenderPass);
            Ok(())
        }
        fn bind_pipeline(&mut self, _: vk::Pipeline) {
            self.0.push(Command::BindPipeline);
        }
        fn push_constants(&mut self, _: vk::PipelineLayout, _: vk::ShaderStageFlags, _: u32, bytes: &[u8]) {
            self.0.push(Command::PushConstants(bytes.to_vec()));
        }
        fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
            self.0.push(Command::BindVertex(buffer.as_raw()));
        }
        fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
            self.0.push(Command::BindIndex(buffer.as_raw()));
        }
        fn bind_descriptor_sets(&mut self, _: vk::PipelineLayout, sets: &[vk::DescriptorSet], offsets: &[u32]) {
            self.0
                .push(Command::BindSets(sets.iter().map(|s| s.as_raw()).collect(), offsets.to_vec()));
        }
        fn draw_indexed(&mut self, index_count: u32) {
            self.0.push(Command::DrawIndexed(index_count));
        }
        fn end_render_pass(&mut self) -> VulkanResult<()> {
            self.0.push(Command::EndRenderPass);
            Ok(())
        }
        fn end(&mut self) -> VulkanResult<()> {
            self.0.push(Command::End);
            Ok(())
        }
    }

    struct FakeMesh(MeshDraw);

    impl DrawableMesh for FakeMesh {
        fn draw(&self) -> MeshDraw {
            self.0
        }
    }

    struct FakeModel(Mat4, Vec<FakeMesh>);

    impl DrawableModel for FakeModel {
        type Mesh = FakeMesh;
        fn transform(&self) -> &Mat4 {
            &self.0
        }
        fn meshes(&self) -> &[FakeMesh] {
            &self.1
        }
    }

    struct Textures(usize);

    impl TextureBindings for Textures {
        fn texture_set(&self, texture_id: usize) -> Option<vk::DescriptorSet> {
            (texture_id < self.0).then(|| vk::DescriptorSet::from_raw(100 + texture_id as u64))
        }
    }

    fn mesh(id: u64, texture_id: usize) -> FakeMesh {
        FakeMesh(MeshDraw {
            vertex_buffer: vk::Buffer::from_raw(id),
            index_buffer: vk::Buffer::from_raw(id + 1000),
            index_count: 6,
            texture_id,
        })
    }

    fn frame(transform: TransformBinding<'_>) -> SceneFrame<'_> {
        SceneFrame {
            render_pass: vk::RenderPass::null(),
            framebuffer: vk::Framebuffer::null(),
            extent: vk::Extent2D { width: 640, height: 480 },
            clear_color: [0.0, 0.0, 0.0, 1.0],
            pipeline: vk::Pipeline::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            frame_set: vk::DescriptorSet::from_raw(7),
            transform,
        }
    }

    #[test]
    fn test_empty_scene_records_cleared_pass() {
        let mut log = Log::default();
        SceneRecorder::record(&mut log, &frame(TransformBinding::PushConstant), &[] as &[FakeModel], &Textures(1))
            .unwrap();
        assert_eq!(
            log.0,
            vec![
                Command::Begin,
                Command::BeginRenderPass,
                Command::BindPipeline,
                Command::EndRenderPass,
                Command::End
            ]
        );
    }

    #[test]
    fn test_push_constant_per_model_then_meshes() {
        let models = vec![
            FakeModel(Mat4::identity(), vec![mesh(1, 0), mesh(2, 1)]),
            FakeModel(Mat4::new_translation(&crate::foundation::math::Vec3::new(1.0, 0.0, 0.0)), vec![mesh(3, 0)]),
        ];
        let mut log = Log::default();
        SceneRecorder::record(&mut log, &frame(TransformBinding::PushConstant), &models, &Textures(2)).unwrap();

        let pushes = log.0.iter().filter(|c| matches!(c, Command::PushConstants(_))).count();
        let draws = log.0.iter().filter(|c| matches!(c, Command::DrawIndexed(6))).count();
        assert_eq!(pushes, 2);
        assert_eq!(draws, 3);

        // Second model's push carries its translation in column 3.
        let Some(Command::PushConstants(bytes)) = log.0.iter().filter(|c| matches!(c, Command::PushConstants(_))).nth(1) else {
            panic!("missing second push");
        };
        assert_eq!(bytes.len(), 64);
        let translation_x = f32::from_ne_bytes([bytes[48], bytes[49], bytes[50], bytes[51]]);
        assert_eq!(translation_x, 1.0);

        assert!(log.0.contains(&Command::BindSets(vec![7, 101], vec![])));
    }

    #[test]
    fn test_dynamic_offsets_follow_model_index() {
        let models = vec![
            FakeModel(Mat4::identity(), vec![mesh(1, 0)]),
            FakeModel(Mat4::identity(), vec![mesh(2, 0)]),
            FakeModel(Mat4::identity(), vec![mesh(3, 0)]),
        ];
        let mut log = Log::default();
        SceneRecorder::record(
            &mut log,
            &frame(TransformBinding::DynamicUniform { offsets: &[0, 256, 512] }),
            &models,
            &Textures(1),
        )
        .unwrap();

        let offsets: Vec<Vec<u32>> = log
            .0
            .iter()
            .filter_map(|c| match c {
                Command::BindSets(_, offsets) => Some(offsets.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(offsets, vec![vec![0], vec![256], vec![512]]);
        assert!(!log.0.iter().any(|c| matches!(c, Command::PushConstants(_))));
    }

    #[test]
    fn test_model_without_dynamic_offset_is_rejected() {
        let models = vec![
            FakeModel(Mat4::identity(), vec![mesh(1, 0)]),
            FakeModel(Mat4::identity(), vec![mesh(2, 0)]),
        ];
        let mut log = Log::default();
        let result = SceneRecorder::record(
            &mut log,
            &frame(TransformBinding::DynamicUniform { offsets: &[0] }),
            &models,
            &Textures(1),
        );
        assert!(matches!(result, Err(VulkanError::CapacityExceeded { limit: 1, .. })));
    }

    #[test]
    fn test_unknown_texture_is_an_error() {
        let models = vec![FakeModel(Mat4::identity(), vec![mesh(1, 5)])];
        let mut log = Log::default();
        let result = SceneRecorder::record(&mut log, &frame(TransformBinding::PushConstant), &models, &Textures(1));
        assert!(matches!(result, Err(VulkanError::ResourceNotFound { id: 5 })));
    }

    #[test]
    fn test_clear_values() {
        let values = frame(TransformBinding::PushConstant).clear_values();
        unsafe {
            assert_eq!(values[0].color.float32, [0.0, 0.0, 0.0, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
        }
    }
}
