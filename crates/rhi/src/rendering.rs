//! Dynamic rendering (Vulkan 1.3) for the one pass drawn each frame.
//!
//! [`FramePass`] owns the attachment infos so the `VkRenderingInfo` it hands
//! out can borrow them. [`BackBufferTransition`] moves a swapchain image in
//! and out of the color attachment layout around that pass.

use ash::vk;

/// One color target cleared and stored, plus an optional depth target
/// cleared to 1.0 and discarded.
pub struct FramePass {
    area: vk::Rect2D,
    color: [vk::RenderingAttachmentInfo<'static>; 1],
    depth: Option<vk::RenderingAttachmentInfo<'static>>,
}

impl FramePass {
    /// Pass over the whole of `extent`, clearing `color_view` to
    /// `clear_color`.
    pub fn new(extent: vk::Extent2D, color_view: vk::ImageView, clear_color: [f32; 4]) -> Self {
        let color = vk::RenderingAttachmentInfo::default()
            .image_view(color_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            });
        Self {
            area: vk::Rect2D::default().extent(extent),
            color: [color],
            depth: None,
        }
    }

    pub fn with_depth(mut self, depth_view: vk::ImageView) -> Self {
        self.depth = Some(
            vk::RenderingAttachmentInfo::default()
                .image_view(depth_view)
                .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                }),
        );
        self
    }

    /// `VkRenderingInfo` for `vkCmdBeginRendering`, borrowing this pass.
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let info = vk::RenderingInfo::default()
            .render_area(self.area)
            .layer_count(1)
            .color_attachments(&self.color);
        match &self.depth {
            Some(depth) => info.depth_attachment(depth),
            None => info,
        }
    }
}

/// Layout transitions of a swapchain image around one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackBufferTransition {
    /// Before the pass. The old contents are cleared anyway, so the source
    /// layout is `UNDEFINED`.
    ToRenderTarget,
    /// Last command of the frame.
    ToPresent,
}

impl BackBufferTransition {
    /// `(src, dst)` stage masks for the barrier.
    pub fn stages(self) -> (vk::PipelineStageFlags, vk::PipelineStageFlags) {
        let dst = match self {
            BackBufferTransition::ToRenderTarget => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            BackBufferTransition::ToPresent => vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        };
        (vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT, dst)
    }

    pub fn barrier(self, image: vk::Image) -> vk::ImageMemoryBarrier<'static> {
        let write = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
        let barrier = match self {
            BackBufferTransition::ToRenderTarget => vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .dst_access_mask(write),
            BackBufferTransition::ToPresent => vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                .src_access_mask(write),
        };
        barrier
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    #[test]
    fn test_color_target_cleared_and_stored() {
        let pass = FramePass::new(EXTENT, vk::ImageView::null(), [0.1, 0.1, 0.1, 1.0]);
        let color = pass.color[0];
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(unsafe { color.clear_value.color.float32 }, [0.1, 0.1, 0.1, 1.0]);
    }

    #[test]
    fn test_depth_cleared_to_far_plane() {
        let pass = FramePass::new(EXTENT, vk::ImageView::null(), [0.0; 4])
            .with_depth(vk::ImageView::null());
        let depth = pass.depth.unwrap();
        assert_eq!(depth.image_layout, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        assert_eq!(unsafe { depth.clear_value.depth_stencil.depth }, 1.0);
        assert!(!pass.info().p_depth_attachment.is_null());
    }

    #[test]
    fn test_info_without_depth() {
        let pass = FramePass::new(EXTENT, vk::ImageView::null(), [0.0; 4]);
        let info = pass.info();
        assert_eq!(info.color_attachment_count, 1);
        assert!(info.p_depth_attachment.is_null());
        assert_eq!(info.render_area.extent.width, 800);
    }

    #[test]
    fn test_back_buffer_transitions() {
        let to_target = BackBufferTransition::ToRenderTarget.barrier(vk::Image::null());
        assert_eq!(to_target.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(to_target.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let to_present = BackBufferTransition::ToPresent.barrier(vk::Image::null());
        assert_eq!(to_present.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(
            BackBufferTransition::ToPresent.stages().1,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE
        );
    }
}
