use ash::vk;

/// 一次布局转换所需的 access mask 与 pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

impl LayoutTransition {
    /// 根据新旧布局推导同步参数
    ///
    /// 只覆盖离屏附件会遇到的布局，其他组合使用最保守的 ALL_COMMANDS
    pub fn between(old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        let (src_access, src_stage) = match old_layout {
            vk::ImageLayout::UNDEFINED => (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            ),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
                (vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER)
            }
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL => {
                (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER)
            }
            _ => (
                vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                vk::PipelineStageFlags::ALL_COMMANDS,
            ),
        };

        let (dst_access, dst_stage) = match new_layout {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            ),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
                (vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER)
            }
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL => {
                (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER)
            }
            vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
                (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER)
            }
            _ => (
                vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                vk::PipelineStageFlags::ALL_COMMANDS,
            ),
        };

        Self {
            src_access,
            dst_access,
            src_stage,
            dst_stage,
        }
    }

    pub fn image_barrier(
        &self,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> vk::ImageMemoryBarrier<'static> {
        vk::ImageMemoryBarrier::default()
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(color_subresource_range())
    }
}

#[inline]
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}
