use ash::vk;

use crate::backend::FrameSubmit;

/// 持有 `vk::SubmitInfo` 引用的数组，保证它们在提交期间有效
#[derive(Default)]
pub struct GfxSubmitInfo {
    command_buffers: Vec<vk::CommandBuffer>,
    wait_semaphores: Vec<vk::Semaphore>,
    wait_stages: Vec<vk::PipelineStageFlags>,
    signal_semaphores: Vec<vk::Semaphore>,
}

impl GfxSubmitInfo {
    pub fn new(commands: &[vk::CommandBuffer]) -> Self {
        Self {
            command_buffers: commands.to_vec(),
            ..Default::default()
        }
    }

    /// 一帧的标准提交：等待 image available，signal render complete
    pub fn from_frame(frame: &FrameSubmit) -> Self {
        Self::new(std::slice::from_ref(&frame.cmd))
            .wait(frame.wait_semaphore, frame.wait_stage)
            .signal(frame.signal_semaphore)
    }

    #[inline]
    pub fn wait(mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags) -> Self {
        if semaphore != vk::Semaphore::null() {
            self.wait_semaphores.push(semaphore);
            self.wait_stages.push(stage);
        }
        self
    }

    #[inline]
    pub fn signal(mut self, semaphore: vk::Semaphore) -> Self {
        if semaphore != vk::Semaphore::null() {
            self.signal_semaphores.push(semaphore);
        }
        self
    }

    #[inline]
    pub fn submit_info(&self) -> vk::SubmitInfo<'_> {
        vk::SubmitInfo::default()
            .command_buffers(&self.command_buffers)
            .wait_semaphores(&self.wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .signal_semaphores(&self.signal_semaphores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn null_semaphores_are_skipped() {
        let info = GfxSubmitInfo::new(&[vk::CommandBuffer::from_raw(1)])
            .wait(vk::Semaphore::null(), vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .signal(vk::Semaphore::from_raw(2));
        let raw = info.submit_info();
        assert_eq!(raw.command_buffer_count, 1);
        assert_eq!(raw.wait_semaphore_count, 0);
        assert_eq!(raw.signal_semaphore_count, 1);
    }

    #[test]
    fn frame_submit_waits_and_signals() {
        let frame = FrameSubmit {
            cmd: vk::CommandBuffer::from_raw(1),
            wait_semaphore: vk::Semaphore::from_raw(2),
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal_semaphore: vk::Semaphore::from_raw(3),
            fence: vk::Fence::from_raw(4),
        };
        let info = GfxSubmitInfo::from_frame(&frame);
        let raw = info.submit_info();
        assert_eq!(raw.wait_semaphore_count, 1);
        assert_eq!(raw.signal_semaphore_count, 1);
    }
}
