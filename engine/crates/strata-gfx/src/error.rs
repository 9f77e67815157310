use ash::vk;

/// GFX 层的错误
///
/// out of date / suboptimal 不属于错误，它们通过 [`crate::backend::AcquireOutcome`]
/// 与 [`crate::backend::PresentOutcome`] 返回。
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    /// 非预期的 Vulkan 返回值，同时保留符号与数值
    #[error("{context} failed: {result:?} ({code}): {result}")]
    Vulkan {
        context: String,
        result: vk::Result,
        code: i32,
    },

    #[error("{context} timed out after {timeout_ns} ns")]
    Timeout { context: String, timeout_ns: u64 },

    /// 每个被拒绝的 GPU 都附带一条原因
    #[error("no suitable GPU found:\n{}", .reasons.join("\n"))]
    NoSuitableDevice { reasons: Vec<String> },

    #[error("required instance extension {0} is missing")]
    MissingInstanceExtension(String),

    #[error("required instance layer {0} is missing")]
    MissingLayer(String),

    #[error("required device extension {0} is missing")]
    MissingDeviceExtension(String),

    #[error("no queue family supports both graphics and present")]
    NoQueueFamily,

    #[error("failed to load vulkan: {0}")]
    Loader(String),

    #[error("surface error: {0}")]
    Surface(String),

    /// 销毁时仍有其他持有者
    #[error("{0} is still in use")]
    InUse(String),

    #[error("shader `{name}` failed to compile: {message}")]
    ShaderCompile { name: String, message: String },
}

pub type GfxResult<T> = Result<T, GfxError>;

impl GfxError {
    pub fn vulkan(context: impl Into<String>, result: vk::Result) -> Self {
        Self::Vulkan {
            context: context.into(),
            result,
            code: result.as_raw(),
        }
    }

    /// 是否为超时，渲染线程据此区分日志
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// 为 ash 的 `VkResult` 附加上下文
pub trait VkResultExt<T> {
    fn vk_context(self, context: &str) -> GfxResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    #[inline]
    fn vk_context(self, context: &str) -> GfxResult<T> {
        self.map_err(|result| GfxError::vulkan(context, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vulkan_error_carries_symbol_and_code() {
        let err: GfxResult<()> = Err(vk::Result::ERROR_DEVICE_LOST).vk_context("queue submit");
        let err = err.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("queue submit"));
        assert!(msg.contains("ERROR_DEVICE_LOST"));
        assert!(msg.contains(&vk::Result::ERROR_DEVICE_LOST.as_raw().to_string()));
    }

    #[test]
    fn no_suitable_device_lists_every_reason() {
        let err = GfxError::NoSuitableDevice {
            reasons: vec!["[0] llvmpipe: no present support".into(), "[1] gpu: missing VK_KHR_swapchain".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("llvmpipe"));
        assert!(msg.contains("VK_KHR_swapchain"));
    }
}
