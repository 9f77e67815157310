use std::ffi::CStr;

use ash::vk;

use crate::error::{GfxResult, VkResultExt};

/// 只在 debug mode 下创建，将 validation 消息转发到 log
pub struct GfxDebugMsger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl GfxDebugMsger {
    pub fn new(entry: &ash::Entry, instance: &ash::Instance) -> GfxResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let messenger = unsafe { loader.create_debug_utils_messenger(&Self::create_info(), None) }
            .vk_context("create debug utils messenger")?;
        Ok(Self { loader, messenger })
    }

    /// 同时挂在 instance 的创建链上，覆盖 instance 创建与销毁期间的消息
    pub fn create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vk_debug_callback))
    }

    pub fn destroy(self) {
        // 触发 drop 进行销毁
    }
}

impl Drop for GfxDebugMsger {
    fn drop(&mut self) {
        log::info!("destroying debug messenger");
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

/// debug messenger 的回调函数
/// # Safety
/// 由驱动调用，`p_callback_data` 在回调期间有效
unsafe extern "system" fn vk_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let msg = if p_callback_data.is_null() || unsafe { (*p_callback_data).p_message.is_null() } {
        std::borrow::Cow::from("")
    } else {
        unsafe { CStr::from_ptr((*p_callback_data).p_message).to_string_lossy() }
    };

    let format_msg = format_validation_message(message_type, &msg);
    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("{}", format_msg),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("{}", format_msg),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::info!("{}", format_msg),
        _ => log::debug!("{}", format_msg),
    };

    // 只有 layer developer 才需要返回 True
    vk::FALSE
}

/// 部分 layer 以 json 输出消息，其中的 MainMessage 字段包含换行，需要单独输出
fn format_validation_message(message_type: vk::DebugUtilsMessageTypeFlagsEXT, msg: &str) -> String {
    let mut json_value = serde_json::from_str::<serde_json::Value>(msg).ok();
    let json_obj = json_value.as_mut().and_then(|v| v.as_object_mut());

    match json_obj {
        Some(obj) => {
            let main_msg = obj.remove("MainMessage");
            let main_msg = main_msg.as_ref().and_then(|v| v.as_str()).unwrap_or_default();
            let rest = serde_json::to_string_pretty(obj).unwrap_or_default();
            format!("[{:?}]\n{}\n{}", message_type, rest, main_msg)
        }
        None => format!("[{:?}] {}", message_type, msg),
    }
}
