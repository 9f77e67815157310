use std::ffi::{CStr, CString, c_char};

use ash::vk;
use itertools::Itertools;

use crate::error::{GfxError, GfxResult, VkResultExt};
use crate::foundation::debug_messenger::GfxDebugMsger;
use crate::platform::{InstanceDesc, SurfaceProvider};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance Level 的全部对象：instance、可选的 debug messenger 以及 surface
pub struct GfxInstance {
    pub(crate) ash_instance: ash::Instance,
    pub(crate) surface_pf: ash::khr::surface::Instance,
    pub(crate) surface: vk::SurfaceKHR,
    debug_msger: Option<GfxDebugMsger>,
    debug: bool,
}

// new & init
impl GfxInstance {
    pub fn new(entry: &ash::Entry, desc: &InstanceDesc, surface_provider: &dyn SurfaceProvider) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxInstance::new");

        let app_name = CString::new(desc.app_name.as_str())
            .map_err(|_| GfxError::Loader(format!("invalid application name {:?}", desc.app_name)))?;
        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3) // 版本过低时，有些函数无法正确加载
            .application_name(app_name.as_c_str())
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"strata")
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let mut required_exts = surface_provider
            .required_instance_extensions()?
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(*ext) })
            .collect_vec();
        if desc.debug {
            required_exts.push(ash::ext::debug_utils::NAME);
        }
        let enabled_exts = Self::check_extensions(entry, &required_exts)?;
        log::info!("instance extensions: {}", required_exts.iter().map(|e| format!("\n\t{e:?}")).join(""));

        let required_layers = if desc.debug { vec![VALIDATION_LAYER] } else { vec![] };
        let enabled_layers = Self::check_layers(entry, &required_layers)?;
        log::info!("instance layers: {}", required_layers.iter().map(|l| format!("\n\t{l:?}")).join(""));

        let mut instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&enabled_exts)
            .enabled_layer_names(&enabled_layers);

        // 为 instance info 添加 debug messenger
        let mut debug_utils_messenger_ci = GfxDebugMsger::create_info();
        if desc.debug {
            instance_ci = instance_ci.push_next(&mut debug_utils_messenger_ci);
        }

        let ash_instance = unsafe { entry.create_instance(&instance_ci, None) }.vk_context("create instance")?;

        let debug_msger = if desc.debug {
            match GfxDebugMsger::new(entry, &ash_instance) {
                Ok(msger) => Some(msger),
                Err(e) => {
                    unsafe { ash_instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        let surface_pf = ash::khr::surface::Instance::new(entry, &ash_instance);
        let surface = match surface_provider.create_surface(entry, &ash_instance) {
            Ok(surface) => surface,
            Err(e) => {
                drop(debug_msger);
                unsafe { ash_instance.destroy_instance(None) };
                return Err(e);
            }
        };

        log::info!("instance created (app: {}, debug: {})", desc.app_name, desc.debug);
        Ok(Self {
            ash_instance,
            surface_pf,
            surface,
            debug_msger,
            debug: desc.debug,
        })
    }

    /// 检查所需的 extension 是否都受支持
    fn check_extensions(entry: &ash::Entry, required: &[&'static CStr]) -> GfxResult<Vec<*const c_char>> {
        let all_ext_props =
            unsafe { entry.enumerate_instance_extension_properties(None) }.vk_context("enumerate instance extensions")?;
        let available = all_ext_props
            .iter()
            .map(|props| unsafe { CStr::from_ptr(props.extension_name.as_ptr()) })
            .collect_vec();

        if let Some(missing) = first_missing(&available, required) {
            return Err(GfxError::MissingInstanceExtension(missing));
        }
        Ok(required.iter().unique().map(|ext| ext.as_ptr()).collect())
    }

    /// 检查所需的 layer 是否都受支持
    fn check_layers(entry: &ash::Entry, required: &[&'static CStr]) -> GfxResult<Vec<*const c_char>> {
        let all_layer_props =
            unsafe { entry.enumerate_instance_layer_properties() }.vk_context("enumerate instance layers")?;
        let available = all_layer_props
            .iter()
            .map(|props| unsafe { CStr::from_ptr(props.layer_name.as_ptr()) })
            .collect_vec();

        if let Some(missing) = first_missing(&available, required) {
            return Err(GfxError::MissingLayer(missing));
        }
        Ok(required.iter().map(|layer| layer.as_ptr()).collect())
    }
}

// getters
impl GfxInstance {
    #[inline]
    pub fn ash_instance(&self) -> &ash::Instance {
        &self.ash_instance
    }

    #[inline]
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    #[inline]
    pub fn is_debug(&self) -> bool {
        self.debug
    }
}

// destroy
impl GfxInstance {
    pub fn destroy(self) {
        log::info!("destroying instance");
        unsafe {
            self.surface_pf.destroy_surface(self.surface, None);
        }
        if let Some(msger) = self.debug_msger {
            msger.destroy();
        }
        unsafe {
            self.ash_instance.destroy_instance(None);
        }
    }
}

/// `required` 中第一个不在 `available` 中的名字
pub fn first_missing(available: &[&CStr], required: &[&CStr]) -> Option<String> {
    required
        .iter()
        .find(|name| !available.contains(name))
        .map(|name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_name_is_reported() {
        let available = [c"VK_KHR_surface", c"VK_KHR_xlib_surface"];
        assert_eq!(first_missing(&available, &[c"VK_KHR_surface"]), None);
        assert_eq!(
            first_missing(&available, &[c"VK_KHR_surface", c"VK_EXT_debug_utils"]),
            Some("VK_EXT_debug_utils".to_string())
        );
    }

    #[test]
    fn validation_layer_name() {
        assert_eq!(VALIDATION_LAYER.to_str().unwrap(), "VK_LAYER_KHRONOS_validation");
    }
}
