use std::ffi::CStr;
use std::fmt;
use std::str::FromStr;

use ash::vk;
use itertools::Itertools;

use crate::error::{GfxError, GfxResult, VkResultExt};
use crate::foundation::features::{DeviceFeature, FeatureChain, REQUIRED_FEATURES};

/// 用户对 GPU 的选择
///
/// - `auto`：按类型打分，优先独立显卡
/// - 数字：`enumerate_physical_devices` 中的序号
/// - 其他字符串：设备名包含该子串（忽略大小写）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GpuPreference {
    #[default]
    Auto,
    Index(usize),
    Name(String),
}

impl FromStr for GpuPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("gpu preference can not be empty".to_string());
        }
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        if let Ok(index) = s.parse::<usize>() {
            return Ok(Self::Index(index));
        }
        Ok(Self::Name(s.to_string()))
    }
}

impl fmt::Display for GpuPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Index(index) => write!(f, "{index}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// 一张候选 GPU 的概要信息，不持有任何 Vulkan 对象，便于测试选择逻辑
#[derive(Debug, Clone)]
pub struct GpuCandidate {
    pub index: usize,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub has_swapchain_ext: bool,
    /// 同时支持 graphics 与 present 的 queue family
    pub queue_family: Option<u32>,
    pub missing_features: Vec<DeviceFeature>,
    pub surface_format_count: usize,
    pub present_mode_count: usize,
}

impl GpuCandidate {
    /// 不可用的原因；可用时为 None
    pub fn rejection(&self) -> Option<String> {
        if !self.has_swapchain_ext {
            return Some(format!("missing device extension {:?}", ash::khr::swapchain::NAME));
        }
        if self.queue_family.is_none() {
            return Some("no queue family supports both graphics and present".to_string());
        }
        if !self.missing_features.is_empty() {
            return Some(format!("missing features: {}", self.missing_features.iter().join(", ")));
        }
        if self.surface_format_count == 0 {
            return Some("surface reports no formats".to_string());
        }
        if self.present_mode_count == 0 {
            return Some("surface reports no present modes".to_string());
        }
        None
    }

    /// 独立显卡 > 集成显卡 > 虚拟 GPU > CPU
    pub fn score(&self) -> u32 {
        match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 4,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
            vk::PhysicalDeviceType::CPU => 1,
            _ => 0,
        }
    }

    fn matches(&self, preference: &GpuPreference) -> bool {
        match preference {
            GpuPreference::Auto => true,
            GpuPreference::Index(index) => self.index == *index,
            GpuPreference::Name(name) => self.name.to_lowercase().contains(&name.to_lowercase()),
        }
    }
}

/// 在候选者中选择 GPU
///
/// return: 被选中的候选者在 `candidates` 中的位置；没有可用 GPU 时，错误中包含每个候选者被拒绝的原因
pub fn select_gpu(candidates: &[GpuCandidate], preference: &GpuPreference) -> GfxResult<usize> {
    let mut reasons = Vec::new();
    let mut best: Option<(usize, u32)> = None;

    for (pos, candidate) in candidates.iter().enumerate() {
        let rejection = if candidate.matches(preference) {
            candidate.rejection()
        } else {
            Some(format!("not the requested GPU ({preference})"))
        };

        match rejection {
            Some(reason) => {
                log::warn!("gpu [{}] {} rejected: {}", candidate.index, candidate.name, reason);
                reasons.push(format!("[{}] {}: {}", candidate.index, candidate.name, reason));
            }
            None => {
                let score = candidate.score();
                // 同分时保持枚举顺序
                if best.is_none_or(|(_, best_score)| score > best_score) {
                    best = Some((pos, score));
                }
            }
        }
    }

    match best {
        Some((pos, _)) => {
            log::info!("selected gpu [{}] {}", candidates[pos].index, candidates[pos].name);
            Ok(pos)
        }
        None => {
            if candidates.is_empty() {
                reasons.push("no vulkan physical device is available".to_string());
            }
            Err(GfxError::NoSuitableDevice { reasons })
        }
    }
}

/// 找到同时支持 graphics 与 present 的 queue family
pub fn find_queue_family(families: &[(vk::QueueFlags, bool)]) -> Option<u32> {
    families
        .iter()
        .position(|(flags, present)| flags.contains(vk::QueueFlags::GRAPHICS) && *present)
        .map(|index| index as u32)
}

/// 一张物理显卡
pub struct GfxPhysicalDevice {
    pub(crate) handle: vk::PhysicalDevice,
    pub(crate) candidate: GpuCandidate,
    pub(crate) queue_family_index: u32,
}

impl GfxPhysicalDevice {
    /// 枚举所有 GPU 并按照 `preference` 选择
    pub fn select(
        instance: &ash::Instance,
        surface_pf: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        preference: &GpuPreference,
    ) -> GfxResult<Self> {
        let pdevices = unsafe { instance.enumerate_physical_devices() }.vk_context("enumerate physical devices")?;

        let mut candidates = Vec::with_capacity(pdevices.len());
        for (index, pdevice) in pdevices.iter().enumerate() {
            candidates.push(Self::describe(instance, surface_pf, surface, *pdevice, index)?);
        }

        let pos = select_gpu(&candidates, preference)?;
        let candidate = candidates.swap_remove(pos);
        let queue_family_index = candidate.queue_family.ok_or(GfxError::NoQueueFamily)?;

        Ok(Self {
            handle: pdevices[candidate.index],
            candidate,
            queue_family_index,
        })
    }

    fn describe(
        instance: &ash::Instance,
        surface_pf: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        pdevice: vk::PhysicalDevice,
        index: usize,
    ) -> GfxResult<GpuCandidate> {
        let props = unsafe { instance.get_physical_device_properties(pdevice) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy().into_owned();
        log::info!("found gpu [{}]: {} ({:?})", index, name, props.device_type);

        let extensions = unsafe { instance.enumerate_device_extension_properties(pdevice) }
            .vk_context("enumerate device extensions")?;
        let has_swapchain_ext = extensions
            .iter()
            .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == ash::khr::swapchain::NAME);

        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
        let mut families = Vec::with_capacity(queue_families.len());
        for (family_index, props) in queue_families.iter().enumerate() {
            let present = unsafe {
                surface_pf.get_physical_device_surface_support(pdevice, family_index as u32, surface)
            }
            .vk_context("query surface support")?;
            families.push((props.queue_flags, present));
        }

        let supported = FeatureChain::query(instance, pdevice);
        let missing_features = FeatureChain::missing(&supported, REQUIRED_FEATURES);

        // 没有 swapchain 扩展的设备查询 surface 可能失败，此时视为不支持
        let surface_format_count = unsafe { surface_pf.get_physical_device_surface_formats(pdevice, surface) }
            .map(|formats| formats.len())
            .unwrap_or(0);
        let present_mode_count = unsafe { surface_pf.get_physical_device_surface_present_modes(pdevice, surface) }
            .map(|modes| modes.len())
            .unwrap_or(0);

        Ok(GpuCandidate {
            index,
            name,
            device_type: props.device_type,
            has_swapchain_ext,
            queue_family: find_queue_family(&families),
            missing_features,
            surface_format_count,
            present_mode_count,
        })
    }
}

// getters
impl GfxPhysicalDevice {
    #[inline]
    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.candidate.name
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(index: usize, name: &str, device_type: vk::PhysicalDeviceType) -> GpuCandidate {
        GpuCandidate {
            index,
            name: name.to_string(),
            device_type,
            has_swapchain_ext: true,
            queue_family: Some(0),
            missing_features: vec![],
            surface_format_count: 2,
            present_mode_count: 1,
        }
    }

    #[test]
    fn parse_preference() {
        assert_eq!("auto".parse::<GpuPreference>().unwrap(), GpuPreference::Auto);
        assert_eq!("AUTO".parse::<GpuPreference>().unwrap(), GpuPreference::Auto);
        assert_eq!("1".parse::<GpuPreference>().unwrap(), GpuPreference::Index(1));
        assert_eq!("nvidia".parse::<GpuPreference>().unwrap(), GpuPreference::Name("nvidia".into()));
        assert!("  ".parse::<GpuPreference>().is_err());
        assert_eq!(GpuPreference::Index(3).to_string(), "3");
    }

    #[test]
    fn discrete_gpu_is_preferred() {
        let candidates = [
            candidate(0, "Intel UHD", vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate(1, "GeForce RTX", vk::PhysicalDeviceType::DISCRETE_GPU),
            candidate(2, "llvmpipe", vk::PhysicalDeviceType::CPU),
        ];
        assert_eq!(select_gpu(&candidates, &GpuPreference::Auto).unwrap(), 1);
    }

    #[test]
    fn preference_narrows_the_set() {
        let candidates = [
            candidate(0, "Intel UHD", vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate(1, "GeForce RTX", vk::PhysicalDeviceType::DISCRETE_GPU),
        ];
        assert_eq!(select_gpu(&candidates, &GpuPreference::Index(0)).unwrap(), 0);
        assert_eq!(select_gpu(&candidates, &GpuPreference::Name("intel".into())).unwrap(), 0);
    }

    #[test]
    fn every_rejected_candidate_has_a_reason() {
        let mut no_ext = candidate(0, "A", vk::PhysicalDeviceType::DISCRETE_GPU);
        no_ext.has_swapchain_ext = false;
        let mut no_queue = candidate(1, "B", vk::PhysicalDeviceType::DISCRETE_GPU);
        no_queue.queue_family = None;
        let mut no_feature = candidate(2, "C", vk::PhysicalDeviceType::DISCRETE_GPU);
        no_feature.missing_features = vec![DeviceFeature::TimelineSemaphore];
        let mut no_format = candidate(3, "D", vk::PhysicalDeviceType::DISCRETE_GPU);
        no_format.surface_format_count = 0;

        let err = select_gpu(&[no_ext, no_queue, no_feature, no_format], &GpuPreference::Auto).unwrap_err();
        let GfxError::NoSuitableDevice { reasons } = err else {
            panic!("unexpected error kind");
        };
        assert_eq!(reasons.len(), 4);
        assert!(reasons[0].starts_with("[0] A: missing device extension"));
        assert!(reasons[1].contains("queue family"));
        assert!(reasons[2].contains("timelineSemaphore"));
        assert!(reasons[3].contains("formats"));
    }

    #[test]
    fn unmatched_preference_is_reported() {
        let candidates = [candidate(0, "Intel UHD", vk::PhysicalDeviceType::INTEGRATED_GPU)];
        let err = select_gpu(&candidates, &GpuPreference::Name("radeon".into())).unwrap_err();
        assert!(err.to_string().contains("not the requested GPU (radeon)"));
    }

    #[test]
    fn empty_device_list() {
        let err = select_gpu(&[], &GpuPreference::Auto).unwrap_err();
        assert!(err.to_string().contains("no vulkan physical device"));
    }

    #[test]
    fn queue_family_needs_graphics_and_present() {
        let families = [
            (vk::QueueFlags::GRAPHICS, false),
            (vk::QueueFlags::COMPUTE, true),
            (vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true),
        ];
        assert_eq!(find_queue_family(&families), Some(2));
        assert_eq!(find_queue_family(&families[..2]), None);
    }
}
