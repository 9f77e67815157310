use std::fmt;
use std::ptr::null_mut;

use ash::vk;

/// 设备 feature 的描述符
///
/// 每个描述符知道自己位于哪个 feature 结构体中，可以写入创建链，也可以检查是否被支持，
/// 不需要在运行时逐字段遍历结构体。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceFeature {
    SamplerAnisotropy,
    IndependentBlend,
    FillModeNonSolid,
    TimelineSemaphore,
    BufferDeviceAddress,
    RuntimeDescriptorArray,
    ScalarBlockLayout,
}

/// 创建逻辑设备时必须开启的 features
pub const REQUIRED_FEATURES: &[DeviceFeature] = &[
    DeviceFeature::SamplerAnisotropy,
    DeviceFeature::IndependentBlend,
    DeviceFeature::TimelineSemaphore,
];

impl DeviceFeature {
    pub fn name(self) -> &'static str {
        match self {
            Self::SamplerAnisotropy => "samplerAnisotropy",
            Self::IndependentBlend => "independentBlend",
            Self::FillModeNonSolid => "fillModeNonSolid",
            Self::TimelineSemaphore => "timelineSemaphore",
            Self::BufferDeviceAddress => "bufferDeviceAddress",
            Self::RuntimeDescriptorArray => "runtimeDescriptorArray",
            Self::ScalarBlockLayout => "scalarBlockLayout",
        }
    }

    /// 写入设备创建链
    pub fn merge_into(self, chain: &mut FeatureChain) {
        match self {
            Self::SamplerAnisotropy => chain.core.sampler_anisotropy = vk::TRUE,
            Self::IndependentBlend => chain.core.independent_blend = vk::TRUE,
            Self::FillModeNonSolid => chain.core.fill_mode_non_solid = vk::TRUE,
            Self::TimelineSemaphore => chain.vk12.timeline_semaphore = vk::TRUE,
            Self::BufferDeviceAddress => chain.vk12.buffer_device_address = vk::TRUE,
            Self::RuntimeDescriptorArray => chain.vk12.runtime_descriptor_array = vk::TRUE,
            Self::ScalarBlockLayout => chain.vk12.scalar_block_layout = vk::TRUE,
        }
    }

    /// 在查询到的支持结果中是否开启
    pub fn is_satisfied_by(self, chain: &FeatureChain) -> bool {
        let flag = match self {
            Self::SamplerAnisotropy => chain.core.sampler_anisotropy,
            Self::IndependentBlend => chain.core.independent_blend,
            Self::FillModeNonSolid => chain.core.fill_mode_non_solid,
            Self::TimelineSemaphore => chain.vk12.timeline_semaphore,
            Self::BufferDeviceAddress => chain.vk12.buffer_device_address,
            Self::RuntimeDescriptorArray => chain.vk12.runtime_descriptor_array,
            Self::ScalarBlockLayout => chain.vk12.scalar_block_layout,
        };
        flag == vk::TRUE
    }
}

impl fmt::Display for DeviceFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// core features 与 Vulkan 1.2 features
///
/// 既用于描述请求，也用于保存物理设备的查询结果；`p_next` 始终为空
#[derive(Clone, Copy, Default)]
pub struct FeatureChain {
    pub core: vk::PhysicalDeviceFeatures,
    pub vk12: vk::PhysicalDeviceVulkan12Features<'static>,
}

impl FeatureChain {
    pub fn from_features(features: &[DeviceFeature]) -> Self {
        let mut chain = Self::default();
        for feature in features {
            feature.merge_into(&mut chain);
        }
        chain
    }

    /// 与支持结果比较，返回不被支持的 features
    pub fn missing(supported: &Self, required: &[DeviceFeature]) -> Vec<DeviceFeature> {
        required.iter().copied().filter(|f| !f.is_satisfied_by(supported)).collect()
    }

    /// 查询物理设备支持的 features
    pub fn query(instance: &ash::Instance, pdevice: vk::PhysicalDevice) -> Self {
        let mut vk12 = vk::PhysicalDeviceVulkan12Features::default();
        let core = {
            let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut vk12);
            unsafe { instance.get_physical_device_features2(pdevice, &mut features2) };
            features2.features
        };
        vk12.p_next = null_mut();
        Self { core, vk12 }
    }

    /// 用于 `vkCreateDevice` 的 features2，链上挂着 `vk12`
    pub fn device_create_features<'a>(
        core: vk::PhysicalDeviceFeatures,
        vk12: &'a mut vk::PhysicalDeviceVulkan12Features<'static>,
    ) -> vk::PhysicalDeviceFeatures2<'a> {
        vk12.p_next = null_mut();
        vk::PhysicalDeviceFeatures2::default().features(core).push_next(vk12)
    }
}

impl fmt::Debug for FeatureChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let all = [
            DeviceFeature::SamplerAnisotropy,
            DeviceFeature::IndependentBlend,
            DeviceFeature::FillModeNonSolid,
            DeviceFeature::TimelineSemaphore,
            DeviceFeature::BufferDeviceAddress,
            DeviceFeature::RuntimeDescriptorArray,
            DeviceFeature::ScalarBlockLayout,
        ];
        f.debug_list().entries(all.iter().filter(|feature| feature.is_satisfied_by(self))).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sets_only_requested_flags() {
        let chain = FeatureChain::from_features(&[DeviceFeature::SamplerAnisotropy, DeviceFeature::TimelineSemaphore]);
        assert_eq!(chain.core.sampler_anisotropy, vk::TRUE);
        assert_eq!(chain.core.independent_blend, vk::FALSE);
        assert_eq!(chain.vk12.timeline_semaphore, vk::TRUE);
        assert_eq!(chain.vk12.buffer_device_address, vk::FALSE);
    }

    #[test]
    fn diff_reports_unsupported_features() {
        let supported = FeatureChain::from_features(&[DeviceFeature::SamplerAnisotropy]);
        let missing = FeatureChain::missing(&supported, REQUIRED_FEATURES);
        assert_eq!(missing, vec![DeviceFeature::IndependentBlend, DeviceFeature::TimelineSemaphore]);
    }

    #[test]
    fn diff_of_merged_request_is_empty() {
        let supported = FeatureChain::from_features(REQUIRED_FEATURES);
        assert!(FeatureChain::missing(&supported, REQUIRED_FEATURES).is_empty());
    }

    #[test]
    fn debug_lists_enabled_names() {
        let chain = FeatureChain::from_features(&[DeviceFeature::ScalarBlockLayout]);
        assert_eq!(format!("{chain:?}"), "[ScalarBlockLayout]");
    }
}
