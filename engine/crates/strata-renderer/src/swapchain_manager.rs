use ash::vk;
use strata_gfx::backend::{DeviceId, SwapchainDesc};
use strata_gfx::swapchain::{choose_extent, choose_image_count, choose_present_mode, choose_surface_format};
use strata_gfx::{GfxBackend, GfxError, GfxResult};

/// 当前 swapchain 的全部信息
#[derive(Debug, Clone)]
pub struct SwapchainState {
    pub handle: vk::SwapchainKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub device: DeviceId,
}

impl SwapchainState {
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

/// 被替换下来的 swapchain，作为下一次创建的 old_swapchain
#[derive(Debug, Clone, Copy)]
struct RetiredSwapchain {
    handle: vk::SwapchainKHR,
    device: DeviceId,
}

/// 创建、重建 swapchain 与它的 image views
#[derive(Default)]
pub struct SwapchainManager {
    current: Option<SwapchainState>,
    retired: Option<RetiredSwapchain>,
}

// getters
impl SwapchainManager {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn current(&self) -> Option<&SwapchainState> {
        self.current.as_ref()
    }

    #[inline]
    pub fn has_retired(&self) -> bool {
        self.retired.is_some()
    }
}

// update
impl SwapchainManager {
    /// 根据最新查询到的 surface 能力创建 swapchain
    ///
    /// surface 能力每次都重新查询。可绘制区域为 0（最小化）时不创建，返回 None。
    /// 旧的 swapchain 作为创建提示；新的创建成功后，如果旧的仍属于当前设备则立即销毁。
    pub fn create(
        &mut self,
        backend: &dyn GfxBackend,
        window_extent: vk::Extent2D,
        requested_mode: vk::PresentModeKHR,
    ) -> GfxResult<Option<&SwapchainState>> {
        debug_assert!(self.current.is_none(), "swapchain must be disposed before it is created again");

        let support = backend.surface_support()?;
        let extent = choose_extent(&support.capabilities, window_extent);
        if window_extent.width == 0 || window_extent.height == 0 || extent.width == 0 || extent.height == 0 {
            log::info!("drawable area is empty, swapchain creation is skipped");
            return Ok(None);
        }
        let format = choose_surface_format(&support.formats)
            .ok_or_else(|| GfxError::Surface("surface reports no formats".to_string()))?;
        let present_mode = choose_present_mode(&support.present_modes, requested_mode);
        let desc = SwapchainDesc {
            format,
            present_mode,
            extent,
            image_count: choose_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
        };

        let device = backend.device_id();
        let old = match self.retired {
            Some(retired) if retired.device == device => retired.handle,
            _ => vk::SwapchainKHR::null(),
        };
        let handle = backend.create_swapchain(&desc, old)?;
        self.release_retired(backend);

        let images = match backend.swapchain_images(handle) {
            Ok(images) => images,
            Err(e) => {
                backend.destroy_swapchain(handle);
                return Err(e);
            }
        };
        let mut views = Vec::with_capacity(images.len());
        for (index, image) in images.iter().enumerate() {
            match backend.create_image_view(*image, format.format, &format!("swapchain-{index}")) {
                Ok(view) => views.push(view),
                Err(e) => {
                    views.into_iter().for_each(|view| backend.destroy_image_view(view));
                    backend.destroy_swapchain(handle);
                    return Err(e);
                }
            }
        }

        log::info!(
            "swapchain created: {}x{}, {:?}/{:?}, {:?}, {} image(s){}",
            extent.width,
            extent.height,
            format.format,
            format.color_space,
            present_mode,
            images.len(),
            if old == vk::SwapchainKHR::null() { "" } else { ", replacing the previous one" }
        );

        let state = self.current.insert(SwapchainState {
            handle,
            format,
            present_mode,
            extent,
            images,
            views,
            device,
        });
        Ok(Some(&*state))
    }

    /// 销毁 image views，swapchain 本身保留为下一次创建的提示
    pub fn dispose(&mut self, backend: &dyn GfxBackend) {
        let Some(state) = self.current.take() else {
            return;
        };
        state.views.into_iter().for_each(|view| backend.destroy_image_view(view));

        // 最多保留一个
        self.release_retired(backend);
        self.retired = Some(RetiredSwapchain {
            handle: state.handle,
            device: state.device,
        });
        log::debug!("swapchain {:?} retired", state.handle);
    }

    /// 销毁保留的旧 swapchain，只处理属于 `backend` 的那一个
    ///
    /// Device 销毁之前必须调用
    pub fn release_retired(&mut self, backend: &dyn GfxBackend) {
        let Some(retired) = self.retired.take() else {
            return;
        };
        if retired.device == backend.device_id() {
            backend.destroy_swapchain(retired.handle);
        } else {
            log::warn!(
                "retired swapchain {:?} belongs to {}, not {}; it is dropped without destroying",
                retired.handle,
                retired.device,
                backend.device_id()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use strata_gfx::mock::{MockBackend, MockOp};

    use super::*;

    const WINDOW: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    fn created(backend: &MockBackend) -> Vec<(vk::SwapchainKHR, vk::SwapchainKHR, SwapchainDesc)> {
        backend
            .ops()
            .into_iter()
            .filter_map(|op| match op {
                MockOp::CreateSwapchain { swapchain, old, desc } => Some((swapchain, old, desc)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn negotiates_format_mode_and_extent() {
        let backend = MockBackend::new();
        let mut manager = SwapchainManager::new();
        let state = manager.create(&backend, WINDOW, vk::PresentModeKHR::IMMEDIATE).unwrap().unwrap();

        assert_eq!(state.format.format, vk::Format::B8G8R8A8_SRGB);
        // IMMEDIATE 不受支持
        assert_eq!(state.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(state.extent, WINDOW);
        assert_eq!(state.image_count(), 3);
        assert_eq!(state.views.len(), 3);
        assert_eq!(state.device, backend.device_id());
    }

    #[test]
    fn definite_surface_extent_wins() {
        let backend = MockBackend::new();
        let mut support = MockBackend::default_support();
        support.capabilities.current_extent = vk::Extent2D {
            width: 1024,
            height: 768,
        };
        backend.set_surface_support(support);

        let mut manager = SwapchainManager::new();
        let state = manager.create(&backend, WINDOW, vk::PresentModeKHR::FIFO).unwrap().unwrap();
        assert_eq!(state.extent.width, 1024);
    }

    #[test]
    fn old_swapchain_is_a_hint_and_destroyed_after_replacement() {
        let backend = MockBackend::new();
        let mut manager = SwapchainManager::new();
        let first = manager.create(&backend, WINDOW, vk::PresentModeKHR::FIFO).unwrap().unwrap().handle;
        manager.dispose(&backend);
        assert!(manager.has_retired());
        assert_eq!(backend.live("swapchain"), 1);
        assert_eq!(backend.live("image_view"), 0);

        let second = manager.create(&backend, WINDOW, vk::PresentModeKHR::MAILBOX).unwrap().unwrap().handle;
        let creations = created(&backend);
        assert_eq!(creations[1].0, second);
        assert_eq!(creations[1].1, first);

        // 新的创建之后才销毁旧的
        let ops = backend.ops();
        let create_pos = ops.iter().position(|op| matches!(op, MockOp::CreateSwapchain { swapchain, .. } if *swapchain == second));
        let destroy_pos = ops.iter().position(|op| *op == MockOp::DestroySwapchain(first));
        assert!(create_pos.unwrap() < destroy_pos.unwrap());
        assert!(!manager.has_retired());
        assert_eq!(backend.live("swapchain"), 1);

        manager.dispose(&backend);
        manager.release_retired(&backend);
        assert!(backend.all_released());
    }

    #[test]
    fn retired_swapchain_of_another_device_is_not_reused() {
        let old_device = MockBackend::new();
        let mut manager = SwapchainManager::new();
        manager.create(&old_device, WINDOW, vk::PresentModeKHR::FIFO).unwrap();
        manager.dispose(&old_device);

        let new_device = MockBackend::new();
        manager.create(&new_device, WINDOW, vk::PresentModeKHR::FIFO).unwrap();
        assert_eq!(created(&new_device)[0].1, vk::SwapchainKHR::null());
        assert_eq!(old_device.count_ops(|op| matches!(op, MockOp::DestroySwapchain(_))), 0);
    }

    #[test]
    fn zero_extent_skips_creation() {
        let backend = MockBackend::new();
        let mut manager = SwapchainManager::new();
        let state = manager
            .create(&backend, vk::Extent2D { width: 0, height: 600 }, vk::PresentModeKHR::FIFO)
            .unwrap();
        assert!(state.is_none());
        assert!(manager.current().is_none());
        assert!(created(&backend).is_empty());
    }
}
