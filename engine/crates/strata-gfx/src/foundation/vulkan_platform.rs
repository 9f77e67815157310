use std::sync::Arc;

use crate::backend::GfxBackend;
use crate::error::{GfxError, GfxResult};
use crate::foundation::device::GfxDevice;
use crate::foundation::instance::GfxInstance;
use crate::platform::{DeviceDesc, GfxPlatform, InstanceDesc, SurfaceProvider};

/// 基于 ash 的 [`GfxPlatform`]
pub struct VulkanPlatform {
    surface_provider: Arc<dyn SurfaceProvider>,
    entry: Option<ash::Entry>,
    instance: Option<GfxInstance>,
}

impl VulkanPlatform {
    pub fn new(surface_provider: Arc<dyn SurfaceProvider>) -> Self {
        Self {
            surface_provider,
            entry: None,
            instance: None,
        }
    }

    fn entry(&self) -> GfxResult<&ash::Entry> {
        self.entry.as_ref().ok_or_else(|| GfxError::Loader("vulkan is not loaded".to_string()))
    }

    fn instance(&self) -> GfxResult<&GfxInstance> {
        self.instance.as_ref().ok_or_else(|| GfxError::Loader("instance is not created".to_string()))
    }
}

impl GfxPlatform for VulkanPlatform {
    type Backend = GfxDevice;

    fn load(&mut self) -> GfxResult<()> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| GfxError::Loader(e.to_string()))?;
        log::info!("vulkan loaded");
        self.entry = Some(entry);
        Ok(())
    }

    fn unload(&mut self) {
        if self.instance.is_some() {
            log::warn!("unloading vulkan while the instance is still alive");
        }
        self.entry = None;
    }

    fn create_instance(&mut self, desc: &InstanceDesc) -> GfxResult<()> {
        let instance = GfxInstance::new(self.entry()?, desc, self.surface_provider.as_ref())?;
        self.instance = Some(instance);
        Ok(())
    }

    fn destroy_instance(&mut self) {
        if let Some(instance) = self.instance.take() {
            instance.destroy();
        }
    }

    fn create_device(&mut self, desc: &DeviceDesc) -> GfxResult<Arc<GfxDevice>> {
        Ok(Arc::new(GfxDevice::new(self.instance()?, desc)?))
    }

    fn destroy_device(&mut self, device: Arc<GfxDevice>) -> GfxResult<()> {
        match Arc::try_unwrap(device) {
            Ok(device) => {
                device.destroy();
                Ok(())
            }
            Err(device) => Err(GfxError::InUse(format!(
                "{} ({} other reference(s))",
                device.device_id(),
                Arc::strong_count(&device) - 1
            ))),
        }
    }
}
