use ash::vk;

/// 优先使用的 surface format：8bit BGRA + sRGB 非线性
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// 支持时使用 [`PREFERRED_SURFACE_FORMAT`]，否则使用 surface 报告的第一个
///
/// surface 不报告任何 format 时返回 None
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == PREFERRED_SURFACE_FORMAT.format && f.color_space == PREFERRED_SURFACE_FORMAT.color_space)
        .or_else(|| formats.first())
        .copied()
}

/// 配置的 present mode 受支持时使用它，否则回退到规范保证可用的 FIFO
pub fn choose_present_mode(supported: &[vk::PresentModeKHR], requested: vk::PresentModeKHR) -> vk::PresentModeKHR {
    if supported.contains(&requested) {
        requested
    } else {
        if requested != vk::PresentModeKHR::FIFO {
            log::warn!("present mode {:?} is not supported by the surface, falling back to FIFO", requested);
        }
        vk::PresentModeKHR::FIFO
    }
}

/// 确定 swapchain 的 extent
///
/// 如果 current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置 extent，此时将窗口尺寸限制在能力范围内；
/// 否则必须使用 surface 给出的 current_extent
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
    let current = capabilities.current_extent;
    if current.width == u32::MAX || current.height == u32::MAX {
        let width = window_extent
            .width
            .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width);
        let height = window_extent
            .height
            .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height);
        vk::Extent2D { width, height }
    } else {
        current
    }
}

/// 比最小值多一张；max_image_count == 0 表示不限制
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = capabilities.min_image_count + 1;
    if capabilities.max_image_count == 0 {
        wanted
    } else {
        wanted.min(capabilities.max_image_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        }
    }

    #[test]
    fn preferred_format_wins() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            PREFERRED_SURFACE_FORMAT,
        ];
        assert_eq!(choose_surface_format(&formats), Some(PREFERRED_SURFACE_FORMAT));
    }

    #[test]
    fn first_format_is_fallback() {
        let first = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let formats = [
            first,
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
            },
        ];
        assert_eq!(choose_surface_format(&formats), Some(first));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let supported = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&supported, vk::PresentModeKHR::IMMEDIATE), vk::PresentModeKHR::IMMEDIATE);
        assert_eq!(choose_present_mode(&supported, vk::PresentModeKHR::MAILBOX), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_is_clamped_when_undefined() {
        let c = caps((u32::MAX, u32::MAX), (100, 100), (1920, 1080));
        let e = choose_extent(&c, vk::Extent2D { width: 4000, height: 50 });
        assert_eq!(e, vk::Extent2D { width: 1920, height: 100 });
    }

    #[test]
    fn definite_current_extent_is_used() {
        let c = caps((800, 600), (1, 1), (4096, 4096));
        let e = choose_extent(&c, vk::Extent2D { width: 1280, height: 720 });
        assert_eq!(e, vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn image_count_respects_max() {
        let mut c = caps((800, 600), (1, 1), (4096, 4096));
        assert_eq!(choose_image_count(&c), 3);
        c.max_image_count = 2;
        assert_eq!(choose_image_count(&c), 2);
    }
}
