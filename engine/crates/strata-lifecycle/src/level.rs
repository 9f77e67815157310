use std::fmt;

/// GPU 资源的依赖层级
///
/// 顺序即依赖方向：低层级被所有高层级依赖。
/// `None` 是哨兵值，表示"最后一个层级之后"，永远不会被创建。
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// 平台上下文：vulkan loader、surface provider
    Context = 0,
    /// vk instance、debug messenger、surface
    Instance = 1,
    /// physical device、logical device、allocator
    Device = 2,
    /// frames in flight 的同步对象
    Frame = 3,
    /// swapchain、image views、render graph、render loop
    Swapchain = 4,
    /// 哨兵
    None = 5,
}

impl Level {
    /// 真实层级的数量（不包括 `None`）
    pub const COUNT: usize = 5;

    /// 所有真实层级，升序
    pub const ALL: [Level; Level::COUNT] =
        [Level::Context, Level::Instance, Level::Device, Level::Frame, Level::Swapchain];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn is_real(self) -> bool {
        self < Level::None
    }

    /// 从 `self` 开始升序直到最高的真实层级
    pub fn ascending_from(self) -> impl DoubleEndedIterator<Item = Level> {
        Level::ALL.into_iter().filter(move |level| *level >= self)
    }

    /// 从最高的真实层级开始降序直到 `self`（包含）
    pub fn descending_to(self) -> impl Iterator<Item = Level> {
        self.ascending_from().rev()
    }

    /// 严格低于 `self` 的所有真实层级，升序
    pub fn below(self) -> impl Iterator<Item = Level> {
        Level::ALL.into_iter().filter(move |level| *level < self)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Context => "Context",
            Level::Instance => "Instance",
            Level::Device => "Device",
            Level::Frame => "Frame",
            Level::Swapchain => "Swapchain",
            Level::None => "None",
        };
        f.write_str(name)
    }
}

/// 每个 Level 上的四个事件阶段
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LevelPhase {
    BeforeCreate = 0,
    AfterCreate = 1,
    BeforeDispose = 2,
    AfterDispose = 3,
}

impl LevelPhase {
    pub const COUNT: usize = 4;

    pub const ALL: [LevelPhase; LevelPhase::COUNT] =
        [LevelPhase::BeforeCreate, LevelPhase::AfterCreate, LevelPhase::BeforeDispose, LevelPhase::AfterDispose];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for LevelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_order() {
        assert!(Level::Context < Level::Instance);
        assert!(Level::Frame < Level::Swapchain);
        assert!(Level::Swapchain < Level::None);
        assert!(!Level::None.is_real());
        assert_eq!(Level::ALL.len(), Level::COUNT);
    }

    #[test]
    fn test_level_ranges() {
        let up = Level::Device.ascending_from().collect::<Vec<_>>();
        assert_eq!(up, vec![Level::Device, Level::Frame, Level::Swapchain]);

        let down = Level::Device.descending_to().collect::<Vec<_>>();
        assert_eq!(down, vec![Level::Swapchain, Level::Frame, Level::Device]);

        let below = Level::Device.below().collect::<Vec<_>>();
        assert_eq!(below, vec![Level::Context, Level::Instance]);

        assert_eq!(Level::None.ascending_from().count(), 0);
    }
}
