//! 两阶段的配置项
//!
//! 读取方只能看到 committed 值；写入方只能修改 pending 值。
//! `committed := pending` 只会发生在 [`LevelSequencer`](crate::sequencer::LevelSequencer) 的 commit 阶段，
//! 因此任意线程（例如开发者控制台）都可以随时修改 option，而 Level 的创建逻辑总是看到一致的配置快照。

use std::any::Any;
use std::collections::HashMap;
use std::fmt::{self, Debug, Display};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::level::Level;

#[derive(thiserror::Error, Debug)]
pub enum OptionError {
    #[error("option '{0}' is already registered")]
    Duplicate(String),

    #[error("option '{0}' is not registered")]
    Unknown(String),

    #[error("option '{name}' can not parse '{value}': {reason}")]
    Parse { name: String, value: String, reason: String },

    #[error("option '{name}' does not hold a value of type {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    #[error("option '{0}' is tagged with the sentinel level")]
    SentinelLevel(String),
}

/// 可以作为 option 值的类型
///
/// 需要能够从字符串解析，以便通过名字从控制台设置。
pub trait OptionValue: Clone + PartialEq + Debug + Send + Sync + 'static {
    fn parse_option(s: &str) -> Result<Self, String>;
}

impl<T> OptionValue for T
where
    T: Clone + PartialEq + Debug + FromStr + Send + Sync + 'static,
    T::Err: Display,
{
    fn parse_option(s: &str) -> Result<Self, String> {
        s.trim().parse::<T>().map_err(|e| e.to_string())
    }
}

/// 只有 sequencer 能够构造，用于限制 commit 的调用方
pub struct CommitToken(());

impl CommitToken {
    #[inline]
    pub(crate) fn new() -> Self {
        Self(())
    }
}

struct OptionSlot<T> {
    committed: T,
    pending: T,
}

pub struct OptionCell<T> {
    name: String,
    level: Level,
    requires_full_reset: bool,
    slot: Mutex<OptionSlot<T>>,
}

/// 类型擦除后的 option，存放在 [`OptionStore`] 中
pub trait AnyOption: Send + Sync {
    fn name(&self) -> &str;
    fn level(&self) -> Level;
    fn requires_full_reset(&self) -> bool;

    /// 该 option 改变时需要从哪个 Level 开始重建
    fn effective_level(&self) -> Level {
        if self.requires_full_reset() { Level::Context } else { self.level() }
    }

    fn is_changed(&self) -> bool;

    /// return: 是否确实发生了变化
    fn apply_change(&self, token: &CommitToken) -> bool;

    fn set_from_str(&self, value: &str) -> Result<(), OptionError>;

    fn committed_string(&self) -> String;
    fn pending_string(&self) -> String;

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: OptionValue> AnyOption for OptionCell<T> {
    #[inline]
    fn name(&self) -> &str {
        &self.name
    }
    #[inline]
    fn level(&self) -> Level {
        self.level
    }
    #[inline]
    fn requires_full_reset(&self) -> bool {
        self.requires_full_reset
    }

    fn is_changed(&self) -> bool {
        let slot = self.slot.lock();
        slot.committed != slot.pending
    }

    fn apply_change(&self, _token: &CommitToken) -> bool {
        let mut slot = self.slot.lock();
        if slot.committed == slot.pending {
            return false;
        }
        log::info!("option '{}' committed: {:?} -> {:?}", self.name, slot.committed, slot.pending);
        slot.committed = slot.pending.clone();
        true
    }

    fn set_from_str(&self, value: &str) -> Result<(), OptionError> {
        let parsed = T::parse_option(value).map_err(|reason| OptionError::Parse {
            name: self.name.clone(),
            value: value.to_string(),
            reason,
        })?;
        self.slot.lock().pending = parsed;
        Ok(())
    }

    fn committed_string(&self) -> String {
        format!("{:?}", self.slot.lock().committed)
    }

    fn pending_string(&self) -> String {
        format!("{:?}", self.slot.lock().pending)
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// 强类型的 option 句柄，可以 clone 并在线程间传递
pub struct GfxOption<T> {
    cell: Arc<OptionCell<T>>,
}

impl<T> Clone for GfxOption<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: OptionValue> Debug for GfxOption<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.cell.slot.lock();
        f.debug_struct("GfxOption")
            .field("name", &self.cell.name)
            .field("level", &self.cell.level)
            .field("committed", &slot.committed)
            .field("pending", &slot.pending)
            .finish()
    }
}

// getters
impl<T: OptionValue> GfxOption<T> {
    /// committed 值
    #[inline]
    pub fn value(&self) -> T {
        self.cell.slot.lock().committed.clone()
    }

    /// 在不 clone 的情况下读取 committed 值
    #[inline]
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.cell.slot.lock().committed)
    }

    #[inline]
    pub fn pending(&self) -> T {
        self.cell.slot.lock().pending.clone()
    }

    #[inline]
    pub fn is_changed(&self) -> bool {
        self.cell.is_changed()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.cell.name
    }

    #[inline]
    pub fn level(&self) -> Level {
        self.cell.level
    }

    #[inline]
    pub fn requires_full_reset(&self) -> bool {
        self.cell.requires_full_reset
    }
}

// update
impl<T: OptionValue> GfxOption<T> {
    /// 只写入 pending，在下一次 `apply_state_changes` 之前不可见
    #[inline]
    pub fn set(&self, value: T) {
        self.cell.slot.lock().pending = value;
    }

    /// 基于当前 pending 值修改
    #[inline]
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.cell.slot.lock().pending);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptionDescription {
    pub name: String,
    pub level: Level,
    pub requires_full_reset: bool,
    pub committed: String,
    pub pending: String,
}

/// 名字到 option 的映射，进程内只创建一次
#[derive(Default)]
pub struct OptionStore {
    options: RwLock<HashMap<String, Arc<dyn AnyOption>>>,
}

// new & register
impl OptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个 option，committed 与 pending 都初始化为 `default`
    pub fn register<T: OptionValue>(
        &self,
        name: &str,
        level: Level,
        default: T,
        requires_full_reset: bool,
    ) -> Result<GfxOption<T>, OptionError> {
        if !level.is_real() {
            return Err(OptionError::SentinelLevel(name.to_string()));
        }

        let mut options = self.options.write();
        if options.contains_key(name) {
            return Err(OptionError::Duplicate(name.to_string()));
        }

        let cell = Arc::new(OptionCell {
            name: name.to_string(),
            level,
            requires_full_reset,
            slot: Mutex::new(OptionSlot {
                committed: default.clone(),
                pending: default,
            }),
        });
        options.insert(name.to_string(), cell.clone());

        Ok(GfxOption { cell })
    }
}

// getters
impl OptionStore {
    /// 通过名字取回强类型的句柄
    pub fn get<T: OptionValue>(&self, name: &str) -> Result<GfxOption<T>, OptionError> {
        let option = self.options.read().get(name).cloned().ok_or_else(|| OptionError::Unknown(name.to_string()))?;
        let cell = option.into_any_arc().downcast::<OptionCell<T>>().map_err(|_| OptionError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
        })?;
        Ok(GfxOption { cell })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.options.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.options.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.read().is_empty()
    }

    /// 所有 pending 与 committed 不同的 option 中，最底层的那个 Level
    pub fn most_foundational_change(&self) -> Option<Level> {
        self.options
            .read()
            .values()
            .filter(|option| option.is_changed())
            .map(|option| option.effective_level())
            .min()
    }

    pub fn changed_names(&self) -> Vec<String> {
        let mut names =
            self.options.read().values().filter(|o| o.is_changed()).map(|o| o.name().to_string()).collect::<Vec<_>>();
        names.sort();
        names
    }

    /// 按 Level、名字排序的描述，用于控制台输出
    pub fn describe(&self) -> Vec<OptionDescription> {
        let mut descriptions = self
            .options
            .read()
            .values()
            .map(|option| OptionDescription {
                name: option.name().to_string(),
                level: option.level(),
                requires_full_reset: option.requires_full_reset(),
                committed: option.committed_string(),
                pending: option.pending_string(),
            })
            .collect::<Vec<_>>();
        descriptions.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.name.cmp(&b.name)));
        descriptions
    }
}

// update
impl OptionStore {
    /// 通过名字设置 pending 值，可以在任意线程调用
    pub fn set_by_name(&self, name: &str, value: &str) -> Result<(), OptionError> {
        let option = self.options.read().get(name).cloned().ok_or_else(|| OptionError::Unknown(name.to_string()))?;
        option.set_from_str(value)
    }

    /// 提交所有 option 的 pending 值
    ///
    /// return: 实际发生变化的 option 数量
    pub(crate) fn commit_all(&self) -> usize {
        let token = CommitToken::new();
        self.options.read().values().filter(|option| option.apply_change(&token)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_invisible_until_commit() {
        let store = OptionStore::new();
        let overlap = store.register("frame_overlap", Level::Frame, 2u32, false).unwrap();

        overlap.set(3);
        assert_eq!(overlap.value(), 2);
        assert_eq!(overlap.pending(), 3);
        assert!(overlap.is_changed());
        assert_eq!(store.most_foundational_change(), Some(Level::Frame));

        assert_eq!(store.commit_all(), 1);
        assert_eq!(overlap.value(), 3);
        assert!(!overlap.is_changed());
        assert_eq!(store.most_foundational_change(), None);
    }

    #[test]
    fn test_setting_same_value_is_not_a_change() {
        let store = OptionStore::new();
        let debug = store.register("debug_mode", Level::Instance, false, false).unwrap();
        debug.set(true);
        debug.set(false);
        assert!(!debug.is_changed());
        assert_eq!(store.commit_all(), 0);
    }

    #[test]
    fn test_most_foundational_change() {
        let store = OptionStore::new();
        let gpu = store.register("gpu", Level::Device, String::from("auto"), false).unwrap();
        let fps = store.register("max_fps", Level::Swapchain, 0u32, false).unwrap();
        let _debug = store.register("debug_mode", Level::Instance, false, false).unwrap();

        fps.set(60);
        assert_eq!(store.most_foundational_change(), Some(Level::Swapchain));
        gpu.set("nvidia".to_string());
        assert_eq!(store.most_foundational_change(), Some(Level::Device));
        assert_eq!(store.changed_names(), vec!["gpu".to_string(), "max_fps".to_string()]);
    }

    #[test]
    fn test_full_reset_maps_to_context() {
        let store = OptionStore::new();
        let name = store.register("app_name", Level::Swapchain, String::from("a"), true).unwrap();
        name.set("b".to_string());
        assert_eq!(store.most_foundational_change(), Some(Level::Context));
    }

    #[test]
    fn test_set_by_name() {
        let store = OptionStore::new();
        let fps = store.register("max_fps", Level::Swapchain, 0u32, false).unwrap();

        store.set_by_name("max_fps", " 144 ").unwrap();
        assert_eq!(fps.pending(), 144);
        assert_eq!(fps.value(), 0);

        let err = store.set_by_name("max_fps", "fast").unwrap_err();
        assert!(matches!(err, OptionError::Parse { .. }));
        assert!(err.to_string().contains("max_fps"));

        let err = store.set_by_name("missing", "1").unwrap_err();
        assert!(matches!(err, OptionError::Unknown(_)));
    }

    #[test]
    fn test_register_and_get() {
        let store = OptionStore::new();
        store.register("debug_mode", Level::Instance, false, false).unwrap();
        assert!(matches!(
            store.register("debug_mode", Level::Instance, true, false),
            Err(OptionError::Duplicate(_))
        ));

        let debug = store.get::<bool>("debug_mode").unwrap();
        assert_eq!(debug.level(), Level::Instance);
        assert!(matches!(store.get::<u32>("debug_mode"), Err(OptionError::TypeMismatch { .. })));
        assert_eq!(store.len(), 1);

        assert!(matches!(
            store.register("orphan", Level::None, 0u32, false),
            Err(OptionError::SentinelLevel(_))
        ));
        assert!(!store.contains("orphan"));
    }

    #[test]
    fn test_describe_sorted_by_level() {
        let store = OptionStore::new();
        store.register("max_fps", Level::Swapchain, 0u32, false).unwrap();
        store.register("debug_mode", Level::Instance, false, false).unwrap();
        let descriptions = store.describe();
        assert_eq!(descriptions[0].name, "debug_mode");
        assert_eq!(descriptions[1].committed, "0");
    }

    #[test]
    fn test_concurrent_writers() {
        let store = Arc::new(OptionStore::new());
        let fps = store.register("max_fps", Level::Swapchain, 0u32, false).unwrap();

        let handles = (0..4)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.set_by_name("max_fps", &format!("{}", 30 + i)).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(fps.value(), 0);
        assert!((30..34).contains(&fps.pending()));
    }
}
