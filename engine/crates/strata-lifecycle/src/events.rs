use anyhow::Context as _;

use crate::level::{Level, LevelPhase};

/// 持久的监听者，每次对应的 (Level, Phase) 发生时都会被调用
pub type LevelListener<C> = Box<dyn FnMut(&mut C) -> anyhow::Result<()> + Send>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct ListenerEntry<C> {
    id: ListenerId,
    name: String,
    listener: LevelListener<C>,
}

/// 每个 Level 上的四个有序监听者列表
///
/// 调用顺序严格等于订阅顺序。
pub struct LevelEvents<C> {
    lists: [[Vec<ListenerEntry<C>>; LevelPhase::COUNT]; Level::COUNT],
    next_id: u64,
}

impl<C> Default for LevelEvents<C> {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl<C> LevelEvents<C> {
    pub fn new() -> Self {
        Self {
            lists: std::array::from_fn(|_| std::array::from_fn(|_| Vec::new())),
            next_id: 0,
        }
    }
}

// subscribe
impl<C> LevelEvents<C> {
    /// `level` 为 `Level::None` 时返回错误
    pub fn subscribe(
        &mut self,
        level: Level,
        phase: LevelPhase,
        name: impl Into<String>,
        listener: impl FnMut(&mut C) -> anyhow::Result<()> + Send + 'static,
    ) -> anyhow::Result<ListenerId> {
        let name = name.into();
        anyhow::ensure!(level.is_real(), "listener '{name}' can not subscribe to the sentinel level");

        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.lists[level.index()][phase.index()].push(ListenerEntry {
            id,
            name,
            listener: Box::new(listener),
        });
        Ok(id)
    }

    #[inline]
    pub fn before_create(
        &mut self,
        level: Level,
        name: impl Into<String>,
        listener: impl FnMut(&mut C) -> anyhow::Result<()> + Send + 'static,
    ) -> anyhow::Result<ListenerId> {
        self.subscribe(level, LevelPhase::BeforeCreate, name, listener)
    }

    #[inline]
    pub fn after_create(
        &mut self,
        level: Level,
        name: impl Into<String>,
        listener: impl FnMut(&mut C) -> anyhow::Result<()> + Send + 'static,
    ) -> anyhow::Result<ListenerId> {
        self.subscribe(level, LevelPhase::AfterCreate, name, listener)
    }

    #[inline]
    pub fn before_dispose(
        &mut self,
        level: Level,
        name: impl Into<String>,
        listener: impl FnMut(&mut C) -> anyhow::Result<()> + Send + 'static,
    ) -> anyhow::Result<ListenerId> {
        self.subscribe(level, LevelPhase::BeforeDispose, name, listener)
    }

    #[inline]
    pub fn after_dispose(
        &mut self,
        level: Level,
        name: impl Into<String>,
        listener: impl FnMut(&mut C) -> anyhow::Result<()> + Send + 'static,
    ) -> anyhow::Result<ListenerId> {
        self.subscribe(level, LevelPhase::AfterDispose, name, listener)
    }

    /// return: 是否找到并移除了该监听者
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        for phases in self.lists.iter_mut() {
            for list in phases.iter_mut() {
                if let Some(pos) = list.iter().position(|entry| entry.id == id) {
                    list.remove(pos);
                    return true;
                }
            }
        }
        false
    }
}

// getters
impl<C> LevelEvents<C> {
    #[inline]
    pub fn listener_count(&self, level: Level, phase: LevelPhase) -> usize {
        if !level.is_real() {
            return 0;
        }
        self.lists[level.index()][phase.index()].len()
    }

    pub fn listener_names(&self, level: Level, phase: LevelPhase) -> Vec<&str> {
        if !level.is_real() {
            return Vec::new();
        }
        self.lists[level.index()][phase.index()].iter().map(|entry| entry.name.as_str()).collect()
    }
}

// dispatch
impl<C> LevelEvents<C> {
    /// 按订阅顺序依次调用；遇到第一个错误立即返回
    pub(crate) fn fire(&mut self, level: Level, phase: LevelPhase, ctx: &mut C) -> anyhow::Result<()> {
        for entry in self.lists[level.index()][phase.index()].iter_mut() {
            (entry.listener)(ctx).with_context(|| format!("listener '{}' failed in {level}::{phase}", entry.name))?;
        }
        Ok(())
    }
}
