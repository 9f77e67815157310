//! 生命周期钩子
//!
//! 让独立的资源持有者挂接到某个 Level 的创建与销毁上，而 sequencer 不需要持有它们的引用。
//!
//! - [`ReCreator`]：在 AfterCreate 时创建，在 BeforeDispose 时销毁，参与之后的每一次级联重建
//! - [`LevelLazy`]：第一次访问时创建，在所属 Level 的下一次 BeforeDispose 时自动销毁并置空
//! - [`ExecuteOnce`]：每个 Level 四个一次性队列，动作只会在下一次对应的阶段执行一次

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::events::{LevelEvents, ListenerId};
use crate::level::{Level, LevelPhase};
use crate::sequencer::{LevelOwner, LevelSequencer};

/// 只执行一次的动作
pub type OnceAction<C> = Box<dyn FnOnce(&mut C) -> anyhow::Result<()> + Send>;

type OnceQueues<C> = [[Vec<OnceAction<C>>; LevelPhase::COUNT]; Level::COUNT];

/// 一次性动作队列
///
/// 可以 clone 并在任意线程入队；动作在下一次匹配的阶段执行后被丢弃。
pub struct ExecuteOnce<C> {
    queues: Arc<Mutex<OnceQueues<C>>>,
}

impl<C> Clone for ExecuteOnce<C> {
    fn clone(&self) -> Self {
        Self {
            queues: self.queues.clone(),
        }
    }
}

impl<C> ExecuteOnce<C> {
    pub(crate) fn new() -> Self {
        Self {
            queues: Arc::new(Mutex::new(std::array::from_fn(|_| std::array::from_fn(|_| Vec::new())))),
        }
    }

    /// `level` 为 `Level::None` 时返回错误，动作不会入队
    pub fn enqueue(
        &self,
        level: Level,
        phase: LevelPhase,
        action: impl FnOnce(&mut C) -> anyhow::Result<()> + Send + 'static,
    ) -> anyhow::Result<()> {
        anyhow::ensure!(level.is_real(), "can not enqueue a one-shot action on the sentinel level");
        self.queues.lock()[level.index()][phase.index()].push(Box::new(action));
        Ok(())
    }

    #[inline]
    pub fn in_before_create(
        &self,
        level: Level,
        action: impl FnOnce(&mut C) -> anyhow::Result<()> + Send + 'static,
    ) -> anyhow::Result<()> {
        self.enqueue(level, LevelPhase::BeforeCreate, action)
    }

    #[inline]
    pub fn in_after_create(
        &self,
        level: Level,
        action: impl FnOnce(&mut C) -> anyhow::Result<()> + Send + 'static,
    ) -> anyhow::Result<()> {
        self.enqueue(level, LevelPhase::AfterCreate, action)
    }

    #[inline]
    pub fn in_before_dispose(
        &self,
        level: Level,
        action: impl FnOnce(&mut C) -> anyhow::Result<()> + Send + 'static,
    ) -> anyhow::Result<()> {
        self.enqueue(level, LevelPhase::BeforeDispose, action)
    }

    #[inline]
    pub fn in_after_dispose(
        &self,
        level: Level,
        action: impl FnOnce(&mut C) -> anyhow::Result<()> + Send + 'static,
    ) -> anyhow::Result<()> {
        self.enqueue(level, LevelPhase::AfterDispose, action)
    }

    pub fn pending(&self, level: Level, phase: LevelPhase) -> usize {
        if !level.is_real() {
            return 0;
        }
        self.queues.lock()[level.index()][phase.index()].len()
    }

    /// 取出队列中的全部动作；执行过程中新入队的动作属于下一次
    pub(crate) fn take(&self, level: Level, phase: LevelPhase) -> Vec<OnceAction<C>> {
        std::mem::take(&mut self.queues.lock()[level.index()][phase.index()])
    }
}

/// 将一对 create/dispose 动作绑定到某个 Level
///
/// create 订阅 AfterCreate，dispose 订阅 BeforeDispose。
#[derive(Debug)]
pub struct ReCreator {
    level: Level,
    create_id: ListenerId,
    dispose_id: ListenerId,
}

impl ReCreator {
    /// 只订阅，不立即执行
    pub fn subscribe<C>(
        events: &mut LevelEvents<C>,
        level: Level,
        name: &str,
        create: impl FnMut(&mut C) -> anyhow::Result<()> + Send + 'static,
        dispose: impl FnMut(&mut C) -> anyhow::Result<()> + Send + 'static,
    ) -> anyhow::Result<Self> {
        let create_id = events.after_create(level, format!("{name}::create"), create)?;
        let dispose_id = match events.before_dispose(level, format!("{name}::dispose"), dispose) {
            Ok(id) => id,
            Err(e) => {
                events.unsubscribe(create_id);
                return Err(e);
            }
        };
        Ok(Self {
            level,
            create_id,
            dispose_id,
        })
    }

    /// 订阅；如果 `level` 已经创建，则立即执行一次 create
    pub fn attach<C: LevelOwner>(
        seq: &mut LevelSequencer<C>,
        ctx: &mut C,
        level: Level,
        name: &str,
        mut create: impl FnMut(&mut C) -> anyhow::Result<()> + Send + 'static,
        dispose: impl FnMut(&mut C) -> anyhow::Result<()> + Send + 'static,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(level.is_real(), "hook '{name}' can not attach to the sentinel level");
        if seq.is_live(level) {
            create(ctx)?;
        }
        Self::subscribe(seq.events_mut(), level, name, create, dispose)
    }

    /// 取消订阅；已经创建的资源由调用方负责
    pub fn detach<C>(self, events: &mut LevelEvents<C>) {
        events.unsubscribe(self.create_id);
        events.unsubscribe(self.dispose_id);
    }

    #[inline]
    pub fn level(&self) -> Level {
        self.level
    }
}

/// 由所属 Level 独占的惰性资源
///
/// 第一次访问时构造；所属 Level 的 BeforeDispose 会销毁并置空。
/// 只能在所属 Level 的 BeforeCreate 与 BeforeDispose 之间构造。
pub struct LevelLazy<T> {
    level: Level,
    name: Arc<str>,
    slot: Arc<Mutex<Option<T>>>,
    /// 所属 Level 处于 BeforeCreate 与 BeforeDispose 之间
    open: Arc<AtomicBool>,
}

impl<T> Clone for LevelLazy<T> {
    fn clone(&self) -> Self {
        Self {
            level: self.level,
            name: self.name.clone(),
            slot: self.slot.clone(),
            open: self.open.clone(),
        }
    }
}

impl<T: Send + 'static> LevelLazy<T> {
    pub fn bind<C: LevelOwner>(
        seq: &mut LevelSequencer<C>,
        level: Level,
        name: &str,
        mut destroy: impl FnMut(&mut C, T) -> anyhow::Result<()> + Send + 'static,
    ) -> anyhow::Result<Self> {
        let slot = Arc::new(Mutex::new(None::<T>));
        let open = Arc::new(AtomicBool::new(seq.is_live(level)));

        let opening = open.clone();
        let open_id = seq.events_mut().before_create(level, format!("{name}::lazy-open"), move |_| {
            opening.store(true, Ordering::Release);
            Ok(())
        })?;

        let closing = open.clone();
        let teardown_slot = slot.clone();
        let teardown = seq.events_mut().before_dispose(level, format!("{name}::lazy-dispose"), move |ctx| {
            closing.store(false, Ordering::Release);
            // 先离开锁再销毁
            let value = teardown_slot.lock().take();
            match value {
                Some(value) => destroy(ctx, value),
                None => Ok(()),
            }
        });
        if let Err(e) = teardown {
            seq.events_mut().unsubscribe(open_id);
            return Err(e);
        }

        Ok(Self {
            level,
            name: Arc::from(name),
            slot,
            open,
        })
    }

    /// 第一次访问时调用 `init` 构造
    ///
    /// 所属 Level 没有创建时返回错误，不会调用 `init`。
    pub fn get_or_try_init(
        &self,
        init: impl FnOnce() -> anyhow::Result<T>,
    ) -> anyhow::Result<MappedMutexGuard<'_, T>> {
        let guard = self.slot.lock();
        if guard.is_none() {
            anyhow::ensure!(
                self.open.load(Ordering::Acquire),
                "'{}' can not be created while level {} is not alive",
                self.name,
                self.level
            );
        }
        match MutexGuard::try_map(guard, Option::as_mut) {
            Ok(value) => Ok(value),
            Err(guard) => {
                let value = init()?;
                Ok(MutexGuard::map(guard, |slot| slot.insert(value)))
            }
        }
    }

    /// 已经构造时返回值，否则为 None，不会触发构造
    pub fn get(&self) -> Option<MappedMutexGuard<'_, T>> {
        MutexGuard::try_map(self.slot.lock(), |slot| slot.as_mut()).ok()
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.slot.lock().is_some()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    #[inline]
    pub fn level(&self) -> Level {
        self.level
    }
}
