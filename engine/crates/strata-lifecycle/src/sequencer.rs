use std::sync::Arc;

use anyhow::Context as _;

use crate::events::LevelEvents;
use crate::hooks::ExecuteOnce;
use crate::level::{Level, LevelPhase};
use crate::option::OptionStore;

/// 拥有各个 Level 资源的上下文
///
/// sequencer 只负责调度顺序，具体的创建与销毁由上下文实现。
pub trait LevelOwner {
    fn create_level(&mut self, level: Level) -> anyhow::Result<()>;
    fn dispose_level(&mut self, level: Level) -> anyhow::Result<()>;
}

/// Level 状态机
///
/// 负责 create/dispose 的调度以及级联重建：
/// 从变化的最底层 Level 开始，先自顶向下销毁，再提交所有 option，最后自底向上创建。
pub struct LevelSequencer<C> {
    options: Arc<OptionStore>,
    events: LevelEvents<C>,
    once: ExecuteOnce<C>,

    /// 每个 Level 当前是否已经创建
    live: [bool; Level::COUNT],

    /// 外部请求的强制重建边界，例如 swapchain out of date
    forced: Option<Level>,
}

// new & init
impl<C: LevelOwner> LevelSequencer<C> {
    pub fn new(options: Arc<OptionStore>) -> Self {
        Self {
            options,
            events: LevelEvents::new(),
            once: ExecuteOnce::new(),
            live: [false; Level::COUNT],
            forced: None,
        }
    }

    /// 提交初始配置，并自底向上创建所有 Level
    pub fn init(&mut self, ctx: &mut C) -> anyhow::Result<()> {
        anyhow::ensure!(!self.live.iter().any(|live| *live), "levels are already initialized");

        self.options.commit_all();
        for level in Level::ALL {
            self.create(level, ctx)?;
        }
        log::info!("all levels created");
        Ok(())
    }

    /// 自顶向下销毁所有已创建的 Level
    pub fn dispose(&mut self, ctx: &mut C) -> anyhow::Result<()> {
        for level in Level::Context.descending_to() {
            self.dispose_one(level, ctx)?;
        }
        self.forced = None;
        log::info!("all levels disposed");
        Ok(())
    }
}

// getters
impl<C: LevelOwner> LevelSequencer<C> {
    #[inline]
    pub fn options(&self) -> &Arc<OptionStore> {
        &self.options
    }

    #[inline]
    pub fn events(&self) -> &LevelEvents<C> {
        &self.events
    }

    #[inline]
    pub fn events_mut(&mut self) -> &mut LevelEvents<C> {
        &mut self.events
    }

    /// 一次性动作队列的句柄，可以 clone 到其他线程
    #[inline]
    pub fn once(&self) -> ExecuteOnce<C> {
        self.once.clone()
    }

    #[inline]
    pub fn is_live(&self, level: Level) -> bool {
        level.is_real() && self.live[level.index()]
    }

    /// 下一次 `apply_state_changes` 会使用的重建边界
    pub fn pending_boundary(&self) -> Option<Level> {
        match (self.options.most_foundational_change(), self.forced) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

// update
impl<C: LevelOwner> LevelSequencer<C> {
    /// 请求在下一次 `apply_state_changes` 时至少从 `level` 开始重建
    pub fn schedule_recreate(&mut self, level: Level) {
        if !level.is_real() {
            return;
        }
        self.forced = Some(self.forced.map_or(level, |forced| forced.min(level)));
        log::debug!("recreation from {level} scheduled");
    }

    /// 检查所有 option，从变化的最底层 Level 开始级联重建
    ///
    /// return: 实际使用的重建边界；没有任何变化时为 None，且不会触发任何回调
    pub fn apply_state_changes(&mut self, ctx: &mut C) -> anyhow::Result<Option<Level>> {
        let Some(boundary) = self.pending_boundary() else {
            return Ok(None);
        };
        self.recreate_levels(boundary, ctx)?;
        Ok(Some(boundary))
    }

    /// 级联重建
    ///
    /// 1. 自顶向下销毁直到 `boundary`（包含）
    /// 2. 提交所有 option（全局提交，与 option 自身的 Level 无关）
    /// 3. 自底向上从 `boundary` 重新创建
    pub fn recreate_levels(&mut self, boundary: Level, ctx: &mut C) -> anyhow::Result<()> {
        if !boundary.is_real() {
            return Ok(());
        }
        if let Some(missing) = boundary.below().find(|level| !self.is_live(*level)) {
            anyhow::bail!("can not recreate from {boundary}: level {missing} is not alive");
        }

        log::info!("recreating levels from {boundary}");

        for level in boundary.descending_to() {
            self.dispose_one(level, ctx)?;
        }

        let committed = self.options.commit_all();
        log::debug!("{committed} option(s) committed");

        if self.forced.is_some_and(|forced| forced >= boundary) {
            self.forced = None;
        }

        for level in boundary.ascending_from() {
            self.create(level, ctx)?;
        }
        Ok(())
    }
}

// dispatch
impl<C: LevelOwner> LevelSequencer<C> {
    fn create(&mut self, level: Level, ctx: &mut C) -> anyhow::Result<()> {
        log::debug!("creating level {level}");

        self.fire(level, LevelPhase::BeforeCreate, ctx)?;
        ctx.create_level(level).with_context(|| format!("failed to create level {level}"))?;
        self.live[level.index()] = true;
        self.fire(level, LevelPhase::AfterCreate, ctx)
    }

    fn dispose_one(&mut self, level: Level, ctx: &mut C) -> anyhow::Result<()> {
        if !self.live[level.index()] {
            return Ok(());
        }
        log::debug!("disposing level {level}");

        self.fire(level, LevelPhase::BeforeDispose, ctx)?;
        ctx.dispose_level(level).with_context(|| format!("failed to dispose level {level}"))?;
        self.live[level.index()] = false;
        self.fire(level, LevelPhase::AfterDispose, ctx)
    }

    /// 先调用持久监听者，再执行一次性队列
    fn fire(&mut self, level: Level, phase: LevelPhase, ctx: &mut C) -> anyhow::Result<()> {
        self.events.fire(level, phase, ctx)?;
        for action in self.once.take(level, phase) {
            action(ctx).with_context(|| format!("one-shot action failed in {level}::{phase}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option::GfxOption;

    #[derive(Default)]
    struct CounterCtx {
        log: Vec<String>,
        creates: [u32; Level::COUNT],
        disposes: [u32; Level::COUNT],
        fail_create: Option<Level>,
    }

    impl LevelOwner for CounterCtx {
        fn create_level(&mut self, level: Level) -> anyhow::Result<()> {
            if self.fail_create == Some(level) {
                anyhow::bail!("no suitable gpu");
            }
            self.creates[level.index()] += 1;
            self.log.push(format!("create {level}"));
            Ok(())
        }

        fn dispose_level(&mut self, level: Level) -> anyhow::Result<()> {
            self.disposes[level.index()] += 1;
            self.log.push(format!("dispose {level}"));
            Ok(())
        }
    }

    struct Fixture {
        seq: LevelSequencer<CounterCtx>,
        ctx: CounterCtx,
        debug_mode: GfxOption<bool>,
        gpu: GfxOption<String>,
        frame_overlap: GfxOption<u32>,
        window_size: GfxOption<String>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(OptionStore::new());
        let debug_mode = store.register("debug_mode", Level::Instance, false, false).unwrap();
        let gpu = store.register("gpu", Level::Device, "auto".to_string(), false).unwrap();
        let frame_overlap = store.register("frame_overlap", Level::Frame, 3u32, false).unwrap();
        let window_size = store.register("window_size", Level::Swapchain, "1280x720".to_string(), false).unwrap();

        let mut seq = LevelSequencer::new(store);
        for level in Level::ALL {
            for phase in LevelPhase::ALL {
                seq.events_mut().subscribe(level, phase, "log", move |ctx: &mut CounterCtx| {
                    ctx.log.push(format!("{phase} {level}"));
                    Ok(())
                })
                .unwrap();
            }
        }

        Fixture {
            seq,
            ctx: CounterCtx::default(),
            debug_mode,
            gpu,
            frame_overlap,
            window_size,
        }
    }

    fn position(log: &[String], entry: &str) -> usize {
        log.iter().position(|e| e == entry).unwrap_or_else(|| panic!("'{entry}' not found in {log:?}"))
    }

    #[test]
    fn test_init_creates_each_level_once_ascending() {
        let mut f = fixture();
        assert!(!f.debug_mode.value());
        assert_eq!(f.frame_overlap.value(), 3);

        f.seq.init(&mut f.ctx).unwrap();

        assert_eq!(f.ctx.creates, [1; Level::COUNT]);
        assert_eq!(f.ctx.disposes, [0; Level::COUNT]);
        let creates = f.ctx.log.iter().filter(|e| e.starts_with("create")).cloned().collect::<Vec<_>>();
        assert_eq!(
            creates,
            vec!["create Context", "create Instance", "create Device", "create Frame", "create Swapchain"]
        );
        for level in Level::ALL {
            assert!(f.seq.is_live(level));
            let before = position(&f.ctx.log, &format!("BeforeCreate {level}"));
            let create = position(&f.ctx.log, &format!("create {level}"));
            let after = position(&f.ctx.log, &format!("AfterCreate {level}"));
            assert!(before < create && create < after);
        }
    }

    #[test]
    fn test_init_twice_fails() {
        let mut f = fixture();
        f.seq.init(&mut f.ctx).unwrap();
        assert!(f.seq.init(&mut f.ctx).is_err());
    }

    #[test]
    fn test_recreate_orders_dispose_and_create() {
        for (ia, a) in Level::ALL.into_iter().enumerate() {
            for b in Level::ALL.into_iter().skip(ia + 1) {
                let mut f = fixture();
                f.seq.init(&mut f.ctx).unwrap();
                f.ctx.log.clear();

                f.seq.recreate_levels(a, &mut f.ctx).unwrap();

                let log = &f.ctx.log;
                assert!(position(log, &format!("dispose {b}")) < position(log, &format!("dispose {a}")));
                assert!(position(log, &format!("create {a}")) < position(log, &format!("create {b}")));
                // L 的 dispose 事件全部先于 L-1 的 dispose
                assert!(position(log, &format!("AfterDispose {b}")) < position(log, &format!("dispose {a}")));
                // L 的 AfterCreate 先于 L+1 的创建
                assert!(position(log, &format!("AfterCreate {a}")) < position(log, &format!("BeforeCreate {b}")));
            }
        }
    }

    #[test]
    fn test_recreate_sentinel_is_noop() {
        let mut f = fixture();
        f.seq.init(&mut f.ctx).unwrap();
        f.ctx.log.clear();
        f.seq.recreate_levels(Level::None, &mut f.ctx).unwrap();
        assert!(f.ctx.log.is_empty());
    }

    #[test]
    fn test_apply_without_changes_is_idempotent() {
        let mut f = fixture();
        f.seq.init(&mut f.ctx).unwrap();
        f.ctx.log.clear();

        assert_eq!(f.seq.apply_state_changes(&mut f.ctx).unwrap(), None);
        assert!(f.ctx.log.is_empty());

        // 写入与 committed 相同的值也不算变化
        f.frame_overlap.set(3);
        assert_eq!(f.seq.apply_state_changes(&mut f.ctx).unwrap(), None);
        assert!(f.ctx.log.is_empty());
    }

    #[test]
    fn test_device_and_swapchain_change_uses_device_boundary() {
        let mut f = fixture();
        f.seq.init(&mut f.ctx).unwrap();
        f.ctx.log.clear();

        f.gpu.set("1".to_string());
        f.window_size.set("800x600".to_string());
        assert_eq!(f.seq.pending_boundary(), Some(Level::Device));

        let boundary = f.seq.apply_state_changes(&mut f.ctx).unwrap();
        assert_eq!(boundary, Some(Level::Device));

        assert_eq!(f.ctx.creates, [1, 1, 2, 2, 2]);
        assert_eq!(f.ctx.disposes, [0, 0, 1, 1, 1]);
        assert!(!f.ctx.log.iter().any(|e| e.ends_with("Context") || e.ends_with("Instance")));
        assert_eq!(f.gpu.value(), "1");
        assert_eq!(f.window_size.value(), "800x600");
    }

    #[test]
    fn test_window_size_change_only_recreates_swapchain() {
        let mut f = fixture();
        f.seq.init(&mut f.ctx).unwrap();

        f.window_size.set("1920x1080".to_string());
        f.seq.apply_state_changes(&mut f.ctx).unwrap();

        assert_eq!(f.ctx.creates, [1, 1, 1, 1, 2]);
        assert_eq!(f.ctx.disposes, [0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_pending_value_hidden_until_recreation() {
        let mut f = fixture();
        f.seq.init(&mut f.ctx).unwrap();

        f.debug_mode.set(true);
        assert!(!f.debug_mode.value());

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_in_create = seen.clone();
        let debug_mode = f.debug_mode.clone();
        f.seq.events_mut().before_create(Level::Instance, "observe", move |_| {
            seen_in_create.lock().push(debug_mode.value());
            Ok(())
        })
        .unwrap();

        f.seq.apply_state_changes(&mut f.ctx).unwrap();
        assert!(f.debug_mode.value());
        // create 阶段看到的是已经提交的新值
        assert_eq!(*seen.lock(), vec![true]);
    }

    #[test]
    fn test_commit_happens_between_dispose_and_create() {
        let mut f = fixture();
        f.seq.init(&mut f.ctx).unwrap();

        let observed = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (o1, o2) = (observed.clone(), observed.clone());
        let (w1, w2) = (f.window_size.clone(), f.window_size.clone());
        f.seq.events_mut().before_dispose(Level::Swapchain, "old", move |_| {
            o1.lock().push(w1.value());
            Ok(())
        })
        .unwrap();
        f.seq.events_mut().after_create(Level::Swapchain, "new", move |_| {
            o2.lock().push(w2.value());
            Ok(())
        })
        .unwrap();

        f.window_size.set("640x480".to_string());
        f.seq.apply_state_changes(&mut f.ctx).unwrap();
        assert_eq!(*observed.lock(), vec!["1280x720".to_string(), "640x480".to_string()]);
    }

    #[test]
    fn test_create_failure_propagates() {
        let mut f = fixture();
        f.ctx.fail_create = Some(Level::Device);

        let err = f.seq.init(&mut f.ctx).unwrap_err();
        assert!(format!("{err:#}").contains("no suitable gpu"));
        assert!(f.seq.is_live(Level::Instance));
        assert!(!f.seq.is_live(Level::Device));
        assert!(!f.seq.is_live(Level::Swapchain));
        assert_eq!(f.ctx.creates[Level::Frame.index()], 0);
    }

    #[test]
    fn test_dispose_descending() {
        let mut f = fixture();
        f.seq.init(&mut f.ctx).unwrap();
        f.ctx.log.clear();
        f.seq.dispose(&mut f.ctx).unwrap();

        let disposes = f.ctx.log.iter().filter(|e| e.starts_with("dispose")).cloned().collect::<Vec<_>>();
        assert_eq!(
            disposes,
            vec!["dispose Swapchain", "dispose Frame", "dispose Device", "dispose Instance", "dispose Context"]
        );
        assert!(Level::ALL.iter().all(|level| !f.seq.is_live(*level)));

        // 再次 dispose 不会触发任何回调
        f.ctx.log.clear();
        f.seq.dispose(&mut f.ctx).unwrap();
        assert!(f.ctx.log.is_empty());
    }

    #[test]
    fn test_scheduled_recreate() {
        let mut f = fixture();
        f.seq.init(&mut f.ctx).unwrap();

        f.seq.schedule_recreate(Level::Swapchain);
        assert_eq!(f.seq.pending_boundary(), Some(Level::Swapchain));
        f.frame_overlap.set(2);
        assert_eq!(f.seq.pending_boundary(), Some(Level::Frame));

        assert_eq!(f.seq.apply_state_changes(&mut f.ctx).unwrap(), Some(Level::Frame));
        assert_eq!(f.seq.pending_boundary(), None);
        assert_eq!(f.ctx.creates, [1, 1, 1, 2, 2]);
    }

    #[test]
    fn test_recreate_before_init_fails() {
        let mut f = fixture();
        assert!(f.seq.recreate_levels(Level::Frame, &mut f.ctx).is_err());
        assert!(f.ctx.log.is_empty());
    }
}
