//! 渲染线程
//!
//! 渲染线程按照 `max_fps` 控制节奏：累计经过的时间（lag），不足目标间隔时等待差值，
//! 足够时清零（不追帧）并绘制一帧。每一帧先等待当前 ring slot 的 fence，这是唯一的 in-flight 上限。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use ash::vk;
use parking_lot::{Condvar, Mutex};
use strata_gfx::GfxBackend;
use strata_gfx::backend::{AcquireOutcome, FrameSubmit, PresentOutcome};
use strata_render_graph::RenderGraph;

use crate::frame_counter::FrameCounter;
use crate::frame_resources::FrameResources;

pub const RENDER_THREAD_NAME: &str = "RenderThread";

/// fence 等待与 acquire 的超时，超过即视为致命错误
pub const DEFAULT_GPU_TIMEOUT: Duration = Duration::from_secs(10);

/// 传给帧开始、帧结束回调的信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame_id: u64,
    pub slot: usize,
    pub image_index: u32,
}

pub type FrameCallback = Box<dyn FnMut(&FrameInfo) + Send>;

/// 由控制线程设置、渲染线程调用的回调
#[derive(Default)]
pub struct FrameCallbacks {
    on_start: Mutex<Option<FrameCallback>>,
    on_end: Mutex<Option<FrameCallback>>,
}

impl FrameCallbacks {
    pub fn set_on_start(&self, callback: Option<FrameCallback>) {
        *self.on_start.lock() = callback;
    }

    pub fn set_on_end(&self, callback: Option<FrameCallback>) {
        *self.on_end.lock() = callback;
    }

    fn frame_start(&self, info: &FrameInfo) {
        if let Some(callback) = self.on_start.lock().as_mut() {
            callback(info);
        }
    }

    fn frame_end(&self, info: &FrameInfo) {
        if let Some(callback) = self.on_end.lock().as_mut() {
            callback(info);
        }
    }
}

/// 渲染统计，跨越渲染线程的多次启动累计
#[derive(Debug, Default)]
pub struct FrameStats {
    /// 下一帧的序号
    frame_id: AtomicU64,
    drawn: AtomicU64,
    /// 因为 out of date 被丢弃的帧
    dropped: AtomicU64,
    suboptimal: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStatsSnapshot {
    pub frame_id: u64,
    pub drawn: u64,
    pub dropped: u64,
    pub suboptimal: u64,
}

impl FrameStats {
    pub fn snapshot(&self) -> FrameStatsSnapshot {
        FrameStatsSnapshot {
            frame_id: self.frame_id.load(Ordering::Acquire),
            drawn: self.drawn.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Acquire),
            suboptimal: self.suboptimal.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id.load(Ordering::Acquire)
    }
}

/// 协作式的停止信号，等待中的渲染线程会被立即唤醒
#[derive(Default)]
pub struct LoopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl LoopSignal {
    pub fn stop(&self) {
        *self.stopped.lock() = true;
        self.cond.notify_all();
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// return: 是否在等待期间（或之前）收到了停止请求
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.cond.wait_for(&mut stopped, timeout);
        }
        *stopped
    }

    /// 阻塞直到收到停止请求
    pub fn wait(&self) {
        let mut stopped = self.stopped.lock();
        while !*stopped {
            self.cond.wait(&mut stopped);
        }
    }
}

/// 基于 lag 累计的帧节奏控制
pub struct FramePacer {
    /// None 表示不限制帧率
    target: Option<Duration>,
    lag: Duration,
    last: Instant,
}

impl FramePacer {
    pub fn new(max_fps: u32) -> Self {
        Self {
            target: (max_fps > 0).then(|| Duration::from_secs(1) / max_fps),
            lag: Duration::ZERO,
            last: Instant::now(),
        }
    }

    #[inline]
    pub fn target(&self) -> Option<Duration> {
        self.target
    }

    /// 累计 `elapsed`
    ///
    /// return: 还需要等待的时间；None 表示可以绘制，此时 lag 被清零
    pub fn advance(&mut self, elapsed: Duration) -> Option<Duration> {
        let Some(target) = self.target else {
            return None;
        };
        self.lag += elapsed;
        if self.lag < target {
            Some(target - self.lag)
        } else {
            self.lag = Duration::ZERO;
            None
        }
    }

    /// 阻塞直到可以绘制下一帧
    ///
    /// return: false 表示收到了停止请求
    pub fn wait_turn(&mut self, signal: &LoopSignal) -> bool {
        loop {
            if signal.is_stopped() {
                return false;
            }
            let now = Instant::now();
            let elapsed = now - self.last;
            self.last = now;
            match self.advance(elapsed) {
                None => return true,
                Some(shortfall) => {
                    if signal.wait_for(shortfall) {
                        return false;
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    Presented { image_index: u32 },
    /// acquire 返回 out of date，没有提交也没有 present
    Dropped,
}

/// 在渲染线程上绘制一帧所需的全部状态
pub struct FrameDriver<B: GfxBackend> {
    backend: Arc<B>,
    frames: Arc<FrameResources>,
    swapchain: vk::SwapchainKHR,
    graph: Arc<Mutex<RenderGraph>>,
    counter: FrameCounter,
    callbacks: Arc<FrameCallbacks>,
    stats: Arc<FrameStats>,
    /// 发现 out of date 时置位，由控制线程取走并安排 Swapchain 重建
    recreate: Arc<AtomicBool>,
    /// 当前 swapchain 已经 out of date，之后的 acquire 不会再成功
    stale: bool,
    gpu_timeout: Duration,
}

// new & init
impl<B: GfxBackend> FrameDriver<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Arc<B>,
        frames: Arc<FrameResources>,
        swapchain: vk::SwapchainKHR,
        graph: Arc<Mutex<RenderGraph>>,
        callbacks: Arc<FrameCallbacks>,
        stats: Arc<FrameStats>,
        recreate: Arc<AtomicBool>,
    ) -> Self {
        let counter = FrameCounter::new(stats.frame_id(), frames.len());
        Self {
            backend,
            frames,
            swapchain,
            graph,
            counter,
            callbacks,
            stats,
            recreate,
            stale: false,
            gpu_timeout: DEFAULT_GPU_TIMEOUT,
        }
    }

    pub fn with_gpu_timeout(mut self, timeout: Duration) -> Self {
        self.gpu_timeout = timeout;
        self
    }
}

// getters
impl<B: GfxBackend> FrameDriver<B> {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.counter.frame_id()
    }

    #[inline]
    pub fn is_swapchain_stale(&self) -> bool {
        self.stale
    }
}

// draw
impl<B: GfxBackend> FrameDriver<B> {
    pub fn draw_frame(&mut self) -> anyhow::Result<DrawOutcome> {
        let slot_index = self.counter.slot();
        let slot = *self
            .frames
            .slot(slot_index)
            .with_context(|| format!("frame slot {slot_index} does not exist"))?;
        let timeout_ns = self.gpu_timeout.as_nanos() as u64;

        // 1. back-pressure：等待该 slot 上一次的提交完成
        self.backend
            .wait_fence(slot.fence, timeout_ns)
            .with_context(|| format!("{} waiting for frame fence", self.counter.frame_name()))?;

        // 2. acquire
        let (image_index, acquire_suboptimal) =
            match self.backend.acquire_next_image(self.swapchain, slot.image_available, timeout_ns)? {
                AcquireOutcome::Acquired { index, suboptimal } => (index, suboptimal),
                AcquireOutcome::OutOfDate => {
                    log::warn!("{} swapchain is out of date on acquire, frame dropped", self.counter.frame_name());
                    self.stale = true;
                    self.recreate.store(true, Ordering::Release);
                    self.stats.dropped.fetch_add(1, Ordering::Release);
                    return Ok(DrawOutcome::Dropped);
                }
            };
        if acquire_suboptimal {
            log::debug!("{} swapchain is suboptimal on acquire", self.counter.frame_name());
        }
        // 丢弃的帧不重置 fence
        self.backend.reset_fence(slot.fence)?;

        let info = FrameInfo {
            frame_id: self.counter.frame_id(),
            slot: slot_index,
            image_index,
        };

        // 3. 帧开始
        self.callbacks.frame_start(&info);
        self.frames.queues().run_frame_start(slot_index);

        // 4. 录制并提交
        self.backend.begin_command_buffer(slot.cmd)?;
        self.graph.lock().record(self.backend.as_ref(), slot.cmd, image_index)?;
        self.backend.end_command_buffer(slot.cmd)?;
        self.backend.submit(&FrameSubmit {
            cmd: slot.cmd,
            wait_semaphore: slot.image_available,
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal_semaphore: slot.render_complete,
            fence: slot.fence,
        })?;

        // 5. present
        let present_suboptimal = match self.backend.present(self.swapchain, image_index, slot.render_complete)? {
            PresentOutcome::Presented { suboptimal } => suboptimal,
            PresentOutcome::OutOfDate => {
                log::warn!("{} swapchain is out of date on present", self.counter.frame_name());
                self.stale = true;
                self.recreate.store(true, Ordering::Release);
                false
            }
        };
        if acquire_suboptimal || present_suboptimal {
            self.stats.suboptimal.fetch_add(1, Ordering::Relaxed);
        }

        // 6. 帧结束
        self.callbacks.frame_end(&info);
        self.frames.queues().run_frame_end(slot_index);

        // 7. 推进帧序号
        self.counter.next_frame();
        self.stats.frame_id.store(self.counter.frame_id(), Ordering::Release);
        self.stats.drawn.fetch_add(1, Ordering::Relaxed);
        if let Some(client) = tracy_client::Client::running() {
            client.frame_mark();
        }

        Ok(DrawOutcome::Presented { image_index })
    }

    /// 渲染线程退出时清空所有 slot 的延迟队列
    pub fn drain_all(&self) -> usize {
        self.frames.queues().run_all()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    NotStarted,
    Running,
    Stopped,
}

/// 渲染线程的句柄
pub struct RenderLoop {
    state: LoopState,
    signal: Arc<LoopSignal>,
    handle: Option<JoinHandle<anyhow::Result<()>>>,
}

impl Default for RenderLoop {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl RenderLoop {
    pub fn new() -> Self {
        Self {
            state: LoopState::NotStarted,
            signal: Arc::new(LoopSignal::default()),
            handle: None,
        }
    }
}

// getters
impl RenderLoop {
    #[inline]
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// 渲染线程已经自行退出（只会因为错误）
    pub fn has_exited(&self) -> bool {
        self.handle.as_ref().is_some_and(JoinHandle::is_finished)
    }
}

// update
impl RenderLoop {
    pub fn start<B: GfxBackend>(&mut self, mut driver: FrameDriver<B>, max_fps: u32) -> anyhow::Result<()> {
        anyhow::ensure!(self.state != LoopState::Running, "render loop is already running");

        let signal = Arc::new(LoopSignal::default());
        self.signal = signal.clone();
        let handle = std::thread::Builder::new()
            .name(RENDER_THREAD_NAME.to_string())
            .spawn(move || {
                if let Some(client) = tracy_client::Client::running() {
                    client.set_thread_name(RENDER_THREAD_NAME);
                }
                let mut pacer = FramePacer::new(max_fps);
                log::info!("render loop started at frame {} (max fps: {})", driver.frame_id(), max_fps);

                let result = loop {
                    if !pacer.wait_turn(&signal) {
                        break Ok(());
                    }
                    if let Err(e) = driver.draw_frame() {
                        log::error!("render loop failed: {e:#}");
                        break Err(e);
                    }
                    // swapchain 重建会先停止本线程，在此之前不再 acquire
                    if driver.is_swapchain_stale() {
                        log::info!("render loop parked at frame {} until the swapchain is recreated", driver.frame_id());
                        signal.wait();
                        break Ok(());
                    }
                };

                let drained = driver.drain_all();
                log::info!("render loop stopped at frame {}, {} deferred action(s) drained", driver.frame_id(), drained);
                result
            })
            .context("failed to spawn the render thread")?;

        self.handle = Some(handle);
        self.state = LoopState::Running;
        Ok(())
    }

    /// 请求停止并等待渲染线程退出；正在绘制的帧总会完成
    ///
    /// return: 渲染线程的错误
    pub fn stop(&mut self) -> anyhow::Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.signal.stop();
        self.state = LoopState::Stopped;
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("render thread panicked")),
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("render loop ended with error: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use strata_gfx::mock::{MockBackend, MockOp};
    use strata_render_graph::CompileTarget;

    use super::*;
    use crate::swapchain_manager::SwapchainManager;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 320,
        height: 240,
    };

    struct Fixture {
        backend: Arc<MockBackend>,
        frames: Arc<FrameResources>,
        swapchain: SwapchainManager,
        graph: Arc<Mutex<RenderGraph>>,
        callbacks: Arc<FrameCallbacks>,
        stats: Arc<FrameStats>,
        recreate: Arc<AtomicBool>,
    }

    impl Fixture {
        fn new(overlap: usize) -> Self {
            let backend = Arc::new(MockBackend::new());
            let frames = Arc::new(FrameResources::new(backend.as_ref(), overlap).unwrap());
            let mut swapchain = SwapchainManager::new();
            let mut graph = RenderGraph::new("ui");
            {
                let state = swapchain.create(backend.as_ref(), EXTENT, vk::PresentModeKHR::FIFO).unwrap().unwrap();
                graph
                    .compile(
                        backend.as_ref(),
                        &CompileTarget {
                            format: state.format.format,
                            extent: state.extent,
                            views: &state.views,
                        },
                    )
                    .unwrap();
            }
            Self {
                backend,
                frames,
                swapchain,
                graph: Arc::new(Mutex::new(graph)),
                callbacks: Arc::new(FrameCallbacks::default()),
                stats: Arc::new(FrameStats::default()),
                recreate: Arc::new(AtomicBool::new(false)),
            }
        }

        fn driver(&self) -> FrameDriver<MockBackend> {
            FrameDriver::new(
                self.backend.clone(),
                self.frames.clone(),
                self.swapchain.current().unwrap().handle,
                self.graph.clone(),
                self.callbacks.clone(),
                self.stats.clone(),
                self.recreate.clone(),
            )
            .with_gpu_timeout(Duration::from_secs(5))
        }

        fn fence(&self, slot: usize) -> vk::Fence {
            self.frames.slot(slot).unwrap().fence
        }
    }

    #[test]
    fn pacer_accumulates_lag_without_catch_up() {
        let mut pacer = FramePacer::new(100);
        assert_eq!(pacer.target(), Some(Duration::from_millis(10)));
        assert_eq!(pacer.advance(Duration::from_millis(4)), Some(Duration::from_millis(6)));
        assert_eq!(pacer.advance(Duration::from_millis(4)), Some(Duration::from_millis(2)));
        assert_eq!(pacer.advance(Duration::from_millis(30)), None);
        // 多出来的时间不会带到下一帧
        assert_eq!(pacer.advance(Duration::from_millis(1)), Some(Duration::from_millis(9)));
    }

    #[test]
    fn unlimited_pacer_never_waits() {
        let mut pacer = FramePacer::new(0);
        assert_eq!(pacer.target(), None);
        assert_eq!(pacer.advance(Duration::ZERO), None);
    }

    #[test]
    fn stop_signal_wakes_waiting_pacer() {
        let signal = Arc::new(LoopSignal::default());
        let waiter = {
            let signal = signal.clone();
            std::thread::spawn(move || FramePacer::new(1).wait_turn(&signal))
        };
        std::thread::sleep(Duration::from_millis(20));
        signal.stop();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn draw_frame_follows_the_frame_protocol() {
        let fixture = Fixture::new(2);
        let mut driver = fixture.driver();
        fixture.backend.clear_ops();

        let outcome = driver.draw_frame().unwrap();
        assert_eq!(outcome, DrawOutcome::Presented { image_index: 0 });

        let slot = *fixture.frames.slot(0).unwrap();
        let ops = fixture.backend.ops();
        let pos = |pred: &dyn Fn(&MockOp) -> bool| ops.iter().position(pred).unwrap();
        let wait = pos(&|op| *op == MockOp::WaitFence(slot.fence));
        let acquire = pos(&|op| matches!(op, MockOp::Acquire(_)));
        let reset = pos(&|op| *op == MockOp::ResetFence(slot.fence));
        let submit = pos(&|op| matches!(op, MockOp::Submit(_)));
        let present = pos(&|op| matches!(op, MockOp::Present { .. }));
        assert!(wait < acquire && acquire < reset && reset < submit && submit < present);

        assert_eq!(
            fixture.backend.submitted_fences(),
            vec![slot.fence],
            "the slot fence is signaled by the submission"
        );
        assert_eq!(driver.frame_id(), 1);
        assert_eq!(fixture.stats.snapshot().drawn, 1);
    }

    #[test]
    fn out_of_date_acquire_drops_the_frame() {
        let fixture = Fixture::new(2);
        let mut driver = fixture.driver();
        fixture.backend.script_acquire([AcquireOutcome::OutOfDate]);
        fixture.backend.clear_ops();

        assert_eq!(driver.draw_frame().unwrap(), DrawOutcome::Dropped);
        assert_eq!(driver.frame_id(), 0);
        assert!(fixture.recreate.load(Ordering::Acquire));
        assert_eq!(fixture.backend.count_ops(|op| matches!(op, MockOp::Submit(_))), 0);
        assert_eq!(fixture.backend.count_ops(|op| matches!(op, MockOp::Present { .. })), 0);
        assert_eq!(fixture.backend.count_ops(|op| matches!(op, MockOp::ResetFence(_))), 0);
        assert_eq!(fixture.stats.snapshot().dropped, 1);

        // fence 没有被重置，下一帧不会阻塞
        assert!(fixture.backend.is_fence_signaled(fixture.fence(0)));
        assert_eq!(driver.draw_frame().unwrap(), DrawOutcome::Presented { image_index: 0 });
        assert_eq!(driver.frame_id(), 1);
    }

    #[test]
    fn suboptimal_is_counted_but_presented() {
        let fixture = Fixture::new(2);
        let mut driver = fixture.driver();
        fixture.backend.script_acquire([AcquireOutcome::Acquired {
            index: 1,
            suboptimal: true,
        }]);
        assert_eq!(driver.draw_frame().unwrap(), DrawOutcome::Presented { image_index: 1 });
        assert_eq!(fixture.stats.snapshot().suboptimal, 1);
        assert!(!fixture.recreate.load(Ordering::Acquire));
    }

    #[test]
    fn out_of_date_present_requests_recreation() {
        let fixture = Fixture::new(2);
        let mut driver = fixture.driver();
        fixture.backend.script_present([PresentOutcome::OutOfDate]);
        driver.draw_frame().unwrap();
        assert!(fixture.recreate.load(Ordering::Acquire));
    }

    #[test]
    fn third_draw_blocks_on_the_first_slot_fence() {
        let fixture = Fixture::new(2);
        let mut driver = fixture.driver();
        driver.draw_frame().unwrap();
        driver.draw_frame().unwrap();
        assert!(!fixture.backend.is_fence_signaled(fixture.fence(0)));

        let fence0 = fixture.fence(0);
        let drawer = std::thread::spawn(move || {
            let outcome = driver.draw_frame();
            (driver, outcome)
        });
        std::thread::sleep(Duration::from_millis(50));
        assert!(!drawer.is_finished(), "the third draw must wait for slot 0");

        fixture.backend.signal_fence(fence0);
        let (driver, outcome) = drawer.join().unwrap();
        assert!(outcome.is_ok());
        assert_eq!(driver.frame_id(), 3);
    }

    #[test]
    fn fence_timeout_is_fatal() {
        let fixture = Fixture::new(1);
        let mut driver = fixture.driver().with_gpu_timeout(Duration::from_millis(5));
        driver.draw_frame().unwrap();
        let err = driver.draw_frame().unwrap_err();
        assert!(format!("{err:#}").contains("timed out"));
    }

    #[test]
    fn frame_start_action_runs_once_on_its_slot() {
        let fixture = Fixture::new(2);
        fixture.backend.set_auto_signal(true);
        let mut driver = fixture.driver();

        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = hits.clone();
            fixture
                .frames
                .queues()
                .push_frame_start(1, Box::new(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                }))
                .ok()
                .unwrap();
        }

        driver.draw_frame().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        driver.draw_frame().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        driver.draw_frame().unwrap();
        driver.draw_frame().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.frames.queues().pending(1), 0);
    }

    #[test]
    fn callbacks_see_frame_info() {
        let fixture = Fixture::new(2);
        fixture.backend.set_auto_signal(true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            fixture.callbacks.set_on_end(Some(Box::new(move |info: &FrameInfo| seen.lock().push(*info))));
        }
        let mut driver = fixture.driver();
        driver.draw_frame().unwrap();
        driver.draw_frame().unwrap();
        assert_eq!(
            *seen.lock(),
            vec![
                FrameInfo {
                    frame_id: 0,
                    slot: 0,
                    image_index: 0
                },
                FrameInfo {
                    frame_id: 1,
                    slot: 1,
                    image_index: 1
                }
            ]
        );
    }

    #[test]
    fn loop_runs_until_stopped_and_drains_queues() {
        let fixture = Fixture::new(2);
        fixture.backend.set_auto_signal(true);

        let mut render_loop = RenderLoop::new();
        assert_eq!(render_loop.state(), LoopState::NotStarted);
        render_loop.start(fixture.driver(), 500).unwrap();
        assert_eq!(render_loop.state(), LoopState::Running);

        std::thread::sleep(Duration::from_millis(50));
        let hits = Arc::new(AtomicUsize::new(0));
        for slot in 0..2 {
            let hits = hits.clone();
            fixture
                .frames
                .queues()
                .push_frame_end(slot, Box::new(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                }))
                .ok()
                .unwrap();
        }
        render_loop.stop().unwrap();
        assert_eq!(render_loop.state(), LoopState::Stopped);

        assert!(fixture.stats.snapshot().drawn > 0);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn loop_parks_once_the_swapchain_is_out_of_date() {
        let fixture = Fixture::new(2);
        fixture.backend.set_auto_signal(true);
        fixture.backend.script_acquire(std::iter::repeat_n(AcquireOutcome::OutOfDate, 10_000));
        fixture.backend.clear_ops();

        let mut render_loop = RenderLoop::new();
        render_loop.start(fixture.driver(), 0).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert!(!render_loop.has_exited());
        render_loop.stop().unwrap();

        assert_eq!(fixture.backend.count_ops(|op| matches!(op, MockOp::Acquire(_))), 1);
        assert_eq!(fixture.stats.snapshot().dropped, 1);
        assert!(fixture.recreate.load(Ordering::Acquire));
    }

    #[test]
    fn loop_parks_after_an_out_of_date_present() {
        let fixture = Fixture::new(2);
        fixture.backend.set_auto_signal(true);
        fixture.backend.script_present([PresentOutcome::OutOfDate]);
        fixture.backend.clear_ops();

        let mut render_loop = RenderLoop::new();
        render_loop.start(fixture.driver(), 0).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        render_loop.stop().unwrap();

        assert_eq!(fixture.backend.count_ops(|op| matches!(op, MockOp::Acquire(_))), 1);
        assert_eq!(fixture.stats.snapshot().drawn, 1);
    }

    #[test]
    fn loop_failure_is_returned_by_stop() {
        let fixture = Fixture::new(1);
        let mut render_loop = RenderLoop::new();
        // fence 永远不会 signal
        render_loop.start(fixture.driver().with_gpu_timeout(Duration::from_millis(5)), 0).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !render_loop.has_exited() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(render_loop.has_exited());
        assert!(render_loop.stop().is_err());
    }
}
