use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;
use strata_gfx::{GfxBackend, GfxResult};

/// 在某一帧开始或结束时执行一次的动作
pub type DeferredAction = Box<dyn FnOnce() + Send>;

/// 一个 ring slot 上的同步对象
#[derive(Debug, Clone, Copy)]
pub struct FrameSlot {
    /// slot 上一次提交完成时 signal
    pub fence: vk::Fence,
    pub image_available: vk::Semaphore,
    pub render_complete: vk::Semaphore,
    pub cmd: vk::CommandBuffer,
}

#[derive(Default)]
struct SlotQueues {
    frame_start: Mutex<Vec<DeferredAction>>,
    frame_end: Mutex<Vec<DeferredAction>>,
}

/// 每个 slot 的延迟动作队列
///
/// 可以 clone 到任意线程入队；渲染线程在对应 slot 的下一帧中取出并执行。
/// 每个 slot 的每个队列各有一把锁，锁只覆盖 append 与 drain+clear。
#[derive(Clone)]
pub struct DeferredQueues {
    slots: Arc<[SlotQueues]>,
}

impl DeferredQueues {
    pub fn new(overlap: usize) -> Self {
        Self {
            slots: (0..overlap).map(|_| SlotQueues::default()).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// return: slot 超出范围时原样返回动作
    pub fn push_frame_start(&self, slot: usize, action: DeferredAction) -> Result<(), DeferredAction> {
        match self.slots.get(slot) {
            Some(queues) => {
                queues.frame_start.lock().push(action);
                Ok(())
            }
            None => Err(action),
        }
    }

    pub fn push_frame_end(&self, slot: usize, action: DeferredAction) -> Result<(), DeferredAction> {
        match self.slots.get(slot) {
            Some(queues) => {
                queues.frame_end.lock().push(action);
                Ok(())
            }
            None => Err(action),
        }
    }

    /// 在锁外执行，动作内部可以继续入队（属于该 slot 的下一帧）
    ///
    /// return: 执行的动作数量
    pub fn run_frame_start(&self, slot: usize) -> usize {
        let actions = self.slots.get(slot).map(|q| std::mem::take(&mut *q.frame_start.lock())).unwrap_or_default();
        Self::run(actions)
    }

    pub fn run_frame_end(&self, slot: usize) -> usize {
        let actions = self.slots.get(slot).map(|q| std::mem::take(&mut *q.frame_end.lock())).unwrap_or_default();
        Self::run(actions)
    }

    /// 依次清空所有 slot 的所有队列
    pub fn run_all(&self) -> usize {
        (0..self.slots.len()).map(|slot| self.run_frame_start(slot) + self.run_frame_end(slot)).sum()
    }

    pub fn pending(&self, slot: usize) -> usize {
        self.slots.get(slot).map_or(0, |q| q.frame_start.lock().len() + q.frame_end.lock().len())
    }

    fn run(actions: Vec<DeferredAction>) -> usize {
        let count = actions.len();
        for action in actions {
            action();
        }
        count
    }
}

/// 固定大小的帧资源 ring，由 Frame Level 独占
pub struct FrameResources {
    slots: Vec<FrameSlot>,
    queues: DeferredQueues,
}

// new & init
impl FrameResources {
    /// fence 以 signaled 状态创建，第一轮的等待不会阻塞
    ///
    /// 中途失败时已经创建的对象会被销毁
    pub fn new(backend: &dyn GfxBackend, overlap: usize) -> GfxResult<Self> {
        let mut slots = Vec::with_capacity(overlap);
        for index in 0..overlap {
            match Self::create_slot(backend, index) {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    slots.iter().for_each(|slot| Self::destroy_slot(backend, slot));
                    return Err(e);
                }
            }
        }
        log::info!("created {} frame slot(s)", overlap);

        Ok(Self {
            slots,
            queues: DeferredQueues::new(overlap),
        })
    }

    fn create_slot(backend: &dyn GfxBackend, index: usize) -> GfxResult<FrameSlot> {
        let fence = backend.create_fence(true, &format!("frame-{index}-in-flight"))?;
        let image_available = match backend.create_semaphore(&format!("frame-{index}-image-available")) {
            Ok(semaphore) => semaphore,
            Err(e) => {
                backend.destroy_fence(fence);
                return Err(e);
            }
        };
        let render_complete = match backend.create_semaphore(&format!("frame-{index}-render-complete")) {
            Ok(semaphore) => semaphore,
            Err(e) => {
                backend.destroy_semaphore(image_available);
                backend.destroy_fence(fence);
                return Err(e);
            }
        };
        let cmd = match backend.allocate_command_buffer(&format!("frame-{index}")) {
            Ok(cmd) => cmd,
            Err(e) => {
                backend.destroy_semaphore(render_complete);
                backend.destroy_semaphore(image_available);
                backend.destroy_fence(fence);
                return Err(e);
            }
        };
        Ok(FrameSlot {
            fence,
            image_available,
            render_complete,
            cmd,
        })
    }
}

// getters
impl FrameResources {
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn slot(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    #[inline]
    pub fn queues(&self) -> &DeferredQueues {
        &self.queues
    }
}

// destroy
impl FrameResources {
    /// 调用前 GPU 不能再使用这些对象；残留的延迟动作会先执行
    pub fn destroy(self, backend: &dyn GfxBackend) {
        let leftover = self.queues.run_all();
        if leftover > 0 {
            log::debug!("ran {leftover} leftover deferred action(s) before destroying frame slots");
        }
        for slot in &self.slots {
            Self::destroy_slot(backend, slot);
        }
        log::info!("destroyed {} frame slot(s)", self.slots.len());
    }

    fn destroy_slot(backend: &dyn GfxBackend, slot: &FrameSlot) {
        backend.free_command_buffer(slot.cmd);
        backend.destroy_semaphore(slot.render_complete);
        backend.destroy_semaphore(slot.image_available);
        backend.destroy_fence(slot.fence);
    }
}
