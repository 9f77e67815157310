pub struct FrameCounter {
    /// 已经完成的帧数，一直累加
    frame_id: u64,
    /// ring 的大小
    overlap: usize,
}

// new & init
impl FrameCounter {
    pub fn new(init_frame_id: u64, overlap: usize) -> Self {
        Self {
            frame_id: init_frame_id,
            overlap: overlap.max(1),
        }
    }
}

// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
    }
}

// getters
impl FrameCounter {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    #[inline]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// 当前帧使用的 ring slot
    #[inline]
    pub fn slot(&self) -> usize {
        (self.frame_id % self.overlap as u64) as usize
    }

    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}#{}]", self.frame_id, self.slot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_cycles_through_ring() {
        let mut counter = FrameCounter::new(0, 3);
        let slots: Vec<_> = (0..7)
            .map(|_| {
                let slot = counter.slot();
                counter.next_frame();
                slot
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(counter.frame_id(), 7);
        assert_eq!(counter.frame_name(), "[F7#1]");
    }

    #[test]
    fn zero_overlap_is_one_slot() {
        let counter = FrameCounter::new(5, 0);
        assert_eq!(counter.overlap(), 1);
        assert_eq!(counter.slot(), 0);
    }
}
