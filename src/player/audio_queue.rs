use crate::core::AudioBlock;
use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// 音频块队列 - 解码端写入，宿主通过 `AudioQueueHandle` 取出
///
/// 按字节数限流：超过内存上限后解码端停止产出新块，直到宿主取走一些。
pub struct AudioQueue {
    shared: Arc<Shared>,
}

struct Shared {
    blocks: SegQueue<AudioBlock>,
    bytes: AtomicUsize,
    capacity_bytes: usize,
    finished: AtomicBool,
}

/// 交给宿主的音频队列句柄（可跨线程）
///
/// 取出的块归宿主所有。
#[derive(Clone)]
pub struct AudioQueueHandle {
    shared: Arc<Shared>,
}

impl AudioQueue {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                blocks: SegQueue::new(),
                bytes: AtomicUsize::new(0),
                capacity_bytes,
                finished: AtomicBool::new(false),
            }),
        }
    }

    /// 写入一个音频块（调用前应先检查 `is_full`）
    pub fn push(&self, block: AudioBlock) {
        self.shared.bytes.fetch_add(block.byte_len(), Ordering::SeqCst);
        self.shared.blocks.push(block);
    }

    /// 已达到内存上限
    pub fn is_full(&self) -> bool {
        self.shared.bytes.load(Ordering::SeqCst) >= self.shared.capacity_bytes
    }

    pub fn len(&self) -> usize {
        self.shared.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.blocks.is_empty()
    }

    pub fn queued_bytes(&self) -> usize {
        self.shared.bytes.load(Ordering::SeqCst)
    }

    /// 正常播放结束：剩余的块仍可被宿主取走
    pub fn finish(&self) {
        self.shared.finished.store(true, Ordering::SeqCst);
    }

    /// stop 时清空队列
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.shared.pop().is_some() {
            dropped += 1;
        }
        self.shared.finished.store(true, Ordering::SeqCst);
        dropped
    }

    pub fn handle(&self) -> AudioQueueHandle {
        AudioQueueHandle {
            shared: self.shared.clone(),
        }
    }
}

impl Shared {
    fn pop(&self) -> Option<AudioBlock> {
        let block = self.blocks.pop()?;
        self.bytes.fetch_sub(block.byte_len(), Ordering::SeqCst);
        Some(block)
    }
}

impl AudioQueueHandle {
    /// 取出最早的音频块
    pub fn pop(&self) -> Option<AudioBlock> {
        self.shared.pop()
    }

    /// 队列中的块数
    pub fn len(&self) -> usize {
        self.shared.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.blocks.is_empty()
    }

    /// 播放已结束且队列已取空：之后不会再有数据（用于区分欠载）
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst) && self.shared.blocks.is_empty()
    }
}
