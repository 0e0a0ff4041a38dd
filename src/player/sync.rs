//! 同步与缓冲管理：Preroll → Running → Draining → Stopped
//!
//! 视频按播放时钟放行，音频在预缓冲完成后通过队列句柄交给宿主。
//! `tick()` 只返回结果，不调用任何回调。

use crate::core::{AudioBlock, PlaybackClock, PlaybackState, PlayerConfig, VideoFrame};
use crate::player::audio_queue::{AudioQueue, AudioQueueHandle};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::time::Duration;

/// 一次 tick 的结果
#[derive(Debug, Default)]
pub struct Tick {
    /// 到时间的视频帧（按队列顺序）
    pub released: Vec<VideoFrame>,
    /// 本次 tick 刚完成预缓冲，应通知宿主音频就绪
    pub audio_ready: bool,
    /// 队首帧距显示还有多久
    pub next_due: Option<Duration>,
    /// 宿主长时间不取音频，本次 tick 放弃了剩余音频
    pub audio_abandoned: bool,
}

pub struct SyncManager {
    state: PlaybackState,
    clock: PlaybackClock,
    video_queue: VecDeque<VideoFrame>,
    video_capacity: usize,
    last_enqueued: Option<f64>,
    audio_queue: AudioQueue,
    audio_present: bool,
    preroll_blocks: usize,
    audio_stall: f64,
    audio_blocked_since: Option<f64>,
    video_done: bool,
    audio_done: bool,
}

impl SyncManager {
    pub fn new(clock: PlaybackClock, audio_present: bool, config: &PlayerConfig) -> Self {
        Self {
            state: PlaybackState::Preroll,
            clock,
            video_queue: VecDeque::with_capacity(config.video_queue_frames),
            video_capacity: config.video_queue_frames.max(1),
            last_enqueued: None,
            audio_queue: AudioQueue::new(config.audio_buffer_bytes),
            audio_present,
            preroll_blocks: config.audio_preroll_blocks.max(1),
            audio_stall: config.audio_stall_ms as f64 / 1000.0,
            audio_blocked_since: None,
            video_done: false,
            audio_done: !audio_present,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// 视频队列还有空位，值得再解一帧
    pub fn wants_video(&self) -> bool {
        self.state != PlaybackState::Stopped
            && !self.video_done
            && self.video_queue.len() < self.video_capacity
    }

    /// 音频队列未达内存上限
    pub fn wants_audio(&self) -> bool {
        self.state != PlaybackState::Stopped && !self.audio_done && !self.audio_queue.is_full()
    }

    /// 入队一帧；显示时间倒退时钳到上一帧，保证非递减
    pub fn push_video(&mut self, mut frame: VideoFrame) {
        if let Some(last) = self.last_enqueued {
            if frame.time < last {
                warn!(
                    "视频帧 #{} 时间倒退 ({:.3}s < {:.3}s)，按上一帧时间处理",
                    frame.frame_index, frame.time, last
                );
                frame.time = last;
            }
        }
        self.last_enqueued = Some(frame.time);
        self.video_queue.push_back(frame);
    }

    pub fn push_audio(&mut self, block: AudioBlock) {
        // 能写入说明宿主在取
        self.audio_blocked_since = None;
        self.audio_queue.push(block);
    }

    /// 音频受背压：还有数据要解，但队列已满
    pub fn audio_backpressured(&self) -> bool {
        self.state != PlaybackState::Stopped && !self.audio_done && self.audio_queue.is_full()
    }

    pub fn mark_video_exhausted(&mut self) {
        self.video_done = true;
    }

    pub fn mark_audio_exhausted(&mut self) {
        self.audio_done = true;
    }

    pub fn audio_handle(&self) -> AudioQueueHandle {
        self.audio_queue.handle()
    }

    /// 推进状态机并放行到时间的视频帧
    pub fn tick(&mut self) -> Tick {
        let mut tick = Tick::default();

        if self.state == PlaybackState::Preroll && self.preroll_complete() {
            self.clock.start();
            self.state = PlaybackState::Running;
            tick.audio_ready = self.audio_present;
            info!(
                "▶️ 预缓冲完成，时钟启动（音频块 {}，视频帧 {}）",
                self.audio_queue.len(),
                self.video_queue.len()
            );
        }

        if self.state == PlaybackState::Running && self.audio_backpressured() {
            if let Some(now) = self.clock.now() {
                let since = *self.audio_blocked_since.get_or_insert(now);
                if now - since >= self.audio_stall {
                    warn!(
                        "🔇 音频队列已满 {:.3}s 无人取走，放弃剩余音频（已排队 {} 块，{} 字节）",
                        now - since,
                        self.audio_queue.len(),
                        self.audio_queue.queued_bytes()
                    );
                    self.audio_done = true;
                    self.audio_blocked_since = None;
                    tick.audio_abandoned = true;
                }
            }
        } else {
            self.audio_blocked_since = None;
        }

        if self.state == PlaybackState::Running && self.video_done && self.audio_done {
            debug!("输入已耗尽，进入 Draining");
            self.state = PlaybackState::Draining;
        }

        if matches!(self.state, PlaybackState::Running | PlaybackState::Draining) {
            if let Some(now) = self.clock.now() {
                // 按队列顺序放行，不跳帧
                while self.video_queue.front().map_or(false, |f| f.time <= now) {
                    if let Some(frame) = self.video_queue.pop_front() {
                        tick.released.push(frame);
                    }
                }
                tick.next_due = self
                    .video_queue
                    .front()
                    .map(|f| Duration::from_secs_f64((f.time - now).max(0.0)));
            }
        }

        if self.state == PlaybackState::Draining && self.video_queue.is_empty() {
            info!("⏹️ 所有视频帧已放行，播放结束");
            self.audio_queue.finish();
            self.state = PlaybackState::Stopped;
        }

        tick
    }

    /// 音频流结束（包括输入结束后包已耗尽）时不再等待凑满预缓冲
    fn preroll_complete(&self) -> bool {
        if self.audio_present && !self.audio_done {
            self.audio_queue.len() >= self.preroll_blocks || self.audio_queue.is_full()
        } else {
            !self.video_queue.is_empty() || self.video_done
        }
    }

    /// 外部停止：丢弃所有未放行的数据
    pub fn stop(&mut self) {
        if self.state == PlaybackState::Stopped {
            return;
        }
        let frames = self.video_queue.len();
        self.video_queue.clear();
        let blocks = self.audio_queue.clear();
        debug!("停止：丢弃 {} 个视频帧、{} 个音频块", frames, blocks);
        self.state = PlaybackState::Stopped;
    }
}
