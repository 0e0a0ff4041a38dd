use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 单调时间源（毫秒）
///
/// 播放循环的时间比较和空闲休眠都经过这里，宿主可以替换成自己的时钟
pub trait TimeSource: Send + Sync {
    /// 当前单调时刻（毫秒，起点任意）
    fn now_ms(&self) -> u64;

    /// 休眠给定时长
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// 默认时间源，基于 `Instant`
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// 宿主提供的 tick 函数（例如 SDL_GetTicks）
pub struct HostTicks<F> {
    ticks: F,
}

impl<F> HostTicks<F>
where
    F: Fn() -> u64 + Send + Sync,
{
    pub fn new(ticks: F) -> Self {
        Self { ticks }
    }
}

impl<F> TimeSource for HostTicks<F>
where
    F: Fn() -> u64 + Send + Sync,
{
    fn now_ms(&self) -> u64 {
        (self.ticks)()
    }
}

/// 播放时钟 - 用于音画同步
///
/// 起点（epoch）只在 Preroll → Running 时捕获一次，之后所有显示时间都相对它比较。
#[derive(Clone)]
pub struct PlaybackClock {
    inner: Arc<Mutex<ClockInner>>,
    source: Arc<dyn TimeSource>,
}

struct ClockInner {
    epoch_ms: Option<u64>,  // Running 开始时的时间源读数
}

impl PlaybackClock {
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner { epoch_ms: None })),
            source,
        }
    }

    /// 捕获起点；已经在运行时不做任何事
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        if inner.epoch_ms.is_none() {
            inner.epoch_ms = Some(self.source.now_ms());
        }
    }

    /// 获取当前播放时间（秒），未启动时为 None
    pub fn now(&self) -> Option<f64> {
        let epoch = self.inner.lock().epoch_ms?;
        let elapsed = self.source.now_ms().saturating_sub(epoch);
        Some(elapsed as f64 / 1000.0)
    }

    pub fn sleep(&self, duration: Duration) {
        self.source.sleep(duration);
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new(Arc::new(MonotonicTime::new()))
    }
}

/// 手动推进的时间源：只有 `sleep` / `advance` 会让时间前进
///
/// 离线渲染或确定性回放时使用，空闲休眠不会真的阻塞线程。
#[derive(Default)]
pub struct ManualTime {
    now: AtomicU64,
}

impl ManualTime {
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTime {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration.as_millis().max(1) as u64);
    }
}
