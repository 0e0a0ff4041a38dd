use crate::core::{
    AudioDescriptor, MonotonicTime, PlaybackClock, PlaybackState, PlaybackStats, PlayerConfig, PlayerError, Result,
    TimeSource, VideoFrame,
};
use crate::player::audio_queue::AudioQueueHandle;
use crate::player::container::ContainerReader;
use crate::player::decoder::{AudioDecoder, AudioPoll, VideoDecoder, VideoPoll};
use crate::player::demuxer::{Demuxer, StreamKind};
use crate::player::engine::{AudioEngine, AudioEngineFactory, VideoEngine, VideoEngineFactory};
use crate::player::sync::SyncManager;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::io::Read;
use std::path::Path;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn log_ctx() -> String {
    format!("[pid:{}-tid:{:?}]", process::id(), thread::current().id())
}

type InitializeCallback = Box<dyn FnMut(u32, u32, Option<AudioDescriptor>) + Send>;
type VideoFrameCallback = Box<dyn FnMut(VideoFrame) + Send>;
type AudioReadyCallback = Box<dyn FnMut(AudioQueueHandle) + Send>;

/// 队首帧到期前提前醒来的余量
const WAKE_MARGIN: Duration = Duration::from_millis(5);
/// 没有待显示帧时的轮询间隔
const IDLE_POLL: Duration = Duration::from_millis(2);

/// 播放器与各个句柄共享的状态
struct Shared {
    stop_requested: AtomicBool,
    playing: AtomicBool,
    clock: Mutex<Option<PlaybackClock>>,
}

/// 播放器 - 单线程协作式播放循环
///
/// `play()` 在调用者线程上阻塞直到播放结束或被 `stop()` 打断。
/// 每次 `play()` 都通过工厂创建新的引擎实例，结束时保证 teardown。
pub struct Player {
    config: PlayerConfig,
    video_factory: VideoEngineFactory,
    audio_factory: Option<AudioEngineFactory>,
    on_initialize: Option<InitializeCallback>,
    on_video_frame: Option<VideoFrameCallback>,
    on_audio_ready: Option<AudioReadyCallback>,
    time_source: Arc<dyn TimeSource>,
    shared: Arc<Shared>,
}

/// 可跨线程使用的控制句柄
#[derive(Clone)]
pub struct PlayerHandle {
    shared: Arc<Shared>,
}

impl PlayerHandle {
    /// 请求停止（可重复调用）
    pub fn stop(&self) {
        request_stop(&self.shared);
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::SeqCst)
    }

    /// 当前播放位置（秒），时钟未启动时为 None
    pub fn position(&self) -> Option<f64> {
        self.shared.clock.lock().as_ref().and_then(|clock| clock.now())
    }
}

fn request_stop(shared: &Shared) {
    if !shared.stop_requested.swap(true, Ordering::SeqCst) {
        info!("{} ⏹️  请求停止播放", log_ctx());
    }
}

/// `play()` 期间的活动标记；离开时清除 playing 与停止锁存
struct ActiveGuard<'a> {
    shared: &'a Shared,
}

impl<'a> ActiveGuard<'a> {
    fn enter(shared: &'a Shared) -> Self {
        shared.playing.store(true, Ordering::SeqCst);
        Self { shared }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        *self.shared.clock.lock() = None;
        self.shared.playing.store(false, Ordering::SeqCst);
        self.shared.stop_requested.store(false, Ordering::SeqCst);
    }
}

/// 尚未交给解码器的引擎；离开作用域时 teardown
struct PendingEngines {
    video: Option<Box<dyn VideoEngine>>,
    audio: Option<Box<dyn AudioEngine>>,
}

impl Drop for PendingEngines {
    fn drop(&mut self) {
        if let Some(mut engine) = self.video.take() {
            engine.teardown();
        }
        if let Some(mut engine) = self.audio.take() {
            debug!("释放未使用的音频引擎");
            engine.teardown();
        }
    }
}

impl Player {
    pub fn new<F>(config: PlayerConfig, video_factory: F) -> Result<Self>
    where
        F: Fn() -> Box<dyn VideoEngine> + Send + Sync + 'static,
    {
        config.validate()?;
        info!("{} 🎮 创建播放器...", log_ctx());
        Ok(Self {
            config,
            video_factory: Box::new(video_factory),
            audio_factory: None,
            on_initialize: None,
            on_video_frame: None,
            on_audio_ready: None,
            time_source: Arc::new(MonotonicTime::new()),
            shared: Arc::new(Shared {
                stop_requested: AtomicBool::new(false),
                playing: AtomicBool::new(false),
                clock: Mutex::new(None),
            }),
        })
    }

    /// 注册音频引擎；不注册时音频流被忽略
    pub fn set_audio_engine<F>(&mut self, factory: F)
    where
        F: Fn() -> Box<dyn AudioEngine> + Send + Sync + 'static,
    {
        self.audio_factory = Some(Box::new(factory));
    }

    /// 头部解析完成后调用一次：画面宽高与音频参数
    pub fn set_initialize_callback<F>(&mut self, callback: F)
    where
        F: FnMut(u32, u32, Option<AudioDescriptor>) + Send + 'static,
    {
        self.on_initialize = Some(Box::new(callback));
    }

    /// 每个到时间的视频帧调用一次，帧的所有权交给回调
    pub fn set_video_callback<F>(&mut self, callback: F)
    where
        F: FnMut(VideoFrame) + Send + 'static,
    {
        self.on_video_frame = Some(Box::new(callback));
    }

    /// 音频预缓冲完成后调用一次，宿主从句柄中取音频块
    pub fn set_audio_ready_callback<F>(&mut self, callback: F)
    where
        F: FnMut(AudioQueueHandle) + Send + 'static,
    {
        self.on_audio_ready = Some(Box::new(callback));
    }

    pub fn set_time_source(&mut self, source: Arc<dyn TimeSource>) {
        self.time_source = source;
    }

    pub fn handle(&self) -> PlayerHandle {
        PlayerHandle {
            shared: self.shared.clone(),
        }
    }

    /// 请求停止；空闲时调用会让下一次 `play()` 立即返回
    pub fn stop(&self) {
        request_stop(&self.shared);
    }

    /// 播放文件，阻塞直到结束
    pub fn play(&mut self, path: impl AsRef<Path>) -> Result<PlaybackStats> {
        let path = path.as_ref();
        info!("{} 📂 打开文件: {}", log_ctx(), path.display());
        let chunk = self.config.read_chunk_size;
        self.play_with(|| ContainerReader::open(path, chunk))
    }

    /// 从任意 `Read` 数据源播放
    pub fn play_reader<R: Read>(&mut self, source: R) -> Result<PlaybackStats> {
        let chunk = self.config.read_chunk_size;
        self.play_with(|| Ok(ContainerReader::new(source, chunk)))
    }

    fn play_with<R, F>(&mut self, open: F) -> Result<PlaybackStats>
    where
        R: Read,
        F: FnOnce() -> Result<ContainerReader<R>>,
    {
        let shared = self.shared.clone();
        let _active = ActiveGuard::enter(&shared);

        if shared.stop_requested.load(Ordering::SeqCst) {
            info!("{} ⏹️  播放开始前已请求停止", log_ctx());
            return Ok(PlaybackStats {
                stopped_early: true,
                ..Default::default()
            });
        }

        let reader = open()?;
        let result = self.run_session(reader, &shared);
        match &result {
            Ok(stats) => info!(
                "{} ✅ 播放结束: {} 帧视频, {} 个音频块, {} 帧迟到, 跳过 {} 字节, 丢弃 {} 页{}",
                log_ctx(),
                stats.video_frames,
                stats.audio_blocks,
                stats.late_frames,
                stats.skipped_bytes,
                stats.discarded_pages,
                if stats.stopped_early { "（已停止）" } else { "" }
            ),
            Err(e) => warn!("{} ❌ 播放失败: {}", log_ctx(), e),
        }
        result
    }

    fn run_session<R: Read>(&mut self, reader: ContainerReader<R>, shared: &Shared) -> Result<PlaybackStats> {
        let mut stats = PlaybackStats::default();
        let mut demuxer = Demuxer::new(reader);

        // ========== 步骤1: 解析头部 ==========
        let mut engines = PendingEngines {
            video: Some((self.video_factory)()),
            audio: self.audio_factory.as_ref().map(|factory| factory()),
        };
        let audio_engine: Option<&mut dyn AudioEngine> = match engines.audio.as_mut() {
            Some(engine) => Some(&mut **engine),
            None => None,
        };
        let headers = match engines.video.as_mut() {
            Some(video) => demuxer.read_headers(&mut **video, audio_engine)?,
            None => return Err(PlayerError::NoVideoStream),
        };

        // ========== 步骤2: 创建解码器 ==========
        let Some(video_engine) = engines.video.take() else {
            return Err(PlayerError::NoVideoStream);
        };
        let mut video = VideoDecoder::new(video_engine, self.config.adaptive_quality)
            .map_err(|e| PlayerError::header("视频", e))?;

        let mut audio = match (headers.audio_serial, engines.audio.take()) {
            (Some(_), Some(engine)) if self.on_audio_ready.is_some() => Some(
                AudioDecoder::new(engine, self.config.audio_block_frames)
                    .map_err(|e| PlayerError::header("音频", e))?,
            ),
            (serial, engine) => {
                if serial.is_some() {
                    info!("{} 🔇 未注册音频就绪回调，忽略音频流", log_ctx());
                    demuxer.drop_stream(StreamKind::Audio);
                }
                engines.audio = engine;
                None
            }
        };
        drop(engines);

        log_stream_info(headers.video_serial, &video, headers.audio_serial, audio.as_ref());

        // ========== 步骤3: 通知宿主 ==========
        let (_, _, width, height) = video.display_rect();
        let descriptor = audio.as_ref().map(|decoder| AudioDescriptor {
            channels: decoder.info().channels,
            sample_rate: decoder.info().sample_rate,
            block_frames: self.config.audio_block_frames,
        });
        if stop_requested(shared) {
            stats.stopped_early = true;
            return Ok(stats);
        }
        if let Some(callback) = self.on_initialize.as_mut() {
            callback(width, height, descriptor);
        }

        // ========== 步骤4: 播放循环 ==========
        let clock = PlaybackClock::new(self.time_source.clone());
        *shared.clock.lock() = Some(clock.clone());
        let mut sync = SyncManager::new(clock.clone(), audio.is_some(), &self.config);
        let frame_duration = video.info().frame_duration();
        let max_idle = Duration::from_millis(self.config.max_idle_sleep_ms);

        'session: loop {
            if stop_requested(shared) {
                sync.stop();
                stats.stopped_early = true;
                break;
            }

            let mut progressed = false;
            let mut need_data = false;

            // 音频优先解码
            if let Some(decoder) = audio.as_mut().filter(|_| sync.wants_audio()) {
                let done = demuxer.stream_finished(StreamKind::Audio);
                match demuxer.stream_mut(StreamKind::Audio) {
                    Some(stream) => match decoder.decode(stream, done) {
                        AudioPoll::Block(block) => {
                            stats.audio_blocks += 1;
                            sync.push_audio(block);
                            progressed = true;
                        }
                        AudioPoll::NeedData => need_data = true,
                        AudioPoll::Exhausted => {
                            sync.mark_audio_exhausted();
                            progressed = true;
                        }
                    },
                    None => sync.mark_audio_exhausted(),
                }
            }

            if sync.wants_video() {
                let done = demuxer.stream_finished(StreamKind::Video);
                match demuxer.stream_mut(StreamKind::Video) {
                    Some(stream) => match video.decode(stream, done) {
                        VideoPoll::Frame(frame) => {
                            if let Some(now) = clock.now() {
                                video.adapt_quality(frame.time - now);
                            }
                            sync.push_video(frame);
                            progressed = true;
                        }
                        VideoPoll::NeedData => need_data = true,
                        VideoPoll::Exhausted => {
                            sync.mark_video_exhausted();
                            progressed = true;
                        }
                    },
                    None => sync.mark_video_exhausted(),
                }
            }

            // 音频被宿主卡住时不再为视频读取容器，避免音频包无限积压
            let backlogged = sync.audio_backpressured()
                && demuxer.backlog(StreamKind::Audio) >= self.config.max_packet_backlog;
            if need_data && !backlogged && !demuxer.end_of_input() {
                // 读到文件末尾时缓冲区里的页面也会被分发，流随后进入结束判定
                demuxer.pump();
                progressed = true;
            }

            let tick = sync.tick();
            if tick.audio_abandoned {
                audio = None;
                demuxer.drop_stream(StreamKind::Audio);
            }
            if tick.audio_ready {
                if stop_requested(shared) {
                    sync.stop();
                    stats.stopped_early = true;
                    break;
                }
                if let Some(callback) = self.on_audio_ready.as_mut() {
                    callback(sync.audio_handle());
                }
            }

            let released = !tick.released.is_empty();
            for frame in tick.released {
                if stop_requested(shared) {
                    sync.stop();
                    stats.stopped_early = true;
                    break 'session;
                }
                if let Some(now) = clock.now() {
                    if now - frame.time > frame_duration {
                        stats.late_frames += 1;
                        debug!("视频帧 #{} 迟到 {:.3}s", frame.frame_index, now - frame.time);
                    }
                }
                stats.video_frames += 1;
                if let Some(callback) = self.on_video_frame.as_mut() {
                    callback(frame);
                }
            }

            if sync.state() == PlaybackState::Stopped {
                break;
            }

            if !progressed && !released {
                let wait = match tick.next_due {
                    Some(due) => due.saturating_sub(WAKE_MARGIN).min(max_idle),
                    None => IDLE_POLL,
                };
                clock.sleep(wait.max(Duration::from_millis(1)));
            }
        }

        stats.discarded_pages = demuxer.discarded_pages();
        stats.skipped_bytes = demuxer.skipped_bytes();
        Ok(stats)
    }
}

fn stop_requested(shared: &Shared) -> bool {
    shared.stop_requested.load(Ordering::SeqCst)
}

fn log_stream_info(video_serial: u32, video: &VideoDecoder, audio_serial: Option<u32>, audio: Option<&AudioDecoder>) {
    let info = video.info();
    info!(
        "{} 🎬 视频流 {:x}: {}x{} 画面, {:.3} fps, {}",
        log_ctx(),
        video_serial,
        info.pic_width,
        info.pic_height,
        info.fps(),
        info.pixel_format.as_str()
    );
    info!(
        "   编码帧 {}x{}，画面偏移 ({}, {})，色彩空间 {:?}",
        info.frame_width, info.frame_height, info.pic_x, info.pic_y, info.color_space
    );
    info!("   编码器: {}", info.comments.vendor);
    for comment in &info.comments.user_comments {
        info!("   {}", comment);
    }

    match (audio_serial, audio) {
        (Some(serial), Some(decoder)) => {
            let info = decoder.info();
            info!(
                "{} 🔊 音频流 {:x}: {} 声道, {} Hz",
                log_ctx(),
                serial,
                info.channels,
                info.sample_rate
            );
            info!("   编码器: {}", info.comments.vendor);
            for comment in &info.comments.user_comments {
                info!("   {}", comment);
            }
        }
        _ => info!("{} 🔇 没有音频流", log_ctx()),
    }
}
