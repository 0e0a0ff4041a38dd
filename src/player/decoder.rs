use crate::core::{AudioBlock, AudioInfo, Plane, VideoFrame, VideoInfo};
use crate::player::engine::{AudioEngine, PcmFrames, PlaneRef, VideoEngine, VideoStatus};
use crate::player::ogg::LogicalStream;
use anyhow::{anyhow, Result};
use log::{debug, info, warn};

/// 视频解码一次的结果
#[derive(Debug)]
pub enum VideoPoll {
    Frame(VideoFrame),
    /// 包队列已空，需要读取更多容器数据
    NeedData,
    /// 流结束（正常结束或解码出错）
    Exhausted,
}

/// 音频解码一次的结果
#[derive(Debug)]
pub enum AudioPoll {
    Block(AudioBlock),
    NeedData,
    Exhausted,
}

/// 视频解码器 - 包装外部视频引擎
///
/// 引擎在 Drop 时一定会被 teardown（正常结束、致命错误、stop 都一样）。
pub struct VideoDecoder {
    engine: Box<dyn VideoEngine>,
    info: VideoInfo,
    rect: (u32, u32, u32, u32),
    exhausted: bool,
    frames: u64,
    // 自适应后处理
    adaptive: bool,
    pp_level: u32,
    pp_level_max: u32,
    pp_pending: i32,
}

impl VideoDecoder {
    /// 头部解析完成后创建解码上下文
    pub fn new(mut engine: Box<dyn VideoEngine>, adaptive: bool) -> Result<Self> {
        let info = match engine.initialize() {
            Ok(info) => info,
            Err(e) => {
                engine.teardown();
                return Err(e);
            }
        };
        if info.fps_numerator == 0 || info.fps_denominator == 0 {
            engine.teardown();
            return Err(anyhow!(
                "无效的帧率 {}/{}",
                info.fps_numerator,
                info.fps_denominator
            ));
        }
        let Some(rect) = info.display_rect() else {
            engine.teardown();
            return Err(anyhow!(
                "画面区域 {}x{}+{}+{} 越界",
                info.pic_width,
                info.pic_height,
                info.pic_x,
                info.pic_y
            ));
        };

        // 从最高后处理等级开始，落后时再逐级降低
        let pp_level_max = engine.max_quality_level();
        let pp_level = if adaptive { pp_level_max } else { engine.quality_level() };
        if adaptive {
            engine.set_quality_level(pp_level);
        }

        Ok(Self {
            engine,
            info,
            rect,
            exhausted: false,
            frames: 0,
            adaptive,
            pp_level,
            pp_level_max,
            pp_pending: 0,
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// 输出画面区域 `(x, y, w, h)`
    pub fn display_rect(&self) -> (u32, u32, u32, u32) {
        self.rect
    }

    pub fn quality_level(&self) -> u32 {
        self.pp_level
    }

    /// 解码下一帧
    ///
    /// `stream_done` 表示该流不会再有新包到达。
    pub fn decode(&mut self, packets: &mut LogicalStream, stream_done: bool) -> VideoPoll {
        if self.exhausted {
            return VideoPoll::Exhausted;
        }

        loop {
            let Some(packet) = packets.packet_out() else {
                if stream_done {
                    info!("🎬 视频流结束（共解码 {} 帧）", self.frames);
                    self.exhausted = true;
                    return VideoPoll::Exhausted;
                }
                return VideoPoll::NeedData;
            };

            self.apply_quality_change();
            if let Some(granule) = packet.granule {
                self.engine.sync_granule(granule);
            }

            match self.engine.packet_in(&packet) {
                Ok(VideoStatus::Picture { frame_index }) => match self.extract_frame(frame_index) {
                    Ok(frame) => {
                        self.frames += 1;
                        return VideoPoll::Frame(frame);
                    }
                    Err(e) => {
                        warn!("❌ 读取视频平面失败，视频流按结束处理: {}", e);
                        self.exhausted = true;
                        return VideoPoll::Exhausted;
                    }
                },
                // 多包编码单元，继续送包
                Ok(VideoStatus::NoOutput) => continue,
                Err(e) => {
                    warn!("❌ 视频解码错误（包 #{}），视频流按结束处理: {}", packet.packet_no, e);
                    self.exhausted = true;
                    return VideoPoll::Exhausted;
                }
            }
        }
    }

    /// 根据帧的提前量调整后处理等级，下一个包解码前生效
    ///
    /// `lead` = 帧显示时间 - 当前时钟（秒）；负数表示已经迟到。
    pub fn adapt_quality(&mut self, lead: f64) {
        if !self.adaptive {
            return;
        }
        let frame = self.info.frame_duration();
        if lead > frame * 0.25 {
            self.pp_pending = if self.pp_level < self.pp_level_max { 1 } else { 0 };
        } else if lead < frame * 0.05 {
            self.pp_pending = if self.pp_level > 0 { -1 } else { 0 };
        }
    }

    fn apply_quality_change(&mut self) {
        if self.pp_pending == 0 {
            return;
        }
        let level = (self.pp_level as i64 + self.pp_pending as i64).clamp(0, self.pp_level_max as i64) as u32;
        self.pp_pending = 0;
        if level != self.pp_level {
            debug!("后处理等级 {} → {}", self.pp_level, level);
            self.pp_level = level;
            self.engine.set_quality_level(level);
        }
    }

    /// 复制画面区域到自有缓冲
    fn extract_frame(&self, frame_index: u64) -> Result<VideoFrame> {
        let planes = self.engine.planes()?;
        let (x, y, width, height) = self.rect;
        let (xdec, ydec) = self.info.pixel_format.chroma_shift();

        let luma = crop_plane(&planes[0], x, y, width, height)?;
        let cb = crop_plane(&planes[1], x >> xdec, y >> ydec, width >> xdec, height >> ydec)?;
        let cr = crop_plane(&planes[2], x >> xdec, y >> ydec, width >> xdec, height >> ydec)?;

        let time = frame_index as f64 * self.info.fps_denominator as f64 / self.info.fps_numerator as f64;
        Ok(VideoFrame {
            time,
            frame_index,
            width,
            height,
            format: self.info.pixel_format,
            planes: [luma, cb, cr],
        })
    }
}

fn crop_plane(src: &PlaneRef<'_>, x: u32, y: u32, width: u32, height: u32) -> Result<Plane> {
    let fits = |start: u32, len: u32, limit: u32| start.checked_add(len).map_or(false, |end| end <= limit);
    if !fits(x, width, src.width) || !fits(y, height, src.height) {
        return Err(anyhow!(
            "画面区域 {}x{}+{}+{} 超出平面 {}x{}",
            width,
            height,
            x,
            y,
            src.width,
            src.height
        ));
    }
    let (x, y, w, h) = (x as usize, y as usize, width as usize, height as usize);
    let needed = if h == 0 { 0 } else { (y + h - 1) * src.stride + x + w };
    if src.data.len() < needed {
        return Err(anyhow!("平面数据过短: {} < {}", src.data.len(), needed));
    }

    // 复制数据到连续内存
    let mut data = vec![0u8; w * h];
    for row in 0..h {
        let src_offset = (y + row) * src.stride + x;
        let dst_offset = row * w;
        data[dst_offset..dst_offset + w].copy_from_slice(&src.data[src_offset..src_offset + w]);
    }
    Ok(Plane {
        width,
        height,
        stride: w,
        data,
    })
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        self.engine.teardown();
    }
}

/// 音频解码器 - 包装外部音频引擎，把浮点采样切成固定大小的 16bit 块
pub struct AudioDecoder {
    engine: Box<dyn AudioEngine>,
    info: AudioInfo,
    block_frames: usize,
    pending: Vec<i16>,
    pending_frames: usize,
    emitted_frames: u64,
    exhausted: bool,
}

impl AudioDecoder {
    pub fn new(mut engine: Box<dyn AudioEngine>, block_frames: usize) -> Result<Self> {
        let info = match engine.initialize() {
            Ok(info) => info,
            Err(e) => {
                engine.teardown();
                return Err(e);
            }
        };
        if info.channels == 0 || info.sample_rate == 0 {
            engine.teardown();
            return Err(anyhow!(
                "无效的音频参数: {} 声道, {} Hz",
                info.channels,
                info.sample_rate
            ));
        }
        let block_frames = block_frames.max(1);
        Ok(Self {
            pending: Vec::with_capacity(block_frames * info.channels as usize),
            engine,
            info,
            block_frames,
            pending_frames: 0,
            emitted_frames: 0,
            exhausted: false,
        })
    }

    pub fn info(&self) -> &AudioInfo {
        &self.info
    }

    /// 产出下一个音频块
    ///
    /// 交替执行“取出已解码采样”和“送入下一个包”，直到凑满一块；
    /// 流结束时把不满的尾块交出一次，然后返回 Exhausted。
    pub fn decode(&mut self, packets: &mut LogicalStream, stream_done: bool) -> AudioPoll {
        if self.exhausted {
            return AudioPoll::Exhausted;
        }

        loop {
            // 先取出引擎积压的采样
            if let Some(pcm) = self.engine.pcm_out() {
                let available = pcm.frames();
                if available > 0 {
                    let take = available.min(self.block_frames - self.pending_frames);
                    append_clamped(&mut self.pending, &pcm, take, self.info.channels as usize);
                    self.engine.pcm_read(take);
                    self.pending_frames += take;
                    if self.pending_frames == self.block_frames {
                        return AudioPoll::Block(self.cut_block());
                    }
                    continue;
                }
            }

            // 没有积压，送入下一个包
            match packets.packet_out() {
                Some(packet) => {
                    if let Err(e) = self.engine.packet_in(&packet) {
                        warn!("❌ 音频解码错误（包 #{}），音频流按结束处理: {}", packet.packet_no, e);
                        self.pending.clear();
                        self.pending_frames = 0;
                        self.exhausted = true;
                        return AudioPoll::Exhausted;
                    }
                }
                None if stream_done => {
                    if self.pending_frames > 0 {
                        return AudioPoll::Block(self.cut_block());
                    }
                    info!("🔊 音频流结束（共 {} 采样帧）", self.emitted_frames);
                    self.exhausted = true;
                    return AudioPoll::Exhausted;
                }
                None => return AudioPoll::NeedData,
            }
        }
    }

    fn cut_block(&mut self) -> AudioBlock {
        let frames = self.pending_frames;
        let play_ms = self.emitted_frames * 1000 / self.info.sample_rate as u64;
        self.emitted_frames += frames as u64;
        self.pending_frames = 0;
        let mut data = Vec::with_capacity(self.block_frames * self.info.channels as usize);
        std::mem::swap(&mut data, &mut self.pending);
        AudioBlock {
            frames,
            channels: self.info.channels,
            sample_rate: self.info.sample_rate,
            play_ms: Some(play_ms),
            data,
        }
    }
}

impl Drop for AudioDecoder {
    fn drop(&mut self) {
        self.engine.teardown();
    }
}

/// 浮点采样转 16bit，对称截断到 ±32767
pub fn clamp_sample(sample: f32) -> i16 {
    let scaled = (sample * 32767.0).round();
    if scaled.is_nan() {
        return 0;
    }
    scaled.clamp(-32767.0, 32767.0) as i16
}

/// 追加前 `frames` 帧（交错存放）；引擎声道多于声明时忽略多余声道
fn append_clamped(out: &mut Vec<i16>, pcm: &PcmFrames<'_>, frames: usize, channels: usize) {
    let available_channels = pcm.channels();
    for f in 0..frames {
        for c in 0..channels {
            let value = if c < available_channels { pcm.sample(f, c) } else { 0.0 };
            out.push(clamp_sample(value));
        }
    }
}
