use crate::core::{AudioInfo, VideoInfo};
use crate::player::ogg::ElementaryPacket;

/// 视频引擎送入一个包后的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoStatus {
    /// 包已消费，但没有可显示的画面（多包编码单元、重复帧等）
    NoOutput,
    /// 包已消费并产出画面；`frame_index` 是引擎累计的显示位置（帧）
    Picture { frame_index: u64 },
}

/// 引擎内部的一个像素平面（借用引擎的缓冲）
#[derive(Debug, Clone, Copy)]
pub struct PlaneRef<'a> {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub data: &'a [u8],
}

/// 视频解码引擎（外部协作者）
///
/// 生命周期：`identify` 探测首包 → `header_in` 送入全部头部包 → `initialize`
/// → 循环 `packet_in`/`planes` → `teardown`。
pub trait VideoEngine: Send {
    /// 判断一个 BOS 包是否属于本编解码器（不改变引擎状态）
    fn identify(&self, packet: &ElementaryPacket) -> bool;

    /// 送入一个头部包；拒绝即为致命错误
    fn header_in(&mut self, packet: &ElementaryPacket) -> anyhow::Result<()>;

    /// 需要的头部包数量
    fn header_count(&self) -> usize {
        3
    }

    /// 头部完成后创建解码上下文
    fn initialize(&mut self) -> anyhow::Result<VideoInfo>;

    /// 包上带有显式粒度位置时，同步引擎内部的位置
    fn sync_granule(&mut self, _granule: i64) {}

    fn packet_in(&mut self, packet: &ElementaryPacket) -> anyhow::Result<VideoStatus>;

    /// 最近一次产出的画面（Y、Cb、Cr），以编码帧尺寸给出
    fn planes(&self) -> anyhow::Result<[PlaneRef<'_>; 3]>;

    /// 当前后处理等级
    fn quality_level(&self) -> u32 {
        0
    }

    fn max_quality_level(&self) -> u32 {
        0
    }

    fn set_quality_level(&mut self, _level: u32) {}

    /// 释放引擎资源；由适配器在所有退出路径上调用一次
    fn teardown(&mut self) {}
}

/// 引擎积压的已解码采样
#[derive(Debug, Clone, Copy)]
pub enum PcmFrames<'a> {
    /// 每个声道一段
    Planar(&'a [Vec<f32>]),
    /// 交错存放
    Interleaved { samples: &'a [f32], channels: usize },
}

impl PcmFrames<'_> {
    /// 可用的采样帧数
    pub fn frames(&self) -> usize {
        match self {
            PcmFrames::Planar(planes) => planes.iter().map(|p| p.len()).min().unwrap_or(0),
            PcmFrames::Interleaved { samples, channels } => {
                if *channels == 0 {
                    0
                } else {
                    samples.len() / channels
                }
            }
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            PcmFrames::Planar(planes) => planes.len(),
            PcmFrames::Interleaved { channels, .. } => *channels,
        }
    }

    /// 第 `frame` 帧第 `channel` 声道的采样
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        match self {
            PcmFrames::Planar(planes) => planes[channel][frame],
            PcmFrames::Interleaved { samples, channels } => samples[frame * channels + channel],
        }
    }
}

/// 音频解码引擎（外部协作者）
///
/// 引擎可以在内部缓冲，每送入一个包产出的采样数不定：
/// 先 `pcm_out` 取出积压，处理完用 `pcm_read` 确认消费数量。
pub trait AudioEngine: Send {
    fn identify(&self, packet: &ElementaryPacket) -> bool;

    fn header_in(&mut self, packet: &ElementaryPacket) -> anyhow::Result<()>;

    fn header_count(&self) -> usize {
        3
    }

    fn initialize(&mut self) -> anyhow::Result<AudioInfo>;

    fn packet_in(&mut self, packet: &ElementaryPacket) -> anyhow::Result<()>;

    /// 积压的已解码采样；没有时返回 None
    fn pcm_out(&mut self) -> Option<PcmFrames<'_>>;

    /// 确认消费了前 `frames` 帧
    fn pcm_read(&mut self, frames: usize);

    fn teardown(&mut self) {}
}

/// 每次 play() 创建一个新的视频引擎
pub type VideoEngineFactory = Box<dyn Fn() -> Box<dyn VideoEngine> + Send + Sync>;
/// 每次 play() 创建一个新的音频引擎
pub type AudioEngineFactory = Box<dyn Fn() -> Box<dyn AudioEngine> + Send + Sync>;
