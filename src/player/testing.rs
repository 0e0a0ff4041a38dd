//! 单元测试用的模拟引擎与容器构造工具

use crate::core::{AudioInfo, ColorSpace, PixelFormat, StreamComments, VideoInfo};
use crate::player::engine::{AudioEngine, PcmFrames, PlaneRef, VideoEngine, VideoStatus};
use crate::player::ogg::writer::simple;
use crate::player::ogg::ElementaryPacket;
use anyhow::{anyhow, bail};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const WIDTH: u32 = 8;
pub const HEIGHT: u32 = 4;

pub fn video_header(i: u8) -> Vec<u8> {
    let mut v = vec![0x80 + i];
    v.extend_from_slice(b"vid");
    v
}

pub fn audio_header(i: u8) -> Vec<u8> {
    let mut v = vec![1 + 2 * i];
    v.extend_from_slice(b"aud");
    v
}

/// 视频数据包：载荷是帧序号
pub fn video_packet(frame_index: u32) -> Vec<u8> {
    frame_index.to_le_bytes().to_vec()
}

/// 音频数据包：`frames` 帧，每个采样值为 `value`
pub fn audio_packet(frames: u16, value: f32) -> Vec<u8> {
    let mut v = frames.to_le_bytes().to_vec();
    v.extend_from_slice(&value.to_le_bytes());
    v
}

/// 模拟视频引擎：帧序号写在包里，像素值等于帧序号
#[derive(Default)]
pub struct MockVideo {
    pub(crate) headers: usize,
    pub(crate) planes: Vec<Vec<u8>>,
    pub quality: u32,
    /// 画面区域的水平偏移
    pub pic_x: u32,
    pub teardowns: Arc<AtomicUsize>,
}

impl MockVideo {
    pub fn with_teardowns(teardowns: Arc<AtomicUsize>) -> Self {
        Self {
            teardowns,
            ..Default::default()
        }
    }

    pub fn headers_seen(&self) -> usize {
        self.headers
    }
}

impl VideoEngine for MockVideo {
    fn identify(&self, packet: &ElementaryPacket) -> bool {
        packet.data == video_header(0)
    }

    fn header_in(&mut self, packet: &ElementaryPacket) -> anyhow::Result<()> {
        if packet.data != video_header(self.headers as u8) {
            bail!("无效的视频头部包 #{}", self.headers);
        }
        self.headers += 1;
        Ok(())
    }

    fn initialize(&mut self) -> anyhow::Result<VideoInfo> {
        Ok(VideoInfo {
            frame_width: WIDTH,
            frame_height: HEIGHT,
            pic_width: WIDTH,
            pic_height: HEIGHT,
            pic_x: self.pic_x,
            pic_y: 0,
            fps_numerator: 25,
            fps_denominator: 1,
            pixel_format: PixelFormat::YUV420P,
            color_space: ColorSpace::Unspecified,
            comments: StreamComments {
                vendor: "mock".to_string(),
                user_comments: vec!["TITLE=test".to_string()],
            },
        })
    }

    fn packet_in(&mut self, packet: &ElementaryPacket) -> anyhow::Result<VideoStatus> {
        if packet.data.is_empty() {
            return Ok(VideoStatus::NoOutput);
        }
        if packet.data.len() != 4 {
            bail!("损坏的视频包");
        }
        let index = u32::from_le_bytes([packet.data[0], packet.data[1], packet.data[2], packet.data[3]]);
        let luma = vec![index as u8; (WIDTH * HEIGHT) as usize];
        let chroma = vec![index as u8; (WIDTH * HEIGHT / 4) as usize];
        self.planes = vec![luma, chroma.clone(), chroma];
        Ok(VideoStatus::Picture {
            frame_index: index as u64,
        })
    }

    fn planes(&self) -> anyhow::Result<[PlaneRef<'_>; 3]> {
        if self.planes.len() != 3 {
            return Err(anyhow!("还没有画面"));
        }
        Ok([
            PlaneRef { width: WIDTH, height: HEIGHT, stride: WIDTH as usize, data: &self.planes[0] },
            PlaneRef { width: WIDTH / 2, height: HEIGHT / 2, stride: (WIDTH / 2) as usize, data: &self.planes[1] },
            PlaneRef { width: WIDTH / 2, height: HEIGHT / 2, stride: (WIDTH / 2) as usize, data: &self.planes[2] },
        ])
    }

    fn quality_level(&self) -> u32 {
        self.quality
    }

    fn max_quality_level(&self) -> u32 {
        3
    }

    fn set_quality_level(&mut self, level: u32) {
        self.quality = level;
    }

    fn teardown(&mut self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// 模拟音频引擎：双声道，44100 Hz
#[derive(Default)]
pub struct MockAudio {
    headers: usize,
    pending: Vec<Vec<f32>>,
    pub teardowns: Arc<AtomicUsize>,
}

impl MockAudio {
    pub fn with_teardowns(teardowns: Arc<AtomicUsize>) -> Self {
        Self {
            teardowns,
            ..Default::default()
        }
    }

    pub fn headers_seen(&self) -> usize {
        self.headers
    }
}

impl AudioEngine for MockAudio {
    fn identify(&self, packet: &ElementaryPacket) -> bool {
        packet.data == audio_header(0)
    }

    fn header_in(&mut self, packet: &ElementaryPacket) -> anyhow::Result<()> {
        if packet.data != audio_header(self.headers as u8) {
            bail!("无效的音频头部包 #{}", self.headers);
        }
        self.headers += 1;
        Ok(())
    }

    fn initialize(&mut self) -> anyhow::Result<AudioInfo> {
        self.pending = vec![Vec::new(), Vec::new()];
        Ok(AudioInfo {
            channels: 2,
            sample_rate: 44100,
            comments: StreamComments::default(),
        })
    }

    fn packet_in(&mut self, packet: &ElementaryPacket) -> anyhow::Result<()> {
        if packet.data.len() != 6 {
            bail!("损坏的音频包");
        }
        let frames = u16::from_le_bytes([packet.data[0], packet.data[1]]) as usize;
        let value = f32::from_le_bytes([packet.data[2], packet.data[3], packet.data[4], packet.data[5]]);
        for channel in self.pending.iter_mut() {
            channel.extend(std::iter::repeat(value).take(frames));
        }
        Ok(())
    }

    fn pcm_out(&mut self) -> Option<PcmFrames<'_>> {
        if self.pending.first().map_or(true, |c| c.is_empty()) {
            None
        } else {
            Some(PcmFrames::Planar(&self.pending))
        }
    }

    fn pcm_read(&mut self, frames: usize) {
        for channel in self.pending.iter_mut() {
            channel.drain(..frames.min(channel.len()));
        }
    }

    fn teardown(&mut self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// 构造一个合成容器：视频流序列号 1，音频流序列号 2
pub struct ContainerBuilder {
    bytes: Vec<u8>,
    video_seq: u32,
    audio_seq: u32,
    with_audio: bool,
}

impl ContainerBuilder {
    pub fn new(with_audio: bool) -> Self {
        let mut bytes = simple(1, 0, 0, true, &[&video_header(0)]);
        if with_audio {
            bytes.extend(simple(2, 0, 0, true, &[&audio_header(0)]));
        }
        bytes.extend(simple(1, 1, 0, false, &[&video_header(1), &video_header(2)]));
        if with_audio {
            bytes.extend(simple(2, 1, 0, false, &[&audio_header(1), &audio_header(2)]));
        }
        Self {
            bytes,
            video_seq: 2,
            audio_seq: 2,
            with_audio,
        }
    }

    pub fn video(mut self, packets: &[Vec<u8>], granule: i64) -> Self {
        let refs: Vec<&[u8]> = packets.iter().map(|p| p.as_slice()).collect();
        self.bytes.extend(simple(1, self.video_seq, granule, false, &refs));
        self.video_seq += 1;
        self
    }

    pub fn audio(mut self, packets: &[Vec<u8>]) -> Self {
        assert!(self.with_audio);
        let refs: Vec<&[u8]> = packets.iter().map(|p| p.as_slice()).collect();
        self.bytes.extend(simple(2, self.audio_seq, -1, false, &refs));
        self.audio_seq += 1;
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}
