//! 集成测试共用：合成 Ogg 容器与交织输出的模拟引擎

#![allow(dead_code)]

use anyhow::bail;
use ogv_player::player::ogg::writer::{page_bytes, PageLayout};
use ogv_player::{
    AudioEngine, AudioInfo, ColorSpace, ElementaryPacket, PcmFrames, PixelFormat, PlaneRef, StreamComments,
    VideoEngine, VideoInfo, VideoStatus,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const VIDEO_SERIAL: u32 = 0x1234;
pub const AUDIO_SERIAL: u32 = 0x5678;
pub const WIDTH: u32 = 16;
pub const HEIGHT: u32 = 8;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ========== Ogg 页面构造 ==========

pub fn page(serial: u32, sequence: u32, granule: i64, bos: bool, eos: bool, packets: &[&[u8]]) -> Vec<u8> {
    page_bytes(&PageLayout {
        serial,
        sequence,
        granule,
        bos,
        eos,
        continued: false,
        packets,
        open_tail: false,
    })
}

pub fn video_header(i: u8) -> Vec<u8> {
    let mut v = vec![0x80 | i];
    v.extend_from_slice(b"mockvid");
    v
}

pub fn audio_header(i: u8) -> Vec<u8> {
    let mut v = vec![1 + 2 * i];
    v.extend_from_slice(b"mockaud");
    v
}

pub fn video_packet(index: u32) -> Vec<u8> {
    index.to_le_bytes().to_vec()
}

pub fn audio_packet(frames: u16, value: f32) -> Vec<u8> {
    let mut v = frames.to_le_bytes().to_vec();
    v.extend_from_slice(&value.to_le_bytes());
    v
}

/// 按顺序拼出一个合成容器
pub struct Clip {
    bytes: Vec<u8>,
    video_seq: u32,
    audio_seq: u32,
}

impl Clip {
    pub fn new(with_audio: bool) -> Self {
        let mut bytes = page(VIDEO_SERIAL, 0, 0, true, false, &[&video_header(0)]);
        if with_audio {
            bytes.extend(page(AUDIO_SERIAL, 0, 0, true, false, &[&audio_header(0)]));
        }
        bytes.extend(page(VIDEO_SERIAL, 1, 0, false, false, &[&video_header(1), &video_header(2)]));
        if with_audio {
            bytes.extend(page(AUDIO_SERIAL, 1, 0, false, false, &[&audio_header(1), &audio_header(2)]));
        }
        Self {
            bytes,
            video_seq: 2,
            audio_seq: 2,
        }
    }

    pub fn video_frames(mut self, range: std::ops::Range<u32>) -> Self {
        for index in range {
            let packet = video_packet(index);
            self.bytes
                .extend(page(VIDEO_SERIAL, self.video_seq, index as i64, false, false, &[&packet]));
            self.video_seq += 1;
        }
        self
    }

    pub fn video_raw(mut self, packet: &[u8]) -> Self {
        self.bytes.extend(page(VIDEO_SERIAL, self.video_seq, -1, false, false, &[packet]));
        self.video_seq += 1;
        self
    }

    pub fn audio(mut self, packets: usize, frames: u16, value: f32) -> Self {
        for _ in 0..packets {
            let packet = audio_packet(frames, value);
            self.bytes.extend(page(AUDIO_SERIAL, self.audio_seq, -1, false, false, &[&packet]));
            self.audio_seq += 1;
        }
        self
    }

    pub fn audio_raw(mut self, packet: &[u8]) -> Self {
        self.bytes.extend(page(AUDIO_SERIAL, self.audio_seq, -1, false, false, &[packet]));
        self.audio_seq += 1;
        self
    }

    pub fn garbage(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.bytes.extend(page(VIDEO_SERIAL, self.video_seq, -1, false, true, &[]));
        self.bytes
    }
}

// ========== 模拟引擎 ==========

#[derive(Default)]
pub struct FakeVideo {
    pub headers: u8,
    pub planes: Option<[Vec<u8>; 3]>,
    pub quality: u32,
    pub teardowns: Arc<AtomicUsize>,
}

impl VideoEngine for FakeVideo {
    fn identify(&self, packet: &ElementaryPacket) -> bool {
        packet.data == video_header(0)
    }

    fn header_in(&mut self, packet: &ElementaryPacket) -> anyhow::Result<()> {
        if packet.data != video_header(self.headers) {
            bail!("unexpected video header {}", self.headers);
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
            pic_x: 0,
            pic_y: 0,
            fps_numerator: 25,
            fps_denominator: 1,
            pixel_format: PixelFormat::YUV420P,
            color_space: ColorSpace::Rec470BG,
            comments: StreamComments {
                vendor: "fake video".into(),
                user_comments: Vec::new(),
            },
        })
    }

    fn packet_in(&mut self, packet: &ElementaryPacket) -> anyhow::Result<VideoStatus> {
        let bytes: [u8; 4] = match packet.data.as_slice().try_into() {
            Ok(bytes) => bytes,
            Err(_) => bail!("corrupt video packet"),
        };
        let index = u32::from_le_bytes(bytes);
        let luma = vec![index as u8; (WIDTH * HEIGHT) as usize];
        let chroma = vec![0x80; (WIDTH * HEIGHT / 4) as usize];
        self.planes = Some([luma, chroma.clone(), chroma]);
        Ok(VideoStatus::Picture {
            frame_index: index as u64,
        })
    }

    fn planes(&self) -> anyhow::Result<[PlaneRef<'_>; 3]> {
        let Some(planes) = self.planes.as_ref() else {
            bail!("no picture decoded yet");
        };
        let (cw, ch) = (WIDTH / 2, HEIGHT / 2);
        Ok([
            PlaneRef { width: WIDTH, height: HEIGHT, stride: WIDTH as usize, data: &planes[0] },
            PlaneRef { width: cw, height: ch, stride: cw as usize, data: &planes[1] },
            PlaneRef { width: cw, height: ch, stride: cw as usize, data: &planes[2] },
        ])
    }

    fn quality_level(&self) -> u32 {
        self.quality
    }

    fn max_quality_level(&self) -> u32 {
        2
    }

    fn set_quality_level(&mut self, level: u32) {
        self.quality = level;
    }

    fn teardown(&mut self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// 单声道 22050 Hz，交织输出
#[derive(Default)]
pub struct FakeAudio {
    pub headers: u8,
    pub pending: Vec<f32>,
    pub teardowns: Arc<AtomicUsize>,
}

impl AudioEngine for FakeAudio {
    fn identify(&self, packet: &ElementaryPacket) -> bool {
        packet.data == audio_header(0)
    }

    fn header_in(&mut self, packet: &ElementaryPacket) -> anyhow::Result<()> {
        if packet.data != audio_header(self.headers) {
            bail!("unexpected audio header {}", self.headers);
        }
        self.headers += 1;
        Ok(())
    }

    fn initialize(&mut self) -> anyhow::Result<AudioInfo> {
        Ok(AudioInfo {
            channels: 1,
            sample_rate: 22050,
            comments: StreamComments {
                vendor: "fake audio".into(),
                user_comments: vec!["ARTIST=nobody".into()],
            },
        })
    }

    fn packet_in(&mut self, packet: &ElementaryPacket) -> anyhow::Result<()> {
        if packet.data.len() != 6 {
            bail!("corrupt audio packet");
        }
        let frames = u16::from_le_bytes([packet.data[0], packet.data[1]]) as usize;
        let value = f32::from_le_bytes([packet.data[2], packet.data[3], packet.data[4], packet.data[5]]);
        self.pending.extend(std::iter::repeat(value).take(frames));
        Ok(())
    }

    fn pcm_out(&mut self) -> Option<PcmFrames<'_>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(PcmFrames::Interleaved {
                samples: &self.pending,
                channels: 1,
            })
        }
    }

    fn pcm_read(&mut self, frames: usize) {
        self.pending.drain(..frames.min(self.pending.len()));
    }

    fn teardown(&mut self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}
