use serde::{Deserialize, Serialize};

/// 像素格式（色度采样方式），三种格式都输出三个平面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    YUV420P,
    YUV422P,
    YUV444P,
}

impl PixelFormat {
    /// 色度平面的 (水平, 垂直) 下采样位移
    pub fn chroma_shift(&self) -> (u32, u32) {
        match self {
            PixelFormat::YUV420P => (1, 1),
            PixelFormat::YUV422P => (1, 0),
            PixelFormat::YUV444P => (0, 0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::YUV420P => "4:2:0",
            PixelFormat::YUV422P => "4:2:2",
            PixelFormat::YUV444P => "4:4:4",
        }
    }
}

/// 编码端声明的色彩空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpace {
    Unspecified,
    /// ITU Rec 470M (NTSC)
    Rec470M,
    /// ITU Rec 470BG (PAL)
    Rec470BG,
    Unknown(u32),
}

/// 流的注释头（vendor + 用户注释）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamComments {
    pub vendor: String,
    pub user_comments: Vec<String>,
}

/// 视频流参数，由视频引擎在头部解析完成后给出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// 编码帧尺寸（16 对齐）
    pub frame_width: u32,
    pub frame_height: u32,
    /// 有效画面区域
    pub pic_width: u32,
    pub pic_height: u32,
    pub pic_x: u32,
    pub pic_y: u32,
    pub fps_numerator: u32,
    pub fps_denominator: u32,
    pub pixel_format: PixelFormat,
    pub color_space: ColorSpace,
    pub comments: StreamComments,
}

impl VideoInfo {
    pub fn fps(&self) -> f64 {
        if self.fps_denominator == 0 {
            0.0
        } else {
            self.fps_numerator as f64 / self.fps_denominator as f64
        }
    }

    /// 单帧时长（秒）
    pub fn frame_duration(&self) -> f64 {
        if self.fps_numerator == 0 {
            0.0
        } else {
            self.fps_denominator as f64 / self.fps_numerator as f64
        }
    }

    /// 输出画面区域 `(x, y, w, h)`：起点向下取偶，终点向上取偶
    ///
    /// 偏移加宽高溢出 `u32` 时返回 None。
    pub fn display_rect(&self) -> Option<(u32, u32, u32, u32)> {
        let x = self.pic_x & !1;
        let y = self.pic_y & !1;
        let right = self.pic_x.checked_add(self.pic_width)?.checked_add(1)? & !1;
        let bottom = self.pic_y.checked_add(self.pic_height)?.checked_add(1)? & !1;
        Some((x, y, right - x, bottom - y))
    }
}

/// 音频流参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub comments: StreamComments,
}

/// 交给宿主 on_initialize 的音频描述
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDescriptor {
    pub channels: u16,
    pub sample_rate: u32,
    /// 每块采样帧数（首选块大小）
    pub block_frames: usize,
}

/// 一个像素平面（数据归本结构所有）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub data: Vec<u8>,
}

impl Plane {
    /// 第 `y` 行的有效像素
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.width as usize]
    }
}

/// 视频帧数据（Y、Cb、Cr 三个平面）
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub time: f64,          // 显示时间（秒）
    pub frame_index: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub planes: [Plane; 3],
}

/// 音频块：交错存放的 16bit 采样
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlock {
    pub frames: usize,          // 采样帧数
    pub channels: u16,
    pub sample_rate: u32,
    pub play_ms: Option<u64>,   // 相对流起点的播放时间（毫秒）
    pub data: Vec<i16>,
}

impl AudioBlock {
    /// 占用的采样内存（字节）
    pub fn byte_len(&self) -> usize {
        self.data.len() * std::mem::size_of::<i16>()
    }
}

/// 同步状态机的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Preroll,
    Running,
    Draining,
    Stopped,
}

/// 一次播放会话的统计（播放结束时返回给调用者）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStats {
    pub video_frames: u64,
    pub audio_blocks: u64,
    /// 解码完成时已经过了显示时间的帧数
    pub late_frames: u64,
    /// 被丢弃的未识别逻辑流页面
    pub discarded_pages: u64,
    /// 重新同步时跳过的字节数
    pub skipped_bytes: u64,
    /// 是否因 stop() 提前结束
    pub stopped_early: bool,
}
