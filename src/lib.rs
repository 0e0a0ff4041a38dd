//! Ogg 容器解封装、解码节奏控制与音画同步的播放核心
//!
//! 具体的视频/音频解码由宿主通过 [`VideoEngine`] / [`AudioEngine`] 提供，
//! 显示和声音输出也由宿主负责：
//!
//! - `on_initialize`：头部解析完成后告知画面尺寸与音频参数
//! - `on_video_frame`：按播放时钟交出每一帧（所有权转移）
//! - `on_audio_ready`：预缓冲完成后交出音频队列句柄

pub mod core;
pub mod player;

pub use crate::core::{
    AudioBlock, AudioDescriptor, AudioInfo, ColorSpace, HostTicks, ManualTime, MonotonicTime, PixelFormat, Plane,
    PlaybackClock, PlaybackState, PlaybackStats, PlayerConfig, PlayerError, Result, StreamComments, TimeSource,
    VideoFrame, VideoInfo,
};
pub use crate::player::{
    AudioEngine, AudioQueueHandle, PcmFrames, PlaneRef, Player, PlayerHandle, VideoEngine, VideoStatus,
};
pub use crate::player::ogg::ElementaryPacket;
