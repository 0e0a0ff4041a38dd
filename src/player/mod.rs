// 播放器核心模块

pub mod ogg;
pub mod container;
pub mod engine;
pub mod demuxer;
pub mod decoder;
pub mod audio_queue;
pub mod sync;
pub mod manager;

#[cfg(test)]
pub(crate) mod testing;

pub use audio_queue::AudioQueueHandle;
pub use container::ContainerReader;
pub use decoder::{AudioDecoder, AudioPoll, VideoDecoder, VideoPoll};
pub use demuxer::{Demuxer, StreamHeaders, StreamKind};
pub use engine::{AudioEngine, PcmFrames, PlaneRef, VideoEngine, VideoStatus};
pub use manager::{Player, PlayerHandle};
pub use sync::{SyncManager, Tick};
