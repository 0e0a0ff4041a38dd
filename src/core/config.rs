use crate::core::error::{PlayerError, Result};
use serde::{Deserialize, Serialize};

/// 播放核心的可调参数
///
/// 所有字段都有默认值，JSON 中缺失的字段使用默认值填充：
/// ```
/// let cfg = ogv_player::PlayerConfig::from_json(r#"{ "audio_preroll_blocks": 8 }"#).unwrap();
/// assert_eq!(cfg.audio_preroll_blocks, 8);
/// assert_eq!(cfg.read_chunk_size, 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// 每次从容器读取的最大字节数
    pub read_chunk_size: usize,
    /// 每个音频块的采样帧数（首选块大小）
    pub audio_block_frames: usize,
    /// 预缓冲完成所需的音频块数
    pub audio_preroll_blocks: usize,
    /// 音频队列的内存上限（字节）
    pub audio_buffer_bytes: usize,
    /// 视频队列最多持有的未显示帧数
    pub video_queue_frames: usize,
    /// 根据解码进度自动调整后处理等级
    pub adaptive_quality: bool,
    /// 空闲时单次休眠的上限（毫秒）
    pub max_idle_sleep_ms: u64,
    /// 音频队列满且宿主一直不取时，等待多久后放弃音频（毫秒，按播放时钟）
    pub audio_stall_ms: u64,
    /// 音频受背压时，其逻辑流最多积压的未解码包数；达到后暂停读取容器
    pub max_packet_backlog: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 4096,
            audio_block_frames: 1024,
            audio_preroll_blocks: 4,
            audio_buffer_bytes: 1 << 20,
            video_queue_frames: 1,
            adaptive_quality: true,
            max_idle_sleep_ms: 500,
            audio_stall_ms: 1000,
            max_packet_backlog: 64,
        }
    }
}

/// 按立体声 16bit 估算一个音频块的字节数
const ASSUMED_CHANNELS: usize = 2;

impl PlayerConfig {
    /// 从 JSON 字符串加载配置并校验
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PlayerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.read_chunk_size == 0 {
            return Err(PlayerError::ConfigError("read_chunk_size 不能为 0".to_string()));
        }
        if self.audio_block_frames == 0 {
            return Err(PlayerError::ConfigError("audio_block_frames 不能为 0".to_string()));
        }
        if self.audio_preroll_blocks == 0 {
            return Err(PlayerError::ConfigError("audio_preroll_blocks 不能为 0".to_string()));
        }
        if self.video_queue_frames == 0 {
            return Err(PlayerError::ConfigError("video_queue_frames 不能为 0".to_string()));
        }
        if self.max_packet_backlog == 0 {
            return Err(PlayerError::ConfigError("max_packet_backlog 不能为 0".to_string()));
        }

        // 内存上限必须容得下预缓冲，否则永远无法离开 Preroll
        let preroll_bytes = self.audio_preroll_blocks * self.audio_block_bytes(ASSUMED_CHANNELS);
        if self.audio_buffer_bytes < preroll_bytes {
            return Err(PlayerError::ConfigError(format!(
                "audio_buffer_bytes ({}) 小于预缓冲所需的 {} 字节",
                self.audio_buffer_bytes, preroll_bytes
            )));
        }
        Ok(())
    }

    /// 一个满块在给定声道数下占用的字节数
    pub fn audio_block_bytes(&self, channels: usize) -> usize {
        self.audio_block_frames * channels * std::mem::size_of::<i16>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PlayerConfig::default().validate().is_ok());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg = PlayerConfig::from_json(r#"{ "video_queue_frames": 3, "adaptive_quality": false }"#).unwrap();
        assert_eq!(cfg.video_queue_frames, 3);
        assert!(!cfg.adaptive_quality);
        assert_eq!(cfg.audio_block_frames, 1024);
    }

    #[test]
    fn ceiling_smaller_than_preroll_is_rejected() {
        let cfg = PlayerConfig {
            audio_buffer_bytes: 1024,
            ..PlayerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(PlayerError::ConfigError(_))));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            PlayerConfig::from_json("{ not json"),
            Err(PlayerError::JsonError(_))
        ));
    }

    #[test]
    fn zero_values_are_rejected() {
        let cfg = PlayerConfig {
            read_chunk_size: 0,
            ..PlayerConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = PlayerConfig {
            max_packet_backlog: 0,
            ..PlayerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
