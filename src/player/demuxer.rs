use crate::core::{PlayerError, Result};
use crate::player::container::ContainerReader;
use crate::player::engine::{AudioEngine, VideoEngine};
use crate::player::ogg::{LogicalStream, Page};
use log::{debug, info, warn};
use std::io::Read;

/// 基本流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

/// 头部阶段的结果：识别到的逻辑流序列号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeaders {
    pub video_serial: u32,
    pub audio_serial: Option<u32>,
}

/// 解封装器 - 识别逻辑流并把页面分发到各自的包队列
pub struct Demuxer<R> {
    reader: ContainerReader<R>,
    video: Option<LogicalStream>,
    audio: Option<LogicalStream>,
    discarded_pages: u64,
}

impl<R: Read> Demuxer<R> {
    pub fn new(reader: ContainerReader<R>) -> Self {
        Self {
            reader,
            video: None,
            audio: None,
            discarded_pages: 0,
        }
    }

    /// 启动扫描 + 头部补全
    ///
    /// BOS 页的首包先交给视频引擎识别，再交给音频引擎；其余流直接丢弃。
    /// 之后持续取包直到两个引擎的头部包数量都满足。任何头部解析失败都是致命的。
    pub fn read_headers(
        &mut self,
        video: &mut dyn VideoEngine,
        mut audio: Option<&mut dyn AudioEngine>,
    ) -> Result<StreamHeaders> {
        let mut video_headers = 0usize;
        let mut audio_headers = 0usize;

        // ========== 阶段一：扫描 BOS 页 ==========
        let mut scanning = true;
        while scanning {
            if self.reader.buffer_data()? == 0 {
                break;
            }
            while let Some(page) = self.reader.page_out() {
                if !page.bos {
                    // 不要丢掉这一页：交给对应的流
                    self.route(&page);
                    scanning = false;
                    break;
                }

                let mut candidate = LogicalStream::new(page.serial);
                candidate.page_in(&page);
                let Some(first) = candidate.packet_out() else {
                    debug!("BOS 页 {:x} 不含完整包，忽略", page.serial);
                    continue;
                };

                if self.video.is_none() && video.identify(&first) {
                    video
                        .header_in(&first)
                        .map_err(|e| PlayerError::header("视频", e))?;
                    video_headers = 1;
                    info!("🎬 逻辑流 {:x} 识别为视频", page.serial);
                    self.video = Some(candidate);
                } else if let Some(engine) = audio.as_deref_mut().filter(|_| self.audio.is_none()) {
                    if engine.identify(&first) {
                        engine
                            .header_in(&first)
                            .map_err(|e| PlayerError::header("音频", e))?;
                        audio_headers = 1;
                        info!("🔊 逻辑流 {:x} 识别为音频", page.serial);
                        self.audio = Some(candidate);
                    } else {
                        debug!("逻辑流 {:x} 不是可识别的编解码器，忽略", page.serial);
                        self.discarded_pages += 1;
                    }
                } else {
                    debug!("逻辑流 {:x} 不是可识别的编解码器，忽略", page.serial);
                    self.discarded_pages += 1;
                }
            }
        }

        if self.video.is_none() {
            return Err(PlayerError::NoVideoStream);
        }

        // ========== 阶段二：补全头部包 ==========
        let video_needed = video.header_count();
        let audio_needed = match (&audio, &self.audio) {
            (Some(engine), Some(_)) => engine.header_count(),
            _ => 0,
        };

        while video_headers < video_needed || audio_headers < audio_needed {
            let mut progressed = false;

            if video_headers < video_needed {
                if let Some(packet) = self.video.as_mut().and_then(|s| s.packet_out()) {
                    video
                        .header_in(&packet)
                        .map_err(|e| PlayerError::header("视频", e))?;
                    video_headers += 1;
                    progressed = true;
                }
            }
            if audio_headers < audio_needed {
                if let (Some(engine), Some(stream)) = (audio.as_deref_mut(), self.audio.as_mut()) {
                    if let Some(packet) = stream.packet_out() {
                        engine
                            .header_in(&packet)
                            .map_err(|e| PlayerError::header("音频", e))?;
                        audio_headers += 1;
                        progressed = true;
                    }
                }
            }
            if progressed {
                continue;
            }

            // 头部页必须先于其他数据到达，否则流不合规
            if let Some(page) = self.reader.page_out() {
                self.route(&page);
            } else if self.reader.buffer_data()? == 0 {
                let stream = if video_headers < video_needed { "视频" } else { "音频" };
                return Err(PlayerError::header(stream, "查找编解码器头部时到达文件末尾"));
            }
        }

        let headers = StreamHeaders {
            video_serial: self.video.as_ref().map(|s| s.serial()).unwrap_or_default(),
            audio_serial: self.audio.as_ref().map(|s| s.serial()),
        };
        debug!("头部解析完成: {:?}", headers);
        Ok(headers)
    }

    /// 把页面交给序列号匹配的流；未识别的流静默丢弃
    fn route(&mut self, page: &Page) {
        if page.bos {
            // 头部扫描之后出现的 BOS 页（链式流）不支持
            self.discarded_pages += 1;
            return;
        }
        if let Some(stream) = self.video.as_mut().filter(|s| s.serial() == page.serial) {
            stream.page_in(page);
        } else if let Some(stream) = self.audio.as_mut().filter(|s| s.serial() == page.serial) {
            stream.page_in(page);
        } else {
            self.discarded_pages += 1;
        }
    }

    /// 读一块数据并分发所有完整页面，返回读到的字节数（0 表示输入结束）
    ///
    /// 头部之后的读取错误按输入结束处理。
    pub fn pump(&mut self) -> usize {
        let n = match self.reader.buffer_data() {
            Ok(n) => n,
            Err(e) => {
                warn!("❌ 读取容器失败，按输入结束处理: {}", e);
                self.reader.mark_eof();
                0
            }
        };
        while let Some(page) = self.reader.page_out() {
            self.route(&page);
        }
        n
    }

    pub fn stream_mut(&mut self, kind: StreamKind) -> Option<&mut LogicalStream> {
        match kind {
            StreamKind::Video => self.video.as_mut(),
            StreamKind::Audio => self.audio.as_mut(),
        }
    }

    /// 不再消费该流：之后它的页面按未知流丢弃
    pub fn drop_stream(&mut self, kind: StreamKind) {
        let dropped = match kind {
            StreamKind::Video => self.video.take(),
            StreamKind::Audio => self.audio.take(),
        };
        if let Some(stream) = dropped {
            debug!("停止消费逻辑流 {:x}，丢弃 {} 个积压包", stream.serial(), stream.queued());
        }
    }

    /// 该流已解出但尚未被解码的包数
    pub fn backlog(&self, kind: StreamKind) -> usize {
        let stream = match kind {
            StreamKind::Video => self.video.as_ref(),
            StreamKind::Audio => self.audio.as_ref(),
        };
        stream.map_or(0, |s| s.queued())
    }

    /// 该流不会再有新包：已见 EOS 或输入结束，且队列为空
    pub fn stream_finished(&self, kind: StreamKind) -> bool {
        let stream = match kind {
            StreamKind::Video => self.video.as_ref(),
            StreamKind::Audio => self.audio.as_ref(),
        };
        match stream {
            Some(s) => !s.has_packets() && (s.end_of_stream() || self.reader.is_eof()),
            None => true,
        }
    }

    pub fn end_of_input(&self) -> bool {
        self.reader.is_eof()
    }

    pub fn discarded_pages(&self) -> u64 {
        self.discarded_pages
    }

    pub fn skipped_bytes(&self) -> u64 {
        self.reader.skipped_bytes()
    }
}
