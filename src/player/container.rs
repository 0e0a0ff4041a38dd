use crate::core::{PlayerError, Result};
use crate::player::ogg::{Page, SyncBuffer};
use log::{debug, info};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

/// 容器读取器 - 增量读取原始字节并切出页面
pub struct ContainerReader<R> {
    source: R,
    sync: SyncBuffer,
    chunk_size: usize,
    bytes_read: u64,
    eof: bool,
}

impl ContainerReader<BufReader<File>> {
    /// 打开媒体文件
    pub fn open(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref();
        info!("正在打开文件: {}", path.display());
        let file = File::open(path)
            .map_err(|e| PlayerError::OpenError(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(BufReader::new(file), chunk_size))
    }
}

impl<R: Read> ContainerReader<R> {
    pub fn new(source: R, chunk_size: usize) -> Self {
        Self {
            source,
            sync: SyncBuffer::new(),
            chunk_size: chunk_size.max(1),
            bytes_read: 0,
            eof: false,
        }
    }

    /// 再读入一块数据，返回读到的字节数（0 表示输入结束）
    pub fn buffer_data(&mut self) -> Result<usize> {
        if self.eof {
            return Ok(0);
        }
        let chunk = self.chunk_size;
        let buf = self.sync.buffer(chunk);
        let read = loop {
            match self.source.read(buf) {
                Ok(n) => break Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => break Err(e),
            }
        };
        match read {
            Ok(n) => {
                self.sync.wrote(chunk, n);
                self.bytes_read += n as u64;
                if n == 0 {
                    debug!("📄 容器读取到达末尾（共 {} 字节）", self.bytes_read);
                    self.eof = true;
                }
                Ok(n)
            }
            Err(e) => {
                self.sync.wrote(chunk, 0);
                Err(e.into())
            }
        }
    }

    /// 取出下一个完整页面
    pub fn page_out(&mut self) -> Option<Page> {
        self.sync.page_out()
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// 标记输入结束（读取出错后不再继续读）
    pub fn mark_eof(&mut self) {
        self.eof = true;
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn skipped_bytes(&self) -> u64 {
        self.sync.skipped_bytes()
    }
}
