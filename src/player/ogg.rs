//! Ogg 分页层：页面解析、CRC 校验、逻辑流的包重组

use log::{debug, warn};
use std::collections::VecDeque;

/// 页面头部固定长度
pub const HEADER_LEN: usize = 27;
/// 页面最大长度（头部 + 255 段 lacing + 255*255 数据）
pub const MAX_PAGE_LEN: usize = HEADER_LEN + 255 + 255 * 255;

const CAPTURE: &[u8; 4] = b"OggS";

const FLAG_CONTINUED: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;

const CRC_TABLE: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut r = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            r = if r & 0x8000_0000 != 0 {
                (r << 1) ^ 0x04c1_1db7
            } else {
                r << 1
            };
            bit += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

/// Ogg 页面校验和（CRC-32，多项式 0x04c11db7，初值 0，不反转）
///
/// 计算时校验字段（偏移 22..26）必须为 0。
pub fn page_checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |crc, &b| {
        (crc << 8) ^ CRC_TABLE[(((crc >> 24) as u8) ^ b) as usize]
    })
}

/// 一个容器页面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub serial: u32,
    pub sequence: u32,
    pub granule: i64,
    pub continued: bool,
    pub bos: bool,
    pub eos: bool,
    pub lacing: Vec<u8>,
    pub body: Vec<u8>,
}

/// 页面解析结果
#[derive(Debug, PartialEq, Eq)]
pub enum PageParse {
    /// 解析成功，附带页面占用的字节数
    Page(Page, usize),
    /// 数据不足，需要继续读取
    Incomplete,
    /// 当前位置不是合法页面
    Invalid,
}

impl Page {
    /// 尝试从 `buf` 起始处解析一个页面
    pub fn parse(buf: &[u8]) -> PageParse {
        if buf.len() < HEADER_LEN {
            // 前缀不匹配时可以提前判定
            let n = buf.len().min(4);
            if buf[..n] != CAPTURE[..n] {
                return PageParse::Invalid;
            }
            return PageParse::Incomplete;
        }
        if &buf[..4] != CAPTURE || buf[4] != 0 {
            return PageParse::Invalid;
        }

        let flags = buf[5];
        let segments = buf[26] as usize;
        let header_len = HEADER_LEN + segments;
        if buf.len() < header_len {
            return PageParse::Incomplete;
        }
        let lacing = &buf[HEADER_LEN..header_len];
        let body_len: usize = lacing.iter().map(|&l| l as usize).sum();
        let total = header_len + body_len;
        if buf.len() < total {
            return PageParse::Incomplete;
        }

        let stored_crc = read_u32(&buf[22..26]);
        let mut crc = 0u32;
        for (i, &b) in buf[..total].iter().enumerate() {
            let b = if (22..26).contains(&i) { 0 } else { b };
            crc = (crc << 8) ^ CRC_TABLE[(((crc >> 24) as u8) ^ b) as usize];
        }
        if crc != stored_crc {
            debug!("页面校验和不匹配: 期望 {:08x}, 实际 {:08x}", stored_crc, crc);
            return PageParse::Invalid;
        }

        let page = Page {
            serial: read_u32(&buf[14..18]),
            sequence: read_u32(&buf[18..22]),
            granule: i64::from_le_bytes([
                buf[6], buf[7], buf[8], buf[9], buf[10], buf[11], buf[12], buf[13],
            ]),
            continued: flags & FLAG_CONTINUED != 0,
            bos: flags & FLAG_BOS != 0,
            eos: flags & FLAG_EOS != 0,
            lacing: lacing.to_vec(),
            body: buf[header_len..total].to_vec(),
        };
        PageParse::Page(page, total)
    }
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

/// 同步缓冲区：累积原始字节，从中切出完整页面
#[derive(Debug, Default)]
pub struct SyncBuffer {
    data: Vec<u8>,
    skipped: u64,
}

impl SyncBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为写入预留 `size` 字节，返回可写区域
    pub fn buffer(&mut self, size: usize) -> &mut [u8] {
        let start = self.data.len();
        self.data.resize(start + size, 0);
        &mut self.data[start..]
    }

    /// 确认上一次 `buffer` 中实际写入了 `written` 字节
    pub fn wrote(&mut self, reserved: usize, written: usize) {
        let keep = self.data.len() - reserved + written.min(reserved);
        self.data.truncate(keep);
    }

    /// 取出下一个完整页面；数据不足时返回 None
    pub fn page_out(&mut self) -> Option<Page> {
        loop {
            match Page::parse(&self.data) {
                PageParse::Page(page, len) => {
                    self.data.drain(..len);
                    return Some(page);
                }
                PageParse::Incomplete => return None,
                PageParse::Invalid => {
                    // 失去同步：跳到下一个 "OggS" 候选位置
                    let skip = find_capture(&self.data[1..]).map(|p| p + 1).unwrap_or_else(|| {
                        // 末尾可能是不完整的捕获字，保留最后 3 字节
                        self.data.len().saturating_sub(3).max(1)
                    });
                    let skip = skip.min(self.data.len());
                    self.skipped += skip as u64;
                    self.data.drain(..skip);
                    if self.data.is_empty() {
                        return None;
                    }
                }
            }
        }
    }

    /// 尚未组成页面的字节数
    pub fn pending(&self) -> usize {
        self.data.len()
    }

    /// 重新同步时累计跳过的字节数
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }
}

fn find_capture(data: &[u8]) -> Option<usize> {
    data.windows(CAPTURE.len()).position(|w| w == CAPTURE)
}

/// 从页面中重组出的一个解码单元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryPacket {
    pub data: Vec<u8>,
    /// 只有页面上最后一个完整包才带粒度位置
    pub granule: Option<i64>,
    pub bos: bool,
    pub eos: bool,
    pub packet_no: u64,
}

/// 单个逻辑流的包重组队列
#[derive(Debug)]
pub struct LogicalStream {
    serial: u32,
    packets: VecDeque<ElementaryPacket>,
    partial: Vec<u8>,
    expected_sequence: Option<u32>,
    packet_no: u64,
    first_packet: bool,
    eos: bool,
}

impl LogicalStream {
    pub fn new(serial: u32) -> Self {
        Self {
            serial,
            packets: VecDeque::new(),
            partial: Vec::new(),
            expected_sequence: None,
            packet_no: 0,
            first_packet: true,
            eos: false,
        }
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// 将属于本流的页面拆成包，追加到队列
    pub fn page_in(&mut self, page: &Page) {
        if page.serial != self.serial {
            warn!("页面序列号 {:x} 不属于逻辑流 {:x}，忽略", page.serial, self.serial);
            return;
        }

        let mut skip_continuation = false;
        if let Some(expected) = self.expected_sequence {
            if page.sequence != expected {
                warn!(
                    "逻辑流 {:x} 页面序号跳变: 期望 {}, 实际 {}，丢弃未完成的包",
                    self.serial, expected, page.sequence
                );
                self.partial.clear();
                skip_continuation = page.continued;
            }
        } else if page.continued {
            // 流的第一页不可能接续之前的包
            skip_continuation = true;
        }
        if page.continued && !skip_continuation && self.partial.is_empty() {
            skip_continuation = true;
        }
        if !page.continued && !self.partial.is_empty() {
            warn!("逻辑流 {:x} 的未完成包没有接续页，丢弃 {} 字节", self.serial, self.partial.len());
            self.partial.clear();
        }
        self.expected_sequence = Some(page.sequence.wrapping_add(1));

        // 最后一个在本页结束的包的下标（用于挂粒度位置）
        let last_complete = page.lacing.iter().rposition(|&l| l < 255);

        let mut offset = 0;
        for (i, &lace) in page.lacing.iter().enumerate() {
            let seg = &page.body[offset..offset + lace as usize];
            offset += lace as usize;

            if skip_continuation {
                if lace < 255 {
                    skip_continuation = false;
                }
                continue;
            }

            self.partial.extend_from_slice(seg);
            if lace < 255 {
                let granule = if Some(i) == last_complete && page.granule >= 0 {
                    Some(page.granule)
                } else {
                    None
                };
                let is_last = Some(i) == last_complete;
                self.packets.push_back(ElementaryPacket {
                    data: std::mem::take(&mut self.partial),
                    granule,
                    bos: self.first_packet,
                    eos: page.eos && is_last,
                    packet_no: self.packet_no,
                });
                self.first_packet = false;
                self.packet_no += 1;
            }
        }

        if page.eos {
            self.eos = true;
        }
    }

    /// 取出下一个完整的包
    pub fn packet_out(&mut self) -> Option<ElementaryPacket> {
        self.packets.pop_front()
    }

    pub fn has_packets(&self) -> bool {
        !self.packets.is_empty()
    }

    pub fn queued(&self) -> usize {
        self.packets.len()
    }

    /// 是否已经收到带 EOS 标记的页面
    pub fn end_of_stream(&self) -> bool {
        self.eos
    }
}

/// 页面写出：把若干包按给定方式封装成带校验和的页面字节
pub mod writer {
    use super::{page_checksum, HEADER_LEN};

    /// 一页的布局描述
    pub struct PageLayout<'a> {
        pub serial: u32,
        pub sequence: u32,
        pub granule: i64,
        pub bos: bool,
        pub eos: bool,
        pub continued: bool,
        pub packets: &'a [&'a [u8]],
        /// 最后一个包不在本页结束
        pub open_tail: bool,
    }

    /// 包长度之和超出单页的 255 个分段时 panic
    pub fn page_bytes(layout: &PageLayout<'_>) -> Vec<u8> {
        let mut lacing = Vec::new();
        let mut body = Vec::new();
        for (i, p) in layout.packets.iter().enumerate() {
            let mut len = p.len();
            while len >= 255 {
                lacing.push(255u8);
                len -= 255;
            }
            let tail_open = layout.open_tail && i + 1 == layout.packets.len();
            if !tail_open {
                lacing.push(len as u8);
            }
            body.extend_from_slice(p);
        }
        assert!(lacing.len() <= 255, "单页最多 255 个分段，实际 {}", lacing.len());
        let mut flags = 0u8;
        if layout.continued {
            flags |= 0x01;
        }
        if layout.bos {
            flags |= 0x02;
        }
        if layout.eos {
            flags |= 0x04;
        }
        let mut out = Vec::with_capacity(HEADER_LEN + lacing.len() + body.len());
        out.extend_from_slice(b"OggS");
        out.push(0);
        out.push(flags);
        out.extend_from_slice(&layout.granule.to_le_bytes());
        out.extend_from_slice(&layout.serial.to_le_bytes());
        out.extend_from_slice(&layout.sequence.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.push(lacing.len() as u8);
        out.extend_from_slice(&lacing);
        out.extend_from_slice(&body);
        let crc = page_checksum(&out);
        out[22..26].copy_from_slice(&crc.to_le_bytes());
        out
    }

    pub fn simple(serial: u32, sequence: u32, granule: i64, bos: bool, packets: &[&[u8]]) -> Vec<u8> {
        page_bytes(&PageLayout {
            serial,
            sequence,
            granule,
            bos,
            eos: false,
            continued: false,
            packets,
            open_tail: false,
        })
    }
}
