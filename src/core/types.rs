use serde::{Deserialize, Serialize};

/// 音频采样格式（输出设备使用的交错格式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    I16,
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::I16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

/// 音频输出格式（采样率、声道数、采样格式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
}

impl AudioSpec {
    pub fn new(sample_rate: u32, channels: u16, format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            format,
        }
    }

    /// 一个采样帧（所有声道）的字节数
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }

    /// 每秒字节数
    pub fn bytes_per_second(&self) -> usize {
        self.frame_bytes() * self.sample_rate as usize
    }

    /// 字节数对应的播放时长（秒）
    pub fn bytes_to_seconds(&self, bytes: usize) -> f64 {
        let per_second = self.bytes_per_second();
        if per_second == 0 {
            return 0.0;
        }
        bytes as f64 / per_second as f64
    }
}

impl Default for AudioSpec {
    fn default() -> Self {
        Self::new(44100, 2, SampleFormat::I16)
    }
}

/// 视频帧数据（YUV420P，三个平面各自独立持有内存）
///
/// 解码器内部的帧缓冲会在下一次解码时被覆盖，
/// 所以这里的平面数据都是从解码器帧中深拷贝出来的。
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub pts: f64, // 显示时间戳（秒）
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

impl VideoFrame {
    /// 从带 stride 的三个平面拷贝出紧凑排列的帧
    pub fn from_planes(
        pts: f64,
        width: u32,
        height: u32,
        planes: [(&[u8], usize); 3],
    ) -> Self {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = chroma_size(w, h);
        let [(y, y_stride), (u, u_stride), (v, v_stride)] = planes;

        Self {
            pts,
            width,
            height,
            y: copy_plane(y, y_stride, w, h),
            u: copy_plane(u, u_stride, cw, ch),
            v: copy_plane(v, v_stride, cw, ch),
        }
    }

    pub fn chroma_width(&self) -> u32 {
        chroma_size(self.width as usize, self.height as usize).0 as u32
    }

    pub fn chroma_height(&self) -> u32 {
        chroma_size(self.width as usize, self.height as usize).1 as u32
    }
}

/// U/V 平面尺寸（宽高各减半，奇数向上取整，与 FFmpeg 的色度平面一致）
pub fn chroma_size(width: usize, height: usize) -> (usize, usize) {
    ((width + 1) / 2, (height + 1) / 2)
}

/// 按行拷贝一个平面，去掉行尾的 padding
///
/// 源数据不足时剩余部分填 0，不会越界。
pub fn copy_plane(src: &[u8], stride: usize, row_bytes: usize, rows: usize) -> Vec<u8> {
    let total = row_bytes * rows;

    // 快速路径：没有 padding，一次拷贝
    if stride == row_bytes && src.len() >= total {
        return src[..total].to_vec();
    }

    let mut data = vec![0u8; total];
    for row in 0..rows {
        let src_offset = row * stride;
        let Some(line) = src.get(src_offset..src_offset + row_bytes) else {
            break;
        };
        let dst_offset = row * row_bytes;
        data[dst_offset..dst_offset + row_bytes].copy_from_slice(line);
    }
    data
}

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackState::Stopped
    }
}

/// 媒体信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration: f64, // 总时长（秒）
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub video_codec: String,
    pub audio_codec: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for MediaInfo {
    fn default() -> Self {
        Self {
            duration: 0.0,
            width: 0,
            height: 0,
            fps: 0.0,
            video_codec: String::new(),
            audio_codec: String::new(),
            sample_rate: 0,
            channels: 0,
        }
    }
}

/// 播放事件（异步投递给 UI 线程）
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    /// 播放进度（秒）
    Progress { current: f64, total: f64 },
    /// 自然播放结束（会话已停止）
    Finished,
}
