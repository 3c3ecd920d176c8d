use crate::core::{AudioSpec, PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 播放引擎配置
///
/// 所有字段都有默认值，JSON 里只需写要覆盖的部分：
/// ```json
/// { "max_video_packets": 60, "output": { "sample_rate": 48000, "channels": 2, "format": "i16" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// 输出设备格式（重采样目标）
    pub output: AudioSpec,
    /// 音频环形缓冲区容量（字节）
    pub ring_buffer_capacity: usize,
    /// 音频包队列上限，超过后解封装线程等待
    pub max_audio_packets: Option<usize>,
    /// 视频包队列上限（默认不限制，视频包通常更稀疏）
    pub max_video_packets: Option<usize>,
    /// 暂停时的轮询间隔
    pub pause_poll_ms: u64,
    /// 队列满时的等待间隔
    pub backpressure_sleep_ms: u64,
    /// 读到文件末尾后的空闲间隔
    pub eof_idle_ms: u64,
    /// 音频回调等待数据的上限
    pub audio_pull_timeout_ms: u64,
    /// 视频帧落后音频时钟超过该值（秒）即丢弃
    pub late_frame_tolerance: f64,
    /// 连续读包失败多少次后按文件结束处理
    pub max_consecutive_read_errors: u32,
    /// 事件通道容量；宿主不读取时，满了之后的进度事件会被丢弃
    pub event_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            output: AudioSpec::default(),
            ring_buffer_capacity: 1 << 20, // 1MB
            max_audio_packets: Some(30),
            max_video_packets: None,
            pause_poll_ms: 10,
            backpressure_sleep_ms: 5,
            eof_idle_ms: 10,
            audio_pull_timeout_ms: 5,
            late_frame_tolerance: 0.1,
            max_consecutive_read_errors: 64,
            event_capacity: 256,
        }
    }
}

impl PlayerConfig {
    /// 从 JSON 字符串解析并校验
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PlayerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.output.sample_rate == 0 {
            return Err(PlayerError::Config("输出采样率不能为 0".to_string()));
        }
        if self.output.channels == 0 {
            return Err(PlayerError::Config("输出声道数不能为 0".to_string()));
        }
        if self.ring_buffer_capacity < self.output.frame_bytes() {
            return Err(PlayerError::Config(format!(
                "环形缓冲区容量 {} 字节小于一个采样帧",
                self.ring_buffer_capacity
            )));
        }
        if !(self.late_frame_tolerance >= 0.0) {
            return Err(PlayerError::Config(
                "late_frame_tolerance 必须是非负数".to_string(),
            ));
        }
        if matches!(self.max_audio_packets, Some(0)) || matches!(self.max_video_packets, Some(0)) {
            return Err(PlayerError::Config("包队列上限不能为 0".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(PlayerError::Config("事件通道容量不能为 0".to_string()));
        }
        Ok(())
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }

    pub fn backpressure_sleep(&self) -> Duration {
        Duration::from_millis(self.backpressure_sleep_ms)
    }

    pub fn eof_idle(&self) -> Duration {
        Duration::from_millis(self.eof_idle_ms)
    }

    pub fn audio_pull_timeout(&self) -> Duration {
        Duration::from_millis(self.audio_pull_timeout_ms)
    }

    /// 是否需要对解封装线程施加背压
    pub fn should_throttle(&self, audio_packets: usize, video_packets: usize) -> bool {
        let audio_full = self.max_audio_packets.map_or(false, |max| audio_packets >= max);
        let video_full = self.max_video_packets.map_or(false, |max| video_packets >= max);
        audio_full || video_full
    }
}
