use crate::core::{AudioSpec, MediaInfo, Result, VideoFrame};

/// 解封装出的一个压缩包
pub struct DemuxedPacket<P> {
    pub stream_index: usize,
    /// 显示时间戳（秒），容器没有给出时为 None
    pub pts: Option<f64>,
    pub packet: P,
}

/// Demuxer 数据源抽象接口
///
/// 不同的媒体后端（FFmpeg、测试用的合成流等）实现这个接口。
pub trait Demuxer: Send {
    type Packet: Send + 'static;

    /// 读取下一个媒体包
    ///
    /// 返回：
    /// - Ok(Some(packet)): 成功读取一个包
    /// - Ok(None): 到达文件末尾
    /// - Err(e): 读取错误（调用方可以跳过后继续读）
    fn read_packet(&mut self) -> Result<Option<DemuxedPacket<Self::Packet>>>;

    /// 向后 Seek 到不晚于指定位置（秒）的关键帧，以视频流为参考
    fn seek(&mut self, seconds: f64) -> Result<()>;

    /// 获取媒体信息
    fn media_info(&self) -> &MediaInfo;

    fn audio_stream_index(&self) -> usize;

    fn video_stream_index(&self) -> usize;

    /// 获取描述信息（用于调试）
    fn description(&self) -> String;
}

/// 解码器 receive 的结果
#[derive(Debug, PartialEq)]
pub enum Decoded<T> {
    Frame(T),
    /// 需要更多输入
    Again,
    /// 已经完全冲刷
    Eof,
}

/// 音频解码器：输出已经重采样到输出设备格式的 PCM 字节
pub trait AudioDecoder: Send {
    type Packet;

    /// 送入一个包（包在这里被消费并释放）；None 表示结束标记
    fn send_packet(&mut self, packet: Option<Self::Packet>) -> Result<()>;

    fn receive(&mut self) -> Result<Decoded<Vec<u8>>>;

    /// 清空解码器内部状态
    fn flush(&mut self);
}

/// 视频解码器：输出与解码器内部缓冲无关的独立帧
pub trait VideoDecoder: Send {
    type Packet;

    fn send_packet(&mut self, packet: Option<Self::Packet>) -> Result<()>;

    fn receive(&mut self) -> Result<Decoded<VideoFrame>>;

    fn flush(&mut self);
}

/// 打开后的媒体：容器 + 两个解码器
pub struct OpenedMedia<M: MediaBackend> {
    pub demuxer: M::Demuxer,
    pub audio_decoder: M::AudioDecoder,
    pub video_decoder: M::VideoDecoder,
}

impl<M: MediaBackend> OpenedMedia<M> {
    pub fn media_info(&self) -> &MediaInfo {
        self.demuxer.media_info()
    }

    /// 清空两个解码器的内部状态（Seek 后使用）
    pub fn flush_decoders(&mut self) {
        self.audio_decoder.flush();
        self.video_decoder.flush();
    }
}

/// 媒体后端：把 url 打开成一组容器与解码器
pub trait MediaBackend: Send + Sync + Sized + 'static {
    type Packet: Send + 'static;
    type Demuxer: Demuxer<Packet = Self::Packet> + 'static;
    type AudioDecoder: AudioDecoder<Packet = Self::Packet> + 'static;
    type VideoDecoder: VideoDecoder<Packet = Self::Packet> + 'static;

    /// 打开媒体；音频解码器输出 output 格式的 PCM
    fn open(&self, url: &str, output: &AudioSpec) -> Result<OpenedMedia<Self>>;
}
