// 播放器核心模块

pub mod packet_queue;
pub mod ring_buffer;
pub mod session;
pub mod audio_output;
pub mod headless_output;
pub mod demuxer_source;  // 媒体后端抽象接口
pub mod demuxer;
pub mod decoder;
pub mod demuxer_factory; // FFmpeg 媒体后端
pub mod demuxer_thread;  // 解封装线程
pub mod decode_thread;   // 音视频解码线程
pub mod frame_sink;
pub mod manager;

use std::process;
use std::thread;

pub use audio_output::{AudioBackend, AudioDevice, AudioSink, CpalAudioBackend, SinkState};
pub use decoder::{FfmpegAudioDecoder, FfmpegVideoDecoder};
pub use demuxer::FfmpegDemuxer;
pub use demuxer_factory::FfmpegBackend;
pub use demuxer_source::{
    AudioDecoder, Decoded, DemuxedPacket, Demuxer, MediaBackend, OpenedMedia, VideoDecoder,
};
pub use frame_sink::{FrameSink, LatestFrameSink, NullFrameSink};
pub use headless_output::HeadlessAudioBackend;
pub use manager::PlaybackManager;
pub use packet_queue::PacketQueue;
pub use ring_buffer::AudioRingBuffer;

pub(crate) fn log_ctx() -> String {
    format!("[pid:{}-tid:{:?}]", process::id(), thread::current().id())
}
