use crate::core::{AudioSpec, PlayerError, Result};
use crate::player::decoder::{FfmpegAudioDecoder, FfmpegVideoDecoder};
use crate::player::demuxer::FfmpegDemuxer;
use crate::player::demuxer_source::{Demuxer, MediaBackend, OpenedMedia};
use ffmpeg_next as ffmpeg;
use log::info;
use std::sync::OnceLock;

static FFMPEG_INIT: OnceLock<std::result::Result<(), ffmpeg::Error>> = OnceLock::new();

/// FFmpeg 媒体后端 - 负责把 url 打开成 Demuxer + 音视频解码器
///
/// 使用方法：
/// ```no_run
/// use myy_engine::core::AudioSpec;
/// use myy_engine::player::{FfmpegBackend, MediaBackend};
///
/// let backend = FfmpegBackend::new()?;
/// let media = backend.open("movie.mp4", &AudioSpec::default())?;
/// println!("时长 {:.2}s", media.media_info().duration);
/// # Ok::<(), myy_engine::core::PlayerError>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FfmpegBackend {
    _private: (),
}

impl FfmpegBackend {
    /// 创建后端（进程内只初始化一次 FFmpeg）
    pub fn new() -> Result<Self> {
        let init = FFMPEG_INIT.get_or_init(|| {
            let result = ffmpeg::init();
            if result.is_ok() {
                info!("FFmpeg 初始化完成");
            }
            result
        });
        match init {
            Ok(()) => Ok(Self { _private: () }),
            Err(e) => Err(PlayerError::FFmpegError(*e)),
        }
    }
}

impl MediaBackend for FfmpegBackend {
    type Packet = ffmpeg::Packet;
    type Demuxer = FfmpegDemuxer;
    type AudioDecoder = FfmpegAudioDecoder;
    type VideoDecoder = FfmpegVideoDecoder;

    fn open(&self, url: &str, output: &AudioSpec) -> Result<OpenedMedia<Self>> {
        info!("🔨 创建 Demuxer: {}", url);
        let demuxer = FfmpegDemuxer::open(url)?;

        let audio_stream = demuxer
            .stream(demuxer.audio_stream_index())
            .ok_or(PlayerError::NoAudioStream)?;
        let audio_decoder = FfmpegAudioDecoder::from_stream(audio_stream, *output)?;

        let video_stream = demuxer
            .stream(demuxer.video_stream_index())
            .ok_or(PlayerError::NoVideoStream)?;
        let video_decoder = FfmpegVideoDecoder::from_stream(video_stream)?;

        info!("✅ {} 已就绪", demuxer.description());
        Ok(OpenedMedia {
            demuxer,
            audio_decoder,
            video_decoder,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        assert!(FfmpegBackend::new().is_ok());
        assert!(FfmpegBackend::new().is_ok());
    }

    #[test]
    fn test_open_missing_url_fails() {
        let backend = FfmpegBackend::new().unwrap();
        let result = backend.open("/no/such/file.mkv", &AudioSpec::default());
        assert!(matches!(result, Err(ref e) if e.is_open_error()));
    }
}
