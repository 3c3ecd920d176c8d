use crate::core::{MediaInfo, PlayerError, Result};
use crate::player::demuxer_source::{DemuxedPacket, Demuxer};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media, Rational};
use log::{debug, info};

fn to_seconds(time_base: Rational) -> f64 {
    if time_base.denominator() == 0 {
        return 0.0;
    }
    time_base.numerator() as f64 / time_base.denominator() as f64
}

/// 解封装器 - 负责读取媒体文件并分离音视频流
pub struct FfmpegDemuxer {
    input_ctx: format::context::Input,
    video_stream_index: usize,
    audio_stream_index: usize,
    video_time_base: f64,
    audio_time_base: f64,
    media_info: MediaInfo,  // 缓存媒体信息
    source_path: String,    // 媒体源路径（用于描述）
}

impl FfmpegDemuxer {
    /// 打开媒体文件（要求同时存在音频流和视频流）
    pub fn open(path: &str) -> Result<Self> {
        info!("正在打开文件: {}", path);

        let input_ctx = format::input(&path)
            .map_err(|e| PlayerError::OpenError(format!("{}: {}", path, e)))?;

        let audio_stream = input_ctx
            .streams()
            .best(media::Type::Audio)
            .ok_or(PlayerError::NoAudioStream)?;
        let video_stream = input_ctx
            .streams()
            .best(media::Type::Video)
            .ok_or(PlayerError::NoVideoStream)?;

        let audio_stream_index = audio_stream.index();
        let video_stream_index = video_stream.index();
        let audio_time_base = to_seconds(audio_stream.time_base());
        let video_time_base = to_seconds(video_stream.time_base());

        debug!("视频流索引: {}, time_base = {}", video_stream_index, video_time_base);
        debug!("音频流索引: {}, time_base = {}", audio_stream_index, audio_time_base);

        let media_info = Self::extract_media_info(&input_ctx, video_stream_index, audio_stream_index)?;

        info!(
            "✅ 文件已打开: 时长 {:.2}s, {}x{} {} / {} Hz {} 声道 {}",
            media_info.duration,
            media_info.width,
            media_info.height,
            media_info.video_codec,
            media_info.sample_rate,
            media_info.channels,
            media_info.audio_codec
        );

        Ok(Self {
            input_ctx,
            video_stream_index,
            audio_stream_index,
            video_time_base,
            audio_time_base,
            media_info,
            source_path: path.to_string(),
        })
    }

    /// 提取媒体信息（内部使用）
    fn extract_media_info(
        input_ctx: &format::context::Input,
        video_index: usize,
        audio_index: usize,
    ) -> Result<MediaInfo> {
        let video_stream = input_ctx.stream(video_index).ok_or(PlayerError::NoVideoStream)?;
        let video_params = video_stream.parameters();
        let video_codec_name = video_params.id().name().to_string();
        let video_decoder = ffmpeg::codec::context::Context::from_parameters(video_params)?
            .decoder()
            .video()?;

        let fps = video_stream.avg_frame_rate();
        let fps = if fps.denominator() == 0 {
            0.0
        } else {
            fps.numerator() as f64 / fps.denominator() as f64
        };

        let audio_stream = input_ctx.stream(audio_index).ok_or(PlayerError::NoAudioStream)?;
        let audio_params = audio_stream.parameters();
        let audio_codec_name = audio_params.id().name().to_string();
        let audio_decoder = ffmpeg::codec::context::Context::from_parameters(audio_params)?
            .decoder()
            .audio()?;

        // 容器时长单位为 AV_TIME_BASE（微秒）；未知时为负数
        let duration = input_ctx.duration();
        let duration = if duration > 0 {
            duration as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
        } else {
            0.0
        };

        Ok(MediaInfo {
            duration,
            width: video_decoder.width(),
            height: video_decoder.height(),
            fps,
            video_codec: video_codec_name,
            audio_codec: audio_codec_name,
            sample_rate: audio_decoder.rate(),
            channels: audio_decoder.channels(),
        })
    }

    /// 获取流（用于创建解码器）
    pub fn stream(&self, index: usize) -> Option<format::stream::Stream<'_>> {
        self.input_ctx.stream(index)
    }

    fn time_base_of(&self, stream_index: usize) -> Option<f64> {
        if stream_index == self.audio_stream_index {
            Some(self.audio_time_base)
        } else if stream_index == self.video_stream_index {
            Some(self.video_time_base)
        } else {
            None
        }
    }
}

impl Demuxer for FfmpegDemuxer {
    type Packet = ffmpeg::Packet;

    fn read_packet(&mut self) -> Result<Option<DemuxedPacket<ffmpeg::Packet>>> {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input_ctx) {
            Ok(()) => {
                let stream_index = packet.stream();
                let pts = match (packet.pts(), self.time_base_of(stream_index)) {
                    (Some(pts), Some(time_base)) => Some(pts as f64 * time_base),
                    _ => None,
                };
                Ok(Some(DemuxedPacket {
                    stream_index,
                    pts,
                    packet,
                }))
            }
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 以视频流为参考向后 Seek
    fn seek(&mut self, seconds: f64) -> Result<()> {
        if self.video_time_base <= 0.0 {
            return Err(PlayerError::DecodeError("视频流 time_base 无效".to_string()));
        }
        let timestamp = (seconds.max(0.0) / self.video_time_base) as i64;
        // 用 av_seek_frame 以指定流为参考，ffmpeg-next 的 seek() 只支持默认流
        let ret = unsafe {
            ffmpeg::ffi::av_seek_frame(
                self.input_ctx.as_mut_ptr(),
                self.video_stream_index as i32,
                timestamp,
                ffmpeg::ffi::AVSEEK_FLAG_BACKWARD as i32,
            )
        };
        if ret < 0 {
            return Err(ffmpeg::Error::from(ret).into());
        }
        debug!("Seek 到 {:.3}s (视频流 ts = {})", seconds, timestamp);
        Ok(())
    }

    fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    fn audio_stream_index(&self) -> usize {
        self.audio_stream_index
    }

    fn video_stream_index(&self) -> usize {
        self.video_stream_index
    }

    fn description(&self) -> String {
        format!("FFmpeg Demuxer: {}", self.source_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_base_to_seconds() {
        assert_eq!(to_seconds(Rational::new(1, 1000)), 0.001);
        assert_eq!(to_seconds(Rational::new(1, 0)), 0.0);
    }

    #[test]
    fn test_open_missing_file_is_open_error() {
        ffmpeg::init().unwrap();
        let err = FfmpegDemuxer::open("/definitely/not/here.mp4").err().unwrap();
        assert!(matches!(err, PlayerError::OpenError(_)));
        assert!(err.is_open_error());
    }
}
