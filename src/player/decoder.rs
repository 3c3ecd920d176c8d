use crate::core::{AudioSpec, Result, SampleFormat, VideoFrame};
use crate::player::demuxer_source::{AudioDecoder, Decoded, VideoDecoder};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::{sample, Pixel, Sample};
use ffmpeg_next::{codec, format, software, util};
use log::{debug, warn};

/// 计算帧的显示时间（秒）
///
/// 优先 best_effort_timestamp，其次 pts，都没有时为 0。
pub fn presentation_time(best_effort: Option<i64>, pts: Option<i64>, time_base: f64) -> f64 {
    best_effort.or(pts).map(|ts| ts as f64 * time_base).unwrap_or(0.0)
}

/// 重采样一帧需要的输出容量（样本数）
///
/// 重采样器内部可能还有上一帧留下的 delay 个输入样本，
/// 按 (delay + in_samples) * out_rate / in_rate 向上取整，保证一次取完。
pub fn output_capacity(delay: usize, in_samples: usize, in_rate: u32, out_rate: u32) -> usize {
    let total = (delay + in_samples) as u64;
    if in_rate == 0 {
        return total as usize;
    }
    let in_rate = in_rate as u64;
    ((total * out_rate as u64 + in_rate - 1) / in_rate) as usize
}

fn time_base_of(stream: &format::stream::Stream) -> f64 {
    let time_base = stream.time_base();
    if time_base.denominator() == 0 {
        return 0.0;
    }
    time_base.numerator() as f64 / time_base.denominator() as f64
}

fn is_again(error: &ffmpeg::Error) -> bool {
    matches!(error, ffmpeg::Error::Other { errno } if *errno == ffmpeg::error::EAGAIN)
}

// ============= 音频 =============

/// 重采样器源格式：(采样格式, 声道布局, 采样率)
type AudioSource = (Sample, ChannelLayout, u32);

/// 重采样器：任意源格式 → 输出设备格式（交错排列）
struct Resampler {
    context: software::resampling::Context,
    source: AudioSource,
    output: AudioSpec,
}

impl Resampler {
    fn new(source: AudioSource, output: AudioSpec) -> Result<Self> {
        let (format, layout, rate) = source;
        debug!(
            "🔧 初始化音频重采样器: {:?} {}Hz/{}ch → {:?} {}Hz/{}ch",
            format,
            rate,
            layout.channels(),
            output.format,
            output.sample_rate,
            output.channels
        );

        let context = software::resampling::Context::get(
            format,
            layout,
            rate,
            Self::target_format(output.format),
            Self::target_layout(output.channels),
            output.sample_rate,
        )?;

        Ok(Self {
            context,
            source,
            output,
        })
    }

    fn target_format(format: SampleFormat) -> Sample {
        match format {
            SampleFormat::I16 => Sample::I16(sample::Type::Packed),
            SampleFormat::F32 => Sample::F32(sample::Type::Packed),
        }
    }

    fn target_layout(channels: u16) -> ChannelLayout {
        ChannelLayout::default(channels as i32)
    }

    fn new_output_frame(&self, samples: usize) -> util::frame::Audio {
        let mut frame = util::frame::Audio::new(
            Self::target_format(self.output.format),
            samples,
            Self::target_layout(self.output.channels),
        );
        frame.set_rate(self.output.sample_rate);
        frame
    }

    fn convert(&mut self, input: &util::frame::Audio) -> Result<Vec<u8>> {
        let delay = self
            .context
            .delay()
            .map(|d| d.input.max(0) as usize)
            .unwrap_or(0);
        let capacity = output_capacity(delay, input.samples(), self.source.2, self.output.sample_rate);
        if capacity == 0 {
            return Ok(Vec::new());
        }

        let mut output = self.new_output_frame(capacity);
        self.context.run(input, &mut output)?;
        Ok(self.take_bytes(&output))
    }

    /// 取出重采样器内部剩余的样本
    fn flush(&mut self) -> Result<Vec<u8>> {
        let pending = self
            .context
            .delay()
            .map(|d| d.output.max(0) as usize)
            .unwrap_or(0);
        if pending == 0 {
            return Ok(Vec::new());
        }

        let mut output = self.new_output_frame(pending + 32);
        self.context.flush(&mut output)?;
        Ok(self.take_bytes(&output))
    }

    fn take_bytes(&self, frame: &util::frame::Audio) -> Vec<u8> {
        let data = frame.data(0);
        let len = (frame.samples() * self.output.frame_bytes()).min(data.len());
        data[..len].to_vec()
    }
}

/// 解码帧 → 设备格式 PCM，源格式/声道布局/采样率变化时重建重采样器
struct AudioConverter {
    resampler: Option<Resampler>,
    output: AudioSpec,
}

impl AudioConverter {
    fn new(output: AudioSpec) -> Self {
        Self {
            resampler: None,
            output,
        }
    }

    fn convert(&mut self, frame: &mut util::frame::Audio) -> Result<Vec<u8>> {
        // 有些容器不填声道布局，按声道数取默认布局
        let mut layout = frame.channel_layout();
        if layout.is_empty() {
            layout = ChannelLayout::default(frame.channels() as i32);
            frame.set_channel_layout(layout);
        }
        let source = (frame.format(), layout, frame.rate());

        let rebuild = match &self.resampler {
            Some(resampler) => resampler.source != source,
            None => true,
        };
        if rebuild {
            self.resampler = Some(Resampler::new(source, self.output)?);
        }

        match self.resampler.as_mut() {
            Some(resampler) => resampler.convert(frame),
            None => Ok(Vec::new()),
        }
    }

    /// 文件结束时取出重采样器里剩下的样本
    fn drain(&mut self) -> Result<Vec<u8>> {
        match self.resampler.as_mut() {
            Some(resampler) => resampler.flush(),
            None => Ok(Vec::new()),
        }
    }

    /// 丢掉 Seek 之前的残留样本
    fn reset(&mut self) {
        self.resampler = None;
    }
}

/// FFmpeg 音频解码器，输出设备格式的交错 PCM
pub struct FfmpegAudioDecoder {
    decoder: codec::decoder::Audio,
    converter: AudioConverter,
    tail_drained: bool,
}

// SwrContext 不是 Send，但解码器只会被音频解码线程独占使用
unsafe impl Send for FfmpegAudioDecoder {}

impl FfmpegAudioDecoder {
    pub fn from_stream(stream: format::stream::Stream, output: AudioSpec) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().audio()?;

        debug!(
            "音频解码器: {} Hz, {} 声道, 格式: {:?}, time_base = {} → 目标: {} Hz, {} 声道 {:?}",
            decoder.rate(),
            decoder.channels(),
            decoder.format(),
            time_base_of(&stream),
            output.sample_rate,
            output.channels,
            output.format
        );

        Ok(Self {
            decoder,
            converter: AudioConverter::new(output),
            tail_drained: false,
        })
    }
}

impl AudioDecoder for FfmpegAudioDecoder {
    type Packet = ffmpeg::Packet;

    fn send_packet(&mut self, packet: Option<ffmpeg::Packet>) -> Result<()> {
        let result = match packet {
            Some(packet) => self.decoder.send_packet(&packet),
            None => self.decoder.send_eof(),
        };
        match result {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::Eof) => {
                debug!("音频解码器已处于 EOF 状态，忽略本次输入");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn receive(&mut self) -> Result<Decoded<Vec<u8>>> {
        loop {
            let mut frame = util::frame::Audio::empty();
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => {
                    let bytes = self.converter.convert(&mut frame)?;
                    // 重采样器还在积攒样本，继续取下一帧
                    if bytes.is_empty() {
                        continue;
                    }
                    return Ok(Decoded::Frame(bytes));
                }
                Err(ref e) if is_again(e) => return Ok(Decoded::Again),
                Err(ffmpeg::Error::Eof) => {
                    if !self.tail_drained {
                        self.tail_drained = true;
                        let tail = self.converter.drain()?;
                        if !tail.is_empty() {
                            return Ok(Decoded::Frame(tail));
                        }
                    }
                    return Ok(Decoded::Eof);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn flush(&mut self) {
        self.decoder.flush();
        self.converter.reset();
        self.tail_drained = false;
    }
}

// ============= 视频 =============

/// 非 YUV420P 源帧的格式转换器
struct Scaler {
    context: software::scaling::Context,
    source: (Pixel, u32, u32),
}

/// 解码帧 → 独立的 YUV420P 帧（深拷贝），其他像素格式先经 swscale 转换
#[derive(Default)]
struct YuvConverter {
    scaler: Option<Scaler>,
}

impl YuvConverter {
    fn convert(&mut self, pts: f64, frame: &util::frame::Video) -> Result<VideoFrame> {
        let (width, height) = (frame.width(), frame.height());

        if frame.format() == Pixel::YUV420P {
            return Ok(copy_yuv(pts, width, height, frame));
        }

        let source = (frame.format(), width, height);
        let rebuild = match &self.scaler {
            Some(scaler) => scaler.source != source,
            None => true,
        };
        if rebuild {
            debug!("🔧 初始化像素格式转换: {:?} → YUV420P ({}x{})", frame.format(), width, height);
            let context = software::scaling::Context::get(
                frame.format(),
                width,
                height,
                Pixel::YUV420P,
                width,
                height,
                software::scaling::Flags::BILINEAR,
            )?;
            self.scaler = Some(Scaler { context, source });
        }

        let mut converted = util::frame::Video::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler.context.run(frame, &mut converted)?;
        }
        Ok(copy_yuv(pts, width, height, &converted))
    }
}

fn copy_yuv(pts: f64, width: u32, height: u32, frame: &util::frame::Video) -> VideoFrame {
    VideoFrame::from_planes(
        pts,
        width,
        height,
        [
            (frame.data(0), frame.stride(0)),
            (frame.data(1), frame.stride(1)),
            (frame.data(2), frame.stride(2)),
        ],
    )
}

/// FFmpeg 视频解码器，输出 YUV420P 帧
pub struct FfmpegVideoDecoder {
    decoder: codec::decoder::Video,
    converter: YuvConverter,
    time_base: f64,
}

// SwsContext 本身不是 Send，但解码器只会被视频解码线程独占使用
unsafe impl Send for FfmpegVideoDecoder {}

impl FfmpegVideoDecoder {
    pub fn from_stream(stream: format::stream::Stream) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().video()?;
        let time_base = time_base_of(&stream);

        debug!(
            "视频解码器: {}x{}, 格式: {:?}, time_base = {}",
            decoder.width(),
            decoder.height(),
            decoder.format(),
            time_base
        );

        Ok(Self {
            decoder,
            converter: YuvConverter::default(),
            time_base,
        })
    }
}

impl VideoDecoder for FfmpegVideoDecoder {
    type Packet = ffmpeg::Packet;

    fn send_packet(&mut self, packet: Option<ffmpeg::Packet>) -> Result<()> {
        let result = match packet {
            Some(packet) => self.decoder.send_packet(&packet),
            None => self.decoder.send_eof(),
        };
        match result {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::Eof) => {
                debug!("视频解码器已处于 EOF 状态，忽略本次输入");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn receive(&mut self) -> Result<Decoded<VideoFrame>> {
        let mut frame = util::frame::Video::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => {
                let pts = presentation_time(frame.timestamp(), frame.pts(), self.time_base);
                Ok(Decoded::Frame(self.converter.convert(pts, &frame)?))
            }
            Err(ref e) if is_again(e) => Ok(Decoded::Again),
            Err(ffmpeg::Error::Eof) => Ok(Decoded::Eof),
            Err(e) => {
                warn!("视频解码错误: {}", e);
                Err(e.into())
            }
        }
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }
}
