//! 集成测试用的合成媒体后端
//!
//! url 格式：`synthetic:<时长秒>[:corrupt]`，另有 `missing` 与 `synthetic:no-audio`
//! 两个打开失败的特殊 url。音频包每 0.05s 一个，视频包每 0.04s 一个，
//! 关键帧间隔 0.5s（Seek 会落到不晚于目标的关键帧上）。

#![allow(dead_code)]

use myy_engine::core::{AudioSpec, MediaInfo, PlayerConfig, PlayerError, Result, VideoFrame};
use myy_engine::player::{
    AudioBackend, AudioDecoder, AudioDevice, Decoded, DemuxedPacket, Demuxer, FrameSink,
    HeadlessAudioBackend, LatestFrameSink, MediaBackend, OpenedMedia, PlaybackManager, SinkState,
    VideoDecoder,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Once};
use std::time::Duration;

pub const AUDIO_STEP: f64 = 0.05;
pub const VIDEO_STEP: f64 = 0.04;
pub const KEYFRAME_INTERVAL: f64 = 0.5;

const AUDIO_STREAM: usize = 1;
const VIDEO_STREAM: usize = 0;
const DATA_STREAM: usize = 2;

pub fn init_logger() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

#[derive(Debug, Clone)]
pub struct SynthPacket {
    pub stream: usize,
    pub pts: f64,
    pub corrupt: bool,
}

fn first_index_at(start: f64, step: f64) -> u64 {
    ((start / step) - 1e-9).ceil().max(0.0) as u64
}

pub struct SynthDemuxer {
    info: MediaInfo,
    corrupt: bool,
    next_audio: u64,
    next_video: u64,
    reads: u64,
}

impl SynthDemuxer {
    fn audio_pts(&self) -> f64 {
        self.next_audio as f64 * AUDIO_STEP
    }

    fn video_pts(&self) -> f64 {
        self.next_video as f64 * VIDEO_STEP
    }
}

impl Demuxer for SynthDemuxer {
    type Packet = SynthPacket;

    fn read_packet(&mut self) -> Result<Option<DemuxedPacket<SynthPacket>>> {
        self.reads += 1;
        let duration = self.info.duration - 1e-9;

        // 偶尔混入一个不属于音视频的流
        if self.reads % 20 == 0 {
            return Ok(Some(DemuxedPacket {
                stream_index: DATA_STREAM,
                pts: None,
                packet: SynthPacket {
                    stream: DATA_STREAM,
                    pts: 0.0,
                    corrupt: false,
                },
            }));
        }

        let audio_pts = self.audio_pts();
        let video_pts = self.video_pts();
        let audio_left = audio_pts < duration;
        let video_left = video_pts < duration;

        let (stream, pts, index) = if audio_left && (!video_left || audio_pts <= video_pts) {
            self.next_audio += 1;
            (AUDIO_STREAM, audio_pts, self.next_audio)
        } else if video_left {
            self.next_video += 1;
            (VIDEO_STREAM, video_pts, self.next_video)
        } else {
            return Ok(None);
        };

        let period = if stream == AUDIO_STREAM { 7 } else { 11 };
        let corrupt = self.corrupt && index % period == 0;
        Ok(Some(DemuxedPacket {
            stream_index: stream,
            pts: Some(pts),
            packet: SynthPacket {
                stream,
                pts,
                corrupt,
            },
        }))
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        let keyframe = (seconds / KEYFRAME_INTERVAL + 1e-9).floor() * KEYFRAME_INTERVAL;
        let keyframe = keyframe.clamp(0.0, self.info.duration);
        self.next_audio = first_index_at(keyframe, AUDIO_STEP);
        self.next_video = first_index_at(keyframe, VIDEO_STEP);
        Ok(())
    }

    fn media_info(&self) -> &MediaInfo {
        &self.info
    }

    fn audio_stream_index(&self) -> usize {
        AUDIO_STREAM
    }

    fn video_stream_index(&self) -> usize {
        VIDEO_STREAM
    }

    fn description(&self) -> String {
        format!("synthetic {:.2}s", self.info.duration)
    }
}

/// 每个音频包产出 0.05s 的静音 PCM
pub struct SynthAudioDecoder {
    bytes_per_packet: usize,
    pending: VecDeque<Vec<u8>>,
    draining: bool,
}

impl AudioDecoder for SynthAudioDecoder {
    type Packet = SynthPacket;

    fn send_packet(&mut self, packet: Option<SynthPacket>) -> Result<()> {
        match packet {
            Some(packet) if packet.corrupt => Err(PlayerError::DecodeError(format!(
                "损坏的音频包 pts={:.2}",
                packet.pts
            ))),
            Some(_) => {
                self.pending.push_back(vec![0u8; self.bytes_per_packet]);
                Ok(())
            }
            None => {
                self.draining = true;
                Ok(())
            }
        }
    }

    fn receive(&mut self) -> Result<Decoded<Vec<u8>>> {
        Ok(match self.pending.pop_front() {
            Some(pcm) => Decoded::Frame(pcm),
            None if self.draining => Decoded::Eof,
            None => Decoded::Again,
        })
    }

    fn flush(&mut self) {
        self.pending.clear();
        self.draining = false;
    }
}

/// 每个视频包产出一帧 4x4 的 YUV420P 图像
pub struct SynthVideoDecoder {
    pending: VecDeque<VideoFrame>,
    draining: bool,
}

impl VideoDecoder for SynthVideoDecoder {
    type Packet = SynthPacket;

    fn send_packet(&mut self, packet: Option<SynthPacket>) -> Result<()> {
        match packet {
            Some(packet) if packet.corrupt => Err(PlayerError::DecodeError(format!(
                "损坏的视频包 pts={:.2}",
                packet.pts
            ))),
            Some(packet) => {
                self.pending.push_back(VideoFrame::from_planes(
                    packet.pts,
                    4,
                    4,
                    [(&[16u8; 16], 4), (&[128u8; 4], 2), (&[128u8; 4], 2)],
                ));
                Ok(())
            }
            None => {
                self.draining = true;
                Ok(())
            }
        }
    }

    fn receive(&mut self) -> Result<Decoded<VideoFrame>> {
        Ok(match self.pending.pop_front() {
            Some(frame) => Decoded::Frame(frame),
            None if self.draining => Decoded::Eof,
            None => Decoded::Again,
        })
    }

    fn flush(&mut self) {
        self.pending.clear();
        self.draining = false;
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SynthBackend;

impl MediaBackend for SynthBackend {
    type Packet = SynthPacket;
    type Demuxer = SynthDemuxer;
    type AudioDecoder = SynthAudioDecoder;
    type VideoDecoder = SynthVideoDecoder;

    fn open(&self, url: &str, output: &AudioSpec) -> Result<OpenedMedia<Self>> {
        let mut parts = url.split(':');
        if parts.next() != Some("synthetic") {
            return Err(PlayerError::OpenError(format!("{}: No such file or directory", url)));
        }
        let duration = match parts.next() {
            Some("no-audio") => return Err(PlayerError::NoAudioStream),
            Some(value) => value
                .parse::<f64>()
                .map_err(|_| PlayerError::OpenError(format!("无效的时长: {}", value)))?,
            None => 1.0,
        };
        let corrupt = parts.next() == Some("corrupt");

        let info = MediaInfo {
            duration,
            width: 4,
            height: 4,
            fps: 1.0 / VIDEO_STEP,
            video_codec: "synthetic-video".to_string(),
            audio_codec: "synthetic-audio".to_string(),
            sample_rate: output.sample_rate,
            channels: output.channels,
        };

        let samples = (AUDIO_STEP * output.sample_rate as f64).round() as usize;
        Ok(OpenedMedia {
            demuxer: SynthDemuxer {
                info,
                corrupt,
                next_audio: 0,
                next_video: 0,
                reads: 0,
            },
            audio_decoder: SynthAudioDecoder {
                bytes_per_packet: samples * output.frame_bytes(),
                pending: VecDeque::new(),
                draining: false,
            },
            video_decoder: SynthVideoDecoder {
                pending: VecDeque::new(),
                draining: false,
            },
        })
    }
}

/// 打开过的音频输出（按打开顺序）
#[derive(Clone, Default)]
pub struct SinkRecorder(Arc<Mutex<Vec<Arc<SinkState>>>>);

impl SinkRecorder {
    pub fn latest(&self) -> Option<Arc<SinkState>> {
        self.0.lock().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.0.lock().len()
    }
}

/// 无声卡后端，额外记录每个会话的 SinkState
pub struct RecordingAudioBackend {
    headless: HeadlessAudioBackend,
    recorder: SinkRecorder,
}

impl AudioBackend for RecordingAudioBackend {
    fn open(&self, state: Arc<SinkState>) -> Result<Box<dyn AudioDevice>> {
        self.recorder.0.lock().push(state.clone());
        self.headless.open(state)
    }
}

/// 合成后端 + 无声卡输出的播放管理器
pub fn manager() -> (PlaybackManager<SynthBackend>, Arc<LatestFrameSink>) {
    let (manager, renderer, _) = manager_with(PlayerConfig::default());
    (manager, renderer)
}

pub fn manager_with(
    config: PlayerConfig,
) -> (PlaybackManager<SynthBackend>, Arc<LatestFrameSink>, SinkRecorder) {
    init_logger();
    let renderer = Arc::new(LatestFrameSink::new());
    let sink: Arc<dyn FrameSink> = renderer.clone();
    let recorder = SinkRecorder::default();
    let manager = PlaybackManager::with_backends(
        SynthBackend,
        Box::new(RecordingAudioBackend {
            headless: HeadlessAudioBackend::with_period(Duration::from_millis(5)),
            recorder: recorder.clone(),
        }),
        sink,
        config,
    )
    .unwrap();
    (manager, renderer, recorder)
}
