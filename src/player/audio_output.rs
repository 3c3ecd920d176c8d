use crate::core::{AudioClock, AudioSpec, PlayerError, Result, SampleFormat};
use crate::player::ring_buffer::AudioRingBuffer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfigRange};
use crossbeam::atomic::AtomicCell;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 音频设备回调与解码线程共享的状态
///
/// fill() 是设备实时线程里的拉取回调：
/// 从环形缓冲区取 PCM，不足部分补静音，按音量缩放，
/// 并按实际输出的字节数推进音频时钟。
pub struct SinkState {
    spec: AudioSpec,
    ring: AudioRingBuffer,
    clock: AudioClock,
    volume: AtomicCell<f32>,
    eof: AtomicBool,
    pull_timeout: Duration,
}

impl SinkState {
    pub fn new(spec: AudioSpec, ring_capacity: usize, pull_timeout: Duration) -> Self {
        Self {
            spec,
            ring: AudioRingBuffer::new(ring_capacity),
            clock: AudioClock::new(),
            volume: AtomicCell::new(1.0),
            eof: AtomicBool::new(false),
            pull_timeout,
        }
    }

    /// 设备拉取回调：填满 out，返回其中真实音频的字节数
    pub fn fill(&self, out: &mut [u8]) -> usize {
        // 有界等待：回调运行在实时线程，不能无限阻塞
        let copied = self.ring.pop_timeout(out, self.pull_timeout);

        // 不足部分补静音，避免输出垃圾数据
        out[copied..].fill(0);

        let volume = self.volume.load();
        if volume < 1.0 {
            apply_volume(&mut out[..copied], self.spec.format, volume);
        }

        if copied > 0 {
            self.clock.advance(self.spec.bytes_to_seconds(copied));
        }
        copied
    }

    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    pub fn ring(&self) -> &AudioRingBuffer {
        &self.ring
    }

    pub fn clock(&self) -> &AudioClock {
        &self.clock
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume.clamp(0.0, 1.0));
    }

    pub fn volume(&self) -> f32 {
        self.volume.load()
    }

    pub fn set_eof(&self, eof: bool) {
        self.eof.store(eof, Ordering::SeqCst);
    }

    pub fn is_eof(&self) -> bool {
        self.eof.load(Ordering::SeqCst)
    }
}

/// 与静音做线性混合：0 为静音，1 为原样
fn apply_volume(data: &mut [u8], format: SampleFormat, volume: f32) {
    match format {
        SampleFormat::I16 => {
            for chunk in data.chunks_exact_mut(2) {
                let sample = i16::from_ne_bytes([chunk[0], chunk[1]]);
                let scaled = (sample as f32 * volume) as i16;
                chunk.copy_from_slice(&scaled.to_ne_bytes());
            }
        }
        SampleFormat::F32 => {
            for chunk in data.chunks_exact_mut(4) {
                let sample = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                chunk.copy_from_slice(&(sample * volume).to_ne_bytes());
            }
        }
    }
}

/// 平台音频输出设备（拉取模式）
pub trait AudioDevice: Send {
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self, paused: bool) -> Result<()>;
    /// 停止设备；返回后不会再调用 fill()
    fn stop(&mut self);
}

/// 打开音频设备的工厂
pub trait AudioBackend: Send + Sync {
    /// 协商设备实际支持的输出格式
    fn negotiate(&self, requested: &AudioSpec) -> Result<AudioSpec> {
        Ok(*requested)
    }

    /// 打开设备（初始为暂停状态），回调中调用 state.fill()
    fn open(&self, state: Arc<SinkState>) -> Result<Box<dyn AudioDevice>>;
}

/// 音频输出 - 拥有设备，向解码线程提供写入接口
pub struct AudioSink {
    state: Arc<SinkState>,
    device: Box<dyn AudioDevice>,
}

impl AudioSink {
    pub fn open(
        backend: &dyn AudioBackend,
        spec: AudioSpec,
        ring_capacity: usize,
        pull_timeout: Duration,
        volume: f32,
    ) -> Result<Self> {
        let state = Arc::new(SinkState::new(spec, ring_capacity, pull_timeout));
        state.set_volume(volume);
        let device = backend.open(state.clone())?;
        debug!(
            "音频输出已打开: {} Hz, {} 声道, {:?}, 缓冲 {} 字节",
            spec.sample_rate, spec.channels, spec.format, ring_capacity
        );
        Ok(Self { state, device })
    }

    pub fn state(&self) -> &Arc<SinkState> {
        &self.state
    }

    pub fn spec(&self) -> AudioSpec {
        self.state.spec()
    }

    /// 写入 PCM（阻塞直到有空间），返回 false 表示已停止
    pub fn enqueue(&self, data: &[u8]) -> bool {
        self.state.ring().push(data)
    }

    pub fn play(&mut self) -> Result<()> {
        self.device.play()
    }

    pub fn pause(&mut self, paused: bool) -> Result<()> {
        self.device.pause(paused)
    }

    /// 停止设备并清空缓冲区
    ///
    /// 必须在 join 解码线程之前调用：停止缓冲区会唤醒阻塞在 push 里的音频解码线程。
    pub fn stop(&mut self) {
        self.device.stop();
        self.state.ring().stop();
        self.state.ring().clear();
        self.state.clock().reset();
    }

    pub fn set_audio_clock(&self, seconds: f64) {
        self.state.clock().set(seconds);
    }

    pub fn audio_clock(&self) -> f64 {
        self.state.clock().get()
    }

    pub fn set_eof(&self, eof: bool) {
        self.state.set_eof(eof);
    }

    pub fn is_eof(&self) -> bool {
        self.state.is_eof()
    }

    pub fn set_volume(&self, volume: f32) {
        self.state.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.state.volume()
    }
}

impl Drop for AudioSink {
    fn drop(&mut self) {
        self.device.stop();
        self.state.ring().stop();
    }
}

/// cpal 音频后端
pub struct CpalAudioBackend;

impl CpalAudioBackend {
    pub fn new() -> Self {
        Self
    }

    fn default_device() -> Result<Device> {
        let host = cpal::default_host();
        host.default_output_device()
            .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))
    }

    /// 检查配置是否兼容
    fn is_config_compatible(spec: &AudioSpec, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = spec.sample_rate >= supported.min_sample_rate().0
            && spec.sample_rate <= supported.max_sample_rate().0;

        let channels_match = spec.channels == supported.channels();

        let format_match = match spec.format {
            SampleFormat::I16 => supported.sample_format() == cpal::SampleFormat::I16,
            SampleFormat::F32 => supported.sample_format() == cpal::SampleFormat::F32,
        };

        rate_in_range && channels_match && format_match
    }

    fn supports(device: &Device, spec: &AudioSpec) -> Result<bool> {
        let mut supported_configs = device
            .supported_output_configs()
            .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?;
        Ok(supported_configs.any(|supported| Self::is_config_compatible(spec, &supported)))
    }
}

impl Default for CpalAudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalAudioBackend {
    /// 设备不支持请求的格式时回退到常见配置
    fn negotiate(&self, requested: &AudioSpec) -> Result<AudioSpec> {
        let device = Self::default_device()?;
        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        if Self::supports(&device, requested)? {
            return Ok(*requested);
        }

        warn!(
            "⚠️  音频设备不支持 {} Hz, {} 声道, {:?}，尝试回退配置",
            requested.sample_rate, requested.channels, requested.format
        );

        let fallback_configs = [
            (48000, 2, requested.format),
            (44100, 2, requested.format),
            (48000, 2, SampleFormat::F32),
            (44100, 2, SampleFormat::F32),
            (48000, 1, SampleFormat::I16),
            (44100, 1, SampleFormat::I16),
        ];

        for (rate, channels, format) in fallback_configs {
            let candidate = AudioSpec::new(rate, channels, format);
            if Self::supports(&device, &candidate)? {
                info!("✅ 使用回退配置: {} Hz, {} 声道, {:?}", rate, channels, format);
                return Ok(candidate);
            }
        }

        Err(PlayerError::AudioError(format!(
            "音频设备不支持任何标准配置 (原请求: {} Hz, {} 声道)",
            requested.sample_rate, requested.channels
        )))
    }

    fn open(&self, state: Arc<SinkState>) -> Result<Box<dyn AudioDevice>> {
        let device = Self::default_device()?;
        let spec = state.spec();
        let config = StreamConfig {
            channels: spec.channels,
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_fn = |err: cpal::StreamError| error!("音频流错误: {}", err);

        let stream = match spec.format {
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    state.fill(bytemuck::cast_slice_mut(data));
                },
                err_fn,
                None,
            ),
            SampleFormat::F32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    state.fill(bytemuck::cast_slice_mut(data));
                },
                err_fn,
                None,
            ),
        }
        .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))?;

        // 部分平台创建后立即开始回调，这里先暂停，等 play() 再启动
        stream
            .pause()
            .map_err(|e| PlayerError::AudioError(format!("暂停音频流失败: {}", e)))?;

        Ok(Box::new(CpalDevice {
            stream: Some(stream),
        }))
    }
}

/// cpal 输出流
struct CpalDevice {
    stream: Option<Stream>,
}

// cpal::Stream 本身不是 Send，但它只会被持有 PlaybackManager 控制锁的线程操作，
// 回调运行在 cpal 自己的线程里，只通过 Arc<SinkState> 访问共享数据
unsafe impl Send for CpalDevice {}

impl AudioDevice for CpalDevice {
    fn play(&mut self) -> Result<()> {
        if let Some(stream) = &self.stream {
            stream
                .play()
                .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;
            info!("音频输出已启动");
        }
        Ok(())
    }

    fn pause(&mut self, paused: bool) -> Result<()> {
        let Some(stream) = &self.stream else {
            return Ok(());
        };
        let result = if paused { stream.pause() } else { stream.play() };
        result.map_err(|e| PlayerError::AudioError(format!("切换音频暂停状态失败: {}", e)))
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);
            info!("音频输出已停止");
        }
    }
}
