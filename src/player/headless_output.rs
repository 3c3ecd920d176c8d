use crate::core::Result;
use crate::player::audio_output::{AudioBackend, AudioDevice, SinkState};
use crate::player::log_ctx;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// 无声卡的音频后端
///
/// 用一个按墙钟节拍运行的线程代替设备回调，每个周期拉取一个周期的 PCM 后丢弃。
/// 音频时钟照常推进，所以视频同步行为与真实设备一致。
pub struct HeadlessAudioBackend {
    period: Duration,
}

impl HeadlessAudioBackend {
    pub fn new() -> Self {
        Self::with_period(Duration::from_millis(10))
    }

    pub fn with_period(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
        }
    }
}

impl Default for HeadlessAudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for HeadlessAudioBackend {
    fn open(&self, state: Arc<SinkState>) -> Result<Box<dyn AudioDevice>> {
        let playing = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        let period = self.period;

        let spec = state.spec();
        let frames_per_period =
            ((spec.sample_rate as u128 * period.as_micros()) / 1_000_000).max(1) as usize;
        let chunk_bytes = frames_per_period * spec.frame_bytes();

        let handle = {
            let playing = playing.clone();
            let closed = closed.clone();
            thread::Builder::new()
                .name("headless-audio".to_string())
                .spawn(move || {
                    debug!("{} 🔈 无声卡音频线程启动 (每周期 {} 字节)", log_ctx(), chunk_bytes);
                    let mut buf = vec![0u8; chunk_bytes];
                    let mut next_tick = Instant::now();
                    while !closed.load(Ordering::SeqCst) {
                        if playing.load(Ordering::SeqCst) {
                            state.fill(&mut buf);
                        }
                        next_tick += period;
                        let now = Instant::now();
                        if next_tick > now {
                            thread::sleep(next_tick - now);
                        } else {
                            // 落后太多时不追赶，重新对齐节拍
                            next_tick = now;
                        }
                    }
                    debug!("{} 🔈 无声卡音频线程退出", log_ctx());
                })?
        };

        Ok(Box::new(HeadlessDevice {
            playing,
            closed,
            handle: Some(handle),
        }))
    }
}

struct HeadlessDevice {
    playing: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AudioDevice for HeadlessDevice {
    fn play(&mut self) -> Result<()> {
        self.playing.store(true, Ordering::SeqCst);
        info!("音频输出已启动（无声卡模式）");
        Ok(())
    }

    fn pause(&mut self, paused: bool) -> Result<()> {
        self.playing.store(!paused, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.playing.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            info!("音频输出已停止（无声卡模式）");
        }
    }
}

impl Drop for HeadlessDevice {
    fn drop(&mut self) {
        self.stop();
    }
}
