use crate::core::{MediaInfo, PlaybackState, PlayerConfig, PlayerError, PlayerEvent, Result};
use crate::player::audio_output::{AudioBackend, AudioSink, CpalAudioBackend};
use crate::player::decode_thread::{run_audio_decode, run_video_decode};
use crate::player::demuxer_factory::FfmpegBackend;
use crate::player::demuxer_source::{Demuxer, MediaBackend, OpenedMedia};
use crate::player::demuxer_thread::run_demux;
use crate::player::frame_sink::FrameSink;
use crate::player::log_ctx;
use crate::player::session::SessionContext;
use crossbeam::atomic::AtomicCell;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

/// 一次打开的媒体：解封装器/解码器、音频输出以及工作线程
struct Session<M: MediaBackend> {
    ctx: Arc<SessionContext<M::Packet>>,
    sink: AudioSink,
    /// 启动后移交给工作线程
    media: Option<OpenedMedia<M>>,
    workers: Vec<(&'static str, JoinHandle<()>)>,
    info: MediaInfo,
    generation: u64,
}

impl<M: MediaBackend> Session<M> {
    fn is_running(&self) -> bool {
        self.ctx.flags.is_running() || !self.workers.is_empty()
    }
}

/// 受控制锁保护的状态
struct Control<M: MediaBackend> {
    state: PlaybackState,
    url: Option<String>,
    session: Option<Session<M>>,
    media_info: Option<MediaInfo>,
    /// 每启动一次会话加一，用于识别过期的结束通知
    generation: u64,
}

struct Inner<M: MediaBackend> {
    media_backend: M,
    audio_backend: Box<dyn AudioBackend>,
    renderer: Arc<dyn FrameSink>,
    config: PlayerConfig,
    control: Mutex<Control<M>>,
    volume: AtomicCell<f32>,
    events_tx: Sender<PlayerEvent>,
    events_rx: Receiver<PlayerEvent>,
    active_workers: Arc<AtomicUsize>,
}

/// 工作线程退出时计数减一
struct WorkerGuard(Arc<AtomicUsize>);

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 播放管理器 - 整体控制播放流程
///
/// 所有控制操作都在一把锁下串行执行；工作线程从不获取这把锁，
/// 只通过会话里的原子标志和队列与控制线程交互。
pub struct PlaybackManager<M: MediaBackend = FfmpegBackend> {
    inner: Arc<Inner<M>>,
}

impl PlaybackManager<FfmpegBackend> {
    /// 使用 FFmpeg 解码、cpal 输出声音
    pub fn new(renderer: Arc<dyn FrameSink>, config: PlayerConfig) -> Result<Self> {
        Self::with_backends(
            FfmpegBackend::new()?,
            Box::new(CpalAudioBackend::new()),
            renderer,
            config,
        )
    }
}

impl<M: MediaBackend> PlaybackManager<M> {
    pub fn with_backends(
        media_backend: M,
        audio_backend: Box<dyn AudioBackend>,
        renderer: Arc<dyn FrameSink>,
        config: PlayerConfig,
    ) -> Result<Self> {
        config.validate()?;
        info!("{} 🎮 创建播放管理器...", log_ctx());

        let (events_tx, events_rx) = bounded(config.event_capacity);
        let inner = Inner {
            media_backend,
            audio_backend,
            renderer,
            config,
            control: Mutex::new(Control {
                state: PlaybackState::Stopped,
                url: None,
                session: None,
                media_info: None,
                generation: 0,
            }),
            volume: AtomicCell::new(1.0),
            events_tx,
            events_rx,
            active_workers: Arc::new(AtomicUsize::new(0)),
        };

        info!("{} ✅ 播放管理器创建完成", log_ctx());
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// 打开媒体文件（不开始播放）
    ///
    /// 先关闭之前的会话；失败时保持 Stopped。
    pub fn open_file(&self, url: &str) -> Result<MediaInfo> {
        let mut control = self.inner.control.lock();
        self.inner.stop_locked(&mut control);
        control.session = None;
        control.media_info = None;
        control.url = Some(url.to_string());

        match self.inner.open_session(url) {
            Ok(session) => {
                let info = session.info.clone();
                control.media_info = Some(info.clone());
                control.session = Some(session);
                Ok(info)
            }
            Err(e) => {
                error!("{} ❌ 打开失败: {}: {}", log_ctx(), url, e);
                Err(e)
            }
        }
    }

    /// 开始播放；已在播放（或暂停）时不做任何事
    pub fn play(&self) -> Result<()> {
        let mut control = self.inner.control.lock();
        if control.session.as_ref().map_or(false, |s| s.is_running()) {
            debug!("{} 已在播放，忽略 play()", log_ctx());
            return Ok(());
        }

        let url = control.url.clone().ok_or(PlayerError::NoMedia)?;
        if control.session.is_none() {
            info!("{} 从停止状态恢复播放，重新打开: {}", log_ctx(), url);
            let session = self.inner.open_session(&url)?;
            control.media_info = Some(session.info.clone());
            control.session = Some(session);
        }

        info!("{} 🎬 播放", log_ctx());
        self.inner.start_locked(&mut control)
    }

    /// 暂停/继续切换；Stopped 时不做任何事
    pub fn pause(&self) {
        let mut control = self.inner.control.lock();
        if control.state == PlaybackState::Stopped {
            return;
        }
        let Some(session) = control.session.as_mut() else {
            return;
        };

        let paused = !session.ctx.flags.is_paused();
        session.ctx.flags.set_paused(paused);
        if let Err(e) = session.sink.pause(paused) {
            warn!("{} ⚠️ 切换音频设备暂停状态失败: {}", log_ctx(), e);
        }

        control.state = if paused {
            info!("{} ⏸ 暂停", log_ctx());
            PlaybackState::Paused
        } else {
            info!("{} ▶ 继续播放", log_ctx());
            PlaybackState::Playing
        };
    }

    /// 停止播放并回收所有工作线程
    pub fn stop(&self) {
        let mut control = self.inner.control.lock();
        self.inner.stop_locked(&mut control);
    }

    /// 跳转到指定位置（0.0 ~ 1.0，按总时长换算）
    ///
    /// 重新打开媒体，向后 Seek 到关键帧后继续播放。
    /// 还没有打开过任何文件时不做任何事。
    pub fn seek(&self, fraction: f64) -> Result<()> {
        let mut control = self.inner.control.lock();
        let Some(url) = control.url.clone() else {
            warn!("{} ⚠️ 没有打开的文件，忽略 Seek", log_ctx());
            return Ok(());
        };
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };

        // ========== 步骤1: 完整停止当前会话 ==========
        self.inner.stop_locked(&mut control);
        control.session = None;

        // ========== 步骤2: 重新打开容器和解码器 ==========
        let mut session = self.inner.open_session(&url)?;
        let target = fraction * session.info.duration;
        info!("{} 🎯 Seek 到: {:.1}% → {:.3}s", log_ctx(), fraction * 100.0, target);

        // ========== 步骤3: 以视频流为参考向后 Seek，清空解码器 ==========
        if let Some(media) = session.media.as_mut() {
            if let Err(e) = media.demuxer.seek(target) {
                warn!("{} ⚠️ Seek 失败，从头播放: {}", log_ctx(), e);
            }
            media.flush_decoders();
        }

        // ========== 步骤4: 预设音频时钟 ==========
        // Seek 落在目标之前的关键帧上，由第一个音频包的时间戳校准
        session.sink.set_audio_clock(target);
        session.sink.state().clock().arm_rebase();

        control.media_info = Some(session.info.clone());
        control.session = Some(session);

        // ========== 步骤5: 恢复播放 ==========
        self.inner.start_locked(&mut control)?;
        info!("{} ✅ Seek 完成: {:.3}s", log_ctx(), target);
        Ok(())
    }

    /// 获取当前状态
    pub fn state(&self) -> PlaybackState {
        self.inner.control.lock().state
    }

    /// 设置音量（0.0 ~ 1.0），对当前和之后的会话都生效
    pub fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.inner.volume.store(volume);
        if let Some(session) = self.inner.control.lock().session.as_ref() {
            session.sink.set_volume(volume);
        }
    }

    pub fn volume(&self) -> f32 {
        self.inner.volume.load()
    }

    /// 当前播放位置（音频时钟，秒）；没有会话时为 0
    pub fn position(&self) -> f64 {
        self.inner
            .control
            .lock()
            .session
            .as_ref()
            .map_or(0.0, |s| s.sink.audio_clock())
    }

    /// 最近一次打开的媒体信息
    pub fn media_info(&self) -> Option<MediaInfo> {
        self.inner.control.lock().media_info.clone()
    }

    pub fn url(&self) -> Option<String> {
        self.inner.control.lock().url.clone()
    }

    /// 播放事件（进度、播放结束）
    ///
    /// 通道有界：没人读取时新的进度事件会被丢弃，Finished 会挤掉最旧的事件。
    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.inner.events_rx.clone()
    }

    /// 仍在运行的工作线程数量
    pub fn active_workers(&self) -> usize {
        self.inner.active_workers.load(Ordering::SeqCst)
    }
}

impl<M: MediaBackend> Inner<M> {
    /// 打开媒体和音频输出
    fn open_session(&self, url: &str) -> Result<Session<M>> {
        let spec = self.audio_backend.negotiate(&self.config.output)?;
        let media = self.media_backend.open(url, &spec)?;
        let info = media.media_info().clone();

        let sink = AudioSink::open(
            self.audio_backend.as_ref(),
            spec,
            self.config.ring_buffer_capacity,
            self.config.audio_pull_timeout(),
            self.volume.load(),
        )?;

        let ctx = Arc::new(SessionContext::new(
            sink.state().clone(),
            self.config.clone(),
            info.duration,
            self.events_tx.clone(),
            self.renderer.clone(),
        ));

        info!(
            "{} 📂 已打开: {} ({:.2}s, {}x{})",
            log_ctx(),
            url,
            info.duration,
            info.width,
            info.height
        );

        Ok(Session {
            ctx,
            sink,
            media: Some(media),
            workers: Vec::new(),
            info,
            generation: 0,
        })
    }

    /// 启动三个工作线程并打开音频设备
    fn start_locked(self: &Arc<Self>, control: &mut Control<M>) -> Result<()> {
        control.generation += 1;
        let generation = control.generation;

        let result = self.spawn_workers(control, generation);
        if let Err(e) = result {
            error!("{} ❌ 启动播放失败: {}", log_ctx(), e);
            self.stop_locked(control);
            control.session = None;
            return Err(e);
        }

        control.state = PlaybackState::Playing;
        Ok(())
    }

    fn spawn_workers(self: &Arc<Self>, control: &mut Control<M>, generation: u64) -> Result<()> {
        let session = control.session.as_mut().ok_or(PlayerError::NoMedia)?;
        let OpenedMedia {
            mut demuxer,
            mut audio_decoder,
            mut video_decoder,
        } = session
            .media
            .take()
            .ok_or_else(|| PlayerError::DecodeError("会话已经启动过".to_string()))?;
        session.generation = generation;

        let ctx = &session.ctx;
        ctx.flags.set_paused(false);
        ctx.flags.set_eos(false);
        ctx.audio_queue.set_stop(false);
        ctx.video_queue.set_stop(false);
        ctx.sink.set_eof(false);
        ctx.flags.set_running(true);

        let demux_ctx = ctx.clone();
        let handle = self.spawn_worker("demux", move || {
            run_demux(&mut demuxer, &demux_ctx);
        })?;
        session.workers.push(("解封装", handle));

        let audio_ctx = ctx.clone();
        let handle = self.spawn_worker("audio-decode", move || {
            run_audio_decode(&mut audio_decoder, &audio_ctx);
        })?;
        session.workers.push(("音频解码", handle));

        let video_ctx = ctx.clone();
        let weak = Arc::downgrade(self);
        let handle = self.spawn_worker("video-decode", move || {
            run_video_decode(&mut video_decoder, &video_ctx, move || {
                Self::schedule_finish(weak, generation);
            });
        })?;
        session.workers.push(("视频解码", handle));

        session.sink.play()?;
        debug!("{} 会话 #{} 已启动", log_ctx(), generation);
        Ok(())
    }

    fn spawn_worker<F>(&self, name: &str, f: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        let counter = self.active_workers.clone();
        counter.fetch_add(1, Ordering::SeqCst);
        let guard = WorkerGuard(counter);

        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _guard = guard;
                f();
            })
            .map_err(PlayerError::from)
    }

    /// 视频线程在播放完成时调用
    ///
    /// 工作线程不能 join 自己，所以在单独的线程里停止会话。
    fn schedule_finish(weak: Weak<Self>, generation: u64) {
        let spawned = thread::Builder::new()
            .name("session-finish".to_string())
            .spawn(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.finish_session(generation);
                }
            });
        if let Err(e) = spawned {
            error!("{} ❌ 无法启动结束处理线程: {}", log_ctx(), e);
        }
    }

    fn finish_session(&self, generation: u64) {
        let mut control = self.control.lock();
        let current = control.generation == generation
            && control.session.as_ref().map_or(false, |s| s.generation == generation);
        if !current {
            debug!("{} 忽略过期的结束通知（会话 #{}）", log_ctx(), generation);
            return;
        }

        info!("{} 🏁 播放结束，自动停止", log_ctx());
        self.stop_locked(&mut control);
        drop(control);

        self.emit_finished();
    }

    /// 发送 Finished；通道已满时丢弃最旧的事件腾出位置
    fn emit_finished(&self) {
        let mut event = PlayerEvent::Finished;
        loop {
            match self.events_tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(dropped) = self.events_rx.try_recv() {
                        debug!("事件通道已满，丢弃 {:?}", dropped);
                    }
                    event = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// 停止顺序：清除标志 → 停止队列 → 停止设备 → join → 清空 → 拆除
    fn stop_locked(&self, control: &mut Control<M>) {
        let running = control.session.as_ref().map_or(false, |s| s.is_running());
        if !running {
            control.state = PlaybackState::Stopped;
            return;
        }
        let Some(mut session) = control.session.take() else {
            return;
        };

        info!("{} ⏹️  停止播放", log_ctx());

        // ========== 步骤1: 清除运行标志 ==========
        session.ctx.flags.set_running(false);
        session.ctx.flags.set_paused(false);

        // ========== 步骤2: 唤醒阻塞在队列上的解码线程 ==========
        session.ctx.stop_queues();

        // ========== 步骤3: 先停设备和环形缓冲区，唤醒阻塞在 push 上的音频线程 ==========
        session.sink.stop();

        // ========== 步骤4: 等待线程结束 ==========
        for (name, handle) in session.workers.drain(..) {
            if handle.join().is_err() {
                error!("{} ❌ {}线程异常退出", log_ctx(), name);
            } else {
                info!("{} ✅ {}线程已结束", log_ctx(), name);
            }
        }

        // ========== 步骤5: 清空包队列 ==========
        let dropped = session.ctx.clear_queues();
        if dropped > 0 {
            info!("{} 🗑️  清空包队列: {} 个包", log_ctx(), dropped);
        }

        // ========== 步骤6: 拆除会话 ==========
        session.sink.set_eof(false);
        drop(session);
        self.renderer.clear();
        control.state = PlaybackState::Stopped;

        info!("{} ✅ 停止播放完成，所有线程已清理", log_ctx());
    }
}

impl<M: MediaBackend> Drop for Inner<M> {
    fn drop(&mut self) {
        let mut control = self.control.lock();
        self.stop_locked(&mut control);
    }
}
