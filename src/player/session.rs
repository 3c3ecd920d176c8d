use crate::core::{PlayerConfig, PlayerEvent};
use crate::player::audio_output::SinkState;
use crate::player::frame_sink::FrameSink;
use crate::player::packet_queue::PacketQueue;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// 会话标志：控制线程与三个工作线程共同读写
#[derive(Debug, Default)]
pub struct SessionFlags {
    running: AtomicBool,
    paused: AtomicBool,
    eos: AtomicBool,
}

impl SessionFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// 解封装已读到文件末尾
    pub fn is_eos(&self) -> bool {
        self.eos.load(Ordering::SeqCst)
    }

    pub fn set_eos(&self, eos: bool) {
        self.eos.store(eos, Ordering::SeqCst);
    }

    /// 暂停期间按固定间隔轮询，返回 false 表示会话已停止
    pub fn wait_while_paused(&self, poll: Duration) -> bool {
        while self.is_running() && self.is_paused() {
            thread::sleep(poll);
        }
        self.is_running()
    }

    /// 分片睡眠，running 被清除时提前返回
    ///
    /// 返回 true 表示睡满了 duration。
    pub fn sleep_while_running(&self, duration: Duration, slice: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if !self.is_running() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(slice));
        }
    }
}

/// 一次播放会话里工作线程共享的全部状态
pub struct SessionContext<P> {
    pub flags: SessionFlags,
    pub audio_queue: PacketQueue<P>,
    pub video_queue: PacketQueue<P>,
    pub sink: Arc<SinkState>,
    pub config: PlayerConfig,
    /// 媒体总时长（秒），随进度通知一起发出
    pub duration: f64,
    pub events: Sender<PlayerEvent>,
    pub renderer: Arc<dyn FrameSink>,
}

impl<P> SessionContext<P> {
    pub fn new(
        sink: Arc<SinkState>,
        config: PlayerConfig,
        duration: f64,
        events: Sender<PlayerEvent>,
        renderer: Arc<dyn FrameSink>,
    ) -> Self {
        Self {
            flags: SessionFlags::new(),
            audio_queue: PacketQueue::new(),
            video_queue: PacketQueue::new(),
            sink,
            config,
            duration,
            events,
            renderer,
        }
    }

    /// 通知两个队列停止，唤醒阻塞在 pop 上的解码线程
    pub fn stop_queues(&self) {
        self.audio_queue.set_stop(true);
        self.video_queue.set_stop(true);
    }

    /// 丢弃两个队列里剩余的包，返回丢弃数量
    pub fn clear_queues(&self) -> usize {
        self.audio_queue.clear() + self.video_queue.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_while_paused_returns_on_stop() {
        let flags = Arc::new(SessionFlags::new());
        flags.set_running(true);
        flags.set_paused(true);

        let waiter = {
            let flags = flags.clone();
            thread::spawn(move || flags.wait_while_paused(Duration::from_millis(2)))
        };
        thread::sleep(Duration::from_millis(20));
        flags.set_running(false);
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn test_wait_while_paused_resumes() {
        let flags = Arc::new(SessionFlags::new());
        flags.set_running(true);
        flags.set_paused(true);

        let waiter = {
            let flags = flags.clone();
            thread::spawn(move || flags.wait_while_paused(Duration::from_millis(2)))
        };
        thread::sleep(Duration::from_millis(20));
        flags.set_paused(false);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_sleep_is_interrupted_by_stop() {
        let flags = Arc::new(SessionFlags::new());
        flags.set_running(true);

        let sleeper = {
            let flags = flags.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let full = flags.sleep_while_running(Duration::from_secs(5), Duration::from_millis(5));
                (full, start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        flags.set_running(false);

        let (full, elapsed) = sleeper.join().unwrap();
        assert!(!full);
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn test_sleep_runs_to_completion() {
        let flags = SessionFlags::new();
        flags.set_running(true);
        let start = Instant::now();
        assert!(flags.sleep_while_running(Duration::from_millis(30), Duration::from_millis(5)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
