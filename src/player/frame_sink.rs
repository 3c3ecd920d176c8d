use crate::core::VideoFrame;
use log::info;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 渲染器边界：视频解码线程把到点的帧交给它
///
/// deliver 在视频解码线程上调用，实现不应长时间阻塞。
pub trait FrameSink: Send + Sync {
    fn deliver(&self, frame: Arc<VideoFrame>);

    /// 停止播放时清空画面
    fn clear(&self);
}

/// 只保留最新一帧的渲染端，供 UI 按自己的刷新率轮询
#[derive(Default)]
pub struct LatestFrameSink {
    latest: Mutex<Option<Arc<VideoFrame>>>,
    /// 渲染统计
    frames_delivered: AtomicU64,
}

impl LatestFrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取当前帧（不取走）
    pub fn latest(&self) -> Option<Arc<VideoFrame>> {
        self.latest.lock().clone()
    }

    /// 取走当前帧
    pub fn take(&self) -> Option<Arc<VideoFrame>> {
        self.latest.lock().take()
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::Relaxed)
    }

    /// 检查是否有画面（用于判断是否应该显示占位符）
    pub fn has_frame(&self) -> bool {
        self.latest.lock().is_some()
    }
}

impl FrameSink for LatestFrameSink {
    fn deliver(&self, frame: Arc<VideoFrame>) {
        *self.latest.lock() = Some(frame);
        self.frames_delivered.fetch_add(1, Ordering::Relaxed);
    }

    fn clear(&self) {
        if self.latest.lock().take().is_some() {
            info!("🧹 清空画面");
        }
    }
}

/// 丢弃所有帧的渲染端（纯音频输出、命令行播放）
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFrameSink;

impl FrameSink for NullFrameSink {
    fn deliver(&self, _frame: Arc<VideoFrame>) {}

    fn clear(&self) {}
}
