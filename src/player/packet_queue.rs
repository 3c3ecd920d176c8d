use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// 压缩包队列（每条基本流一个）
///
/// - push 不设上限，背压由解封装线程根据 len() 自己控制
/// - pop 阻塞直到有数据或收到停止信号；停止后先把剩余的包取完，再返回 None
/// - clear 丢弃所有排队的包（包在这里被 drop，只释放一次）
pub struct PacketQueue<T> {
    inner: Mutex<QueueState<T>>,
    available: Condvar,
}

struct QueueState<T> {
    items: VecDeque<T>,
    stopped: bool,
}

impl<T> PacketQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueState {
                items: VecDeque::new(),
                stopped: false,
            }),
            available: Condvar::new(),
        }
    }

    pub fn push(&self, item: T) {
        let mut state = self.inner.lock();
        state.items.push_back(item);
        self.available.notify_one();
    }

    /// 取出最早的包
    ///
    /// blocking 为 true 时等待数据或停止信号。
    pub fn pop(&self, blocking: bool) -> Option<T> {
        let mut state = self.inner.lock();
        if blocking {
            while state.items.is_empty() && !state.stopped {
                self.available.wait(&mut state);
            }
        }
        state.items.pop_front()
    }

    /// 清空队列，返回丢弃的包数量
    pub fn clear(&self) -> usize {
        let drained: Vec<T> = {
            let mut state = self.inner.lock();
            state.items.drain(..).collect()
        };
        // 在锁外 drop，避免释放包时持有锁
        drained.len()
    }

    /// 设置停止标志并唤醒所有等待者
    pub fn set_stop(&self, stopped: bool) {
        let mut state = self.inner.lock();
        state.stopped = stopped;
        self.available.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stopped
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}

impl<T> Default for PacketQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
