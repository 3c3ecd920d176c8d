use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// 音频环形缓冲区（PCM 字节）
///
/// 音频解码线程 push，音频设备回调 pop。
/// 两端都会阻塞：满了 push 等待（背压），空了 pop 等待（饥饿），
/// stop() 之后所有等待者立即返回。
pub struct AudioRingBuffer {
    inner: Mutex<RingState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

struct RingState {
    buf: Box<[u8]>,
    head: usize, // 读位置
    len: usize,  // 已占用字节数，始终 <= capacity
    stopped: bool,
}

impl RingState {
    fn free(&self) -> usize {
        self.buf.len() - self.len
    }

    fn write(&mut self, data: &[u8]) {
        let capacity = self.buf.len();
        let tail = (self.head + self.len) % capacity;
        let first = data.len().min(capacity - tail);
        self.buf[tail..tail + first].copy_from_slice(&data[..first]);
        let rest = data.len() - first;
        if rest > 0 {
            self.buf[..rest].copy_from_slice(&data[first..]);
        }
        self.len += data.len();
    }

    fn read(&mut self, dst: &mut [u8]) -> usize {
        let capacity = self.buf.len();
        let count = dst.len().min(self.len);
        let first = count.min(capacity - self.head);
        dst[..first].copy_from_slice(&self.buf[self.head..self.head + first]);
        let rest = count - first;
        if rest > 0 {
            dst[first..count].copy_from_slice(&self.buf[..rest]);
        }
        self.head = (self.head + count) % capacity;
        self.len -= count;
        count
    }
}

impl AudioRingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(RingState {
                buf: vec![0u8; capacity].into_boxed_slice(),
                head: 0,
                len: 0,
                stopped: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// 写入数据，空间不足时阻塞
    ///
    /// 返回 false 表示缓冲区已停止、数据没有（完整）写入，调用方不应重试。
    /// 超过容量的数据按容量分段写入。
    pub fn push(&self, data: &[u8]) -> bool {
        let mut state = self.inner.lock();
        let mut offset = 0;
        while offset < data.len() {
            let want = (data.len() - offset).min(self.capacity);
            while !state.stopped && state.free() < want {
                self.not_full.wait(&mut state);
            }
            if state.stopped {
                return false;
            }
            state.write(&data[offset..offset + want]);
            offset += want;
            self.not_empty.notify_all();
        }
        !state.stopped
    }

    /// 读取最多 dst.len() 字节，至少有 1 字节可读或已停止才返回
    ///
    /// 返回实际拷贝的字节数，少于请求是正常情况；停止且读空后返回 0。
    pub fn pop(&self, dst: &mut [u8]) -> usize {
        if dst.is_empty() {
            return 0;
        }
        let mut state = self.inner.lock();
        while !state.stopped && state.len == 0 {
            self.not_empty.wait(&mut state);
        }
        self.take(&mut state, dst)
    }

    /// 与 pop 相同，但最多等待 timeout，超时返回 0
    ///
    /// 给实时音频回调用，保证不会无限阻塞。
    pub fn pop_timeout(&self, dst: &mut [u8], timeout: Duration) -> usize {
        if dst.is_empty() {
            return 0;
        }
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.lock();
        while !state.stopped && state.len == 0 {
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        self.take(&mut state, dst)
    }

    fn take(&self, state: &mut RingState, dst: &mut [u8]) -> usize {
        let copied = state.read(dst);
        if copied > 0 {
            self.not_full.notify_all();
        }
        copied
    }

    /// 停止：唤醒所有等待者，之后 push 不再写入，pop 读完剩余数据后返回 0
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        state.stopped = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// 丢弃缓冲的数据（不影响停止标志）
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.head = 0;
        state.len = 0;
        self.not_full.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stopped
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
