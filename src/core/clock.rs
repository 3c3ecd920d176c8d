use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// 音频时钟 - 音画同步的主时钟（秒）
///
/// 只在音频拉取回调里按实际输出的字节数推进；
/// Seek/Stop 时由控制线程直接写入绝对值。
/// 数值以 f64 的位模式存放在 AtomicU64 中，推进使用 CAS，
/// 即使与重置并发也不会丢失更新。
pub struct AudioClock {
    bits: AtomicU64,
    rebase_armed: AtomicBool,
}

impl AudioClock {
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(0f64.to_bits()),
            rebase_armed: AtomicBool::new(false),
        }
    }

    /// 当前播放位置（秒）
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// 设置绝对位置
    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Release);
    }

    /// 推进时钟，返回推进后的值
    pub fn advance(&self, delta: f64) -> f64 {
        let previous = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + delta).to_bits())
            })
            .unwrap_or_else(|bits| bits);
        f64::from_bits(previous) + delta
    }

    /// Seek 后调用：让之后读到的第一个音频包用自己的时间戳校准时钟
    pub fn arm_rebase(&self) {
        self.rebase_armed.store(true, Ordering::Release);
    }

    pub fn is_rebase_armed(&self) -> bool {
        self.rebase_armed.load(Ordering::Acquire)
    }

    /// 消费一次校准请求（CAS，只会成功一次）
    ///
    /// 包没有时间戳时仅解除标记，保留 seek 预设的时钟值。
    pub fn rebase(&self, packet_pts: Option<f64>) -> bool {
        if self
            .rebase_armed
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        match packet_pts {
            Some(pts) => {
                self.set(pts);
                true
            }
            None => false,
        }
    }

    /// 回到 0 并取消未完成的校准
    pub fn reset(&self) {
        self.rebase_armed.store(false, Ordering::Release);
        self.set(0.0);
    }
}

impl Default for AudioClock {
    fn default() -> Self {
        Self::new()
    }
}
