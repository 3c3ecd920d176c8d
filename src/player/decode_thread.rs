use crate::core::{PlayerEvent, VideoFrame};
use crate::player::demuxer_source::{AudioDecoder, Decoded, VideoDecoder};
use crate::player::log_ctx;
use crate::player::session::SessionContext;
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// 视频帧等待时的睡眠分片，保证 stop 能及时打断
const PACING_SLICE: Duration = Duration::from_millis(5);

/// 音画同步决策
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameAction {
    /// 立即显示
    Present,
    /// 帧比音频时钟超前，等待后显示
    Wait(Duration),
    /// 落后太多，丢弃不显示
    Drop,
}

/// 比较帧时间戳与音频时钟
pub fn pace_frame(pts: f64, clock: f64, late_tolerance: f64) -> FrameAction {
    let diff = pts - clock;
    if diff > 0.0 {
        FrameAction::Wait(Duration::from_secs_f64(diff))
    } else if diff < -late_tolerance {
        FrameAction::Drop
    } else {
        FrameAction::Present
    }
}

/// 解码线程统计
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct DecodeStats {
    pub packets: usize,
    pub frames: usize,
    pub dropped_frames: usize,
    pub errors: usize,
    pub flushed: bool,
}

// ============= 音频 =============

/// 音频解码循环（在独立线程中运行）
///
/// 解码出的 PCM 已经是输出格式，直接写入环形缓冲区；
/// 无论因为 stop 还是自然结束退出，最后都会标记音频输出 EOF。
pub fn run_audio_decode<D: AudioDecoder>(decoder: &mut D, ctx: &SessionContext<D::Packet>) -> DecodeStats {
    info!("{} 🔊 音频解码线程启动", log_ctx());
    let mut stats = DecodeStats::default();

    while ctx.flags.is_running() {
        if !ctx.flags.wait_while_paused(ctx.config.pause_poll()) {
            break;
        }

        match ctx.audio_queue.pop(true) {
            Some(packet) => {
                stats.packets += 1;
                // 包在这里移交给解码器并被释放
                if let Err(e) = decoder.send_packet(Some(packet)) {
                    stats.errors += 1;
                    warn!("{} ⚠️ 音频包解码失败（已跳过）: {}", log_ctx(), e);
                    continue;
                }
                if !drain_audio(decoder, ctx, &mut stats) {
                    break;
                }
            }
            None => {
                // 队列已停止且取空：文件结束时冲刷解码器
                if ctx.flags.is_running() && ctx.flags.is_eos() {
                    debug!("{} 🔊 音频队列已取空，冲刷解码器", log_ctx());
                    match decoder.send_packet(None) {
                        Ok(()) => {
                            drain_audio(decoder, ctx, &mut stats);
                        }
                        Err(e) => warn!("{} ⚠️ 音频解码器冲刷失败: {}", log_ctx(), e),
                    }
                    stats.flushed = true;
                }
                break;
            }
        }
    }

    ctx.sink.set_eof(true);
    info!(
        "{} 🛑 音频解码线程退出（{} 包，{} 帧，错误 {}）",
        log_ctx(),
        stats.packets,
        stats.frames,
        stats.errors
    );
    stats
}

/// 取出解码器里所有可用的帧并写入环形缓冲区
///
/// 返回 false 表示缓冲区已停止，线程应退出。
fn drain_audio<D: AudioDecoder>(decoder: &mut D, ctx: &SessionContext<D::Packet>, stats: &mut DecodeStats) -> bool {
    loop {
        match decoder.receive() {
            Ok(Decoded::Frame(pcm)) => {
                stats.frames += 1;
                // 空间不足时阻塞；stop 会先停止缓冲区把这里唤醒
                if !ctx.sink.ring().push(&pcm) {
                    return false;
                }
            }
            Ok(Decoded::Again) | Ok(Decoded::Eof) => return true,
            Err(e) => {
                stats.errors += 1;
                warn!("{} ⚠️ 音频帧解码失败（已跳过）: {}", log_ctx(), e);
                return true;
            }
        }
    }
}

// ============= 视频 =============

/// 视频解码循环（在独立线程中运行）
///
/// 文件结束时冲刷解码器，等音频播完后调用 on_finished 通知会话结束。
pub fn run_video_decode<D, F>(decoder: &mut D, ctx: &SessionContext<D::Packet>, on_finished: F) -> DecodeStats
where
    D: VideoDecoder,
    F: FnOnce(),
{
    info!("{} 🎞 视频解码线程启动", log_ctx());
    let mut stats = DecodeStats::default();

    while ctx.flags.is_running() {
        if !ctx.flags.wait_while_paused(ctx.config.pause_poll()) {
            break;
        }

        match ctx.video_queue.pop(true) {
            Some(packet) => {
                stats.packets += 1;
                if let Err(e) = decoder.send_packet(Some(packet)) {
                    stats.errors += 1;
                    warn!("{} ⚠️ 视频包解码失败（已跳过）: {}", log_ctx(), e);
                    continue;
                }
                drain_video(decoder, ctx, &mut stats);
            }
            None => {
                if ctx.flags.is_running() && ctx.flags.is_eos() {
                    debug!("{} 🎞 视频队列已取空，冲刷解码器", log_ctx());
                    match decoder.send_packet(None) {
                        Ok(()) => drain_video(decoder, ctx, &mut stats),
                        Err(e) => warn!("{} ⚠️ 视频解码器冲刷失败: {}", log_ctx(), e),
                    }
                    stats.flushed = true;

                    wait_for_audio_drain(ctx);
                    if ctx.flags.is_running() {
                        info!("{} 🏁 播放完成", log_ctx());
                        on_finished();
                    }
                }
                break;
            }
        }
    }

    info!(
        "{} 🛑 视频解码线程退出（{} 包，{} 帧，丢弃 {}，错误 {}）",
        log_ctx(),
        stats.packets,
        stats.frames,
        stats.dropped_frames,
        stats.errors
    );
    stats
}

fn drain_video<D: VideoDecoder>(decoder: &mut D, ctx: &SessionContext<D::Packet>, stats: &mut DecodeStats) {
    while ctx.flags.is_running() {
        match decoder.receive() {
            Ok(Decoded::Frame(frame)) => {
                stats.frames += 1;
                if !present_frame(ctx, frame) {
                    stats.dropped_frames += 1;
                }
            }
            Ok(Decoded::Again) | Ok(Decoded::Eof) => return,
            Err(e) => {
                stats.errors += 1;
                warn!("{} ⚠️ 视频帧解码失败（已跳过）: {}", log_ctx(), e);
                return;
            }
        }
    }
}

/// 按音频时钟决定帧的去留，到点后交给渲染端并发出进度
///
/// 返回 false 表示帧没有显示（落后被丢弃，或等待期间会话被停止）。
pub fn present_frame<P>(ctx: &SessionContext<P>, frame: VideoFrame) -> bool {
    let clock = ctx.sink.clock().get();
    match pace_frame(frame.pts, clock, ctx.config.late_frame_tolerance) {
        FrameAction::Drop => {
            debug!("丢弃落后帧: pts={:.3}s, 时钟={:.3}s", frame.pts, clock);
            return false;
        }
        FrameAction::Wait(delay) => {
            if !ctx.flags.sleep_while_running(delay, PACING_SLICE) {
                return false;
            }
        }
        FrameAction::Present => {}
    }

    let pts = frame.pts;
    ctx.renderer.deliver(Arc::new(frame));
    // 通道满了（宿主没在读）或接收端已丢弃时直接丢掉这次进度
    let _ = ctx.events.try_send(PlayerEvent::Progress {
        current: pts,
        total: ctx.duration,
    });
    true
}

/// 等待音频解码结束并且缓冲区播放完毕
fn wait_for_audio_drain<P>(ctx: &SessionContext<P>) {
    while ctx.flags.is_running() && !(ctx.sink.is_eof() && ctx.sink.ring().is_empty()) {
        thread::sleep(ctx.config.eof_idle());
    }
}
