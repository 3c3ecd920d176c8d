use crate::player::demuxer_source::Demuxer;
use crate::player::log_ctx;
use crate::player::session::SessionContext;
use log::{debug, info, warn};
use std::thread;

/// 解封装统计
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct DemuxStats {
    pub audio_packets: usize,
    pub video_packets: usize,
    pub dropped_packets: usize,
    pub read_errors: usize,
    pub reached_eos: bool,
}

/// Demuxer 循环（在独立线程中运行）
///
/// 关键点：
/// - 暂停时忙等，保证 stop 能立即生效
/// - 音频队列（以及配置了上限的视频队列）超过上限时短暂休眠，形成背压
/// - 读到 EOF 后标记 eos，并停止两个队列，让解码线程把剩余的包处理完后退出
/// - Seek 之后的第一个音频包用自己的时间戳覆盖音频时钟
pub fn run_demux<D: Demuxer>(demuxer: &mut D, ctx: &SessionContext<D::Packet>) -> DemuxStats {
    info!("{} 🎬 Demuxer 线程启动: {}", log_ctx(), demuxer.description());

    let config = &ctx.config;
    let audio_index = demuxer.audio_stream_index();
    let video_index = demuxer.video_stream_index();
    let mut stats = DemuxStats::default();
    let mut consecutive_errors = 0usize;

    // 仅用于日志
    const LOG_FIRST_N: usize = 5;

    while ctx.flags.is_running() {
        if !ctx.flags.wait_while_paused(config.pause_poll()) {
            break;
        }

        if ctx.flags.is_eos() {
            thread::sleep(config.eof_idle());
            continue;
        }

        if config.should_throttle(ctx.audio_queue.len(), ctx.video_queue.len()) {
            thread::sleep(config.backpressure_sleep());
            continue;
        }

        match demuxer.read_packet() {
            Ok(Some(media_packet)) => {
                consecutive_errors = 0;

                if media_packet.stream_index == audio_index {
                    stats.audio_packets += 1;
                    if stats.audio_packets <= LOG_FIRST_N || stats.audio_packets % 500 == 0 {
                        debug!(
                            "{} 🔊 Demuxer 读取音频包 #{} pts={:?}",
                            log_ctx(),
                            stats.audio_packets,
                            media_packet.pts
                        );
                    }

                    let clock = ctx.sink.clock();
                    if clock.is_rebase_armed() && clock.rebase(media_packet.pts) {
                        info!(
                            "{} ⏱ Seek 后首个音频包，音频时钟校正为 {:.3}s",
                            log_ctx(),
                            clock.get()
                        );
                    }

                    ctx.audio_queue.push(media_packet.packet);
                } else if media_packet.stream_index == video_index {
                    stats.video_packets += 1;
                    if stats.video_packets <= LOG_FIRST_N || stats.video_packets % 500 == 0 {
                        debug!(
                            "{} 📦 Demuxer 读取视频包 #{} pts={:?}",
                            log_ctx(),
                            stats.video_packets,
                            media_packet.pts
                        );
                    }
                    ctx.video_queue.push(media_packet.packet);
                } else {
                    // 字幕/数据流的包直接丢弃
                    stats.dropped_packets += 1;
                }
            }
            Ok(None) => {
                info!("{} 📄 Demuxer 到达文件末尾", log_ctx());
                finish_input(ctx, &mut stats);
                break;
            }
            Err(e) => {
                stats.read_errors += 1;
                consecutive_errors += 1;
                warn!("{} ⚠️ 读取包失败（已跳过）: {}", log_ctx(), e);

                if consecutive_errors >= config.max_consecutive_read_errors as usize {
                    warn!(
                        "{} ❌ 连续 {} 次读取失败，按文件末尾处理",
                        log_ctx(),
                        consecutive_errors
                    );
                    finish_input(ctx, &mut stats);
                    break;
                }
            }
        }
    }

    info!(
        "{} 🛑 Demuxer 线程退出（{} 音频包，{} 视频包，丢弃 {}，读取错误 {}）",
        log_ctx(),
        stats.audio_packets,
        stats.video_packets,
        stats.dropped_packets,
        stats.read_errors
    );
    stats
}

fn finish_input<P>(ctx: &SessionContext<P>, stats: &mut DemuxStats) {
    stats.reached_eos = true;
    ctx.flags.set_eos(true);
    // 通知解码线程：队列里的包取完就结束
    ctx.stop_queues();
}
