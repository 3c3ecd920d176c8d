use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use myy_engine::core::{PlaybackState, PlayerConfig, PlayerEvent};
use myy_engine::player::{
    CpalAudioBackend, FfmpegBackend, HeadlessAudioBackend, LatestFrameSink, PlaybackManager,
};

/// 命令行播放器：打开文件播放到结束
#[derive(Parser, Debug)]
#[command(name = "myy-play")]
#[command(about = "MYY 播放引擎命令行前端")]
#[command(version)]
struct Args {
    /// 媒体文件路径或 URL
    url: String,

    /// JSON 配置文件
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 音量 (0.0 ~ 1.0)
    #[arg(short, long, default_value_t = 1.0)]
    volume: f32,

    /// 起始位置（0.0 ~ 1.0，按总时长比例）
    #[arg(short, long)]
    seek: Option<f64>,

    /// 不使用声卡（按墙钟节拍消费音频）
    #[arg(long)]
    headless: bool,
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();
    info!("🎬 MYY Player - 命令行版本启动");

    let config = match &args.config {
        Some(path) => PlayerConfig::load(path)
            .with_context(|| format!("加载配置失败: {}", path.display()))?,
        None => PlayerConfig::default(),
    };

    let renderer = Arc::new(LatestFrameSink::new());
    let manager = if args.headless {
        PlaybackManager::with_backends(
            FfmpegBackend::new()?,
            Box::new(HeadlessAudioBackend::new()),
            renderer.clone(),
            config,
        )?
    } else {
        PlaybackManager::with_backends(
            FfmpegBackend::new()?,
            Box::new(CpalAudioBackend::new()),
            renderer.clone(),
            config,
        )?
    };
    manager.set_volume(args.volume);

    let media = manager
        .open_file(&args.url)
        .with_context(|| format!("无法打开: {}", args.url))?;
    info!(
        "📺 {}x{} @ {:.2} fps, {} / {} ({} Hz, {} 声道), 时长 {:.2}s",
        media.width,
        media.height,
        media.fps,
        media.video_codec,
        media.audio_codec,
        media.sample_rate,
        media.channels,
        media.duration
    );

    let events = manager.events();
    match args.seek {
        Some(fraction) => manager.seek(fraction)?,
        None => manager.play()?,
    }

    let mut last_reported = -1.0f64;
    loop {
        match events.recv_timeout(Duration::from_millis(500)) {
            Ok(PlayerEvent::Progress { current, total }) => {
                // 每秒最多打印一次
                if current - last_reported >= 1.0 || current < last_reported {
                    info!("⏱ {:.1}s / {:.1}s", current, total);
                    last_reported = current;
                }
            }
            Ok(PlayerEvent::Finished) => {
                info!("🏁 播放完成，共显示 {} 帧", renderer.frames_delivered());
                break;
            }
            Err(_) => {
                if manager.state() == PlaybackState::Stopped {
                    warn!("播放已停止");
                    break;
                }
            }
        }
    }

    manager.stop();
    Ok(())
}
