//! MYY 播放引擎
//!
//! 打开容器文件，在独立线程上解封装、解码音频和视频，
//! 以音频输出实际播放的字节数作为主时钟驱动视频帧的显示。

pub mod core;
pub mod player;

pub use crate::core::{MediaInfo, PlaybackState, PlayerConfig, PlayerError, PlayerEvent, Result};
pub use crate::player::PlaybackManager;
