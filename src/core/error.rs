use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("配置解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("无法打开文件: {0}")]
    OpenError(String),

    #[error("无法找到视频流")]
    NoVideoStream,

    #[error("无法找到音频流")]
    NoAudioStream,

    #[error("解码错误: {0}")]
    DecodeError(String),

    #[error("音频输出错误: {0}")]
    AudioError(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("没有打开的文件")]
    NoMedia,
}

impl PlayerError {
    /// 是否属于打开阶段的错误（需要提示给用户）
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            PlayerError::OpenError(_)
                | PlayerError::NoVideoStream
                | PlayerError::NoAudioStream
                | PlayerError::FFmpegError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
