//! Command lines for the streaming stages

use std::fmt;
use webcd_common::{Bitrate, RobustnessMode, StreamProfile};

/// Size of each chunk handed to the HTTP body
pub const CHUNK_SIZE: usize = 4096;

/// The fallback transcoder ignores the active profile
pub const FALLBACK_BITRATE: Bitrate = Bitrate::K192;

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl StageCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl fmt::Display for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// cdparanoia flags for a robustness mode
pub fn robustness_flags(mode: RobustnessMode) -> &'static [&'static str] {
    match mode {
        RobustnessMode::Fast => &["-Z", "-Y", "--never-skip=10"],
        RobustnessMode::Normal => &["-Y", "--never-skip=20"],
        RobustnessMode::Paranoid => &[],
    }
}

/// Raw PCM extraction of one track to stdout
pub fn extraction_command(program: &str, device: &str, track: u32, mode: RobustnessMode) -> StageCommand {
    let mut args = vec!["-d".to_string(), device.to_string(), "-r".to_string()];
    args.extend(robustness_flags(mode).iter().map(|s| s.to_string()));
    args.push(track.to_string());
    args.push("-".to_string());
    StageCommand::new(program, args)
}

/// MP3 encoding of s16le/44.1 kHz/stereo PCM from stdin to stdout
pub fn encoder_command(program: &str, profile: &StreamProfile) -> StageCommand {
    let bitrate = profile.bitrate.as_arg();
    let args = [
        "-f", "s16le", "-ar", "44100", "-ac", "2", "-i", "-", "-acodec", "mp3", "-ab",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain([
        bitrate.clone(),
        "-bufsize".to_string(),
        profile.buffer_size.as_arg(),
        "-maxrate".to_string(),
        bitrate,
        "-f".to_string(),
        "mp3".to_string(),
        "-".to_string(),
    ])
    .collect();
    StageCommand::new(program, args)
}

/// Single-stage read and encode of one track, straight from the device
pub fn fallback_command(program: &str, device: &str, track: u32) -> StageCommand {
    let args = vec![
        "-f".to_string(),
        "libcdio".to_string(),
        "-i".to_string(),
        device.to_string(),
        "-map".to_string(),
        format!("0:a:{}", track.saturating_sub(1)),
        "-acodec".to_string(),
        "mp3".to_string(),
        "-ab".to_string(),
        FALLBACK_BITRATE.as_arg(),
        "-f".to_string(),
        "mp3".to_string(),
        "-".to_string(),
    ];
    StageCommand::new(program, args)
}
