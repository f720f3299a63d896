//! FFprobe preflight check.

use super::CheckResult;
use crate::models::config::Config;
use crate::services::ffprobe::Ffprobe;

/// Check if the configured ffprobe binary runs.
pub async fn check(config: &Config) -> CheckResult {
    let ffprobe = Ffprobe::new(&config.ffprobe.path);
    if ffprobe.is_installed().await {
        match ffprobe.get_version().await {
            Ok(version) => CheckResult::ok("ffprobe", &format!("installed ({})", version)),
            Err(_) => CheckResult::ok("ffprobe", "installed"),
        }
    } else {
        CheckResult::fail(
            "ffprobe",
            &format!("not found at '{}'", config.ffprobe.path.display()),
            "Install FFmpeg (sudo apt install ffmpeg) or set [ffprobe].path",
        )
    }
}
