//! Operating-system side effects of a notification.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::NotificationError;

#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Read `text` aloud.
    async fn speak(&self, text: &str) -> Result<(), NotificationError>;

    /// Play a named sound asset to completion.
    async fn play_sound(&self, name: &str) -> Result<(), NotificationError>;

    async fn show_banner(&self, title: &str, body: &str) -> Result<(), NotificationError>;

    async fn open_url(&self, url: &str) -> Result<(), NotificationError>;
}

/// Shells out to the platform's speech, audio and notification utilities.
pub struct DesktopAlertSink {
    sounds_dir: PathBuf,
}

impl DesktopAlertSink {
    pub fn new(sounds_dir: impl Into<PathBuf>) -> Self {
        Self {
            sounds_dir: sounds_dir.into(),
        }
    }

    fn sound_path(&self, name: &str) -> Result<PathBuf, NotificationError> {
        let file = Path::new(name);
        if file.components().count() != 1 || file.file_name().is_none() {
            return Err(NotificationError::Playback(format!(
                "invalid sound name: {}",
                name
            )));
        }
        let path = if file.extension().is_some() {
            self.sounds_dir.join(file)
        } else {
            self.sounds_dir.join(format!("{}.wav", name))
        };
        if !path.is_file() {
            return Err(NotificationError::Playback(format!(
                "sound asset not found: {}",
                path.display()
            )));
        }
        Ok(path)
    }
}

async fn run(mut command: Command) -> Result<(), NotificationError> {
    let program = format!("{:?}", command.as_std().get_program());
    let status = command
        .status()
        .await
        .map_err(|e| NotificationError::Playback(format!("{} failed to start: {}", program, e)))?;
    if status.success() {
        debug!(%program, "Alert command finished");
        Ok(())
    } else {
        Err(NotificationError::Playback(format!(
            "{} exited with {}",
            program, status
        )))
    }
}

fn escape_applescript(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl AlertSink for DesktopAlertSink {
    async fn speak(&self, text: &str) -> Result<(), NotificationError> {
        let mut command = if cfg!(target_os = "macos") {
            Command::new("say")
        } else {
            let mut spd = Command::new("spd-say");
            spd.arg("--wait");
            spd
        };
        command.arg(text);
        run(command).await
    }

    async fn play_sound(&self, name: &str) -> Result<(), NotificationError> {
        let path = self.sound_path(name)?;
        let mut command = if cfg!(target_os = "macos") {
            Command::new("afplay")
        } else {
            Command::new("paplay")
        };
        command.arg(path);
        run(command).await
    }

    async fn show_banner(&self, title: &str, body: &str) -> Result<(), NotificationError> {
        if cfg!(target_os = "macos") {
            let script = format!(
                "display notification \"{}\" with title \"{}\"",
                escape_applescript(body),
                escape_applescript(title)
            );
            let mut command = Command::new("osascript");
            command.arg("-e").arg(script);
            run(command).await
        } else {
            let mut command = Command::new("notify-send");
            command.arg(title).arg(body);
            run(command).await
        }
    }

    async fn open_url(&self, url: &str) -> Result<(), NotificationError> {
        let url = url.to_string();
        tokio::task::spawn_blocking(move || open::that(&url))
            .await
            .map_err(|e| NotificationError::Playback(format!("browser task failed: {}", e)))?
            .map_err(|e| NotificationError::Playback(format!("failed to open browser: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sound_names_cannot_escape_the_sounds_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DesktopAlertSink::new(dir.path());

        assert!(sink.sound_path("../secret").is_err());
        assert!(sink.sound_path("missing").is_err());

        std::fs::write(dir.path().join("siren.wav"), b"RIFF").unwrap();
        assert_eq!(sink.sound_path("siren").unwrap(), dir.path().join("siren.wav"));
    }

    #[test]
    fn applescript_quotes_are_escaped() {
        assert_eq!(escape_applescript(r#"say "hi""#), r#"say \"hi\""#);
    }
}
