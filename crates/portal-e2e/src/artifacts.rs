//! Per-scenario artifacts: videos and failure screenshots

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::E2eResult;

/// When to keep a recording of the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoMode {
    #[default]
    Off,
    On,
    RetainOnFailure,
}

impl VideoMode {
    /// Whether the browser should record at all
    pub fn records(&self) -> bool {
        !matches!(self, VideoMode::Off)
    }

    /// Whether a recording of a scenario with this outcome is kept
    pub fn keeps(&self, passed: bool) -> bool {
        match self {
            VideoMode::Off => false,
            VideoMode::On => true,
            VideoMode::RetainOnFailure => !passed,
        }
    }
}

impl fmt::Display for VideoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VideoMode::Off => "off",
            VideoMode::On => "on",
            VideoMode::RetainOnFailure => "retain-on-failure",
        })
    }
}

impl std::str::FromStr for VideoMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(VideoMode::Off),
            "on" => Ok(VideoMode::On),
            "retain-on-failure" => Ok(VideoMode::RetainOnFailure),
            other => Err(format!(
                "unknown video mode '{}' (expected off, on or retain-on-failure)",
                other
            )),
        }
    }
}

/// A file kept for a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: u64,
}

impl Artifact {
    pub fn from_path(path: &Path) -> E2eResult<Self> {
        let data = std::fs::read(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            sha256: hash_bytes(&data),
            bytes: data.len() as u64,
        })
    }
}

/// Hex SHA-256 of `data`
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Move a finished recording into `video_dir` as `<scenario>.<ext>` or delete it
///
/// Returns the kept artifact, if any.
pub fn settle_video(
    mode: VideoMode,
    passed: bool,
    recorded: Option<PathBuf>,
    video_dir: &Path,
    scenario: &str,
) -> E2eResult<Option<Artifact>> {
    let Some(recorded) = recorded else {
        return Ok(None);
    };

    if !recorded.exists() {
        debug!("Recorded video {} is gone", recorded.display());
        return Ok(None);
    }

    if !mode.keeps(passed) {
        debug!("Discarding video for '{}' ({})", scenario, mode);
        std::fs::remove_file(&recorded)?;
        return Ok(None);
    }

    std::fs::create_dir_all(video_dir)?;
    let ext = recorded
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "webm".to_string());
    let target = video_dir.join(format!("{}.{}", sanitize(scenario), ext));
    if target != recorded {
        if std::fs::rename(&recorded, &target).is_err() {
            // rename fails across filesystems
            std::fs::copy(&recorded, &target)?;
            std::fs::remove_file(&recorded)?;
        }
    }

    let artifact = Artifact::from_path(&target)?;
    info!("Saved video for '{}' to {}", scenario, target.display());
    Ok(Some(artifact))
}

/// File-name-safe form of a scenario name
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
