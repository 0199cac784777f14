//! Sound playback via [kira](https://docs.rs/kira).
//!
//! [`Audio`] owns the output device and a table of loaded [`Sound`]s keyed
//! by path. [`Audio::play`] starts a sound and returns a [`Source`] that
//! controls that one playing instance. Nothing here touches the render core.
//!
//! ```ignore
//! let mut audio = Audio::new()?;
//! let blip = audio.load("assets/blip.ogg")?;
//! let mut source = audio.play_named(&blip)?;
//! source.set_gain(0.5);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kira::sound::PlaybackState;
use kira::sound::static_sound::{StaticSoundData, StaticSoundHandle};
use kira::{AudioManager, AudioManagerSettings, Decibels, DefaultBackend, Tween};
use thiserror::Error;

use crate::asset::path_key;

/// Convert a linear amplitude (0.0 = silence, 1.0 = full) to decibels.
fn amplitude_to_db(amplitude: f64) -> Decibels {
    if amplitude <= 0.0 {
        Decibels::SILENCE
    } else {
        Decibels((20.0 * amplitude.log10()) as f32)
    }
}

const SOUND_EXTENSIONS: [&str; 4] = ["ogg", "wav", "mp3", "flac"];

fn is_sound_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SOUND_EXTENSIONS.iter().any(|s| e.eq_ignore_ascii_case(s)))
}

// ── Errors ──────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("audio backend init failed: {0}")]
    BackendInit(String),

    #[error("failed to load sound {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("failed to play sound: {0}")]
    Play(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ── Sound ───────────────────────────────────────────────────────────────

/// Decoded audio data. Clones share the samples.
#[derive(Clone)]
pub struct Sound {
    data: StaticSoundData,
    path: PathBuf,
}

impl Sound {
    /// Decode a whole file (OGG, WAV, MP3, FLAC) into memory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AudioError> {
        let path = path.as_ref();
        let data = StaticSoundData::from_file(path).map_err(|e| AudioError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            data,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn duration(&self) -> Duration {
        self.data.duration()
    }

    /// Amplitude scale, 1.0 = full.
    pub fn volume(mut self, volume: f64) -> Self {
        self.data = self.data.volume(amplitude_to_db(volume));
        self
    }

    pub fn looping(mut self) -> Self {
        self.data = self.data.loop_region(..);
        self
    }

    /// 1.0 = normal speed.
    pub fn playback_rate(mut self, rate: f64) -> Self {
        self.data = self.data.playback_rate(rate);
        self
    }

    /// 0.0 = left, 0.5 = center, 1.0 = right.
    pub fn panning(mut self, panning: f64) -> Self {
        self.data = self.data.panning(panning as f32);
        self
    }
}

impl fmt::Debug for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sound")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

// ── Source ──────────────────────────────────────────────────────────────

/// One playing instance of a [`Sound`].
pub struct Source {
    handle: StaticSoundHandle,
    gain: f64,
}

impl Source {
    pub fn pause(&mut self) {
        self.handle.pause(Tween::default());
    }

    pub fn resume(&mut self) {
        self.handle.resume(Tween::default());
    }

    /// A stopped source cannot be restarted; play the sound again instead.
    pub fn stop(&mut self) {
        self.handle.stop(Tween::default());
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f64) {
        self.gain = gain;
        self.handle.set_volume(amplitude_to_db(gain), Tween::default());
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        self.handle.set_playback_rate(rate, Tween::default());
    }

    /// Playback position in seconds.
    pub fn position(&self) -> f64 {
        self.handle.position()
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.handle.state(), PlaybackState::Playing)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.handle.state(), PlaybackState::Paused)
    }

    /// True once the sound has finished or been stopped.
    pub fn is_stopped(&self) -> bool {
        matches!(self.handle.state(), PlaybackState::Stopped)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("state", &self.handle.state())
            .field("gain", &self.gain)
            .finish()
    }
}

// ── Audio ───────────────────────────────────────────────────────────────

/// The output device plus every sound loaded through it.
pub struct Audio {
    manager: AudioManager<DefaultBackend>,
    gain: f64,
    sounds: HashMap<String, Sound>,
}

impl Audio {
    pub const DEFAULT_GAIN: f64 = 0.8;

    /// Open the default output device.
    pub fn new() -> Result<Self, AudioError> {
        let manager = AudioManager::<DefaultBackend>::new(AudioManagerSettings::default())
            .map_err(|e| AudioError::BackendInit(e.to_string()))?;
        let mut audio = Self {
            manager,
            gain: Self::DEFAULT_GAIN,
            sounds: HashMap::new(),
        };
        audio.set_gain(Self::DEFAULT_GAIN);
        log::info!("Audio device opened");
        Ok(audio)
    }

    /// Listener gain applied to everything that plays.
    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f64) {
        self.gain = gain;
        self.manager
            .main_track()
            .set_volume(amplitude_to_db(gain), Tween::default());
    }

    /// Decode `path` and register it under its path key. Loading the same
    /// path twice returns the registered sound.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<String, AudioError> {
        let path = path.as_ref();
        let key = path_key(path);
        if !self.sounds.contains_key(&key) {
            let sound = Sound::from_file(path)?;
            log::info!("Loaded sound: {}", path.display());
            self.sounds.insert(key.clone(), sound);
        }
        Ok(key)
    }

    /// Load every sound file in `dir`. Files that fail to decode are
    /// logged and skipped.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<Vec<String>, AudioError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| AudioError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_sound_file(p))
            .collect();
        paths.sort();

        let mut keys = Vec::new();
        for path in paths {
            match self.load(&path) {
                Ok(key) => keys.push(key),
                Err(e) => log::warn!("Skipping {}: {e}", path.display()),
            }
        }
        Ok(keys)
    }

    pub fn sound(&self, key: &str) -> Option<&Sound> {
        self.sounds.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, sound: Sound) {
        self.sounds.insert(key.into(), sound);
    }

    pub fn remove(&mut self, key: &str) -> Option<Sound> {
        self.sounds.remove(key)
    }

    pub fn play(&mut self, sound: &Sound) -> Result<Source, AudioError> {
        let handle = self
            .manager
            .play(sound.data.clone())
            .map_err(|e| AudioError::Play(e.to_string()))?;
        Ok(Source { handle, gain: 1.0 })
    }

    /// Play a registered sound by key.
    pub fn play_named(&mut self, key: &str) -> Result<Source, AudioError> {
        let sound = self
            .sounds
            .get(key)
            .cloned()
            .ok_or_else(|| AudioError::Play(format!("unknown sound: {key}")))?;
        self.play(&sound)
    }
}

impl fmt::Debug for Audio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Audio")
            .field("gain", &self.gain)
            .field("sounds", &self.sounds.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amplitude_maps_to_decibels() {
        assert_eq!(amplitude_to_db(0.0), Decibels::SILENCE);
        assert_eq!(amplitude_to_db(-1.0), Decibels::SILENCE);
        assert!(amplitude_to_db(1.0).0.abs() < 1e-6);
        assert!((amplitude_to_db(0.5).0 + 6.0206).abs() < 1e-3);
    }

    #[test]
    fn sound_extensions_are_case_insensitive() {
        assert!(is_sound_file(Path::new("a/blip.ogg")));
        assert!(is_sound_file(Path::new("a/blip.WAV")));
        assert!(!is_sound_file(Path::new("a/blip.png")));
        assert!(!is_sound_file(Path::new("a/blip")));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = Sound::from_file("does/not/exist.ogg").unwrap_err();
        assert!(matches!(err, AudioError::Load { .. }));
    }
}
