//! Audio tracks mixed under the final video.

use std::path::{Path, PathBuf};

use crate::filters;
use crate::reaper::{HandleGuard, HandleRegistry, Release, ReleaseReport};

/// Ducking multiplier applied to background music.
pub const DUCKING_FACTOR: f64 = 0.6;

/// One decoded audio input and its filter chain.
#[derive(Debug)]
pub struct AudioTrack {
    path: PathBuf,
    filters: Vec<String>,
    looped: bool,
    gain: f64,
    handle: HandleGuard,
}

impl AudioTrack {
    pub fn open(registry: &HandleRegistry, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            path: path.to_path_buf(),
            filters: Vec::new(),
            looped: false,
            gain: 1.0,
            handle: registry.open(path),
        }
    }

    /// Multiply the track level by `factor`.
    pub fn with_volume(mut self, factor: f64) -> Self {
        self.filters.push(filters::volume(factor));
        self.gain *= factor;
        self
    }

    pub fn with_fade_in(mut self, seconds: f64) -> Self {
        if seconds > 0.0 {
            self.filters.push(filters::afade_in(seconds));
        }
        self
    }

    /// Fade out over the last `seconds` of a `total`-second track.
    pub fn with_fade_out(mut self, total: f64, seconds: f64) -> Self {
        if seconds > 0.0 {
            self.filters.push(filters::afade_out(total, seconds));
        }
        self
    }

    /// Loop the input until the mix is cut to length.
    pub fn looped(mut self) -> Self {
        self.looped = true;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    pub fn is_looped(&self) -> bool {
        self.looped
    }

    /// Product of every volume multiplier applied to this track.
    pub fn gain(&self) -> f64 {
        self.gain
    }
}

impl Release for AudioTrack {
    fn release(&mut self) -> ReleaseReport {
        ReleaseReport {
            handles_closed: usize::from(self.handle.close()),
            files_removed: 0,
        }
    }
}

/// Tracks mixed into one stream; the first track is the lead.
#[derive(Debug, Default)]
pub struct AudioMix {
    tracks: Vec<AudioTrack>,
}

impl AudioMix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, track: AudioTrack) {
        self.tracks.push(track);
    }

    pub fn tracks(&self) -> &[AudioTrack] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl Release for AudioMix {
    fn release(&mut self) -> ReleaseReport {
        crate::reaper::release_all(self.tracks.iter_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_gain_and_filters() {
        let registry = HandleRegistry::new();
        let track = AudioTrack::open(&registry, "/music/a.mp3")
            .with_volume(0.2)
            .with_fade_in(0.0)
            .with_fade_out(10.0, 3.0)
            .with_volume(DUCKING_FACTOR)
            .looped();
        assert!((track.gain() - 0.12).abs() < 1e-9);
        assert_eq!(
            track.filters(),
            &[
                "volume=0.2".to_string(),
                "afade=t=out:st=7:d=3".to_string(),
                "volume=0.6".to_string()
            ]
        );
        assert!(track.is_looped());
    }

    #[test]
    fn test_mix_release_closes_all_tracks() {
        let registry = HandleRegistry::new();
        let mut mix = AudioMix::new();
        mix.push(AudioTrack::open(&registry, "/a/narration.mp3"));
        mix.push(AudioTrack::open(&registry, "/a/music.mp3"));
        assert_eq!(registry.open_count(), 2);
        assert_eq!(mix.release().handles_closed, 2);
        assert_eq!(registry.open_count(), 0);
        assert!(mix.release().is_empty());
    }
}
