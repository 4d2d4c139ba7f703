//! Clip graph to FFmpeg filtergraph compiler.

use std::path::PathBuf;

use crate::audio::AudioMix;
use crate::clip::{Clip, ClipKind, Layer};
use crate::command::FfmpegInput;
use crate::error::{MediaError, MediaResult};
use crate::filters;

/// A compiled graph: inputs, the `-filter_complex` string and the labels
/// to map.
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    pub inputs: Vec<FfmpegInput>,
    pub filter_complex: String,
    pub video_label: String,
    pub audio_label: Option<String>,
    /// Output duration (seconds)
    pub duration: f64,
}

impl CompiledGraph {
    pub fn input_paths(&self) -> Vec<PathBuf> {
        self.inputs.iter().map(|i| i.path().to_path_buf()).collect()
    }
}

#[derive(Default)]
struct GraphBuilder {
    inputs: Vec<FfmpegInput>,
    chains: Vec<String>,
    next_label: usize,
    fps: u32,
}

impl GraphBuilder {
    fn label(&mut self, prefix: char) -> String {
        let label = format!("{}{}", prefix, self.next_label);
        self.next_label += 1;
        label
    }

    fn push_chain(&mut self, inputs: &[&str], body: &str, prefix: char) -> String {
        let out = self.label(prefix);
        let ins: String = inputs.iter().map(|l| format!("[{}]", l)).collect();
        self.chains.push(format!("{}{}[{}]", ins, body, out));
        out
    }

    fn add_input(&mut self, input: FfmpegInput) -> usize {
        self.inputs.push(input);
        self.inputs.len() - 1
    }

    fn compile_clip(&mut self, clip: &Clip) -> MediaResult<String> {
        if clip.is_released() {
            return Err(MediaError::invalid_graph("clip used after release"));
        }

        let label = match clip.kind() {
            ClipKind::Source(spec) => {
                let mut input = FfmpegInput::new(&spec.path);
                if spec.still {
                    input = input.still_image().duration(spec.span);
                } else {
                    if spec.start > 0.0 {
                        input = input.seek(spec.start);
                    }
                    input = input.duration(spec.span);
                }
                let index = self.add_input(input);
                let body = format!("fps={},{}", self.fps, filters::RESET_PTS);
                self.push_chain(&[&format!("{}:v", index)], &body, 'v')
            }
            ClipKind::Color { color } => {
                let source = filters::color_source(
                    color,
                    clip.width(),
                    clip.height(),
                    clip.duration(),
                    self.fps,
                );
                self.push_chain(&[], &source, 'v')
            }
            ClipKind::Composite { layers } => {
                let mut iter = layers.iter();
                let mut base = match iter.next() {
                    Some(Layer::Video { clip, .. }) => self.compile_clip(clip)?,
                    _ => {
                        return Err(MediaError::invalid_graph(
                            "composite must start with a video layer",
                        ))
                    }
                };
                for layer in iter {
                    base = match layer {
                        Layer::Video { clip, x, y, enable } => {
                            let top = self.compile_clip(clip)?;
                            let body = filters::overlay(x, y, *enable);
                            self.push_chain(&[&base, &top], &body, 'v')
                        }
                        Layer::Text {
                            text_file,
                            style,
                            x,
                            y,
                            enable,
                        } => {
                            let body = filters::drawtext(
                                &text_file.path().to_string_lossy(),
                                style,
                                x,
                                y,
                                *enable,
                            );
                            self.push_chain(&[&base], &body, 'v')
                        }
                    };
                }
                base
            }
            ClipKind::Concat { parts } => {
                let mut labels = Vec::with_capacity(parts.len());
                for part in parts {
                    let compiled = self.compile_clip(part)?;
                    labels.push(self.push_chain(&[&compiled], "setsar=1", 'v'));
                }
                let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
                let body = format!("concat=n={}:v=1:a=0", labels.len());
                self.push_chain(&refs, &body, 'v')
            }
        };

        if clip.filters().is_empty() {
            Ok(label)
        } else {
            let body = clip.filters().join(",");
            Ok(self.push_chain(&[&label], &body, 'v'))
        }
    }

    fn compile_audio(&mut self, mix: &AudioMix, duration: f64) -> MediaResult<Option<String>> {
        let mut labels = Vec::new();
        for track in mix.tracks() {
            let mut input = FfmpegInput::new(track.path());
            if track.is_looped() {
                input = input.stream_loop(-1);
            }
            let index = self.add_input(input);
            let mut chain = vec![filters::atrim(duration)];
            chain.extend(track.filters().iter().cloned());
            labels.push(self.push_chain(&[&format!("{}:a", index)], &chain.join(","), 'a'));
        }
        match labels.len() {
            0 => Ok(None),
            1 => Ok(labels.pop()),
            n => {
                let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
                Ok(Some(self.push_chain(&refs, &filters::amix(n), 'a')))
            }
        }
    }
}

/// Compile a clip (and optional audio mix) into a filtergraph at `fps`.
pub fn compile(clip: &Clip, audio: Option<&AudioMix>, fps: u32) -> MediaResult<CompiledGraph> {
    let mut builder = GraphBuilder {
        fps,
        ..Default::default()
    };
    let video_label = builder.compile_clip(clip)?;
    let audio_label = match audio {
        Some(mix) => builder.compile_audio(mix, clip.duration())?,
        None => None,
    };
    Ok(CompiledGraph {
        inputs: builder.inputs,
        filter_complex: builder.chains.join(";"),
        video_label,
        audio_label,
        duration: clip.duration(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::MediaInfo;
    use crate::reaper::HandleRegistry;

    #[test]
    fn test_compile_source_with_filters() {
        let registry = HandleRegistry::new();
        let clip = Clip::source(&registry, "/m/a.mp4", &MediaInfo::video(1920, 1080, 10.0))
            .subclip(2.0, 5.0)
            .unwrap()
            .resized(1080, 608);
        let graph = compile(&clip, None, 30).unwrap();
        assert_eq!(graph.inputs.len(), 1);
        assert_eq!(
            graph.filter_complex,
            "[0:v]fps=30,setpts=PTS-STARTPTS[v0];[v0]scale=1080:608[v1]"
        );
        assert_eq!(graph.video_label, "v1");
        assert!((graph.duration - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_compile_composite_overlays_on_background() {
        let registry = HandleRegistry::new();
        let fg = Clip::source(&registry, "/m/a.mp4", &MediaInfo::video(640, 360, 4.0));
        let bg = Clip::color("black", 1080, 1920, 4.0);
        let comp = Clip::composite(1080, 1920, 4.0, vec![Layer::at(bg, 0, 0), Layer::at(fg, 220, 780)]);
        let graph = compile(&comp, None, 30).unwrap();
        assert!(graph.filter_complex.starts_with("color=c=black:s=1080x1920:d=4:r=30[v0]"));
        assert!(graph
            .filter_complex
            .contains("[v0][v1]overlay=x=220:y=780:eof_action=pass[v2]"));
    }

    #[test]
    fn test_compile_concat_of_two_sources() {
        let registry = HandleRegistry::new();
        let a = Clip::source(&registry, "/t/acc.mp4", &MediaInfo::video(1080, 1920, 5.0));
        let b = Clip::source(&registry, "/t/seg-2.mp4", &MediaInfo::video(1080, 1920, 3.0));
        let clip = Clip::concat(vec![a, b]).unwrap();
        let graph = compile(&clip, None, 30).unwrap();
        assert_eq!(graph.inputs.len(), 2);
        assert!(graph.filter_complex.contains("concat=n=2:v=1:a=0"));
        assert_eq!(graph.duration, 8.0);
    }

    #[test]
    fn test_composite_without_video_base_is_rejected() {
        let comp = Clip::composite(10, 10, 1.0, Vec::new());
        assert!(matches!(
            compile(&comp, None, 30),
            Err(MediaError::InvalidGraph(_))
        ));
    }
}
