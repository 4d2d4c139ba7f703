//! FFmpeg filter builders.
//!
//! Expressions that contain commas are single-quoted so they survive
//! filtergraph parsing.

use reel_models::SlideDirection;

/// Uniform time-scale (`speed > 1` plays faster).
pub fn speed(factor: f64) -> String {
    format!("setpts=PTS/{}", fmt_num(factor))
}

/// Reset timestamps to start at zero.
pub const RESET_PTS: &str = "setpts=PTS-STARTPTS";

pub fn scale(width: u32, height: u32) -> String {
    format!("scale={}:{}", even(width), even(height))
}

pub fn crop(width: u32, height: u32, x: u32, y: u32) -> String {
    format!("crop={}:{}:{}:{}", width, height, x, y)
}

/// Zoom in by `rate` per second, keeping a centred `width` x `height` frame.
pub fn zoom_in(width: u32, height: u32, rate: f64) -> String {
    let factor = format!("(1+{}*t)", fmt_num(rate));
    format!(
        "scale=w='trunc(iw*{f}/2)*2':h='trunc(ih*{f}/2)*2':eval=frame,crop={}:{}",
        even(width),
        even(height),
        f = factor
    )
}

/// Scale a still-image thumbnail into a square box, keeping aspect ratio.
pub fn fit_box(max_side: u32) -> String {
    format!(
        "scale='min({m},iw)':'min({m},ih)':force_original_aspect_ratio=decrease",
        m = max_side
    )
}

/// Opacity ramp from black at the head.
pub fn fade_in(duration: f64) -> String {
    format!("fade=t=in:st=0:d={}", fmt_num(duration))
}

/// Opacity ramp to black ending at `clip_duration`.
pub fn fade_out(clip_duration: f64, duration: f64) -> String {
    let start = (clip_duration - duration).max(0.0);
    format!("fade=t=out:st={}:d={}", fmt_num(start), fmt_num(duration))
}

/// Keep the head `[0, duration)`.
pub fn trim_head(duration: f64) -> String {
    format!("trim=duration={},{}", fmt_num(duration), RESET_PTS)
}

/// Solid colour source.
pub fn color_source(color: &str, width: u32, height: u32, duration: f64, fps: u32) -> String {
    format!(
        "color=c={}:s={}x{}:d={}:r={}",
        ffmpeg_color(color),
        width,
        height,
        fmt_num(duration),
        fps
    )
}

/// Overlay with position expressions and an optional enable window.
pub fn overlay(x: &str, y: &str, enable: Option<(f64, f64)>) -> String {
    let mut filter = format!("overlay=x={}:y={}:eof_action=pass", quote_expr(x), quote_expr(y));
    if let Some((from, to)) = enable {
        filter.push_str(&format!(":enable={}", between(from, to)));
    }
    filter
}

/// `between(t,a,b)` enable expression, quoted.
pub fn between(from: f64, to: f64) -> String {
    format!("'between(t,{},{})'", fmt_num(from), fmt_num(to))
}

/// Position expressions `(x, y)` for a layer sliding in from `side`.
///
/// `W`/`H` are the frame size as seen by `overlay`; the layer reaches its
/// resting position `(0, 0)` at `duration`.
pub fn slide_in_position(side: SlideDirection, duration: f64) -> (String, String) {
    let d = fmt_num(duration);
    let ramp = |from: &str| format!("if(lt(t,{d}),{from}*(1-t/{d}),0)");
    match side {
        SlideDirection::Left => (ramp("-W"), "0".to_string()),
        SlideDirection::Right => (ramp("W"), "0".to_string()),
        SlideDirection::Top => ("0".to_string(), ramp("-H")),
        SlideDirection::Bottom => ("0".to_string(), ramp("H")),
    }
}

/// Position expressions `(x, y)` for a layer sliding out towards `side`,
/// leaving the frame at `clip_duration`.
pub fn slide_out_position(
    side: SlideDirection,
    clip_duration: f64,
    duration: f64,
) -> (String, String) {
    let start = fmt_num((clip_duration - duration).max(0.0));
    let d = fmt_num(duration);
    let ramp = |to: &str| format!("if(gt(t,{start}),{to}*(t-{start})/{d},0)");
    match side {
        SlideDirection::Left => (ramp("-W"), "0".to_string()),
        SlideDirection::Right => (ramp("W"), "0".to_string()),
        SlideDirection::Top => ("0".to_string(), ramp("-H")),
        SlideDirection::Bottom => ("0".to_string(), ramp("H")),
    }
}

/// Text rendering options for [`drawtext`].
#[derive(Debug, Clone, PartialEq)]
pub struct DrawTextStyle {
    pub font_file: Option<String>,
    pub font_size: u32,
    pub color: String,
    pub box_color: Option<String>,
    pub stroke_color: Option<String>,
    pub stroke_width: u32,
    pub line_spacing: u32,
}

/// `drawtext` reading its text from a file, positioned by expressions.
pub fn drawtext(
    text_file: &str,
    style: &DrawTextStyle,
    x: &str,
    y: &str,
    enable: Option<(f64, f64)>,
) -> String {
    let mut parts = vec![format!("textfile='{}'", escape_filter_path(text_file))];
    if let Some(font) = &style.font_file {
        parts.push(format!("fontfile='{}'", escape_filter_path(font)));
    }
    parts.push(format!("fontsize={}", style.font_size));
    parts.push(format!("fontcolor={}", ffmpeg_color(&style.color)));
    parts.push(format!("line_spacing={}", style.line_spacing));
    if let Some(box_color) = &style.box_color {
        parts.push("box=1".to_string());
        parts.push(format!("boxcolor={}", ffmpeg_color(box_color)));
        parts.push("boxborderw=8".to_string());
    }
    if let Some(stroke) = &style.stroke_color {
        if style.stroke_width > 0 {
            parts.push(format!("bordercolor={}", ffmpeg_color(stroke)));
            parts.push(format!("borderw={}", style.stroke_width));
        }
    }
    parts.push(format!("x={}", quote_expr(x)));
    parts.push(format!("y={}", quote_expr(y)));
    if let Some((from, to)) = enable {
        parts.push(format!("enable={}", between(from, to)));
    }
    format!("drawtext={}", parts.join(":"))
}

/// Audio gain.
pub fn volume(factor: f64) -> String {
    format!("volume={}", fmt_num(factor))
}

pub fn afade_in(duration: f64) -> String {
    format!("afade=t=in:st=0:d={}", fmt_num(duration))
}

pub fn afade_out(total: f64, duration: f64) -> String {
    let start = (total - duration).max(0.0);
    format!("afade=t=out:st={}:d={}", fmt_num(start), fmt_num(duration))
}

/// Cut an audio stream to `duration` seconds.
pub fn atrim(duration: f64) -> String {
    format!("atrim=duration={},asetpts=PTS-STARTPTS", fmt_num(duration))
}

/// Mix `inputs` audio streams at their own levels, as long as the longest.
pub fn amix(inputs: usize) -> String {
    format!("amix=inputs={}:duration=longest:dropout_transition=0:normalize=0", inputs)
}

/// Escape a path for use inside a quoted filter option.
pub fn escape_filter_path(path: &str) -> String {
    path.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
}

/// Convert `#RRGGBB[AA]` into FFmpeg's `0xRRGGBB[AA]`; names pass through.
pub fn ffmpeg_color(color: &str) -> String {
    let color = color.trim();
    match color.strip_prefix('#') {
        Some(hex) if hex.len() == 6 || hex.len() == 8 => format!("0x{}", hex),
        _ => color.to_string(),
    }
}

fn quote_expr(expr: &str) -> String {
    if expr.contains(',') {
        format!("'{}'", expr)
    } else {
        expr.to_string()
    }
}

/// Round to an even dimension (yuv420p requires even sizes).
pub fn even(v: u32) -> u32 {
    let v = v.max(2);
    v - (v % 2)
}

/// Format a number with at most three decimals.
pub fn fmt_num(v: f64) -> String {
    let s = format!("{:.3}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(fmt_num(1.0), "1");
        assert_eq!(fmt_num(0.25), "0.25");
        assert_eq!(fmt_num(1.23456), "1.235");
        assert_eq!(fmt_num(0.0), "0");
    }

    #[test]
    fn test_speed_and_fades() {
        assert_eq!(speed(1.25), "setpts=PTS/1.25");
        assert_eq!(fade_in(0.5), "fade=t=in:st=0:d=0.5");
        assert_eq!(fade_out(4.0, 1.0), "fade=t=out:st=3:d=1");
    }

    #[test]
    fn test_slide_expressions_quote_commas() {
        let (x, y) = slide_in_position(SlideDirection::Left, 1.0);
        assert_eq!(x, "if(lt(t,1),-W*(1-t/1),0)");
        assert_eq!(y, "0");
        let filter = overlay(&x, &y, None);
        assert!(filter.contains("x='if(lt(t,1),-W*(1-t/1),0)'"));

        let (_, y) = slide_out_position(SlideDirection::Bottom, 5.0, 1.0);
        assert_eq!(y, "if(gt(t,4),H*(t-4)/1,0)");
    }

    #[test]
    fn test_drawtext_escapes_paths() {
        let style = DrawTextStyle {
            font_file: Some("C:/fonts/a.ttf".to_string()),
            font_size: 60,
            color: "#FFFFFF".to_string(),
            box_color: Some("#000000".to_string()),
            stroke_color: Some("#000000".to_string()),
            stroke_width: 2,
            line_spacing: 15,
        };
        let f = drawtext("/tmp/sub-1.txt", &style, "(w-text_w)/2", "100", Some((1.0, 3.0)));
        assert!(f.starts_with("drawtext=textfile='/tmp/sub-1.txt'"));
        assert!(f.contains("fontfile='C\\:/fonts/a.ttf'"));
        assert!(f.contains("fontcolor=0xFFFFFF"));
        assert!(f.contains("enable='between(t,1,3)'"));
        assert!(f.contains("borderw=2"));
    }

    #[test]
    fn test_zoom_in_keeps_frame() {
        assert_eq!(
            zoom_in(801, 600, 0.03),
            "scale=w='trunc(iw*(1+0.03*t)/2)*2':h='trunc(ih*(1+0.03*t)/2)*2':eval=frame,crop=800:600"
        );
    }

    #[test]
    fn test_even_dimensions() {
        assert_eq!(even(1081), 1080);
        assert_eq!(even(0), 2);
        assert_eq!(scale(607, 1080), "scale=606:1080");
    }
}
