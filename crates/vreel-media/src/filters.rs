//! FFmpeg filter graph fragments.
//!
//! Pure string builders shared by the compositor and reframe engine.

use vreel_models::{encoding::AUDIO_SAMPLE_RATE, AnchorPosition, CropWindow, TextStyle};

/// Audio normalization applied to every stream before concat or mix.
pub fn audio_format() -> String {
    format!(
        "aresample={},aformat=sample_fmts=fltp:channel_layouts=stereo",
        AUDIO_SAMPLE_RATE
    )
}

/// Silent stereo source of `duration` seconds.
pub fn silence(duration: f64) -> String {
    format!(
        "anullsrc=channel_layout=stereo:sample_rate={},atrim=duration={:.3}",
        AUDIO_SAMPLE_RATE, duration
    )
}

/// Escape a value for use inside a filter option.
///
/// Two levels apply: the option parser (`\ ' :`) and the filtergraph parser
/// (`\ ' [ ] , ;`).
pub fn escape_filter_value(value: &str) -> String {
    let mut option_level = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            option_level.push('\\');
        }
        option_level.push(c);
    }

    let mut graph_level = String::with_capacity(option_level.len());
    for c in option_level.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            graph_level.push('\\');
        }
        graph_level.push(c);
    }
    graph_level
}

/// Overlay position expressions for an anchored image.
///
/// `W`/`H` are the base frame, `w`/`h` the overlay.
pub fn overlay_position(anchor: AnchorPosition, margin: u32) -> (String, String) {
    let m = margin;
    let left = m.to_string();
    let hcenter = "(W-w)/2".to_string();
    let right = format!("W-w-{}", m);
    let top = m.to_string();
    let vcenter = "(H-h)/2".to_string();
    let bottom = format!("H-h-{}", m);

    match anchor {
        AnchorPosition::TopLeft => (left, top),
        AnchorPosition::TopCenter => (hcenter, top),
        AnchorPosition::TopRight => (right, top),
        AnchorPosition::Center => (hcenter, vcenter),
        AnchorPosition::BottomLeft => (left, bottom),
        AnchorPosition::BottomCenter => (hcenter, bottom),
        AnchorPosition::BottomRight => (right, bottom),
    }
}

/// Image overlay preparation: scale, then fade to `opacity` when below 1.
pub fn overlay_source(width: u32, height: u32, opacity: f32) -> String {
    let mut chain = format!("scale={}:{},format=rgba", width, height);
    if opacity < 1.0 {
        chain.push_str(&format!(",colorchannelmixer=aa={:.2}", opacity.max(0.0)));
    }
    chain
}

/// `enable=` expression for a layer not spanning the whole segment.
pub fn enable_window(start: f64, duration: f64, segment_duration: f64) -> Option<String> {
    const EPS: f64 = 1e-3;
    if start <= EPS && start + duration >= segment_duration - EPS {
        return None;
    }
    Some(format!(
        "enable='between(t,{:.3},{:.3})'",
        start,
        start + duration
    ))
}

/// Vertical distance between consecutive caption lines.
pub fn line_height(style: &TextStyle) -> u32 {
    (style.size as f64 * 1.2).round() as u32
}

/// One `drawtext` per line, positioned as a block by `anchor`.
///
/// Lines are centered individually when the anchor is horizontally centered.
pub fn drawtext_chain(
    lines: &[String],
    style: &TextStyle,
    anchor: AnchorPosition,
    margin: u32,
    opacity: f32,
    enable: Option<&str>,
) -> String {
    let step = line_height(style);
    let block = step * lines.len() as u32;

    let top = match anchor {
        AnchorPosition::TopLeft | AnchorPosition::TopCenter | AnchorPosition::TopRight => {
            margin.to_string()
        }
        AnchorPosition::Center => format!("(h-{})/2", block),
        _ => format!("h-{}", block + margin),
    };
    let x = match anchor {
        AnchorPosition::TopLeft | AnchorPosition::BottomLeft => margin.to_string(),
        AnchorPosition::TopRight | AnchorPosition::BottomRight => format!("w-text_w-{}", margin),
        _ => "(w-text_w)/2".to_string(),
    };

    let font = match &style.font_file {
        Some(path) => format!("fontfile={}", escape_filter_value(&path.to_string_lossy())),
        None => format!("font={}", escape_filter_value(&style.font)),
    };

    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let mut filter = format!(
                "drawtext={}:expansion=none:text={}:fontsize={}:fontcolor={}@{:.2}:x={}:y={}+{}",
                font,
                escape_filter_value(line),
                style.size,
                escape_filter_value(&style.color),
                opacity.clamp(0.0, 1.0),
                x,
                top,
                step * i as u32
            );
            if let Some(enable) = enable {
                filter.push(':');
                filter.push_str(enable);
            }
            filter
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Average glyph advance as a fraction of the font size (11/20).
const GLYPH_ADVANCE: (u64, u64) = (11, 20);

/// Greedy word wrap so each line fits roughly `max_width_px`.
///
/// Words longer than a line are split. Explicit newlines are kept.
pub fn wrap_caption(text: &str, font_size: u32, max_width_px: u32) -> Vec<String> {
    let (num, den) = GLYPH_ADVANCE;
    let glyph_scaled = (font_size.max(1) as u64 * num).max(1);
    let max_chars = ((max_width_px as u64 * den / glyph_scaled) as usize).max(1);

    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            if word.is_empty() {
                continue;
            }

            let needed = if current.is_empty() {
                word.len()
            } else {
                current.chars().count() + 1 + word.len()
            };
            if needed > max_chars && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.extend(word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

/// Crop to `window`, then force even dimensions for yuv420p.
pub fn crop_filter(window: &CropWindow) -> String {
    format!(
        "crop={}:{}:{}:{},scale=trunc(iw/2)*2:trunc(ih/2)*2,setsar=1",
        window.width(),
        window.height(),
        window.x1,
        window.y1
    )
}
