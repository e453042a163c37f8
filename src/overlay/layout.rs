//! Caption text-block layouts
//!
//! Layouts only decide where each line goes. Measuring is delegated to a
//! closure so placement can be checked without rasterizing anything.

use serde::{Deserialize, Serialize};

use super::CanvasSize;

/// Pixel extent of a measured line (right and bottom edge from its origin)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineExtent {
    pub width: u32,
    pub height: u32,
}

/// A line of text with the top-left corner it is drawn at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedLine {
    pub text: String,
    pub x: i64,
    pub y: i64,
}

/// Two-line banner split at a delimiter character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitLayout {
    /// Character the caption is split at (kept at the end of each line)
    pub delimiter: char,
    /// Top of line 1 as a fraction of canvas height
    pub anchor: f64,
    /// Vertical gap between the lines in pixels
    pub line_gap: u32,
    /// Horizontal shift applied after centering, in pixels
    pub x_offset: i32,
}

impl Default for SplitLayout {
    fn default() -> Self {
        Self {
            delimiter: '!',
            anchor: 0.655,
            line_gap: 10,
            x_offset: 100,
        }
    }
}

/// Lines stacked upward from a margin above the bottom edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BottomLayout {
    /// Distance from the canvas bottom to the bottom of the block, in pixels
    pub margin: u32,
}

impl Default for BottomLayout {
    fn default() -> Self {
        Self { margin: 100 }
    }
}

/// Caption layout selected by the pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptionLayout {
    Split(SplitLayout),
    Bottom(BottomLayout),
}

impl Default for CaptionLayout {
    fn default() -> Self {
        Self::Split(SplitLayout::default())
    }
}

/// Split `text` into the two banner lines.
///
/// Line 1 runs up to and including the first delimiter. Line 2 is the next
/// delimited part, trimmed, with the delimiter put back; it is empty when
/// nothing follows. Without a delimiter the whole text is line 1.
#[must_use]
pub fn split_caption(text: &str, delimiter: char) -> (String, String) {
    let Some(idx) = text.find(delimiter) else {
        return (text.to_string(), String::new());
    };

    let end = idx + delimiter.len_utf8();
    let first = text[..end].to_string();
    let rest = &text[end..];
    let second = rest.split(delimiter).next().unwrap_or_default().trim();

    if second.is_empty() {
        (first, String::new())
    } else {
        (first, format!("{second}{delimiter}"))
    }
}

/// Floor division, matching how centering rounds when text is wider than the frame
fn centered_x(canvas_width: u32, line_width: u32) -> i64 {
    (i64::from(canvas_width) - i64::from(line_width)).div_euclid(2)
}

impl CaptionLayout {
    /// Place the lines of `text` on a canvas.
    ///
    /// `line_pitch` is the distance between baselines for stacked layouts.
    pub fn place<F>(&self, text: &str, canvas: CanvasSize, line_pitch: u32, mut measure: F) -> Vec<PlacedLine>
    where
        F: FnMut(&str) -> LineExtent,
    {
        match self {
            Self::Split(split) => {
                let (line1, line2) = split_caption(text, split.delimiter);
                let e1 = measure(&line1);
                let e2 = measure(&line2);

                let y1 = (f64::from(canvas.height) * split.anchor).floor() as i64;
                let y2 = y1 + i64::from(e1.height) + i64::from(split.line_gap);
                let shift = i64::from(split.x_offset);

                vec![
                    PlacedLine {
                        x: centered_x(canvas.width, e1.width) + shift,
                        y: y1,
                        text: line1,
                    },
                    PlacedLine {
                        x: centered_x(canvas.width, e2.width) + shift,
                        y: y2,
                        text: line2,
                    },
                ]
            }
            Self::Bottom(bottom) => {
                let lines: Vec<&str> = text.split('\n').map(|l| l.trim_end_matches('\r')).collect();
                let block_bottom = i64::from(canvas.height) - i64::from(bottom.margin);
                let pitch = i64::from(line_pitch);
                let count = lines.len() as i64;

                lines
                    .iter()
                    .enumerate()
                    .map(|(i, line)| {
                        let from_bottom = count - i as i64;
                        let extent = measure(line);
                        PlacedLine {
                            text: (*line).to_string(),
                            x: centered_x(canvas.width, extent.width),
                            y: block_bottom - from_bottom * pitch,
                        }
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_width(text: &str) -> LineExtent {
        LineExtent {
            width: text.chars().count() as u32 * 10,
            height: 20,
        }
    }

    fn canvas(width: u32, height: u32) -> CanvasSize {
        CanvasSize::new(width, height).unwrap()
    }

    #[test]
    fn split_at_first_delimiter() {
        assert_eq!(split_caption("ABC! DEF!", '!'), ("ABC!".into(), "DEF!".into()));
    }

    #[test]
    fn split_without_delimiter_keeps_full_text() {
        assert_eq!(split_caption("Go team", '!'), ("Go team".into(), String::new()));
    }

    #[test]
    fn split_with_nothing_after_delimiter() {
        assert_eq!(split_caption("Hooray!", '!'), ("Hooray!".into(), String::new()));
        assert_eq!(split_caption("Hooray!  ", '!'), ("Hooray!".into(), String::new()));
    }

    #[test]
    fn split_takes_only_the_next_part() {
        assert_eq!(split_caption("A! B! C!", '!'), ("A!".into(), "B!".into()));
        assert_eq!(split_caption("A! B", '!'), ("A!".into(), "B!".into()));
    }

    #[test]
    fn split_handles_multibyte_text() {
        let (l1, l2) = split_caption("응원단! 민수가 응원해!", '!');
        assert_eq!(l1, "응원단!");
        assert_eq!(l2, "민수가 응원해!");
    }

    #[test]
    fn split_layout_positions() {
        let layout = CaptionLayout::Split(SplitLayout::default());
        let lines = layout.place("ABC! DEFGH!", canvas(1000, 1000), 0, fixed_width);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "ABC!");
        assert_eq!(lines[0].y, 655);
        assert_eq!(lines[0].x, (1000 - 40) / 2 + 100);
        assert_eq!(lines[1].text, "DEFGH!");
        assert_eq!(lines[1].y, 655 + 20 + 10);
        assert_eq!(lines[1].x, (1000 - 60) / 2 + 100);
    }

    #[test]
    fn split_layout_anchor_is_configurable() {
        let layout = CaptionLayout::Split(SplitLayout {
            anchor: 0.725,
            ..SplitLayout::default()
        });
        let lines = layout.place("X!", canvas(100, 1000), 0, fixed_width);
        assert_eq!(lines[0].y, 725);
    }

    #[test]
    fn wide_text_centers_with_floor_division() {
        let layout = CaptionLayout::Split(SplitLayout {
            x_offset: 0,
            ..SplitLayout::default()
        });
        let lines = layout.place("ABCDEFGHIJK", canvas(101, 100), 0, fixed_width);
        assert_eq!(lines[0].x, -5);
    }

    #[test]
    fn bottom_layout_stacks_upward() {
        let layout = CaptionLayout::Bottom(BottomLayout { margin: 50 });
        let lines = layout.place("top\nmiddle\nbottom", canvas(400, 600), 30, fixed_width);

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2].text, "bottom");
        assert_eq!(lines[2].y, 600 - 50 - 30);
        assert_eq!(lines[1].y, 600 - 50 - 60);
        assert_eq!(lines[0].y, 600 - 50 - 90);
        assert_eq!(lines[0].x, (400 - 30) / 2);
        assert_eq!(lines[1].x, (400 - 60) / 2);
    }

    #[test]
    fn layout_reads_from_toml_with_defaults() {
        let layout: CaptionLayout = toml::from_str("kind = \"split\"\nanchor = 0.725\n").unwrap();
        assert_eq!(
            layout,
            CaptionLayout::Split(SplitLayout {
                anchor: 0.725,
                ..SplitLayout::default()
            })
        );

        let layout: CaptionLayout = toml::from_str("kind = \"bottom\"").unwrap();
        assert_eq!(layout, CaptionLayout::Bottom(BottomLayout::default()));
    }
}
