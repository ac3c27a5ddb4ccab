//! # Colour Scales
//!
//! Colours for deviations, checkpoint averages, directions and staff roles,
//! using the Material Design palettes the map and tables are drawn with.
//!
//! Deviation colour maps `|value| / max_value` onto ten discrete shades.
//! Behind schedule (positive) is red, on time or ahead is green. Text turns
//! white from shade 500 up.
//!
//! ```
//! use linker_engine::{route_deviation_color, fiche_deviation_color};
//!
//! // 1.5 hours behind saturates the route scale
//! let props = route_deviation_color(5400);
//! assert_eq!(props.background, "#b71c1c");
//! assert_eq!(props.text, "#ffffff");
//!
//! // On time
//! assert_eq!(fiche_deviation_color(0).background, "#e8f5e9");
//! ```

use crate::model::{Direction, MemberType};

/// Route deviation saturates at 1.5 hours.
pub const ROUTE_DEVIATION_MAX_SECONDS: f64 = 1.5 * 3600.0;

/// Checkpoint deviation saturates at 15 minutes.
pub const FICHE_DEVIATION_MAX_SECONDS: f64 = 15.0 * 60.0;

pub const SHADES: [u32; 10] = [50, 100, 200, 300, 400, 500, 600, 700, 800, 900];

const RED: [&str; 10] = [
    "#ffebee", "#ffcdd2", "#ef9a9a", "#e57373", "#ef5350",
    "#f44336", "#e53935", "#d32f2f", "#c62828", "#b71c1c",
];

const GREEN: [&str; 10] = [
    "#e8f5e9", "#c8e6c9", "#a5d6a7", "#81c784", "#66bb6a",
    "#4caf50", "#43a047", "#388e3c", "#2e7d32", "#1b5e20",
];

const BLUE_500: &str = "#2196f3";
const LIGHT_GREEN_500: &str = "#8bc34a";
const ORANGE_500: &str = "#ff9800";
const PURPLE_500: &str = "#9c27b0";
const INDIGO_500: &str = "#3f51b5";

const WHITE: &str = "#ffffff";
const BLACK: &str = "#000000";

/// Background and text colour for a table cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorProps {
    pub background: &'static str,
    pub text: &'static str,
}

/// Index into [`SHADES`] nearest to `value`. Ties and NaN go to the lower shade.
fn nearest_shade(value: f64) -> usize {
    (1..SHADES.len()).fold(0, |best, i| {
        if (SHADES[i] as f64 - value).abs() < (SHADES[best] as f64 - value).abs() {
            i
        } else {
            best
        }
    })
}

/// Shade (50..=900) for a value on a scale saturating at `max_value`.
///
/// A non-positive `max_value` has no scale: zero is shade 50, anything else 900.
pub fn shade_for(value: f64, max_value: f64) -> u32 {
    SHADES[shade_index(value, max_value)]
}

fn shade_index(value: f64, max_value: f64) -> usize {
    let percentage = if max_value > 0.0 {
        (value.abs() / max_value).min(1.0)
    } else if value == 0.0 {
        0.0
    } else {
        1.0
    };
    nearest_shade(900.0 * percentage)
}

/// Colour for a deviation on a scale saturating at `max_value`.
pub fn deviation_color(value: f64, max_value: f64) -> ColorProps {
    let index = shade_index(value, max_value);
    let palette = if value > 0.0 { &RED } else { &GREEN };
    ColorProps {
        background: palette[index],
        text: if SHADES[index] >= 500 { WHITE } else { BLACK },
    }
}

pub fn route_deviation_color(seconds: i64) -> ColorProps {
    deviation_color(seconds as f64, ROUTE_DEVIATION_MAX_SECONDS)
}

pub fn fiche_deviation_color(seconds: i64) -> ColorProps {
    deviation_color(seconds as f64, FICHE_DEVIATION_MAX_SECONDS)
}

/// Background for an average checkpoint time within the column's range:
/// white at `min`, light red at `max`.
///
/// ```
/// use linker_engine::fiche_time_to_color;
///
/// assert_eq!(fiche_time_to_color(600.0, 600.0, 1800.0), "rgb(255, 255, 255)");
/// assert_eq!(fiche_time_to_color(1800.0, 600.0, 1800.0), "rgb(255, 180, 180)");
/// ```
pub fn fiche_time_to_color(time: f64, min: f64, max: f64) -> String {
    const LOWEST: f64 = 255.0;
    const HIGHEST: f64 = 180.0;

    let percentage = if max == min { 0.0 } else { (time - min) / (max - min) };
    let value = (LOWEST + (HIGHEST - LOWEST) * percentage + 0.5).floor();
    format!("rgb(255, {}, {})", value, value)
}

pub fn direction_color(direction: Direction) -> &'static str {
    match direction {
        Direction::Red => RED[5],
        Direction::Blue => BLUE_500,
    }
}

pub fn member_color(member_type: MemberType) -> &'static str {
    match member_type {
        MemberType::Agenda => GREEN[5],
        MemberType::Coordinatie => LIGHT_GREEN_500,
        MemberType::RodeKruis => ORANGE_500,
        MemberType::HandigeHarry => PURPLE_500,
        MemberType::Weide => INDIGO_500,
    }
}
