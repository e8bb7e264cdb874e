//! SVG status glyph for a deck key.
//!
//! Rendering is a pure template substitution: the same readings always
//! produce the same SVG text.
//!
//! # Example
//!
//! ```
//! use eco_power_deck::render::{render_power_svg, svg_data_uri};
//!
//! let svg = render_power_svg(1234.0, 567.0, 667.0);
//! assert!(svg.contains("123.4 W"));
//! assert!(svg.contains(r#"width="7.0875""#));
//!
//! let image = svg_data_uri(&svg);
//! assert!(image.starts_with("data:image/svg+xml,"));
//! ```

use crate::power::PowerStatus;
use crate::{CANVAS_SIZE, LOAD_BAR_MAX_WIDTH, LOAD_REFERENCE_WATTS, READING_SCALE};

const SVG_TEMPLATE: &str = r##"<svg width="{{SIZE}}" height="{{SIZE}}" xmlns="http://www.w3.org/2000/svg">
  <defs>
    <clipPath id="roundedClip">
      <rect x="5" y="5" width="90" height="90" rx="10" ry="10"/>
    </clipPath>
    <linearGradient id="bgGradient" x1="0%" y1="0%" x2="100%" y2="100%">
      <stop offset="0%" style="stop-color:#1a1a1a;stop-opacity:1" />
      <stop offset="100%" style="stop-color:#2d2d2d;stop-opacity:1" />
    </linearGradient>
  </defs>

  <rect x="5" y="5" width="90" height="90" rx="10" ry="10"
        fill="url(#bgGradient)" stroke="#444" stroke-width="2"/>

  <g clip-path="url(#roundedClip)">
    <g>
      <text x="5" y="45" fill="#ffd700" font-family="Arial, sans-serif" font-size="14" font-weight="bold">
        ☀️: {{GEN}} W
      </text>
      <text x="5" y="60" fill="#00ff88" font-family="Arial, sans-serif" font-size="14" font-weight="bold">
        ⚡: {{NET}} W
      </text>
      <text x="5" y="75" fill="#ff6b6b" font-family="Arial, sans-serif" font-size="14" font-weight="bold">
        🔌: {{LOAD}} W
      </text>
    </g>
  </g>

  <circle cx="15" cy="20" r="8" fill="#00ff88" opacity="0.8">
    <animate attributeName="opacity" values="0.8;0.3;0.8" dur="2s" repeatCount="indefinite"/>
  </circle>
  <text x="28" y="24" fill="#ccc" font-family="Arial, sans-serif" font-size="10">LIVE</text>

  <rect x="10" y="88" width="80" height="4" rx="2" ry="2" fill="#333"/>
  <rect x="10" y="88" width="{{MAX_LOAD}}" height="4" rx="2" ry="2" fill="#00ff88" />
</svg>"##;

/// Display strings for one render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerReadout {
    /// Generation in watts, one decimal
    pub generation: String,
    /// Net balance in watts, one decimal
    pub net: String,
    /// Load in watts, one decimal
    pub load: String,
    /// Width of the load bar, four decimals
    pub load_bar_width: String,
}

impl PowerReadout {
    /// Format raw readings (0.1 W resolution).
    pub fn new(generation: f64, load: f64, net: f64) -> Self {
        Self {
            generation: to_fixed(generation / READING_SCALE, 1),
            net: to_fixed(net / READING_SCALE, 1),
            load: to_fixed(load / READING_SCALE, 1),
            load_bar_width: to_fixed(load_bar_width(load), 4),
        }
    }

    pub fn from_status(status: &PowerStatus) -> Self {
        Self::new(
            status.generation.current,
            status.consumption.total,
            status.summary.net_load,
        )
    }

    /// Substitute this readout into the key template.
    pub fn to_svg(&self) -> String {
        SVG_TEMPLATE
            .replace("{{SIZE}}", &CANVAS_SIZE.to_string())
            .replace("{{GEN}}", &self.generation)
            .replace("{{NET}}", &self.net)
            .replace("{{LOAD}}", &self.load)
            .replace("{{MAX_LOAD}}", &self.load_bar_width)
    }
}

/// Load bar width for a raw load reading.
///
/// `((load / 10) / 800) * 100`, clamped to the bar track. Non-finite input
/// yields an empty bar.
pub fn load_bar_width(load: f64) -> f64 {
    let width = ((load / READING_SCALE) / LOAD_REFERENCE_WATTS) * 100.0;
    if width.is_finite() {
        width.clamp(0.0, LOAD_BAR_MAX_WIDTH)
    } else {
        0.0
    }
}

/// Render the key image for raw generation, load and net readings.
pub fn render_power_svg(generation: f64, load: f64, net: f64) -> String {
    PowerReadout::new(generation, load, net).to_svg()
}

/// Render the key image for a status.
pub fn render_status_svg(status: &PowerStatus) -> String {
    PowerReadout::from_status(status).to_svg()
}

/// Percent-encode an SVG document as a `data:` URI.
pub fn svg_data_uri(svg: &str) -> String {
    // byte_serialize turns spaces into '+'; a literal '+' is already %2B
    let encoded: String = form_urlencoded::byte_serialize(svg.as_bytes()).collect();
    format!("data:image/svg+xml,{}", encoded.replace('+', "%20"))
}

/// Fixed-point formatting where exact halves round away from zero.
///
/// `format!("{:.1}", 0.25)` gives `0.2`; displays expect `0.3`. A value
/// only counts as a half when `value * factor` lands on `.5` without
/// rounding, so `0.15` (stored just below) still gives `0.1`.
pub fn to_fixed(value: f64, digits: usize) -> String {
    let factor = 10f64.powi(digits as i32);
    let scaled = value * factor;
    if scaled.is_finite()
        && scaled.fract().abs() == 0.5
        && value.mul_add(factor, -scaled) == 0.0
    {
        format!("{:.*}", digits, scaled.round() / factor)
    } else {
        format!("{:.*}", digits, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readout_example() {
        let readout = PowerReadout::new(1234.0, 567.0, 667.0);
        assert_eq!(readout.generation, "123.4");
        assert_eq!(readout.load, "56.7");
        assert_eq!(readout.net, "66.7");
        assert_eq!(readout.load_bar_width, "7.0875");
    }

    #[test]
    fn test_readout_from_status() {
        let status = PowerStatus::from_readings(1234.0, 567.0).unwrap();
        assert_eq!(
            PowerReadout::from_status(&status),
            PowerReadout::new(1234.0, 567.0, 667.0)
        );
    }

    #[test]
    fn test_render_substitutes_all_placeholders() {
        let svg = render_power_svg(1234.0, 567.0, 667.0);
        assert!(svg.starts_with(r#"<svg width="100" height="100""#));
        assert!(svg.contains("☀️: 123.4 W"));
        assert!(svg.contains("⚡: 66.7 W"));
        assert!(svg.contains("🔌: 56.7 W"));
        assert!(svg.contains(r#"<rect x="10" y="88" width="7.0875" height="4""#));
        assert!(!svg.contains("{{"));
    }

    #[test]
    fn test_render_is_deterministic() {
        assert_eq!(
            render_power_svg(500.0, 250.0, 250.0),
            render_power_svg(500.0, 250.0, 250.0)
        );
        let status = PowerStatus::from_readings(500.0, 250.0).unwrap();
        assert_eq!(render_status_svg(&status), render_power_svg(500.0, 250.0, 250.0));
    }

    #[test]
    fn test_negative_net() {
        let readout = PowerReadout::new(0.0, 850.0, -850.0);
        assert_eq!(readout.generation, "0.0");
        assert_eq!(readout.net, "-85.0");
        assert_eq!(readout.load_bar_width, "10.6250");
    }

    #[test]
    fn test_load_bar_width_formula() {
        for load in [0.0, 100.0, 567.0, 1000.0, 4000.0, 6400.0] {
            assert_eq!(load_bar_width(load), ((load / 10.0) / 800.0) * 100.0);
        }
    }

    #[test]
    fn test_load_bar_width_clamped() {
        assert_eq!(load_bar_width(6400.0), 80.0);
        assert_eq!(load_bar_width(20_000.0), 80.0);
        assert_eq!(load_bar_width(-50.0), 0.0);
        assert_eq!(load_bar_width(f64::NAN), 0.0);
        assert_eq!(PowerReadout::new(0.0, 20_000.0, 0.0).load_bar_width, "80.0000");
    }

    #[test]
    fn test_to_fixed_rounds_halves_away_from_zero() {
        assert_eq!(to_fixed(0.25, 1), "0.3");
        assert_eq!(to_fixed(1.25, 1), "1.3");
        assert_eq!(to_fixed(-1.25, 1), "-1.3");
        assert_eq!(to_fixed(2.5, 0), "3");
        assert_eq!(to_fixed(123.4, 1), "123.4");
        assert_eq!(to_fixed(7.0875, 4), "7.0875");
        assert_eq!(to_fixed(0.0, 4), "0.0000");
    }

    #[test]
    fn test_to_fixed_near_halves_round_down() {
        // Expected strings come from JavaScript's Number.prototype.toFixed
        let cases = [
            (1.5, "0.1"),
            (8.5, "0.8"),
            (3.5, "0.3"),
            (4.5, "0.5"),
            (10.5, "1.1"),
            (12.5, "1.3"),
            (1234.5, "123.5"),
            (0.5, "0.1"),
        ];
        for (reading, expected) in cases {
            assert_eq!(to_fixed(reading / 10.0, 1), expected, "reading {reading}");
        }
        assert_eq!(PowerReadout::new(0.0, 1.5, 0.0).load_bar_width, "0.0187");
        assert_eq!(PowerReadout::new(15.0, 0.0, 0.0).generation, "1.5");
    }

    #[test]
    fn test_svg_data_uri() {
        let uri = svg_data_uri(r#"<svg width="1">a+b</svg>"#);
        assert_eq!(
            uri,
            "data:image/svg+xml,%3Csvg%20width%3D%221%22%3Ea%2Bb%3C%2Fsvg%3E"
        );
        assert!(!svg_data_uri(&render_power_svg(1.0, 2.0, 3.0)).contains(' '));
    }
}
