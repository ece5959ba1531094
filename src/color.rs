use std::collections::BTreeMap;

use palette::{Hsl, IntoColor, LinSrgb, Mix, Srgb};

use crate::classify::Breaks;
use crate::data::model::{FeatureRef, TableData, TableParameters};
use crate::data::value::region_class;

/// 8-bit sRGB colour handed to the renderer.
pub type Rgb8 = Srgb<u8>;

/// Fill for regions without a derivable value.
pub const NO_DATA: [u8; 3] = [0xff, 0xff, 0xff];

/// `#rrggbb` form of a colour.
pub fn hex(color: Rgb8) -> String {
    format!("#{:02x}{:02x}{:02x}", color.red, color.green, color.blue)
}

// ---------------------------------------------------------------------------
// Categorical palette (chart series)
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Rgb8> {
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            rgb.into_format()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Sequential ramps (choropleth classes)
// ---------------------------------------------------------------------------

/// ColorBrewer YlGn, indexed by `classes - 2`.
const YL_GN: [&[[u8; 3]]; 8] = [
    &[[0xff, 0xff, 0xe5], [0x00, 0x45, 0x29]],
    &[[0xf7, 0xfc, 0xb9], [0xad, 0xdd, 0x8e], [0x31, 0xa3, 0x54]],
    &[[0xff, 0xff, 0xcc], [0xc2, 0xe6, 0x99], [0x78, 0xc6, 0x79], [0x23, 0x84, 0x43]],
    &[[0xff, 0xff, 0xcc], [0xc2, 0xe6, 0x99], [0x78, 0xc6, 0x79], [0x31, 0xa3, 0x54], [0x00, 0x68, 0x37]],
    &[[0xff, 0xff, 0xcc], [0xd9, 0xf0, 0xa3], [0xad, 0xdd, 0x8e], [0x78, 0xc6, 0x79], [0x31, 0xa3, 0x54], [0x00, 0x68, 0x37]],
    &[[0xff, 0xff, 0xcc], [0xd9, 0xf0, 0xa3], [0xad, 0xdd, 0x8e], [0x78, 0xc6, 0x79], [0x41, 0xab, 0x5d], [0x23, 0x84, 0x43], [0x00, 0x5a, 0x32]],
    &[[0xff, 0xff, 0xe5], [0xf7, 0xfc, 0xb9], [0xd9, 0xf0, 0xa3], [0xad, 0xdd, 0x8e], [0x78, 0xc6, 0x79], [0x41, 0xab, 0x5d], [0x23, 0x84, 0x43], [0x00, 0x5a, 0x32]],
    &[[0xff, 0xff, 0xe5], [0xf7, 0xfc, 0xb9], [0xd9, 0xf0, 0xa3], [0xad, 0xdd, 0x8e], [0x78, 0xc6, 0x79], [0x41, 0xab, 0x5d], [0x23, 0x84, 0x43], [0x00, 0x68, 0x37], [0x00, 0x45, 0x29]],
];

fn rgb([r, g, b]: [u8; 3]) -> Rgb8 {
    Srgb::new(r, g, b)
}

/// `classes` sequential colours, light to dark.
///
/// Uses the published YlGn ramps for 2–9 classes and interpolates the
/// 9-class ramp in linear RGB otherwise.
pub fn sequential_ramp(classes: usize) -> Vec<Rgb8> {
    if let Some(ramp) = classes.checked_sub(2).and_then(|i| YL_GN.get(i)) {
        return ramp.iter().copied().map(rgb).collect();
    }

    let stops: Vec<LinSrgb> = YL_GN[YL_GN.len() - 1]
        .iter()
        .map(|&c| rgb(c).into_format::<f32>().into_linear())
        .collect();
    let segments = (stops.len() - 1) as f32;
    (0..classes)
        .map(|i| {
            let t = if classes == 1 {
                0.5
            } else {
                i as f32 / (classes - 1) as f32
            };
            let pos = t * segments;
            let lower = (pos.floor() as usize).min(stops.len() - 2);
            let mixed = stops[lower].mix(stops[lower + 1], pos - lower as f32);
            Srgb::<f32>::from_linear(mixed).into_format()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Choropleth scale: breaks → colours
// ---------------------------------------------------------------------------

/// One legend row.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub label: String,
    pub color: Rgb8,
}

/// Maps derived values onto class colours for one loaded table.
#[derive(Debug, Clone)]
pub struct ChoroplethScale {
    breaks: Breaks,
    colors: Vec<Rgb8>,
    no_data: Rgb8,
}

impl ChoroplethScale {
    pub fn new(breaks: Breaks) -> Self {
        let colors = sequential_ramp(breaks.classes());
        Self {
            breaks,
            colors,
            no_data: rgb(NO_DATA),
        }
    }

    /// Scale for a loaded table; `None` when the table has no breaks.
    pub fn for_table(table: &TableData) -> Option<Self> {
        table.breaks.clone().map(Self::new)
    }

    pub fn breaks(&self) -> &Breaks {
        &self.breaks
    }

    pub fn colors(&self) -> &[Rgb8] {
        &self.colors
    }

    pub fn no_data(&self) -> Rgb8 {
        self.no_data
    }

    pub fn color_for_value(&self, value: Option<f64>) -> Rgb8 {
        match value {
            Some(v) if v.is_finite() => self.colors[self.breaks.class_of(v)],
            _ => self.no_data,
        }
    }

    /// Colour of the region with `geoid`, or the no-data colour.
    pub fn color_for_region(&self, params: &TableParameters, table: &TableData, geoid: &str) -> Rgb8 {
        region_class(params, table, &self.breaks, geoid)
            .map(|class| self.colors[class])
            .unwrap_or(self.no_data)
    }

    /// Colour of every feature, keyed by GEOID.
    pub fn region_colors(
        &self,
        params: &TableParameters,
        table: &TableData,
        features: &[FeatureRef],
    ) -> BTreeMap<String, Rgb8> {
        features
            .iter()
            .map(|f| (f.geoid.clone(), self.color_for_region(params, table, &f.geoid)))
            .collect()
    }

    /// `lo–hi` label and colour per class.
    pub fn legend_entries(&self) -> Vec<LegendEntry> {
        self.breaks
            .bounds()
            .windows(2)
            .zip(&self.colors)
            .map(|(pair, &color)| LegendEntry {
                label: format!("{:.1}\u{2013}{:.1}", pair[0], pair[1]),
                color,
            })
            .collect()
    }
}

/// Legend heading for a table, with markers for missing metadata.
pub fn legend_title(params: Option<&TableParameters>) -> &str {
    match params {
        None => "Missing table info",
        Some(p) => p.legend_title.as_deref().unwrap_or("Missing LegendTitle"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify_or_uniform;

    #[test]
    fn palette_has_requested_size() {
        assert!(generate_palette(0).is_empty());
        let colors = generate_palette(4);
        assert_eq!(colors.len(), 4);
        assert_ne!(colors[0], colors[1]);
    }

    #[test]
    fn ramps_match_class_count() {
        for classes in 1..=14 {
            assert_eq!(sequential_ramp(classes).len(), classes);
        }
        assert_eq!(hex(sequential_ramp(5)[0]), "#ffffcc");
        assert_eq!(hex(sequential_ramp(5)[4]), "#006837");
    }

    #[test]
    fn interpolated_ramp_runs_light_to_dark() {
        let ramp = sequential_ramp(12);
        assert_eq!(hex(ramp[0]), "#ffffe5");
        assert_eq!(hex(ramp[11]), "#004529");
    }

    #[test]
    fn values_map_to_class_colours() {
        let breaks = classify_or_uniform(&[1.0, 2.0, 3.0, 10.0, 11.0, 12.0], 2).unwrap();
        let scale = ChoroplethScale::new(breaks);
        assert_eq!(hex(scale.color_for_value(Some(2.0))), "#ffffe5");
        assert_eq!(hex(scale.color_for_value(Some(10.0))), "#004529");
        assert_eq!(hex(scale.color_for_value(None)), "#ffffff");
        assert_eq!(hex(scale.color_for_value(Some(f64::NAN))), "#ffffff");

        let legend = scale.legend_entries();
        assert_eq!(legend.len(), 2);
        assert_eq!(legend[0].label, "1.0\u{2013}10.0");
        assert_eq!(legend[1].label, "10.0\u{2013}12.0");
    }

    #[test]
    fn legend_title_fallbacks() {
        assert_eq!(legend_title(None), "Missing table info");
        let mut params: TableParameters =
            serde_json::from_str(r#"{"tableId":"B01001","offset":2}"#).unwrap();
        assert_eq!(legend_title(Some(&params)), "Missing LegendTitle");
        params.legend_title = Some("Population".into());
        assert_eq!(legend_title(Some(&params)), "Population");
    }
}
