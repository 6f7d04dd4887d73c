//! Raster sample → sky-brightness class on the 1–9 Bortle-like scale.
//!
//! Two encodings exist. Current rasters store a single luminance byte per
//! pixel and are classified through a sparse step table. Older palette
//! rasters store a colour ramp and are classified by nearest colour.

/// Reserved sample value meaning "no data / water".
pub const NO_DATA: u8 = 0;

/// Class reported for no-data samples and unmapped values.
pub const BRIGHTEST_CLASS: f64 = 9.0;

/// Default "dark enough" threshold: class ≤ 3.0.
pub const DEFAULT_DARK_THRESHOLD: f64 = 3.0;

/// Sparse luminance → class table, sorted by key. A sample takes the class of
/// the largest key at or below it; values between keys are not interpolated.
/// 0 is deliberately absent so that it falls through to [`BRIGHTEST_CLASS`].
const LUMINANCE_TABLE: [(u8, f64); 17] = [
    (1, 1.0),
    (3, 1.5),
    (6, 2.0),
    (10, 2.5),
    (16, 3.0),
    (24, 3.5),
    (36, 4.0),
    (52, 4.5),
    (72, 5.0),
    (96, 5.5),
    (124, 6.0),
    (156, 6.5),
    (188, 7.0),
    (216, 7.5),
    (240, 8.0),
    (252, 8.5),
    (255, 9.0),
];

/// Colour ramp of the legacy palette rasters.
const PALETTE_TABLE: [([u8; 3], f64); 16] = [
    ([8, 8, 8], 1.0),
    ([34, 34, 34], 1.0),
    ([66, 66, 66], 1.5),
    ([20, 47, 114], 2.0),
    ([33, 84, 216], 2.5),
    ([15, 87, 20], 3.0),
    ([31, 161, 42], 3.5),
    ([110, 100, 30], 4.0),
    ([184, 166, 37], 4.5),
    ([191, 100, 30], 5.0),
    ([253, 150, 80], 5.5),
    ([251, 90, 73], 6.0),
    ([251, 153, 138], 6.5),
    ([160, 160, 160], 7.0),
    ([242, 242, 242], 8.0),
    ([255, 255, 255], 9.0),
];

/// Classify a luminance sample.
///
/// Returns [`BRIGHTEST_CLASS`] for [`NO_DATA`]; callers that need to tell
/// "no data" apart from a genuinely bright pixel must check [`is_no_data`]
/// first, since both read as 9 on the scale.
pub fn class_for_luminance(sample: u8) -> f64 {
    // partition_point gives the number of keys <= sample.
    let n = LUMINANCE_TABLE.partition_point(|&(key, _)| key <= sample);
    match n {
        0 => BRIGHTEST_CLASS,
        n => LUMINANCE_TABLE[n - 1].1,
    }
}

/// Classify a legacy palette pixel by nearest colour (Euclidean RGB).
pub fn class_for_rgb(rgb: [u8; 3]) -> f64 {
    if rgb == [0, 0, 0] {
        return BRIGHTEST_CLASS;
    }
    PALETTE_TABLE
        .iter()
        .min_by_key(|(colour, _)| rgb_distance_sq(rgb, *colour))
        .map(|&(_, class)| class)
        .unwrap_or(BRIGHTEST_CLASS)
}

/// Classify a luminance sample, returning `None` for the no-data sentinel.
pub fn classify_sample(sample: u8) -> Option<f64> {
    if is_no_data(sample) {
        None
    } else {
        Some(class_for_luminance(sample))
    }
}

#[inline]
pub fn is_no_data(sample: u8) -> bool {
    sample == NO_DATA
}

/// The "dark enough" predicate.
#[inline]
pub fn is_dark_enough(class: f64, threshold: f64) -> bool {
    class <= threshold
}

/// Representative luminance byte for a class, used when palette rasters are
/// re-encoded as luminance. Picks the first table key carrying a class at
/// least as bright as `class`, so the step table maps it straight back.
pub fn luminance_for_class(class: f64) -> u8 {
    LUMINANCE_TABLE
        .iter()
        .find(|&&(_, c)| c >= class)
        .map(|&(key, _)| key)
        .unwrap_or(u8::MAX)
}

fn rgb_distance_sq(a: [u8; 3], b: [u8; 3]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as i32 - y as i32;
            (d * d) as u32
        })
        .sum()
}
