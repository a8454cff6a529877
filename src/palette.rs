use rgb::RGB;

/// Colours of the optimised routes A to D.
pub const OPTIMISED_COLOURS: [RGB<u8>; 4] = [
    RGB::new(37, 99, 235),
    RGB::new(22, 163, 74),
    RGB::new(234, 88, 12),
    RGB::new(147, 51, 234),
];

pub const FALLBACK_COLOUR: RGB<u8> = RGB::new(100, 116, 139);

pub fn optimised_colour(index: usize) -> RGB<u8> {
    OPTIMISED_COLOURS.get(index).copied().unwrap_or(FALLBACK_COLOUR)
}

/// Evenly spaced hues so neighbouring courier routes stay distinguishable.
pub fn individual_colour(index: usize, total: usize) -> RGB<u8> {
    let hue = if total == 0 {
        0.0
    } else {
        360.0 * index as f64 / total as f64
    };
    hsl_to_rgb(hue, 0.65, 0.48)
}

fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> RGB<u8> {
    let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let h = (hue.rem_euclid(360.0)) / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = lightness - c / 2.0;
    let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    RGB::new(channel(r), channel(g), channel(b))
}

pub fn to_hex(colour: RGB<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", colour.r, colour.g, colour.b)
}
