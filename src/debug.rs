//! Compact formatting of vectors for log output.
use num_complex::Complex64;
use pretty_dtoa::{dtoa, FmtFloatConfig};
use std::f64::consts::PI;

const FLOAT_CONFIG: FmtFloatConfig = FmtFloatConfig::default()
    .add_point_zero(false)
    .max_significant_digits(6);

fn join<T>(v: &[T], f: impl Fn(&T) -> String) -> String {
    format!("[{}]", v.iter().map(f).collect::<Vec<_>>().join(", "))
}

pub fn format_f64_vec(v: &[f64]) -> String {
    join(v, |&f| dtoa(f, FLOAT_CONFIG))
}

pub fn format_rect_vec(v: &[Complex64]) -> String {
    join(v, |z| {
        format!(
            "{}{}j{}",
            dtoa(z.re, FLOAT_CONFIG),
            if z.im.is_sign_negative() { "-" } else { "+" },
            dtoa(z.im.abs(), FLOAT_CONFIG)
        )
    })
}

pub fn format_polar_vec(v: &[Complex64]) -> String {
    join(v, |z| {
        format!(
            "{}\u{2220}{}\u{00B0}",
            dtoa(z.norm(), FLOAT_CONFIG),
            dtoa(z.arg() * 180.0 / PI, FLOAT_CONFIG)
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats() {
        assert_eq!(format_f64_vec(&[1.0, -0.5]), "[1, -0.5]");
        assert_eq!(format_rect_vec(&[Complex64::new(1.0, -2.0)]), "[1-j2]");
        assert_eq!(format_polar_vec(&[Complex64::new(0.0, 2.0)]), "[2\u{2220}90\u{00B0}]");
    }
}
