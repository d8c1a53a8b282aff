pub mod matrix;
pub mod value;

pub use matrix::Matrix;
pub use value::Value;

/// Renders a scalar without floating-point noise.
///
/// Values within one single-precision ULP of an integer print as that integer, and values
/// below one in magnitude that land on a 1-3 digit decimal print as that
/// decimal. Everything else uses plain notation inside [1e-3, 1e7) and
/// exponential notation outside it.
pub fn print(d: f64) -> String {
    let epsilon = f32::EPSILON as f64;

    let l = d.round();
    if l != 0.0 && (d - l).abs() < epsilon && l.abs() < i64::MAX as f64 {
        return format!("{}", l as i64);
    }

    if d != 0.0 && d.abs() < 1.0 {
        let sign = if d < 0.0 { "-" } else { "" };
        let magnitude = d.abs();
        let mut power = 1.0;
        for places in 1..=3 {
            power *= 10.0;
            let t = magnitude * power;
            let l = t.round();
            if l != 0.0 && (t - l).abs() < epsilon {
                let digits = format!("{}", l as i64);
                let pad = "0".repeat(places - digits.len().min(places));
                return format!("{sign}0.{pad}{digits}");
            }
        }
    }

    let magnitude = d.abs();
    if d == 0.0 || (1e-3..1e7).contains(&magnitude) || !d.is_finite() {
        format!("{d}")
    } else {
        format!("{d:e}")
    }
}

#[cfg(test)]
mod tests {
    use super::print;

    #[test]
    fn test_print_integers() {
        assert_eq!(print(3.0), "3");
        assert_eq!(print(-42.0), "-42");
        assert_eq!(print(0.0), "0");
        assert_eq!(print(1.0 + f64::EPSILON / 2.0), "1");
    }

    #[test]
    fn test_print_short_decimals() {
        assert_eq!(print(0.1 + 0.2), "0.3");
        assert_eq!(print(0.05), "0.05");
        assert_eq!(print(0.007), "0.007");
        assert_eq!(print(-0.25), "-0.25");
    }

    #[test]
    fn test_print_plain_and_exponential() {
        assert_eq!(print(2.5), "2.5");
        assert_eq!(print(1.5e-5), "1.5e-5");
        assert_eq!(print(1e20), "1e20");
        assert_eq!(print(2.5e-7), "2.5e-7");
        assert_eq!(print(f64::INFINITY), "inf");
    }
}
