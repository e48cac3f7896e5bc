use std::ops::RangeBounds;

use crate::error::{MdpError, Result};

/// Checks that a numerical parameter lies in `range`
///
/// ### Example
/// ```ignore
/// check_interval("gamma", 1.0, 0.0..1.0)?;
/// ```
/// This fails with the message "Invalid value for \`gamma\`. Must be in the interval 0.0..1.0, got 1."
pub(crate) fn check_interval<R>(name: &str, value: f64, range: R) -> Result<()>
where
    R: RangeBounds<f64> + std::fmt::Debug,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(MdpError::InvalidParameter(format!(
            "Invalid value for `{name}`. Must be in the interval {range:?}, got {value}."
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_interval_functional() {
        assert!(check_interval("x", 0.0, 0.0..1.0).is_ok());
        assert!(check_interval("x", 1.0, 0.0..1.0).is_err());
        assert!(check_interval("x", 1.0, 0.0..=1.0).is_ok());
        assert!(check_interval("x", f64::NAN, 0.0..=1.0).is_err());
    }
}
