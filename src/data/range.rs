//! Compact range expressions for addressing episodes.
//!
//! Fields are separated by commas and/or whitespace:
//! * `7`       a single index
//! * `3-5`     an inclusive range
//! * `2:10:2`  a half-open slice with optional start/stop/step, evaluated
//!   against `0..upper_bound`
//!
//! The result is ascending, de-duplicated and never negative.

use std::collections::BTreeSet;

use crate::error::ParseError;

/// Parse `text` into a sorted set of indexes. `upper_bound` is the length used
/// to resolve slice fields and to cap inclusive ranges; literal fields are
/// kept as given.
pub fn parse_range_expression(text: &str, upper_bound: usize) -> Result<Vec<usize>, ParseError> {
    let mut indexes: BTreeSet<i64> = BTreeSet::new();
    let fields = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|f| !f.is_empty());

    for field in fields {
        if field.contains(':') {
            indexes.extend(slice_indices(field, upper_bound as i64)?);
        } else if field.contains('-') {
            let (start, end) = field
                .split_once('-')
                .ok_or_else(|| ParseError::invalid(field, "expected 'start-end'"))?;
            let start = parse_int(field, start)?;
            let end = parse_int(field, end)?.min(upper_bound as i64 - 1);
            indexes.extend(start.max(0)..=end);
        } else {
            indexes.insert(parse_int(field, field)?);
        }
    }

    Ok(indexes
        .into_iter()
        .filter(|&i| i >= 0)
        .map(|i| i as usize)
        .collect())
}

/// Inverse of [`parse_range_expression`] for display: a space separated list.
pub fn format_range_expression(indexes: &[usize]) -> String {
    indexes
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_int(field: &str, token: &str) -> Result<i64, ParseError> {
    token
        .trim()
        .parse::<i64>()
        .map_err(|_| ParseError::invalid(field, format!("'{token}' is not an integer")))
}

/// Expand a `start:stop:step` slice the way sequence slicing resolves bounds:
/// negative bounds count from `len`, out-of-range bounds are clamped.
fn slice_indices(field: &str, len: i64) -> Result<Vec<i64>, ParseError> {
    let parts: Vec<&str> = field.split(':').collect();
    if parts.len() > 3 {
        return Err(ParseError::invalid(field, "too many ':' separators"));
    }
    let mut bounds = [None; 3];
    for (slot, part) in bounds.iter_mut().zip(&parts) {
        if !part.trim().is_empty() {
            *slot = Some(parse_int(field, part)?);
        }
    }
    let [start, stop, step] = bounds;

    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(ParseError::ZeroStep {
            field: field.to_string(),
        });
    }

    let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };
    let clamp = |bound: Option<i64>, default: i64| -> i64 {
        match bound {
            None => default,
            Some(b) if b < 0 => (b + len).max(lower),
            Some(b) => b.min(upper),
        }
    };
    let start = clamp(start, if step > 0 { lower } else { upper });
    let stop = clamp(stop, if step > 0 { upper } else { lower });

    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(i);
        i += step;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_fields() {
        assert_eq!(
            parse_range_expression("1,3-5,7:9", 10).unwrap(),
            vec![1, 3, 4, 5, 7, 8]
        );
    }

    #[test]
    fn whitespace_and_duplicates() {
        assert_eq!(
            parse_range_expression(" 4  2,,2\t0-1 ", 10).unwrap(),
            vec![0, 1, 2, 4]
        );
    }

    #[test]
    fn bare_colon_is_full_range() {
        assert_eq!(parse_range_expression(":", 4).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(parse_range_expression("::", 3).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn slice_stop_is_clamped_and_negative_start_counts_back() {
        assert_eq!(parse_range_expression("3:100", 5).unwrap(), vec![3, 4]);
        assert_eq!(parse_range_expression("-2:", 5).unwrap(), vec![3, 4]);
        assert_eq!(parse_range_expression("::2", 5).unwrap(), vec![0, 2, 4]);
        assert_eq!(parse_range_expression("::-2", 5).unwrap(), vec![0, 2, 4]);
    }

    #[test]
    fn literal_fields_are_not_bounded() {
        assert_eq!(parse_range_expression("12", 3).unwrap(), vec![12]);
    }

    #[test]
    fn inclusive_ranges_are_capped_at_the_bound() {
        assert_eq!(parse_range_expression("8-12", 10).unwrap(), vec![8, 9]);
        assert_eq!(
            parse_range_expression("0-9999999999", 10).unwrap(),
            (0..10).collect::<Vec<_>>()
        );
        assert_eq!(
            parse_range_expression("3-9223372036854775807", 5).unwrap(),
            vec![3, 4]
        );
        assert!(parse_range_expression("0-5", 0).unwrap().is_empty());
    }

    #[test]
    fn reversed_inclusive_range_is_empty() {
        assert!(parse_range_expression("5-3", 10).unwrap().is_empty());
    }

    #[test]
    fn malformed_fields_name_the_offender() {
        let err = parse_range_expression("1, x", 10).unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { ref field, .. } if field == "x"));

        assert!(parse_range_expression("-5", 10).is_err());
        assert!(parse_range_expression("1:2:3:4", 10).is_err());
        assert!(matches!(
            parse_range_expression("0:5:0", 10),
            Err(ParseError::ZeroStep { .. })
        ));
    }

    #[test]
    fn format_round_trips() {
        let idx = vec![0, 2, 5];
        let text = format_range_expression(&idx);
        assert_eq!(text, "0 2 5");
        assert_eq!(parse_range_expression(&text, 10).unwrap(), idx);
    }
}
