//! CLI command implementations.

pub mod codecs;
pub mod list;
pub mod map;

use spillway_common::{Tuple, Value};

/// Deterministic three-column row for synthetic workloads.
pub(crate) fn synthetic_row(i: u64) -> Tuple {
    let id = i64::try_from(i).unwrap_or(i64::MAX);
    Tuple::from(vec![
        Value::from(id),
        Value::from(format!("row-{i:010}")),
        Value::from((i % 1_000) as f64 / 8.0),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_row_is_deterministic() {
        assert_eq!(synthetic_row(42), synthetic_row(42));
        assert_ne!(synthetic_row(1), synthetic_row(2));
        assert_eq!(synthetic_row(7).len(), 3);
    }
}
