//! Bidirectional conversion between domain values and their storage form.
//!
//! A [`TypeMapper`] is a pair of plain functions. Mappers are built once as
//! constants and reused by every query that reads or writes the mapped column.

use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoundTripError {
    #[error("domain value {input} mapped to {stored} but came back as {returned}")]
    Left {
        input: String,
        stored: String,
        returned: String,
    },
    #[error("storage value {output} mapped to {domain} but came back as {returned}")]
    Right {
        output: String,
        domain: String,
        returned: String,
    },
}

/// Pair of total functions between a domain type `I` and a storage type `O`.
pub struct TypeMapper<I, O> {
    left: fn(I) -> O,
    right: fn(O) -> I,
}

impl<I, O> TypeMapper<I, O> {
    pub const fn new(left: fn(I) -> O, right: fn(O) -> I) -> Self {
        Self { left, right }
    }

    /// Domain to storage.
    pub fn map_left(&self, value: I) -> O {
        (self.left)(value)
    }

    /// Storage to domain.
    pub fn map_right(&self, value: O) -> I {
        (self.right)(value)
    }
}

impl<I, O> TypeMapper<I, O>
where
    I: Clone + PartialEq + Debug,
    O: Clone + PartialEq + Debug,
{
    /// Checks the round-trip law over the given enumerated domains.
    ///
    /// Every input must survive `right(left(x))` and every output must
    /// survive `left(right(y))`. Returns the first violation found.
    pub fn verify_bidirectional(&self, inputs: &[I], outputs: &[O]) -> Result<(), RoundTripError> {
        for input in inputs {
            let stored = self.map_left(input.clone());
            let returned = self.map_right(stored.clone());
            if &returned != input {
                return Err(RoundTripError::Left {
                    input: format!("{:?}", input),
                    stored: format!("{:?}", stored),
                    returned: format!("{:?}", returned),
                });
            }
        }
        for output in outputs {
            let domain = self.map_right(output.clone());
            let returned = self.map_left(domain.clone());
            if &returned != output {
                return Err(RoundTripError::Right {
                    output: format!("{:?}", output),
                    domain: format!("{:?}", domain),
                    returned: format!("{:?}", returned),
                });
            }
        }
        Ok(())
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

// Lenient read: anything other than 0 is true.
fn int_to_bool(value: i64) -> bool {
    value != 0
}

/// Writes `true`/`false` as exactly `1`/`0`.
pub const BOOLEAN_INT_MAPPER: TypeMapper<bool, i64> = TypeMapper::new(bool_to_int, int_to_bool);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_mapper_writes_strict_values() {
        assert_eq!(BOOLEAN_INT_MAPPER.map_left(true), 1);
        assert_eq!(BOOLEAN_INT_MAPPER.map_left(false), 0);
    }

    #[test]
    fn test_boolean_mapper_reads_leniently() {
        assert!(BOOLEAN_INT_MAPPER.map_right(1));
        assert!(BOOLEAN_INT_MAPPER.map_right(42));
        assert!(BOOLEAN_INT_MAPPER.map_right(-1));
        assert!(!BOOLEAN_INT_MAPPER.map_right(0));

        // A lenient read is normalized on the next write
        let read = BOOLEAN_INT_MAPPER.map_right(42);
        assert_eq!(BOOLEAN_INT_MAPPER.map_left(read), 1);
    }

    #[test]
    fn test_boolean_mapper_round_trips_canonical_pair() {
        BOOLEAN_INT_MAPPER
            .verify_bidirectional(&[true, false], &[1, 0])
            .unwrap();
    }

    #[test]
    fn test_verify_reports_non_canonical_storage_value() {
        let err = BOOLEAN_INT_MAPPER
            .verify_bidirectional(&[true, false], &[42])
            .unwrap_err();
        assert_eq!(
            err,
            RoundTripError::Right {
                output: "42".to_string(),
                domain: "true".to_string(),
                returned: "1".to_string(),
            }
        );
    }

    #[test]
    fn test_verify_reports_broken_left_direction() {
        fn lossy(value: u8) -> u8 {
            value / 2
        }
        fn identity(value: u8) -> u8 {
            value
        }
        let mapper = TypeMapper::new(lossy, identity);
        let err = mapper.verify_bidirectional(&[4], &[]).unwrap_err();
        assert!(matches!(err, RoundTripError::Left { .. }));
        assert!(err.to_string().contains("came back as 2"));
    }
}
