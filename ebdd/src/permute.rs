//! Variable permutations assigning input variables to BDD levels.
//!
//! A permutation file lists, in level order, the input variable id placed at each level. BDD
//! performance is dominated by the variable order, so benchmarks ship an order tuned to their
//! structure; the proof keeps using the input numbering throughout.

use std::io::{self, BufRead, BufReader, Read};

use rustc_hash::FxHashMap;
use thiserror::Error;

/// Possible errors while reading or applying a permutation.
#[derive(Debug, Error)]
pub enum PermutationError {
    #[error("line {line}: invalid variable list '{text}'")]
    NonInteger { line: usize, text: String },
    #[error("unequal list lengths: {values}, {permuted}")]
    UnequalLengths { values: usize, permuted: usize },
    #[error("not a permutation: {value} appears twice")]
    DuplicateValue { value: i64 },
    #[error("not a permutation: nothing maps to {value}")]
    MissingValue { value: i64 },
    #[error("value {value} not in permutation")]
    UnknownValue { value: i64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A bijection between BDD levels and input variable ids.
pub struct Permuter {
    forward: FxHashMap<i64, i64>,
    reverse: FxHashMap<i64, i64>,
}

impl Permuter {
    /// The identity permutation on `1..=count`.
    pub fn identity(count: usize) -> Permuter {
        let mut forward = FxHashMap::default();
        let mut reverse = FxHashMap::default();
        for value in 1..=count as i64 {
            forward.insert(value, value);
            reverse.insert(value, value);
        }
        Permuter { forward, reverse }
    }

    /// Build a permutation from parallel value lists, verifying it is a bijection.
    pub fn new(values: &[i64], permuted: &[i64]) -> Result<Permuter, PermutationError> {
        if values.len() != permuted.len() {
            return Err(PermutationError::UnequalLengths {
                values: values.len(),
                permuted: permuted.len(),
            });
        }
        let mut forward = FxHashMap::default();
        let mut reverse = FxHashMap::default();
        for (&value, &image) in values.iter().zip(permuted.iter()) {
            if reverse.insert(image, value).is_some() {
                return Err(PermutationError::DuplicateValue { value: image });
            }
            forward.insert(value, image);
        }
        for &value in values.iter() {
            if !reverse.contains_key(&value) {
                return Err(PermutationError::MissingValue { value });
            }
        }
        Ok(Permuter { forward, reverse })
    }

    /// The input variable id assigned to `level`.
    pub fn forward(&self, level: i64) -> Result<i64, PermutationError> {
        self.forward
            .get(&level)
            .copied()
            .ok_or(PermutationError::UnknownValue { value: level })
    }

    /// The level carrying input variable `id`.
    pub fn reverse(&self, id: i64) -> Result<i64, PermutationError> {
        self.reverse
            .get(&id)
            .copied()
            .ok_or(PermutationError::UnknownValue { value: id })
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// Read a permutation file: whitespace-separated integers, `#` starting a comment line.
///
/// The k-th integer is the input variable placed at level k; the file must be a bijection on
/// `1..=N`.
pub fn read_permutation(input: impl Read) -> Result<Permuter, PermutationError> {
    let reader = BufReader::new(input);
    let mut permuted = vec![];
    let mut line_number = 0;
    for line in reader.lines() {
        let line = line?;
        line_number += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        for field in trimmed.split_whitespace() {
            let value: i64 = field.parse().map_err(|_| PermutationError::NonInteger {
                line: line_number,
                text: line.clone(),
            })?;
            permuted.push(value);
        }
    }
    let values: Vec<i64> = (1..=permuted.len() as i64).collect();
    Permuter::new(&values, &permuted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_maps_values_to_themselves() {
        let permuter = Permuter::identity(4);
        assert_eq!(permuter.len(), 4);
        for value in 1..=4 {
            assert_eq!(permuter.forward(value).unwrap(), value);
            assert_eq!(permuter.reverse(value).unwrap(), value);
        }
    }

    #[test]
    fn reads_a_permutation_across_lines() {
        let permuter = read_permutation("# order tuned for the instance\n3 1\n4\n2\n".as_bytes())
            .unwrap();
        assert_eq!(permuter.forward(1).unwrap(), 3);
        assert_eq!(permuter.forward(2).unwrap(), 1);
        assert_eq!(permuter.forward(3).unwrap(), 4);
        assert_eq!(permuter.forward(4).unwrap(), 2);
        assert_eq!(permuter.reverse(4).unwrap(), 3);
    }

    #[test]
    fn rejects_duplicates() {
        assert!(matches!(
            read_permutation("1 2 2\n".as_bytes()),
            Err(PermutationError::DuplicateValue { value: 2 })
        ));
    }

    #[test]
    fn rejects_values_outside_range() {
        // 5 appears but 3 never does, so nothing maps to 3.
        assert!(matches!(
            read_permutation("1 2 5\n".as_bytes()),
            Err(PermutationError::MissingValue { .. })
        ));
    }

    #[test]
    fn rejects_non_integers() {
        assert!(matches!(
            read_permutation("1 x\n".as_bytes()),
            Err(PermutationError::NonInteger { line: 1, .. })
        ));
    }
}
