//! Candidate Filtering and Sampling
//!
//! Filtering keeps instances whose operand dtypes match the requested
//! operation. Sampling bounds the candidate count with a fixed seed so that a
//! given filtered set always yields the same subset, in the same order.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dtype::DataType;
use crate::instance::ConvInstance;
use crate::tensor::TensorDesc;

/// Seed of the candidate sampler
///
/// Fixed so that builds and tests are reproducible. The sampler is ChaCha8,
/// whose stream does not change between `rand` releases.
pub const SAMPLE_SEED: u64 = (-11_i64) as u64;

/// Operand dtypes of the requested operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperandTypes {
    /// Input activation dtype
    pub a: DataType,
    /// Weight dtype
    pub b: DataType,
    /// Output dtype
    pub output: DataType,
}

impl OperandTypes {
    /// Create from explicit dtypes
    #[must_use]
    pub const fn new(a: DataType, b: DataType, output: DataType) -> Self {
        Self { a, b, output }
    }

    /// Take the dtypes of input, weight and output descriptors
    #[must_use]
    pub fn from_descriptors(x: &TensorDesc, w: &TensorDesc, y: &TensorDesc) -> Self {
        Self::new(x.dtype(), w.dtype(), y.dtype())
    }
}

fn ck_matches(tag: &str, dtype: DataType) -> bool {
    dtype.ck_tag() == Some(tag)
}

/// Keep `op` only if its a/b/output dtype tags equal the requested ones.
///
/// A dtype without a CK spelling never matches.
#[must_use]
pub fn filter_op<'a>(op: &'a ConvInstance, types: &OperandTypes) -> Option<&'a ConvInstance> {
    if !ck_matches(&op.a_element_dtype, types.a) {
        return None;
    }
    if !ck_matches(&op.b_element_dtype, types.b) {
        return None;
    }
    if !ck_matches(&op.e_element_dtype, types.output) {
        return None;
    }
    Some(op)
}

/// Filter a catalog against the requested operand dtypes, preserving order
#[must_use]
pub fn filter_instances(instances: &[ConvInstance], types: &OperandTypes) -> Vec<ConvInstance> {
    instances
        .iter()
        .filter_map(|op| filter_op(op, types))
        .cloned()
        .collect()
}

/// Bound a candidate list to `cap` entries.
///
/// `None` keeps everything; a list no longer than the cap is returned as is.
/// Otherwise exactly `cap` entries are drawn with [`SAMPLE_SEED`].
#[must_use]
pub fn select_instances<T: Clone>(candidates: Vec<T>, cap: Option<usize>) -> Vec<T> {
    let Some(cap) = cap else {
        return candidates;
    };
    if candidates.len() <= cap {
        return candidates;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(SAMPLE_SEED);
    rand::seq::index::sample(&mut rng, candidates.len(), cap)
        .into_iter()
        .map(|i| candidates[i].clone())
        .collect()
}

/// Filter then sample: the candidate list for one operation signature
#[must_use]
pub fn choose_instances(
    library: &[ConvInstance],
    types: &OperandTypes,
    cap: Option<usize>,
) -> Vec<ConvInstance> {
    let filtered = filter_instances(library, types);
    let filtered_count = filtered.len();
    let chosen = select_instances(filtered, cap);
    debug!(
        library = library.len(),
        filtered = filtered_count,
        chosen = chosen.len(),
        "generated ck instances after filter"
    );
    chosen
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::instance::tests::sample_instance;
    use proptest::prelude::*;

    const TAGS: [&str; 4] = ["F16", "BF16", "F32", "I8"];
    const DTYPES: [DataType; 4] = [DataType::F16, DataType::BF16, DataType::F32, DataType::I8];

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_select_returns_min_of_len_and_cap(
            len in 0usize..200,
            cap in 0usize..50
        ) {
            let items: Vec<usize> = (0..len).collect();
            let chosen = select_instances(items.clone(), Some(cap));
            prop_assert_eq!(chosen.len(), len.min(cap));
            if len <= cap {
                prop_assert_eq!(&chosen, &items);
            } else {
                prop_assert_eq!(chosen, select_instances(items, Some(cap)));
            }
        }

        #[test]
        fn test_filter_is_sound(
            triples in prop::collection::vec((0usize..4, 0usize..4, 0usize..4), 0..30),
            request in (0usize..4, 0usize..4, 0usize..4)
        ) {
            let library: Vec<ConvInstance> = triples
                .iter()
                .map(|&(a, b, e)| ConvInstance {
                    a_element_dtype: TAGS[a].to_string(),
                    b_element_dtype: TAGS[b].to_string(),
                    e_element_dtype: TAGS[e].to_string(),
                    ..sample_instance()
                })
                .collect();
            let types = OperandTypes::new(DTYPES[request.0], DTYPES[request.1], DTYPES[request.2]);
            let kept = filter_instances(&library, &types);

            let expected = triples.iter().filter(|&&t| t == request).count();
            prop_assert_eq!(kept.len(), expected);
            for op in &kept {
                prop_assert_eq!(op.a_element_dtype.as_str(), TAGS[request.0]);
                prop_assert_eq!(op.b_element_dtype.as_str(), TAGS[request.1]);
                prop_assert_eq!(op.e_element_dtype.as_str(), TAGS[request.2]);
            }
        }
    }
}
