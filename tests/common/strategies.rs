use proptest::prelude::*;

/// Strategy for fleet sizes
pub fn fleet_size_strategy() -> impl Strategy<Value = u64> {
    1u64..200
}

/// Strategy for positive batch sizes, including ones larger than most fleets
pub fn batch_size_strategy() -> impl Strategy<Value = usize> {
    1usize..250
}
