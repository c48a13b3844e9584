//! Host memory discovery for the batch-size planner.

use sysinfo::System;

/// Total system memory in bits.
///
/// The planner works in bits throughout because several per-character costs
/// (the 2-bit packed representation in particular) are sub-byte.
#[must_use]
pub fn total_system_memory_bits() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.total_memory().saturating_mul(8)
}

/// Currently available system memory in bits.
#[must_use]
pub fn available_memory_bits() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.available_memory().saturating_mul(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_discovery_returns_reasonable_values() {
        let total = total_system_memory_bits();
        let available = available_memory_bits();
        // any machine running the test suite has somewhere between 64MB and 1PB
        assert!(total > 64 * 1024 * 1024 * 8);
        assert!(total < 1_u64 << 53);
        assert!(available <= total);
    }
}
