use crate::constants::MAX_ITERATIONS_PER_CALL;

/// Iterations one instruction may still run. Stands in for the compute
/// budget so a loop always stops before the runtime would kill it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkBudget {
    remaining: u32,
}

impl WorkBudget {
    /// Requests above `MAX_ITERATIONS_PER_CALL` are clamped, not rejected.
    pub fn new(requested: u32) -> Self {
        Self { remaining: requested.min(MAX_ITERATIONS_PER_CALL) }
    }

    pub fn try_spend(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(mut budget: WorkBudget) -> u32 {
        let mut spent = 0;
        while budget.try_spend() {
            spent += 1;
        }
        spent
    }

    #[test]
    fn test_budget_is_clamped() {
        assert_eq!(drain(WorkBudget::new(1_000)), MAX_ITERATIONS_PER_CALL);
        assert_eq!(drain(WorkBudget::new(3)), 3);
        assert_eq!(drain(WorkBudget::new(0)), 0);
    }

    #[test]
    fn test_spend_until_empty() {
        let mut budget = WorkBudget::new(2);
        assert!(budget.try_spend());
        assert!(budget.try_spend());
        assert!(!budget.try_spend());
        assert!(!budget.try_spend());
    }
}
