//! Generated label names.

/// The pair of labels guarding one materialized comparison: control jumps
/// to `when_true` when the comparison holds and falls through to `next`
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonLabels {
    pub when_true: String,
    pub next: String,
}

/// Produces globally unique labels for generated jumps. The counter is
/// threaded through the translator rather than kept in module state, so
/// code generation stays reentrant.
#[derive(Debug, Clone)]
pub struct LabelGenerator {
    counter: usize,
}
impl LabelGenerator {
    pub fn new() -> Self {
        Self { counter: 0 }
    }

    /// Generate the label pair for the next comparison.
    pub fn next_comparison(&mut self) -> ComparisonLabels {
        let n = self.counter;
        self.counter += 1;
        ComparisonLabels {
            when_true: format!("LT{}", n),
            next: format!("NLT{}", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_unique_and_ascending() {
        let mut labels = LabelGenerator::new();

        let first = labels.next_comparison();
        let second = labels.next_comparison();

        assert_eq!("LT0", first.when_true);
        assert_eq!("NLT0", first.next);
        assert_eq!("LT1", second.when_true);
        assert_eq!("NLT1", second.next);
    }
}
