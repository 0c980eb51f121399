//! Configuration for template inference and statement generation

use crate::template::calendar::CalendarPolicy;

/// Configuration options for generation
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    /// What to do with time values declared in the Ethiopian calendar
    pub calendar_policy: CalendarPolicy,

    /// Upper bound for `$n` searches; `None` uses the larger sheet dimension
    pub n_bound: Option<usize>,

    /// Multiplier applied to the gap distance of misaligned block pairs
    pub misalignment_factor: f64,

    /// Flat cost added to every misaligned block pair
    pub misalignment_offset: f64,

    /// Cost of the padding columns added when candidates outnumber targets
    pub padding_cost: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            calendar_policy: CalendarPolicy::Leave,
            n_bound: None,
            misalignment_factor: 5.0,
            misalignment_offset: 1.0e7,
            padding_cost: 1.0e9,
        }
    }
}

impl GenerationConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Ethiopian calendar policy
    pub fn with_calendar_policy(mut self, policy: CalendarPolicy) -> Self {
        self.calendar_policy = policy;
        self
    }

    /// Set the `$n` search bound
    pub fn with_n_bound(mut self, bound: usize) -> Self {
        self.n_bound = Some(bound);
        self
    }

    /// Set the misalignment multiplier
    pub fn with_misalignment_factor(mut self, factor: f64) -> Self {
        self.misalignment_factor = factor;
        self
    }

    pub fn with_misalignment_offset(mut self, offset: f64) -> Self {
        self.misalignment_offset = offset;
        self
    }

    pub fn with_padding_cost(mut self, cost: f64) -> Self {
        self.padding_cost = cost;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GenerationConfig::default();
        assert_eq!(config.calendar_policy, CalendarPolicy::Leave);
        assert_eq!(config.misalignment_factor, 5.0);
        assert!(config.padding_cost > config.misalignment_offset);
    }

    #[test]
    fn test_builder() {
        let config = GenerationConfig::new()
            .with_calendar_policy(CalendarPolicy::Add)
            .with_n_bound(20);
        assert_eq!(config.calendar_policy, CalendarPolicy::Add);
        assert_eq!(config.n_bound, Some(20));
    }
}
