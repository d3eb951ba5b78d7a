//! Transient outcome records for module runs.

use crate::modules::ModuleId;

/// Share of modules that must succeed for a run to count as "mostly succeeded".
pub const MOSTLY_SUCCEEDED_RATIO: f64 = 0.8;

/// Result of one step inside a module (one adapter, one command, one value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub name: String,
    pub success: bool,
    pub detail: String,
}

impl StepOutcome {
    pub fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            detail: detail.into(),
        }
    }

    pub fn failed(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            detail: detail.into(),
        }
    }
}

/// Outcome of running (or reverting) a single module.
#[derive(Debug, Clone)]
pub struct ModuleReport {
    pub module: ModuleId,
    pub success: bool,
    pub message: String,
    pub steps: Vec<StepOutcome>,
    /// The change only takes full effect after a restart.
    pub reboot_required: bool,
}

impl ModuleReport {
    pub fn new(module: ModuleId, success: bool, message: impl Into<String>) -> Self {
        Self {
            module,
            success,
            message: message.into(),
            steps: Vec::new(),
            reboot_required: false,
        }
    }

    pub fn with_steps(mut self, steps: Vec<StepOutcome>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_reboot(mut self, required: bool) -> Self {
        self.reboot_required = required;
        self
    }
}

/// Aggregate of a multi-module run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<ModuleReport>,
}

impl RunSummary {
    pub fn push(&mut self, report: ModuleReport) {
        self.reports.push(report);
    }

    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.success).count()
    }

    pub fn all_succeeded(&self) -> bool {
        !self.reports.is_empty() && self.succeeded() == self.total()
    }

    pub fn mostly_succeeded(&self) -> bool {
        if self.reports.is_empty() {
            return false;
        }
        self.succeeded() as f64 / self.total() as f64 >= MOSTLY_SUCCEEDED_RATIO
    }

    pub fn reboot_required(&self) -> bool {
        self.reports.iter().any(|r| r.reboot_required)
    }

    pub fn failed_modules(&self) -> Vec<ModuleId> {
        self.reports
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.module)
            .collect()
    }

    /// One-line summary, e.g. `8/9 modules succeeded`.
    pub fn headline(&self) -> String {
        format!("{}/{} modules succeeded", self.succeeded(), self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_with(results: &[bool]) -> RunSummary {
        let mut summary = RunSummary::default();
        for (i, ok) in results.iter().enumerate() {
            summary.push(ModuleReport::new(ModuleId::ALL[i], *ok, ""));
        }
        summary
    }

    #[test]
    fn test_mostly_succeeded_threshold() {
        // 8 of 9 is above 80%
        let summary = summary_with(&[true, true, true, true, true, true, true, true, false]);
        assert!(summary.mostly_succeeded());
        assert!(!summary.all_succeeded());
        assert_eq!(summary.headline(), "8/9 modules succeeded");

        // 7 of 9 is below
        let summary = summary_with(&[true, true, true, true, true, true, true, false, false]);
        assert!(!summary.mostly_succeeded());

        // exactly 4 of 5 counts
        let summary = summary_with(&[true, true, true, true, false]);
        assert!(summary.mostly_succeeded());
    }

    #[test]
    fn test_empty_summary_is_not_success() {
        let summary = RunSummary::default();
        assert!(!summary.all_succeeded());
        assert!(!summary.mostly_succeeded());
    }

    #[test]
    fn test_reboot_and_failed_modules() {
        let mut summary = RunSummary::default();
        summary.push(ModuleReport::new(ModuleId::Dns, true, "ok"));
        summary.push(ModuleReport::new(ModuleId::Reset, false, "bad").with_reboot(true));
        assert!(summary.reboot_required());
        assert_eq!(summary.failed_modules(), vec![ModuleId::Reset]);
    }
}
