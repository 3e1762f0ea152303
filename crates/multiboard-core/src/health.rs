//! Project-wide design rule and connectivity report.
//!
//! Nets that leave a board through a declared port are expected to show up as
//! unconnected on that board, since the other end is on another board. Those
//! reports are filtered out; everything else is passed through.

use crate::manager::MultiBoardManager;
use crate::constants::MAX_REPORTED_VIOLATIONS;
use crate::placement::PlacementIndex;
use crate::progress::{Monotonic, Progress};
use multiboard_kicad::DrcViolation;
use std::collections::{BTreeMap, BTreeSet};

/// Check results for one board.
#[derive(Debug, Clone, Default)]
pub struct BoardHealth {
    /// Violations left after filtering
    pub violations: usize,
    /// The first of those violations
    pub details: Vec<DrcViolation>,
    /// Unconnected items on port nets
    pub ignored: usize,
    /// Violations the user excluded in KiCad
    pub excluded: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectivityReport {
    pub boards: BTreeMap<String, BoardHealth>,
    /// Port nets with no counterpart on any other board
    pub cross_board: Vec<String>,
    /// Boards that could not be checked
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConnectivityReport {
    /// No errors and no remaining violations.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.boards.values().all(|b| b.violations == 0)
    }
}

/// Split a board's violations into what to report and what its ports explain.
fn filter_violations<'a>(
    violations: impl IntoIterator<Item = &'a DrcViolation>,
    port_nets: &BTreeSet<String>,
) -> BoardHealth {
    let mut health = BoardHealth::default();
    for violation in violations {
        if violation.excluded {
            health.excluded += 1;
            continue;
        }
        if violation.is_unconnected()
            && violation
                .referenced_nets()
                .iter()
                .any(|net| port_nets.contains(net))
        {
            health.ignored += 1;
            continue;
        }
        health.violations += 1;
        if health.details.len() < MAX_REPORTED_VIOLATIONS {
            health.details.push(violation.clone());
        }
    }
    health
}

impl MultiBoardManager {
    /// Run the design rule checker on every board. A board that cannot be
    /// checked is listed in [`ConnectivityReport::errors`] and the others
    /// are still checked.
    pub fn check_connectivity(&self, progress: &mut dyn Progress) -> ConnectivityReport {
        let mut progress = Monotonic::new(progress);
        let mut report = ConnectivityReport::default();
        report.warnings.extend(self.project.problems());

        let mut placement = PlacementIndex::default();
        placement.scan(self.project.boards.values(), &self.root, self.store.as_ref(), true);
        report.warnings.extend(placement.duplicates().iter().cloned());

        let total = self.project.boards.len().max(1);
        for (index, (name, board)) in self.project.boards.iter().enumerate() {
            let percent = (100 * index / total) as u8;
            progress.step(percent, &format!("Checking {name}..."));

            let pcb = board.pcb_file(&self.root);
            if !self.store.exists(&pcb) {
                report.errors.push(format!("{name}: PCB file not found"));
                continue;
            }
            let drc = match self.checker.check(&pcb) {
                Ok(drc) => drc,
                Err(e) => {
                    log::warn!("DRC on '{name}' failed: {e:#}");
                    report.errors.push(format!("{name}: DRC failed - {e:#}"));
                    continue;
                }
            };

            let health = filter_violations(drc.all_violations(), &board.port_nets());
            log::debug!(
                "'{name}': {} violations, {} on port nets, {} excluded",
                health.violations,
                health.ignored,
                health.excluded
            );
            if health.excluded > 0 {
                report.warnings.push(format!(
                    "{name}: {} violations excluded in KiCad",
                    health.excluded
                ));
            }
            report.boards.insert(name.clone(), health);
        }

        report.cross_board = self.unmatched_port_nets();
        progress.step(100, "Done");
        report
    }

    /// Port nets declared on exactly one board.
    fn unmatched_port_nets(&self) -> Vec<String> {
        let mut declared: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        for (name, board) in &self.project.boards {
            for net in board.port_nets() {
                declared.entry(net).or_default().push(name);
            }
        }
        declared
            .into_iter()
            .filter(|(_, boards)| boards.len() == 1)
            .map(|(net, boards)| {
                format!("{net}: port on '{}' has no counterpart on another board", boards[0])
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiboard_kicad::DrcReport;

    const REPORT: &str = r#"{
        "violations": [
            {"type": "clearance", "severity": "error", "description": "Clearance violation", "items": []},
            {"type": "silk_overlap", "severity": "warning", "description": "Silk overlap", "items": [], "excluded": true}
        ],
        "unconnected_items": [
            {"type": "unconnected_items", "severity": "error", "description": "Missing connection between items",
             "items": [{"description": "Pad 1 [VBUS] of J1 on F.Cu"}, {"description": "Pad 2 [VBUS] of U1 on F.Cu"}]},
            {"type": "unconnected_items", "severity": "error", "description": "Missing connection between items",
             "items": [{"description": "Pad 1 [VBUS_SENSE] of R4 on F.Cu"}, {"description": "Pad 3 [VBUS_SENSE] of U1 on F.Cu"}]}
        ]
    }"#;

    #[test]
    fn test_filter_port_nets_exactly() {
        let report = DrcReport::from_json(REPORT).unwrap();
        let ports = BTreeSet::from(["VBUS".to_string()]);
        let health = filter_violations(report.all_violations(), &ports);

        assert_eq!(health.violations, 2);
        assert_eq!(health.ignored, 1);
        assert_eq!(health.excluded, 1);
        assert_eq!(health.details[0].violation_type, "clearance");
        assert!(health.details[1].referenced_nets().contains("VBUS_SENSE"));
    }

    #[test]
    fn test_details_are_capped() {
        let violation = DrcViolation {
            violation_type: "clearance".into(),
            severity: "error".into(),
            description: "x".into(),
            items: Vec::new(),
            excluded: false,
        };
        let many = vec![violation; MAX_REPORTED_VIOLATIONS + 5];
        let health = filter_violations(&many, &BTreeSet::new());
        assert_eq!(health.violations, MAX_REPORTED_VIOLATIONS + 5);
        assert_eq!(health.details.len(), MAX_REPORTED_VIOLATIONS);
    }
}
