//! Bringing one board in line with the schematic.
//!
//! Every placeable schematic component lives on exactly one board. Updating
//! a board adds the components no board has yet, refreshes the ones it
//! already hosts, and leaves alone anything hosted elsewhere or marked as not
//! to be placed. Footprints whose library id changed in the schematic are
//! swapped for the new footprint in the same spot.

use crate::board::BoardDocument;
use crate::constants::{MAX_REPORTED_FAILURES, PACK_GRID_SPACING, PACK_MAX_PER_ROW, PACK_ORIGIN};
use crate::error::ReconcileError;
use crate::footprint::Footprint;
use crate::links::setup_board_project;
use crate::manager::MultiBoardManager;
use crate::netlist::ComponentRecord;
use crate::nets::{NetAssignment, assign_nets};
use crate::placement::is_schematic_reference;
use crate::progress::{Monotonic, Progress};
use std::collections::BTreeSet;
use std::fmt;

/// Outcome of one [`MultiBoardManager::update_board`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub added: usize,
    pub updated: usize,
    pub replaced: usize,
    /// `REF: Library:Name` for every component whose footprint could not be
    /// loaded
    pub failed: Vec<String>,
    /// Components on the board that the schematic no longer places. They are
    /// reported, never removed.
    pub orphaned: Vec<String>,
    pub nets: NetAssignment,
}

impl fmt::Display for UpdateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Added: {}\nUpdated: {}", self.added, self.updated)?;
        if self.replaced > 0 {
            write!(f, "\nReplaced: {}", self.replaced)?;
        }
        write!(f, "\nFailed: {}", self.failed.len())?;
        if !self.failed.is_empty() {
            write!(f, "\n\nFailed footprints:")?;
            for failure in self.failed.iter().take(MAX_REPORTED_FAILURES) {
                write!(f, "\n{failure}")?;
            }
        }
        if !self.orphaned.is_empty() {
            write!(
                f,
                "\n\nNot placed by the schematic: {}",
                self.orphaned.join(", ")
            )?;
        }
        Ok(())
    }
}

/// Columns of the placement grid for `count` new footprints: one more than
/// a square layout needs, capped at the row limit.
pub fn grid_columns(count: usize) -> usize {
    let square = (count as f64).sqrt().ceil() as usize;
    (square + 1).clamp(1, PACK_MAX_PER_ROW)
}

/// Grid positions (mm) for `count` new footprints, row by row.
pub fn grid_positions(count: usize) -> Vec<(f64, f64)> {
    let columns = grid_columns(count);
    let (x0, y0) = PACK_ORIGIN;
    (0..count)
        .map(|i| {
            let (row, col) = (i / columns, i % columns);
            (
                x0 + col as f64 * PACK_GRID_SPACING,
                y0 + row as f64 * PACK_GRID_SPACING,
            )
        })
        .collect()
}

/// Where each netlist component goes relative to the board being updated.
#[derive(Default)]
struct Partition<'a> {
    skipped: usize,
    elsewhere: usize,
    update: Vec<&'a ComponentRecord>,
    add: Vec<&'a ComponentRecord>,
}

impl MultiBoardManager {
    /// Reconcile board `name` with the schematic and save it.
    ///
    /// Errors before the document is loaded leave it untouched. After that
    /// point, per-component problems are collected in the summary rather than
    /// failing the update.
    pub fn update_board(
        &mut self,
        name: &str,
        progress: &mut dyn Progress,
    ) -> Result<UpdateSummary, ReconcileError> {
        let mut progress = Monotonic::new(progress);

        let board = self
            .project
            .boards
            .get(name)
            .cloned()
            .ok_or_else(|| ReconcileError::UnknownBoard(name.to_string()))?;
        let pcb = board.pcb_file(&self.root);
        if !self.store.exists(&pcb) {
            return Err(ReconcileError::MissingDocument(board.pcb_path.clone()));
        }
        if self.project.root_schematic.is_empty() {
            return Err(ReconcileError::NoSchematic);
        }

        progress.step(5, "Refreshing schematic links...");
        if let Err(e) = setup_board_project(&self.root, &self.project, &board) {
            log::warn!("Schematic links for '{name}' not refreshed: {e:#}");
        }

        progress.step(10, "Scanning existing boards...");
        let placement = self.placement(!self.reconciled);

        progress.step(20, "Exporting netlist...");
        let netlist = self
            .try_export_netlist()
            .map_err(ReconcileError::NetlistExport)?;

        progress.step(30, "Parsing netlist...");
        let components = netlist.components()?;

        progress.step(40, "Loading PCB...");
        let mut doc = self
            .store
            .open(&pcb)
            .map_err(|source| ReconcileError::Document {
                path: pcb.clone(),
                source,
            })?;

        let mut part = Partition::default();
        for (reference, component) in &components {
            if component.skip() {
                part.skipped += 1;
                continue;
            }
            if let Some(at) = placement.get(reference)
                && at.board != name
            {
                if doc.footprint(reference).is_some() {
                    log::warn!("{reference} is also on '{}', leaving this copy alone", at.board);
                }
                part.elsewhere += 1;
                continue;
            }
            if doc.footprint(reference).is_some() {
                part.update.push(component);
            } else {
                part.add.push(component);
            }
        }
        log::debug!(
            "'{name}': {} to update, {} to add, {} on other boards, {} skipped",
            part.update.len(),
            part.add.len(),
            part.elsewhere,
            part.skipped
        );

        let mut summary = UpdateSummary::default();

        progress.step(50, &format!("Updating {} components...", part.update.len()));
        for component in &part.update {
            self.refresh_component(doc.as_mut(), component, &mut summary);
        }

        progress.step(70, &format!("Adding {} components...", part.add.len()));
        let mut staged = Vec::new();
        for component in &part.add {
            match self.resolver.load_fpid(&component.footprint_id) {
                Some(mut footprint) => {
                    stamp(&mut footprint, component);
                    staged.push(footprint);
                }
                None => summary
                    .failed
                    .push(format!("{}: {}", component.reference, component.footprint_id)),
            }
        }
        let positions = grid_positions(staged.len());
        for (mut footprint, (x, y)) in staged.into_iter().zip(positions) {
            footprint.set_position(x, y);
            doc.add_footprint(footprint);
            summary.added += 1;
        }

        summary.orphaned = doc
            .footprints()
            .iter()
            .map(Footprint::reference)
            .filter(|r| is_schematic_reference(r))
            .filter(|r| components.get(r).is_none_or(ComponentRecord::skip))
            .collect();
        if !summary.orphaned.is_empty() {
            log::warn!(
                "'{name}' hosts components the schematic does not place: {}",
                summary.orphaned.join(", ")
            );
        }

        progress.step(85, "Assigning nets...");
        let nets = netlist.nets()?;
        let references: BTreeSet<String> =
            doc.footprints().iter().map(Footprint::reference).collect();
        summary.nets = assign_nets(doc.as_mut(), &nets, &references);

        progress.step(95, "Saving...");
        doc.save().map_err(|source| ReconcileError::Document {
            path: pcb.clone(),
            source,
        })?;
        self.placement.invalidate();
        self.reconciled = true;

        progress.step(100, "Done");
        log::info!(
            "Updated '{name}': {} added, {} updated, {} replaced, {} failed",
            summary.added,
            summary.updated,
            summary.replaced,
            summary.failed.len()
        );
        Ok(summary)
    }

    /// Bring a component that is already on the board up to date, swapping
    /// its footprint if the schematic now names a different one.
    fn refresh_component(
        &mut self,
        doc: &mut dyn BoardDocument,
        component: &ComponentRecord,
        summary: &mut UpdateSummary,
    ) {
        let reference = component.reference.as_str();
        let Some(current) = doc.footprint(reference).map(|fp| fp.fpid().to_string()) else {
            return;
        };

        if current != component.footprint_id {
            let replacement = self.resolver.load_fpid(&component.footprint_id);
            if let Some(mut footprint) = replacement
                && let Some(old) = doc.remove_footprint(reference)
            {
                let (x, y) = old.position();
                footprint.set_position(x, y);
                footprint.set_rotation(old.rotation());
                footprint.set_layer(&old.layer());
                let uuid = old.uuid();
                if !uuid.is_empty() {
                    footprint.set_uuid(&uuid);
                }
                stamp(&mut footprint, component);
                log::debug!(
                    "{reference}: {} -> {}",
                    old.fpid(),
                    component.footprint_id
                );
                doc.add_footprint(footprint);
                summary.replaced += 1;
                return;
            }
            log::warn!(
                "{reference}: cannot load {}, keeping {}",
                component.footprint_id,
                current
            );
            if let Some(footprint) = doc.footprint_mut(reference) {
                footprint.set_value(&component.value);
            }
            summary.updated += 1;
            return;
        }

        if let Some(footprint) = doc.footprint_mut(reference) {
            footprint.set_value(&component.value);
            footprint.set_path(&component.path_id);
        }
        summary.updated += 1;
    }
}

/// Reference, value and schematic link from the netlist.
fn stamp(footprint: &mut Footprint, component: &ComponentRecord) {
    footprint.set_reference(&component.reference);
    footprint.set_value(&component.value);
    footprint.set_path(&component.path_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_columns_bounds() {
        assert_eq!(grid_columns(0), 1);
        assert_eq!(grid_columns(1), 2);
        assert_eq!(grid_columns(4), 3);
        assert_eq!(grid_columns(5), 4);
        assert_eq!(grid_columns(81), 10);
        assert_eq!(grid_columns(10_000), PACK_MAX_PER_ROW);
        for n in 0..500 {
            let cols = grid_columns(n);
            assert!((1..=PACK_MAX_PER_ROW).contains(&cols), "{n} -> {cols}");
        }
    }

    #[test]
    fn test_grid_positions() {
        let positions = grid_positions(5);
        assert_eq!(positions.len(), 5);
        assert_eq!(positions[0], PACK_ORIGIN);
        assert_eq!(positions[3], (55.0, 25.0));
        assert_eq!(positions[4], (25.0, 35.0));
    }

    #[test]
    fn test_summary_lists_first_failures() {
        let summary = UpdateSummary {
            added: 1,
            updated: 2,
            failed: (1..=12).map(|i| format!("R{i}: Lib:Missing")).collect(),
            ..Default::default()
        };
        let text = summary.to_string();
        assert!(text.starts_with("Added: 1\nUpdated: 2\nFailed: 12\n\nFailed footprints:\nR1:"));
        assert!(text.contains("R10: Lib:Missing"));
        assert!(!text.contains("R11"));
        assert!(!text.contains("Replaced"));
    }
}
