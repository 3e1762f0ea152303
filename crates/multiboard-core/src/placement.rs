//! Which board hosts which component.

use crate::board::BoardStore;
use crate::config::Board;
use crate::constants::INTERNAL_REF_PREFIX;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Where a reference is placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedComponent {
    pub board: String,
    pub footprint_id: String,
}

pub type PlacementMap = BTreeMap<String, PlacedComponent>;

/// References that belong to the schematic, as opposed to power flags and
/// generated helper footprints.
pub fn is_schematic_reference(reference: &str) -> bool {
    !reference.is_empty()
        && !reference.starts_with('#')
        && !reference.starts_with(INTERNAL_REF_PREFIX)
}

/// Cached `reference -> board` map across every board of the project.
#[derive(Debug, Default)]
pub struct PlacementIndex {
    snapshot: Option<Arc<PlacementMap>>,
    /// References found on more than one board during the last scan
    duplicates: Vec<String>,
}

impl PlacementIndex {
    /// The cached snapshot, if one has been built since the last mutation.
    pub fn get(&self) -> Option<Arc<PlacementMap>> {
        self.snapshot.clone()
    }

    pub fn is_cached(&self) -> bool {
        self.snapshot.is_some()
    }

    /// One message per reference the last scan found on several boards.
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    /// Drop the snapshot. The next [`scan`](Self::scan) rebuilds it.
    pub fn invalidate(&mut self) {
        if self.snapshot.take().is_some() {
            log::debug!("Placement index invalidated");
        }
    }

    /// Return the cached snapshot, or build one by opening every board
    /// document that exists. Boards that fail to open are skipped.
    pub fn scan<'a>(
        &mut self,
        boards: impl IntoIterator<Item = &'a Board>,
        root: &Path,
        store: &dyn BoardStore,
        force: bool,
    ) -> Arc<PlacementMap> {
        if !force && let Some(snapshot) = &self.snapshot {
            return snapshot.clone();
        }

        let mut placed = PlacementMap::new();
        let mut duplicates = Vec::new();
        for board in boards {
            let path = board.pcb_file(root);
            if !store.exists(&path) {
                continue;
            }
            let doc = match store.open(&path) {
                Ok(doc) => doc,
                Err(e) => {
                    log::warn!("Skipping board '{}' while indexing: {e:#}", board.name);
                    continue;
                }
            };
            for footprint in doc.footprints() {
                let reference = footprint.reference();
                if !is_schematic_reference(&reference) {
                    continue;
                }
                if let Some(existing) = placed.get(&reference) {
                    let message = format!(
                        "{reference} is on both '{}' and '{}', indexing it on '{}'",
                        existing.board, board.name, existing.board
                    );
                    log::warn!("{message}");
                    duplicates.push(message);
                    continue;
                }
                placed.insert(
                    reference,
                    PlacedComponent {
                        board: board.name.clone(),
                        footprint_id: footprint.fpid().to_string(),
                    },
                );
            }
        }

        log::debug!("Placement index: {} components", placed.len());
        let snapshot = Arc::new(placed);
        self.snapshot = Some(snapshot.clone());
        self.duplicates = duplicates;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::memory::MemoryBoard;
    use crate::board::MemoryBoardStore;
    use crate::footprint::Footprint;

    fn fp(reference: &str, fpid: &str) -> Footprint {
        let mut fp = Footprint::parse(&format!(r#"(footprint "{fpid}")"#)).unwrap();
        fp.set_reference(reference);
        fp
    }

    fn setup() -> (MemoryBoardStore, Vec<Board>) {
        let store = MemoryBoardStore::new();
        store.insert(
            "/p/a.kicad_pcb",
            MemoryBoard {
                footprints: vec![fp("R1", "R:R"), fp("#PWR01", "P:P"), fp("MB_PORT1", "M:M")],
                ..Default::default()
            },
        );
        store.insert(
            "/p/b.kicad_pcb",
            MemoryBoard {
                footprints: vec![fp("C1", "C:C"), fp("R1", "R:Other")],
                ..Default::default()
            },
        );
        store.insert_unreadable("/p/c.kicad_pcb");
        let boards = vec![
            Board::new("A", "a.kicad_pcb"),
            Board::new("B", "b.kicad_pcb"),
            Board::new("C", "c.kicad_pcb"),
            Board::new("D", "missing.kicad_pcb"),
        ];
        (store, boards)
    }

    #[test]
    fn test_scan_filters_and_keeps_first_owner() {
        let (store, boards) = setup();
        let mut index = PlacementIndex::default();
        let placed = index.scan(&boards, Path::new("/p"), &store, false);
        assert_eq!(placed.keys().collect::<Vec<_>>(), ["C1", "R1"]);
        assert_eq!(placed["R1"].board, "A");
        assert_eq!(placed["R1"].footprint_id, "R:R");
        assert_eq!(placed["C1"].board, "B");
        assert_eq!(
            index.duplicates(),
            ["R1 is on both 'A' and 'B', indexing it on 'A'"]
        );
    }

    #[test]
    fn test_cache_and_invalidate() {
        let (store, boards) = setup();
        let mut index = PlacementIndex::default();
        let first = index.scan(&boards, Path::new("/p"), &store, false);

        store.insert("/p/a.kicad_pcb", MemoryBoard::default());
        let cached = index.scan(&boards, Path::new("/p"), &store, false);
        assert!(Arc::ptr_eq(&first, &cached));

        index.invalidate();
        assert!(!index.is_cached());
        let fresh = index.scan(&boards, Path::new("/p"), &store, false);
        assert_eq!(fresh["R1"].board, "B");
    }

    #[test]
    fn test_schematic_references() {
        assert!(is_schematic_reference("U1"));
        assert!(!is_schematic_reference(""));
        assert!(!is_schematic_reference("#FLG01"));
        assert!(!is_schematic_reference("MB_BLOCK"));
    }
}
