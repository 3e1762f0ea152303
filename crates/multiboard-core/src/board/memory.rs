use super::{BoardDocument, BoardStore, Net};
use crate::footprint::Footprint;
use anyhow::{Result, anyhow};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Contents of one in-memory board.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryBoard {
    pub footprints: Vec<Footprint>,
    pub nets: Vec<Net>,
}

impl Default for MemoryBoard {
    fn default() -> Self {
        Self {
            footprints: Vec::new(),
            nets: vec![Net::new(0, "")],
        }
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Board(MemoryBoard),
    /// Present, but fails to open.
    Unreadable,
}

/// Board store backed by a shared map. Clones share the same boards, so a
/// test can hand one clone to the engine and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryBoardStore {
    boards: Arc<Mutex<BTreeMap<PathBuf, Entry>>>,
}

impl MemoryBoardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, board: MemoryBoard) {
        self.lock().insert(path.into(), Entry::Board(board));
    }

    pub fn insert_unreadable(&self, path: impl Into<PathBuf>) {
        self.lock().insert(path.into(), Entry::Unreadable);
    }

    pub fn get(&self, path: &Path) -> Option<MemoryBoard> {
        match self.lock().get(path)? {
            Entry::Board(board) => Some(board.clone()),
            Entry::Unreadable => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Entry>> {
        // A panic while holding the lock only happens in a failing test.
        self.boards.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BoardStore for MemoryBoardStore {
    fn exists(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn BoardDocument>> {
        match self.lock().get(path) {
            Some(Entry::Board(board)) => Ok(Box::new(MemoryDocument {
                path: path.to_path_buf(),
                board: board.clone(),
                store: self.clone(),
            })),
            Some(Entry::Unreadable) => Err(anyhow!("Corrupt board file: {}", path.display())),
            None => Err(anyhow!("No such board: {}", path.display())),
        }
    }

    fn create_empty(&self, path: &Path) -> Result<()> {
        self.insert(path, MemoryBoard::default());
        Ok(())
    }
}

struct MemoryDocument {
    path: PathBuf,
    board: MemoryBoard,
    store: MemoryBoardStore,
}

impl BoardDocument for MemoryDocument {
    fn footprints(&self) -> &[Footprint] {
        &self.board.footprints
    }

    fn footprint_mut(&mut self, reference: &str) -> Option<&mut Footprint> {
        self.board
            .footprints
            .iter_mut()
            .find(|fp| fp.reference() == reference)
    }

    fn add_footprint(&mut self, footprint: Footprint) {
        self.board.footprints.push(footprint);
    }

    fn remove_footprint(&mut self, reference: &str) -> Option<Footprint> {
        let idx = self
            .board
            .footprints
            .iter()
            .position(|fp| fp.reference() == reference)?;
        Some(self.board.footprints.remove(idx))
    }

    fn net(&self, name: &str) -> Option<Net> {
        self.board.nets.iter().find(|n| n.name == name).cloned()
    }

    fn ensure_net(&mut self, name: &str) -> Net {
        if let Some(net) = self.net(name) {
            return net;
        }
        let code = self.board.nets.iter().map(|n| n.code).max().unwrap_or(0) + 1;
        let net = Net::new(code, name);
        self.board.nets.push(net.clone());
        net
    }

    fn save(&mut self) -> Result<()> {
        self.store.insert(self.path.clone(), self.board.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changes_are_visible_after_save_only() {
        let store = MemoryBoardStore::new();
        let path = Path::new("boards/A/A.kicad_pcb");
        store.create_empty(path).unwrap();

        let mut doc = store.open(path).unwrap();
        let fp = Footprint::parse(r#"(footprint "Lib:R" (property "Reference" "R1"))"#).unwrap();
        doc.add_footprint(fp);
        assert_eq!(doc.ensure_net("GND"), Net::new(1, "GND"));
        assert!(store.get(path).unwrap().footprints.is_empty());

        doc.save().unwrap();
        let saved = store.get(path).unwrap();
        assert_eq!(saved.footprints.len(), 1);
        assert_eq!(saved.nets.len(), 2);
    }

    #[test]
    fn test_unreadable_board() {
        let store = MemoryBoardStore::new();
        store.insert_unreadable("bad.kicad_pcb");
        assert!(store.exists(Path::new("bad.kicad_pcb")));
        assert!(store.open(Path::new("bad.kicad_pcb")).is_err());
    }
}
