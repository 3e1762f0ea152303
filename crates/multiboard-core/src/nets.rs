//! Net propagation from the schematic onto one board.

use crate::board::BoardDocument;
use crate::netlist::NetRecord;
use std::collections::BTreeSet;

/// Counters from one [`assign_nets`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NetAssignment {
    /// Nets the board did not have yet
    pub created: usize,
    pub pads: usize,
    /// Nodes whose component is on the board but has no such pad
    pub missing_pads: usize,
}

/// Connect pads to their schematic nets. Every named net is made to exist on
/// the board, but only pads of components in `references` are touched; nodes
/// for any other reference are ignored.
pub fn assign_nets(
    doc: &mut dyn BoardDocument,
    nets: &[NetRecord],
    references: &BTreeSet<String>,
) -> NetAssignment {
    let mut stats = NetAssignment::default();

    for record in nets {
        if record.name.is_empty() {
            continue;
        }
        if doc.net(&record.name).is_none() {
            stats.created += 1;
        }
        let net = doc.ensure_net(&record.name);

        for (reference, pin) in &record.nodes {
            if !references.contains(reference) {
                continue;
            }
            let Some(footprint) = doc.footprint_mut(reference) else {
                continue;
            };
            match footprint.set_pad_net(pin, &net) {
                0 => {
                    log::debug!("{reference} has no pad {pin} for net {}", record.name);
                    stats.missing_pads += 1;
                }
                n => stats.pads += n,
            }
        }
    }

    log::debug!(
        "Assigned {} pads ({} new nets, {} missing pads)",
        stats.pads,
        stats.created,
        stats.missing_pads
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BoardStore, MemoryBoardStore, Net};
    use crate::board::memory::MemoryBoard;
    use crate::footprint::Footprint;
    use std::path::Path;

    fn resistor(reference: &str) -> Footprint {
        let mut fp = Footprint::parse(
            r#"(footprint "R:R" (pad "1" smd rect (at 0 0)) (pad "2" smd rect (at 1 0)))"#,
        )
        .unwrap();
        fp.set_reference(reference);
        fp
    }

    #[test]
    fn test_assign_nets() {
        let store = MemoryBoardStore::new();
        store.insert(
            "b.kicad_pcb",
            MemoryBoard {
                footprints: vec![resistor("R1"), resistor("R2")],
                nets: vec![Net::new(0, ""), Net::new(1, "GND")],
            },
        );
        let mut doc = store.open(Path::new("b.kicad_pcb")).unwrap();

        let nets = vec![
            NetRecord {
                name: "GND".into(),
                nodes: vec![("R1".into(), "2".into()), ("R2".into(), "2".into())],
            },
            NetRecord {
                name: "/VIN".into(),
                nodes: vec![("R1".into(), "1".into()), ("U9".into(), "1".into())],
            },
            NetRecord {
                name: "/NC".into(),
                nodes: vec![("R1".into(), "7".into())],
            },
            NetRecord {
                name: "/OTHER".into(),
                nodes: vec![("R3".into(), "1".into())],
            },
        ];
        let refs = BTreeSet::from(["R1".to_string(), "R2".to_string()]);
        let stats = assign_nets(doc.as_mut(), &nets, &refs);

        assert_eq!(
            stats,
            NetAssignment {
                created: 3,
                pads: 3,
                missing_pads: 1
            }
        );
        // Nets with no pads here still exist on the board.
        assert!(doc.net("/OTHER").is_some());
        let r1 = doc.footprint("R1").unwrap().pads();
        assert_eq!(r1[0], ("1".to_string(), "/VIN".to_string()));
        assert_eq!(r1[1], ("2".to_string(), "GND".to_string()));
    }
}
