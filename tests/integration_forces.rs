#![allow(clippy::unwrap_used)]

//! Integration tests: bonded forces on molecules split across ranks.
//!
//! Each distributed force pass is compared with a serial evaluation of the
//! same molecules with every member local.

use std::collections::HashMap;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dpd_sync::config::ForceParams;
use dpd_sync::{
    Domain, ForceContext, ForceLedger, LocalNetwork, LocalTransport, Molecule, Partition, SimBox,
    SyncConfig, load_config, molecule_forces,
};

type Node = Domain<LocalTransport>;

/// One bond of rest length 0.5 whose head is member 0.
const DIMER: &str = r#"
[[bead_types]]
name = "A"
radius = 0.5

[[molecule_types]]
name = "Dimer"
bead_types = [0, 0]
bonds = [{ head = 0, tail = 1, k = 128.0, l0 = 0.5 }]
"#;

fn ranks(count: usize, simbox: SimBox, config: &SyncConfig) -> Vec<Node> {
    let partition = Partition::slabs(count, simbox).unwrap();
    LocalNetwork::new(count)
        .into_iter()
        .map(|t| Domain::new(t, partition.clone(), config.clone()).unwrap())
        .collect()
}

fn collective<R, F>(domains: &mut [Node], step: F) -> Vec<R>
where
    R: Send,
    F: Fn(&mut Node) -> R + Sync,
{
    let step = &step;
    thread::scope(|s| {
        let handles: Vec<_> = domains.iter_mut().map(|d| s.spawn(move || step(d))).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// Migrate, refresh ghosts and evaluate bonded forces on every rank.
fn force_step(domains: &mut [Node]) -> Vec<ForceLedger> {
    collective(domains, |d| {
        let departures = d.plan_departures();
        d.migrate(&departures).unwrap();
        let ghosts = d.exchange_ghosts().unwrap();
        assert!(ghosts.stale.is_empty(), "rank {} has stale ghosts", d.rank());
        d.bonded_forces().unwrap()
    })
}

/// Bead id to (holding rank, force).
fn gather(domains: &[Node]) -> HashMap<i64, (usize, [f64; 3])> {
    let mut out = HashMap::new();
    for d in domains {
        for b in d.registry().beads() {
            assert!(out.insert(b.id, (d.rank(), b.force)).is_none());
        }
    }
    out
}

fn close(got: [f64; 3], expected: [f64; 3], tol: f64) -> bool {
    let scale = expected.iter().map(|x| x.abs()).fold(1.0, f64::max);
    (0..3).all(|a| (got[a] - expected[a]).abs() <= tol * scale)
}

#[test]
fn stretched_bond_split_across_a_boundary() {
    let config = load_config(Some(DIMER)).unwrap();
    // Two slabs meeting at x = 10.5.
    let simbox = SimBox::new([21.0, 10.0, 10.0], [true; 3]);
    let positions = [[10.0, 5.0, 5.0], [10.6, 5.0, 5.0]];

    let mut serial = ranks(1, simbox, &config);
    serial[0].spawn_molecule(1, 0, 0, &positions).unwrap();
    let ledger = serial[0].bonded_forces().unwrap();
    assert!(ledger.is_empty());
    let reg = serial[0].registry();
    let (on_head, on_tail) = (reg.bead(0).unwrap().force, reg.bead(1).unwrap().force);
    assert!(close(on_head, [12.8, 0.0, 0.0], 1e-12));
    assert!(close(on_tail, [-12.8, 0.0, 0.0], 1e-12));

    let mut domains = ranks(2, simbox, &config);
    domains[0].spawn_molecule(1, 0, 0, &positions).unwrap();
    let ledgers = force_step(&mut domains);

    assert_eq!(domains[0].registry().bead_ids(), vec![0]);
    assert_eq!(domains[1].registry().bead_ids(), vec![1]);
    let head = domains[0].registry().bead(0).unwrap().force;
    let tail = domains[1].registry().bead(1).unwrap().force;
    assert!(close(head, on_head, 1e-12));
    assert!(close(tail, on_tail, 1e-12));
    assert!(close([head[0] + tail[0], head[1] + tail[1], head[2] + tail[2]], [0.0; 3], 1e-12));

    // Each side reports the share it computed for the other's bead.
    assert!(close(ledgers[0].for_rank(1).unwrap()[&1], on_tail, 1e-12));
    assert!(close(ledgers[1].for_rank(0).unwrap()[&0], on_head, 1e-12));
}

#[test]
fn random_split_lipids_match_serial_forces() {
    let config = load_config(None).unwrap();
    let simbox = SimBox::new([24.0, 8.0, 8.0], [true; 3]);
    let mut domains = ranks(3, simbox, &config);
    let partition = domains[0].partition().clone();
    let shape = config.shape(1).unwrap().clone();
    let mut rng = StdRng::seed_from_u64(2024);

    let mut chains: Vec<(i64, Vec<[f64; 3]>)> = Vec::new();
    for m in 0..30i64 {
        let mut p = [
            rng.gen_range(0.0..24.0),
            rng.gen_range(0.0..8.0),
            rng.gen_range(0.0..8.0),
        ];
        let mut chain = vec![p];
        for _ in 1..shape.bead_count() {
            // Mostly along x, so that many chains straddle a slab boundary.
            let step = [
                rng.gen_range(0.4..0.7),
                rng.gen_range(-0.2..0.2),
                rng.gen_range(-0.2..0.2),
            ];
            p = [p[0] + step[0], p[1] + step[1], p[2] + step[2]];
            chain.push(p);
        }
        let owner = partition.owner_of(chain[0]);
        domains[owner].spawn_molecule(m, 1, 5 * m, &chain).unwrap();
        chains.push((m, chain));
    }

    let ledgers = force_step(&mut domains);
    let split = domains.iter().map(|d| d.border().len()).sum::<usize>();
    assert!(split > 0, "no molecule straddles a boundary");

    let held = gather(&domains);
    assert_eq!(held.len(), 150);

    let params = ForceParams::default();
    let ctx = ForceContext {
        simbox: &simbox,
        params: &params,
        rank: 0,
    };
    let mut net = [0.0; 3];
    for (m, chain) in &chains {
        let mut molecule = Molecule::empty(0);
        shape.fill(&mut molecule, *m, 1, 5 * m, 5 * m, 5 * m);
        let wrapped: Vec<_> = chain.iter().map(|&p| simbox.wrap(p)).collect();
        let reference = molecule_forces(&molecule, &wrapped, &ctx).unwrap();
        for (id, expected) in molecule.beads.iter().zip(reference) {
            let (rank, got) = held[id];
            assert!(
                close(got, expected, 1e-9),
                "bead {id} on rank {rank}: {got:?} != {expected:?}"
            );
            for a in 0..3 {
                net[a] += got[a];
            }
        }
    }
    assert!(close(net, [0.0; 3], 1e-9), "bonded forces do not cancel: {net:?}");

    // Shares are only ever addressed to the rank holding the bead.
    for (from, ledger) in ledgers.iter().enumerate() {
        for to in ledger.ranks() {
            assert_ne!(to, from);
            for bead in ledger.for_rank(to).unwrap().keys() {
                assert_eq!(held[bead].0, to, "rank {from} routed bead {bead} to rank {to}");
            }
        }
    }
}

#[test]
fn forces_stay_serial_while_molecules_drift() {
    let config = load_config(None).unwrap();
    let simbox = SimBox::new([16.0, 8.0, 8.0], [true; 3]);
    let mut domains = ranks(2, simbox, &config);
    let shape = config.shape(1).unwrap().clone();

    // Two chains bent at different angles, both straddling x = 8.
    let chains: Vec<(i64, Vec<[f64; 3]>)> = vec![
        (
            0,
            vec![
                [6.9, 2.0, 2.0],
                [7.4, 2.1, 2.0],
                [7.9, 2.0, 2.2],
                [8.4, 2.3, 2.1],
                [8.9, 2.2, 2.0],
            ],
        ),
        (
            1,
            vec![
                [7.2, 5.0, 5.0],
                [7.7, 5.3, 5.0],
                [8.1, 5.0, 5.3],
                [8.6, 5.2, 5.6],
                [9.2, 5.1, 5.5],
            ],
        ),
    ];
    for (m, chain) in &chains {
        domains[0].spawn_molecule(*m, 1, 5 * m, chain).unwrap();
    }

    let params = ForceParams::default();
    let ctx = ForceContext {
        simbox: &simbox,
        params: &params,
        rank: 0,
    };
    let shift = 0.3;
    for step in 0..8 {
        let offset = shift * step as f64;
        if step > 0 {
            collective(&mut domains, |d| {
                for bead in d.registry_mut().beads_mut() {
                    let p = bead.position;
                    bead.position = simbox.wrap([p[0] + shift, p[1], p[2]]);
                }
            });
        }
        force_step(&mut domains);
        let held = gather(&domains);

        for (m, chain) in &chains {
            let mut molecule = Molecule::empty(0);
            shape.fill(&mut molecule, *m, 1, 5 * m, 5 * m, 5 * m);
            let positions: Vec<_> = chain
                .iter()
                .map(|p| simbox.wrap([p[0] + offset, p[1], p[2]]))
                .collect();
            let reference = molecule_forces(&molecule, &positions, &ctx).unwrap();
            for (id, expected) in molecule.beads.iter().zip(reference) {
                let (rank, got) = held[id];
                assert!(
                    close(got, expected, 1e-9),
                    "step {step}, bead {id} on rank {rank}: {got:?} != {expected:?}"
                );
            }
        }
    }
    // After 2.1 units of drift both chains sit on rank 1 and are whole again.
    assert!(domains.iter().all(|d| d.border().is_empty()));
    assert_eq!(domains[1].registry().bead_count(), 10);
}
