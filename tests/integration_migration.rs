#![allow(clippy::unwrap_used)]

//! Integration tests: bead migration between ranks running on threads.
//!
//! Every collective step is driven on all ranks at once through
//! [`LocalNetwork`], the way a simulation loop would drive them.

use std::collections::{HashMap, HashSet};
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dpd_sync::{Bead, Domain, LocalNetwork, LocalTransport, Partition, SimBox, load_config};

type Node = Domain<LocalTransport>;

const TRIMER: &str = r#"
[[bead_types]]
name = "A"
radius = 0.5

[[molecule_types]]
name = "Trimer"
bead_types = [0, 0, 0]
bonds = [
    { head = 1, tail = 0, k = 128.0, l0 = 0.5 },
    { head = 2, tail = 1, k = 128.0, l0 = 0.5 },
]
bends = [{ first = 0, second = 1, modulus = 20.0 }]
"#;

fn ranks(count: usize, simbox: SimBox, toml: Option<&str>) -> Vec<Node> {
    let config = load_config(toml).unwrap();
    let partition = Partition::slabs(count, simbox).unwrap();
    LocalNetwork::new(count)
        .into_iter()
        .map(|t| Domain::new(t, partition.clone(), config.clone()).unwrap())
        .collect()
}

/// Runs `step` on every rank concurrently and collects the results in rank
/// order.
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

fn assert_pool_balanced(domains: &[Node]) {
    for d in domains {
        let (pool, reg) = (d.pool(), d.registry());
        assert_eq!(
            pool.allocated_beads(),
            reg.bead_count() + pool.free_beads(),
            "rank {} lost or duplicated bead storage",
            d.rank()
        );
        assert_eq!(
            pool.allocated_molecules(),
            reg.molecule_count() + pool.free_molecules(),
            "rank {} lost or duplicated molecule storage",
            d.rank()
        );
        let tags: HashSet<_> = reg.beads().map(|b| b.storage).collect();
        assert_eq!(tags.len(), reg.bead_count(), "rank {} shares a storage slot", d.rank());
        assert!(reg.beads().all(|b| !b.is_empty()));
    }
}

/// Every id in `0..count` is held by exactly one rank.
fn assert_single_ownership(domains: &[Node], count: i64) {
    let mut holder: HashMap<i64, usize> = HashMap::new();
    for d in domains {
        for b in d.registry().beads() {
            assert!(
                holder.insert(b.id, d.rank()).is_none(),
                "bead {} held twice",
                b.id
            );
        }
    }
    let mut ids: Vec<_> = holder.into_keys().collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..count).collect::<Vec<_>>());
}

#[test]
fn migration_out_and_back_restores_state() {
    let mut domains = ranks(2, SimBox::new([20.0, 10.0, 10.0], [true; 3]), None);
    let chain: Vec<[f64; 3]> = (0..5).map(|j| [2.0 + 0.5 * j as f64, 4.0, 6.0]).collect();
    domains[0].spawn_molecule(7, 1, 100, &chain).unwrap();
    for (j, bead) in domains[0].registry_mut().beads_mut().enumerate() {
        let s = j as f64 + 1.0;
        bead.velocity = [0.1 * s, -0.2, 0.3];
        bead.old_velocity = [0.05 * s, 0.0, -0.1];
        bead.old_force = [1.5, -2.5 * s, 0.25];
        bead.display_id = 9000 + bead.id;
        bead.visible = j % 2 == 0;
        bead.unwrapped[0] += 20.0;
    }
    let before: HashMap<i64, Bead> = domains[0]
        .registry()
        .beads()
        .map(|b| (b.id, b.clone()))
        .collect();

    let out: Vec<_> = (100..105).map(|b| (b, 1)).collect();
    let reports = collective(&mut domains, |d| {
        let departures = if d.rank() == 0 { out.clone() } else { Vec::new() };
        d.migrate(&departures).unwrap()
    });
    assert_eq!(reports[0].linear_sent, 5);
    assert_eq!(reports[1].linear_received, 5);
    assert_eq!(domains[0].registry().bead_count(), 0);
    assert_eq!(domains[1].registry().bead_count(), 5);

    let back: Vec<_> = (100..105).map(|b| (b, 0)).collect();
    collective(&mut domains, |d| {
        let departures = if d.rank() == 1 { back.clone() } else { Vec::new() };
        d.migrate(&departures).unwrap()
    });

    let reg = domains[0].registry();
    assert_eq!(reg.molecule(7).unwrap().beads, vec![100, 101, 102, 103, 104]);
    for (id, original) in &before {
        let restored = reg.bead(*id).unwrap();
        assert_eq!(
            &Bead {
                storage: original.storage,
                ..restored.clone()
            },
            original,
            "bead {id} changed on its round trip"
        );
    }
    // The returning beads refilled the slots they left behind.
    assert_eq!(domains[0].pool().allocated_beads(), 5);
    assert_eq!(domains[1].registry().bead_count(), 0);
    assert_pool_balanced(&domains);
}

#[test]
fn three_bead_batch_for_molecule_77() {
    let mut domains = ranks(2, SimBox::new([20.0, 10.0, 10.0], [true; 3]), Some(TRIMER));
    domains[0]
        .spawn_molecule(77, 0, 101, &[[4.0, 5.0, 5.0], [4.5, 5.0, 5.0], [5.0, 5.0, 5.0]])
        .unwrap();
    let sender_free = domains[0].pool().free_beads();
    let receiver_live = domains[1].registry().bead_count();

    let reports = collective(&mut domains, |d| {
        let departures = if d.rank() == 0 {
            vec![(101, 1), (102, 1), (103, 1)]
        } else {
            Vec::new()
        };
        d.migrate(&departures).unwrap()
    });

    assert_eq!(reports[0].sent(), 3);
    assert_eq!(reports[0].molecules_recycled, 1);
    assert_eq!(reports[1].received(), 3);
    let mut ids = domains[1].registry().bead_ids();
    ids.sort_unstable();
    assert_eq!(ids, vec![101, 102, 103]);
    assert!(domains[1].registry().beads().all(|b| b.molecule == 77));
    assert_eq!(domains[0].pool().free_beads(), sender_free + 3);
    assert_eq!(domains[1].registry().bead_count(), receiver_live + 3);
    assert_pool_balanced(&domains);
}

#[test]
fn split_molecule_rejoins_on_one_rank() {
    let mut domains = ranks(2, SimBox::new([20.0, 10.0, 10.0], [true; 3]), None);
    let chain: Vec<[f64; 3]> = (0..5).map(|j| [9.0 + 0.5 * j as f64, 5.0, 5.0]).collect();
    domains[0].spawn_molecule(1, 1, 0, &chain).unwrap();

    collective(&mut domains, |d| d.migrate(&d.plan_departures()).unwrap());
    assert_eq!(domains[0].registry().local_member_count(1), 2);
    assert_eq!(domains[1].registry().local_member_count(1), 3);
    assert!(domains[0].border().contains(1));
    assert!(domains[1].border().contains(1));

    // Shift the whole chain across the boundary.
    collective(&mut domains, |d| {
        let simbox = *d.simbox();
        for bead in d.registry_mut().beads_mut() {
            bead.position = simbox.wrap([bead.position[0] + 1.5, bead.position[1], bead.position[2]]);
        }
    });
    let reports = collective(&mut domains, |d| d.migrate(&d.plan_departures()).unwrap());

    assert_eq!(reports[0].planar_sent, 2);
    assert_eq!(reports[0].molecules_recycled, 1);
    assert_eq!(reports[1].became_whole, 1);
    assert!(!domains[0].registry().contains_molecule(1));
    assert!(domains[0].border().is_empty());
    assert!(domains[1].border().is_empty());
    assert_eq!(domains[1].registry().local_member_count(1), 5);
    assert_single_ownership(&domains, 5);
    assert_pool_balanced(&domains);
}

#[test]
fn pool_stays_balanced_over_many_cycles() {
    let simbox = SimBox::new([24.0, 8.0, 8.0], [true; 3]);
    let mut domains = ranks(3, simbox, None);
    let partition = domains[0].partition().clone();
    let mut rng = StdRng::seed_from_u64(7);

    let molecules = 12;
    for m in 0..molecules {
        let head = [
            rng.gen_range(0.0..24.0),
            rng.gen_range(0.0..8.0),
            rng.gen_range(0.0..8.0),
        ];
        let chain: Vec<[f64; 3]> = (0..5).map(|j| [head[0] + 0.5 * j as f64, head[1], head[2]]).collect();
        let owner = partition.owner_of(head);
        domains[owner].spawn_molecule(m, 1, 5 * m, &chain).unwrap();
    }

    let shifts: Vec<Vec<[f64; 3]>> = (0..40)
        .map(|_| {
            (0..molecules)
                .map(|_| {
                    [
                        rng.gen_range(-0.4..0.4),
                        rng.gen_range(-0.4..0.4),
                        rng.gen_range(-0.4..0.4),
                    ]
                })
                .collect()
        })
        .collect();

    let mut moved = 0;
    for step in &shifts {
        let reports = collective(&mut domains, |d| {
            let simbox = *d.simbox();
            for bead in d.registry_mut().beads_mut() {
                let s = step[bead.molecule as usize];
                let p = bead.position;
                bead.position = simbox.wrap([p[0] + s[0], p[1] + s[1], p[2] + s[2]]);
            }
            d.migrate(&d.plan_departures()).unwrap()
        });
        moved += reports.iter().map(|r| r.sent()).sum::<usize>();
        let received: usize = reports.iter().map(|r| r.received()).sum();
        assert_eq!(received, reports.iter().map(|r| r.sent()).sum::<usize>());
        assert!(reports.iter().all(|r| r.rejected.is_empty()));

        assert_single_ownership(&domains, 5 * molecules);
        assert_pool_balanced(&domains);
    }
    assert!(moved > 0, "the walk never crossed a boundary");
}
