use std::io::{self, Write};

use dpd_sync::{Partition, SyncConfig};

use crate::sim::{RunTotals, Workload};
use crate::util::text::{grouped, truncate};

const INDENT: &str = "      ";

pub fn print_run_setup(partition: &Partition, workload: &Workload, steps: usize) {
    let stderr = io::stderr();
    let mut out = stderr.lock();

    let simbox = partition.simbox();
    let boundary = if simbox.periodic.iter().all(|&p| p) {
        "periodic"
    } else {
        "closed"
    };
    let rows = vec![
        ("Ranks", grouped(partition.size())),
        (
            "Grid",
            format!(
                "{} × {} × {}",
                partition.grid()[0],
                partition.grid()[1],
                partition.grid()[2]
            ),
        ),
        (
            "Box",
            format!(
                "{:.1} × {:.1} × {:.1} ({boundary})",
                simbox.size[0], simbox.size[1], simbox.size[2]
            ),
        ),
        ("Molecules", grouped(workload.seeds.len())),
        ("Beads", grouped(workload.bead_count())),
        ("Steps", grouped(steps)),
    ];
    print_kv_table(&mut out, "Run Setup", &rows);
}

pub fn print_summary(totals: &RunTotals) {
    let stderr = io::stderr();
    let mut out = stderr.lock();

    let rows = vec![
        ("Steps verified", grouped(totals.steps)),
        ("Linear transfers", grouped(totals.linear_sent)),
        ("Planar transfers", grouped(totals.planar_sent)),
        ("Rejected (kept)", grouped(totals.rejected)),
        ("Rejoined molecules", grouped(totals.became_whole)),
        ("Peak split parts", grouped(totals.peak_split)),
        ("Remote force shares", grouped(totals.remote_shares)),
        ("Stale ghosts", grouped(totals.stale_ghosts)),
        ("Max force deviation", format!("{:.2e}", totals.max_force_error)),
    ];
    print_kv_table(&mut out, "Synchronization Summary", &rows);

    let _ = writeln!(out, "{}┌─ Final Ownership ─┐", INDENT);
    let _ = writeln!(out, "{}┌──────┬──────────┬──────────┬──────────┐", INDENT);
    let _ = writeln!(out, "{}│ Rank │    Beads │ Pool free│ Allocated│", INDENT);
    let _ = writeln!(out, "{}├──────┼──────────┼──────────┼──────────┤", INDENT);
    for r in &totals.final_ranks {
        let _ = writeln!(
            out,
            "{}│ {:>4} │ {:>8} │ {:>8} │ {:>8} │",
            INDENT,
            r.rank,
            grouped(r.beads),
            grouped(r.pool_free),
            grouped(r.pool_allocated)
        );
    }
    let _ = writeln!(out, "{}└──────┴──────────┴──────────┴──────────┘", INDENT);
}

pub fn print_templates(config: &SyncConfig) {
    let stderr = io::stderr();
    let mut out = stderr.lock();

    let rows = vec![
        ("Max batch", grouped(config.transfer.max_batch)),
        (
            "Receive limit",
            config
                .transfer
                .receive_timeout_ms
                .map_or_else(|| "none".to_string(), |ms| format!("{ms} ms")),
        ),
        (
            "Split molecules",
            if config.transfer.extended_molecules {
                "yes".to_string()
            } else {
                "no".to_string()
            },
        ),
        (
            "Bond warning",
            format!("{:.2}", config.forces.bond_length_warning),
        ),
    ];
    print_kv_table(&mut out, "Transfer", &rows);

    let _ = writeln!(out, "{}┌─ Molecule Templates ─┐", INDENT);
    let _ = writeln!(out, "{}┌──────┬──────────────┬───────┬───────┬───────┐", INDENT);
    let _ = writeln!(out, "{}│ Type │ Name         │ Beads │ Bonds │ Bends │", INDENT);
    let _ = writeln!(out, "{}├──────┼──────────────┼───────┼───────┼───────┤", INDENT);
    for (i, shape) in config.molecule_types.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}│ {:>4} │ {:<12} │ {:>5} │ {:>5} │ {:>5} │",
            INDENT,
            i,
            truncate(&shape.name, 12),
            shape.bead_count(),
            shape.bonds.len(),
            shape.bends.len()
        );
    }
    let _ = writeln!(out, "{}└──────┴──────────────┴───────┴───────┴───────┘", INDENT);
}

fn print_kv_table(out: &mut impl Write, title: &str, rows: &[(&str, String)]) {
    let key_w = rows.iter().map(|(k, _)| k.chars().count()).max().unwrap_or(0);
    let val_w = rows
        .iter()
        .map(|(_, v)| v.chars().count())
        .max()
        .unwrap_or(0);

    let _ = writeln!(out, "{}┌─ {} ─┐", INDENT, title);
    let _ = writeln!(
        out,
        "{}┌{}┬{}┐",
        INDENT,
        "─".repeat(key_w + 2),
        "─".repeat(val_w + 2)
    );
    for (key, value) in rows {
        let _ = writeln!(
            out,
            "{}│ {:<key_w$} │ {:>val_w$} │",
            INDENT,
            key,
            value,
            key_w = key_w,
            val_w = val_w
        );
    }
    let _ = writeln!(
        out,
        "{}└{}┴{}┘",
        INDENT,
        "─".repeat(key_w + 2),
        "─".repeat(val_w + 2)
    );
    let _ = writeln!(out);
}
