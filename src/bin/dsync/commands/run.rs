use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use dpd_sync::{Domain, LocalNetwork, Partition, SimBox, SyncConfig};

use crate::cli::{Boundary, RunArgs};
use crate::display::{Context as DisplayContext, Progress, StepBar, print_run_setup, print_summary};
use crate::sim::{Checker, RankJob, Walk, Workload, run_rank};

const TOTAL_STEPS: u8 = 3;

/// Receive limit when neither the command line nor the file sets one, so
/// that a failed rank cannot leave its peers blocked forever.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn run_sim(args: RunArgs, ctx: DisplayContext) -> Result<()> {
    let mut progress = Progress::new(ctx.interactive, TOTAL_STEPS);

    progress.step("Loading configuration");
    let config = resolve_config(&args)?;
    let partition = resolve_partition(&args)?;
    let timeout = args
        .transfer
        .timeout_ms
        .map(Duration::from_millis)
        .or(config.transfer.receive_timeout())
        .unwrap_or(DEFAULT_TIMEOUT);
    progress.complete_step(
        "Loading configuration",
        &[
            format!("Grid {:?} over {} ranks", partition.grid(), partition.size()),
            format!(
                "{} molecules, receive limit {:.1}s",
                if config.transfer.extended_molecules {
                    "Split"
                } else {
                    "Whole"
                },
                timeout.as_secs_f64()
            ),
        ],
    );

    progress.step("Placing molecules");
    let workload = Arc::new(build_workload(&args, &config, partition.simbox())?);
    progress.complete_step(
        "Placing molecules",
        &[format!(
            "{} × '{}' ({} beads)",
            workload.seeds.len(),
            workload.shape.name,
            workload.bead_count()
        )],
    );

    if ctx.interactive {
        print_run_setup(&partition, &workload, args.workload.steps);
    }

    progress.step("Starting ranks");
    let walk = Walk {
        seed: args.workload.seed,
        drift: args.workload.drift,
        jitter: args.workload.jitter,
    };
    let (reports, snapshots) = mpsc::channel();
    let mut handles = Vec::with_capacity(partition.size());
    for transport in LocalNetwork::with_timeout(partition.size(), Some(timeout)) {
        let domain = Domain::new(transport, partition.clone(), config.clone())?;
        let rank = domain.rank();
        let job = RankJob {
            domain,
            workload: Arc::clone(&workload),
            walk,
            steps: args.workload.steps,
            reports: reports.clone(),
        };
        let handle = thread::Builder::new()
            .name(format!("rank-{rank}"))
            .spawn(move || run_rank(job))
            .with_context(|| format!("Failed to start rank {rank}"))?;
        handles.push((rank, handle));
    }
    drop(reports);
    progress.complete_step(
        "Starting ranks",
        &[format!("{} rank threads", handles.len())],
    );

    let mut checker = Checker::new(
        Arc::clone(&workload),
        *partition.simbox(),
        config.forces.clone(),
        partition.size(),
        args.transfer.tolerance,
    );
    let mut bar = StepBar::new(ctx.interactive, args.workload.steps);
    let mut check_failure = None;
    for snapshot in snapshots {
        match checker.accept(snapshot) {
            Ok(Some(step)) => bar.advance(step.moved, step.split),
            Ok(None) => {}
            Err(e) => {
                check_failure = Some(e);
                break;
            }
        }
    }
    bar.finish();

    let mut rank_failure = None;
    for (rank, handle) in handles {
        let outcome = handle
            .join()
            .map_err(|_| anyhow!("Rank {rank} panicked"))?;
        if let Err(e) = outcome {
            rank_failure.get_or_insert_with(|| anyhow!(e).context(format!("Rank {rank} failed")));
        }
    }
    if let Some(e) = check_failure {
        return Err(e.context("Distributed state diverged from the serial reference"));
    }
    if let Some(e) = rank_failure {
        return Err(e);
    }

    let totals = checker.finish();
    if totals.steps != args.workload.steps {
        bail!(
            "Only {} of {} steps were verified",
            totals.steps,
            args.workload.steps
        );
    }
    if !args.common.quiet {
        print_summary(&totals);
    }
    progress.finish();
    Ok(())
}

fn resolve_config(args: &RunArgs) -> Result<SyncConfig> {
    let mut config = super::read_config(args.common.config.as_deref())?;
    if args.transfer.whole_molecules {
        config.transfer.extended_molecules = false;
    }
    if let Some(max) = args.transfer.max_batch {
        config.transfer.max_batch = max;
    }
    config.validate().context("Invalid transfer options")?;
    Ok(config)
}

fn resolve_partition(args: &RunArgs) -> Result<Partition> {
    let d = &args.decomposition;
    let size = match d.box_size.as_slice() {
        &[x, y, z] => [x, y, z],
        _ => bail!("--box takes exactly three lengths"),
    };
    let periodic = match d.boundary {
        Boundary::Periodic => [true; 3],
        Boundary::NonPeriodic => [false; 3],
    };
    let simbox = SimBox::new(size, periodic);
    let partition = match &d.grid {
        Some(grid) => match grid.as_slice() {
            &[gx, gy, gz] => Partition::new([gx, gy, gz], simbox)?,
            _ => bail!("--grid takes exactly three counts"),
        },
        None => Partition::slabs(d.ranks, simbox)?,
    };
    if d.grid.is_some() && partition.size() != d.ranks {
        bail!(
            "Grid {:?} has {} sub-domains but {} ranks were requested",
            partition.grid(),
            partition.size(),
            d.ranks
        );
    }
    Ok(partition)
}

fn build_workload(args: &RunArgs, config: &SyncConfig, simbox: &SimBox) -> Result<Workload> {
    let w = &args.workload;
    if !(w.drift >= 0.0 && w.jitter >= 0.0) {
        bail!("--drift and --jitter must be non-negative");
    }
    let mol_type = config.mol_type_named(&w.molecule_type).ok_or_else(|| {
        anyhow!(
            "Unknown molecule type '{}' (configured: {})",
            w.molecule_type,
            config
                .molecule_types
                .iter()
                .map(|m| m.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    })?;
    let shape = config
        .shape(mol_type)
        .cloned()
        .ok_or_else(|| anyhow!("Molecule type {mol_type} has no template"))?;
    Ok(Workload::place(shape, mol_type, w.molecules, simbox, w.seed))
}
