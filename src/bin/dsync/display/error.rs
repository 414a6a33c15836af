use std::io::{self, Write};

use anyhow::Error;

use dpd_sync::{Error as SyncError, TransportError, ValidationError};

use crate::util::text::wrap;

#[rustfmt::skip]
pub fn print_error(err: &Error) {
    let mut stderr = io::stderr().lock();

    let _ = writeln!(stderr);
    let _ = writeln!(stderr, "   ╔══════════════════════════════════════════════════════════════╗");
    let _ = writeln!(stderr, "   ║  ✗ Error                                                     ║");
    let _ = writeln!(stderr, "   ╟──────────────────────────────────────────────────────────────╢");

    for line in wrap(&err.to_string(), 59) {
        let _ = writeln!(stderr, "   ║  {:<59} ║", line);
    }

    for cause in err.chain().skip(1) {
        let _ = writeln!(stderr, "   ╟──────────────────────────────────────────────────────────────╢");
        let _ = writeln!(stderr, "   ║  Caused by:                                                  ║");
        for line in wrap(&cause.to_string(), 57) {
            let _ = writeln!(stderr, "   ║    {:<57} ║", line);
        }
    }

    let hints = hints_for(err);
    if !hints.is_empty() {
        let _ = writeln!(stderr, "   ╟──────────────────────────────────────────────────────────────╢");
        let _ = writeln!(stderr, "   ║  Hints:                                                      ║");
        for hint in hints {
            let wrapped = wrap(&hint, 55);
            if let Some((first, rest)) = wrapped.split_first() {
                let _ = writeln!(stderr, "   ║    • {:<55} ║", first);
                for line in rest {
                    let _ = writeln!(stderr, "   ║      {:<55} ║", line);
                }
            }
        }
    }

    let _ = writeln!(stderr, "   ╚══════════════════════════════════════════════════════════════╝");
    let _ = writeln!(stderr);
}

fn hints_for(err: &Error) -> Vec<String> {
    if let Some(e) = err.chain().find_map(|c| c.downcast_ref::<SyncError>()) {
        return sync_hints(e);
    }
    if let Some(e) = err.chain().find_map(|c| c.downcast_ref::<io::Error>()) {
        return match e.kind() {
            io::ErrorKind::NotFound => vec![
                "Check that the configuration path is correct".to_string(),
                "Omit --config to use the embedded defaults".to_string(),
            ],
            io::ErrorKind::PermissionDenied => {
                vec!["Check file permissions with `ls -la`".to_string()]
            }
            _ => Vec::new(),
        };
    }
    let text = err.to_string().to_lowercase();
    if text.contains("diverged") {
        return vec![
            "Re-run with RUST_LOG=debug to trace batch traffic per rank".to_string(),
            "Degenerate or overstretched bonds are reported as warnings".to_string(),
        ];
    }
    Vec::new()
}

fn sync_hints(err: &SyncError) -> Vec<String> {
    let mut hints = Vec::new();
    match err {
        SyncError::ConfigParse(_) => {
            hints.push("Check the TOML syntax of the configuration file".into());
            hints.push("Run `dsync config` without --config to see the defaults".into());
        }
        SyncError::InvalidConfig(msg) => {
            hints.push(format!("Fix the reported value: {msg}"));
            hints.push("transfer.max_batch must lie between 1 and 1000".into());
        }
        SyncError::Transport { rank, source } => {
            hints.push(format!("Rank {rank} lost contact with a peer"));
            match source {
                TransportError::TimedOut { .. } => {
                    hints.push("Another rank probably failed first; look for earlier errors".into());
                    hints.push("Raise --timeout-ms for very large workloads".into());
                }
                TransportError::Disconnected { .. } => {
                    hints.push("A peer rank exited before the exchange finished".into());
                }
                TransportError::Truncated { .. } => {
                    hints.push("A batch exceeded the receive capacity of 1000 beads".into());
                }
                TransportError::InvalidRank { .. } => {
                    hints.push("The grid and the rank count disagree".into());
                }
            }
        }
        SyncError::Validation(v) => {
            hints.push("A migration batch was withheld; its beads stayed local".into());
            if let ValidationError::NegativeCoordinate { .. } = v {
                hints.push("Positions must be wrapped into the box before migrating".into());
            }
        }
        SyncError::UnknownMoleculeType(t) => {
            hints.push(format!("Molecule type {t} has no template in the configuration"));
        }
        SyncError::EmptyGhost(bead) => {
            hints.push(format!("No neighbour reported a position for bead {bead}"));
            hints.push("A split molecule may span more than one sub-domain width".into());
            hints.push("Use a coarser grid or the --whole-molecules mode".into());
        }
        SyncError::BothEndpointsRemote { .. } | SyncError::NoRemoteEndpoint { .. } => {
            hints.push("A bonded term was evaluated with the wrong endpoints".into());
        }
        SyncError::Topology { .. } | SyncError::Wire(_) => {
            hints.push("Ranks disagree about a molecule's layout".into());
            hints.push("Make sure every rank loads the same configuration".into());
        }
        _ => {}
    }
    hints
}
