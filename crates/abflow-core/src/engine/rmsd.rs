//! Post-prediction filter metrics: Cα RMSDs between a designed complex and its predicted
//! counterpart after superposition on either the antibody framework or the target.

use crate::core::models::chain::ChainRole;
use crate::core::models::loops::LoopLabel;
use crate::core::models::record::StructureRecord;
use crate::core::utils::geometry::{calculate_rmsd, superpose};
use nalgebra::Point3;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricsError {
    #[error("Residue count differs between design ({designed}) and prediction ({predicted})")]
    LengthMismatch { designed: usize, predicted: usize },
    #[error("Residue {position} has no CA atom")]
    MissingCa { position: usize },
    #[error("Superposition on the {0} failed")]
    Superposition(&'static str),
}

/// RMSD values in Angstroms. Metrics over empty residue sets are omitted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterMetrics {
    pub framework_aligned_antibody_rmsd: Option<f64>,
    pub framework_aligned_cdr_rmsd: Option<f64>,
    pub framework_aligned_loop_rmsd: BTreeMap<LoopLabel, f64>,
    pub target_aligned_antibody_rmsd: Option<f64>,
    pub target_aligned_cdr_rmsd: Option<f64>,
}

impl FilterMetrics {
    /// Flattens the metrics into `(metadata key, formatted value)` pairs.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut push = |key: String, value: Option<f64>| {
            if let Some(v) = value {
                pairs.push((key, format!("{v:.3}")));
            }
        };
        push(
            "framework_aligned_antibody_rmsd".into(),
            self.framework_aligned_antibody_rmsd,
        );
        push(
            "framework_aligned_cdr_rmsd".into(),
            self.framework_aligned_cdr_rmsd,
        );
        for (label, value) in &self.framework_aligned_loop_rmsd {
            push(format!("framework_aligned_{label}_rmsd"), Some(*value));
        }
        push(
            "target_aligned_antibody_rmsd".into(),
            self.target_aligned_antibody_rmsd,
        );
        push("target_aligned_cdr_rmsd".into(), self.target_aligned_cdr_rmsd);
        pairs
    }
}

fn ca_coordinates(record: &StructureRecord) -> Result<Vec<Point3<f64>>, MetricsError> {
    record
        .residues()
        .map(|(position, _, residue)| {
            residue
                .atom("CA")
                .map(|a| a.position)
                .ok_or(MetricsError::MissingCa { position })
        })
        .collect()
}

fn subset(coords: &[Point3<f64>], positions: &[usize]) -> Vec<Point3<f64>> {
    positions.iter().map(|&p| coords[p - 1]).collect()
}

/// RMSD over `positions` after moving `predicted` by the transform fitting `fit` positions.
fn aligned_rmsd(
    designed: &[Point3<f64>],
    predicted: &[Point3<f64>],
    fit: &[usize],
    measured: &[&[usize]],
    what: &'static str,
) -> Result<Vec<Option<f64>>, MetricsError> {
    let transform = superpose(&subset(predicted, fit), &subset(designed, fit))
        .ok_or(MetricsError::Superposition(what))?;
    let moved: Vec<Point3<f64>> = predicted.iter().map(|p| transform.apply(p)).collect();
    Ok(measured
        .iter()
        .map(|positions| calculate_rmsd(&subset(&moved, positions), &subset(designed, positions)))
        .collect())
}

/// Compares `predicted` against `designed`, using the loop annotations of `designed`.
///
/// # Errors
///
/// Fails when the two structures differ in residue count, a residue lacks a CA atom,
/// or either superposition subset is empty.
pub fn compute(
    designed: &StructureRecord,
    predicted: &StructureRecord,
) -> Result<FilterMetrics, MetricsError> {
    if designed.total_len() != predicted.total_len() {
        return Err(MetricsError::LengthMismatch {
            designed: designed.total_len(),
            predicted: predicted.total_len(),
        });
    }
    let reference = ca_coordinates(designed)?;
    let model = ca_coordinates(predicted)?;

    let loop_positions: BTreeSet<usize> = designed.all_loop_positions();
    let antibody: Vec<usize> = designed
        .residues()
        .filter(|(_, role, _)| role.is_antibody())
        .map(|(pos, _, _)| pos)
        .collect();
    let framework: Vec<usize> = antibody
        .iter()
        .copied()
        .filter(|p| !loop_positions.contains(p))
        .collect();
    let cdr: Vec<usize> = loop_positions.iter().copied().collect();
    let target = designed.positions_of(ChainRole::Target);

    let mut metrics = FilterMetrics::default();

    let mut measured: Vec<&[usize]> = vec![&antibody, &cdr];
    let loops: Vec<(LoopLabel, &[usize])> = designed
        .loops()
        .iter()
        .map(|(label, positions)| (*label, positions.as_slice()))
        .collect();
    measured.extend(loops.iter().map(|(_, positions)| *positions));
    let values = aligned_rmsd(&reference, &model, &framework, &measured, "framework")?;
    metrics.framework_aligned_antibody_rmsd = values[0];
    metrics.framework_aligned_cdr_rmsd = values[1];
    for ((label, _), value) in loops.iter().zip(&values[2..]) {
        if let Some(v) = value {
            metrics.framework_aligned_loop_rmsd.insert(*label, *v);
        }
    }

    if !target.is_empty() {
        let values = aligned_rmsd(&reference, &model, &target, &[&antibody, &cdr], "target")?;
        metrics.target_aligned_antibody_rmsd = values[0];
        metrics.target_aligned_cdr_rmsd = values[1];
    }

    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::record::tests::sample_record;
    use nalgebra::{Rotation3, Vector3};

    fn transformed(record: &StructureRecord, f: impl Fn(usize, Point3<f64>) -> Point3<f64>) -> StructureRecord {
        let mut chains = record.chains().to_vec();
        let mut position = 0;
        for chain in &mut chains {
            for residue in &mut chain.residues {
                position += 1;
                for atom in &mut residue.atoms {
                    atom.position = f(position, atom.position);
                }
            }
        }
        StructureRecord::new(record.tag(), chains, record.loops().clone()).unwrap()
    }

    #[test]
    fn rigid_motion_gives_zero_rmsd() {
        let designed = sample_record();
        let rotation = Rotation3::from_euler_angles(0.3, -0.4, 1.1);
        let shift = Vector3::new(5.0, -2.0, 9.0);
        let predicted = transformed(&designed, |_, p| rotation * p + shift);

        let metrics = compute(&designed, &predicted).unwrap();
        assert!(metrics.framework_aligned_antibody_rmsd.unwrap() < 1e-6);
        assert!(metrics.framework_aligned_cdr_rmsd.unwrap() < 1e-6);
        assert!(metrics.target_aligned_cdr_rmsd.unwrap() < 1e-6);
        assert!(metrics.framework_aligned_loop_rmsd[&LoopLabel::H3] < 1e-6);
    }

    #[test]
    fn displaced_loop_shows_only_in_loop_metrics() {
        let designed = sample_record();
        let predicted = transformed(&designed, |pos, p| {
            if (4..=6).contains(&pos) {
                p + Vector3::new(0.0, 0.0, 2.0)
            } else {
                p
            }
        });
        let metrics = compute(&designed, &predicted).unwrap();
        assert!((metrics.framework_aligned_loop_rmsd[&LoopLabel::H3] - 2.0).abs() < 1e-6);
        assert!(metrics.framework_aligned_loop_rmsd[&LoopLabel::L1] < 1e-6);
        // 3 of the 5 loop residues moved by 2 A.
        let expected_cdr = (3.0 * 4.0 / 5.0f64).sqrt();
        assert!((metrics.framework_aligned_cdr_rmsd.unwrap() - expected_cdr).abs() < 1e-6);

        let pairs = metrics.to_pairs();
        assert!(pairs.contains(&("framework_aligned_H3_rmsd".to_string(), "2.000".to_string())));
    }

    #[test]
    fn length_mismatch_is_reported() {
        let designed = sample_record();
        let mut chains = designed.chains().to_vec();
        chains[2].residues.pop();
        let predicted =
            StructureRecord::new("p", chains, designed.loops().clone()).unwrap();
        assert_eq!(
            compute(&designed, &predicted),
            Err(MetricsError::LengthMismatch {
                designed: 24,
                predicted: 23
            })
        );
    }
}
