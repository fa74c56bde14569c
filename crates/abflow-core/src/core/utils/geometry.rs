use nalgebra::{Matrix3, Point3, Vector3};

/// A rigid-body transform produced by [`superpose`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Superposition {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Superposition {
    pub fn apply(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * point.coords + self.translation)
    }
}

fn centroid(points: &[Point3<f64>]) -> Vector3<f64> {
    points.iter().map(|p| p.coords).sum::<Vector3<f64>>() / points.len() as f64
}

/// Finds the proper rotation and translation that minimise the RMSD of `mobile` onto
/// `reference` (Kabsch algorithm).
///
/// Returns `None` when the slices differ in length, are empty, or the SVD fails.
pub fn superpose(mobile: &[Point3<f64>], reference: &[Point3<f64>]) -> Option<Superposition> {
    if mobile.len() != reference.len() || mobile.is_empty() {
        return None;
    }
    let mobile_center = centroid(mobile);
    let reference_center = centroid(reference);

    let covariance: Matrix3<f64> = mobile
        .iter()
        .zip(reference)
        .map(|(m, r)| (m.coords - mobile_center) * (r.coords - reference_center).transpose())
        .sum();

    let svd = covariance.svd(true, true);
    let u = svd.u?;
    let v = svd.v_t?.transpose();

    // Reflection guard.
    let d = (v * u.transpose()).determinant().signum();
    let correction = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, d));
    let rotation = v * correction * u.transpose();
    let translation = reference_center - rotation * mobile_center;

    Some(Superposition {
        rotation,
        translation,
    })
}

pub fn calculate_rmsd(coords1: &[Point3<f64>], coords2: &[Point3<f64>]) -> Option<f64> {
    if coords1.len() != coords2.len() || coords1.is_empty() {
        return None;
    }
    let n = coords1.len() as f64;
    let squared_dist_sum: f64 = coords1
        .iter()
        .zip(coords2.iter())
        .map(|(p1, p2)| (p1 - p2).norm_squared())
        .sum();
    Some((squared_dist_sum / n).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;

    fn cloud() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.5, 0.0, 0.0),
            Point3::new(1.5, 2.0, 0.0),
            Point3::new(0.0, 2.0, 3.0),
            Point3::new(-1.0, 0.5, 1.0),
        ]
    }

    #[test]
    fn calculate_rmsd_of_identical_sets_is_zero() {
        let c = cloud();
        assert_eq!(calculate_rmsd(&c, &c), Some(0.0));
        assert_eq!(calculate_rmsd(&c, &c[..2]), None);
        assert_eq!(calculate_rmsd(&[], &[]), None);
    }

    #[test]
    fn superpose_recovers_rigid_motion() {
        let reference = cloud();
        let rotation = Rotation3::from_euler_angles(0.3, -0.7, 1.1);
        let shift = Vector3::new(4.0, -2.0, 7.5);
        let mobile: Vec<_> = reference
            .iter()
            .map(|p| Point3::from(rotation * p.coords + shift))
            .collect();

        let fit = superpose(&mobile, &reference).unwrap();
        let moved: Vec<_> = mobile.iter().map(|p| fit.apply(p)).collect();
        assert!(calculate_rmsd(&moved, &reference).unwrap() < 1e-8);
        assert!((fit.rotation.determinant() - 1.0).abs() < 1e-8);
    }

    #[test]
    fn superpose_never_returns_a_reflection() {
        let reference = cloud();
        let mirrored: Vec<_> = reference
            .iter()
            .map(|p| Point3::new(-p.x, p.y, p.z))
            .collect();
        let fit = superpose(&mirrored, &reference).unwrap();
        assert!((fit.rotation.determinant() - 1.0).abs() < 1e-8);
    }
}
