//! Rotation-axis geometry.
//!
//! A bead fixed to the sample traces a circle around the rotation axis. The
//! default [`PlaneCircleFitter`] recovers that circle from the recorded bead
//! positions in two steps:
//!
//! 1. Best-fit plane through the points (smallest eigenvector of their
//!    scatter matrix).
//! 2. Algebraic (Kåsa) circle fit of the points projected into that plane.

use nalgebra::{Matrix3, Point3, SymmetricEigen, Unit, Vector2, Vector3};
use spim_core::error::{AppResult, SpimError};
use spim_core::limits::MIN_CALIBRATION_POINTS;

/// Rotation axis of the sample stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationAxis {
    /// A point on the axis
    pub origin: Point3<f64>,
    /// Axis direction
    pub direction: Unit<Vector3<f64>>,
}

impl RotationAxis {
    /// Axis through `origin` along `direction`.
    pub fn new(origin: Point3<f64>, direction: Unit<Vector3<f64>>) -> Self {
        Self { origin, direction }
    }

    /// Same line, opposite direction.
    pub fn reversed(&self) -> Self {
        Self {
            origin: self.origin,
            direction: Unit::new_unchecked(-self.direction.into_inner()),
        }
    }

    /// Perpendicular distance from `point` to the axis.
    pub fn distance_to(&self, point: &Point3<f64>) -> f64 {
        let direction = self.direction.into_inner();
        let offset = point - self.origin;
        (offset - direction * offset.dot(&direction)).norm()
    }
}

/// Circle fitted through 3D points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleFit {
    /// Circle centre
    pub center: Point3<f64>,
    /// Normal of the circle's plane
    pub normal: Unit<Vector3<f64>>,
    /// Radius
    pub radius: f64,
    /// RMS radial residual of the input points
    pub rms: f64,
}

/// Fits a circle through recorded bead positions.
pub trait CircleFitter: Send + Sync {
    /// Fit `points`.
    ///
    /// # Errors
    /// - `CalibrationInsufficientData` with fewer than three points
    /// - `DegenerateFit` when the points are coincident or collinear
    fn fit(&self, points: &[Point3<f64>]) -> AppResult<CircleFit>;
}

/// Plane fit followed by an in-plane algebraic circle fit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaneCircleFitter;

impl CircleFitter for PlaneCircleFitter {
    fn fit(&self, points: &[Point3<f64>]) -> AppResult<CircleFit> {
        if points.len() < MIN_CALIBRATION_POINTS {
            return Err(SpimError::CalibrationInsufficientData {
                required: MIN_CALIBRATION_POINTS,
                available: points.len(),
            });
        }

        let plane = fit_plane(points)?;
        let projected: Vec<Vector2<f64>> = points
            .iter()
            .map(|p| {
                let offset = p - plane.centroid;
                Vector2::new(offset.dot(&plane.u), offset.dot(&plane.v))
            })
            .collect();

        let (center_2d, radius) = kasa_circle(&projected)?;
        let rms = (projected
            .iter()
            .map(|q| ((q - center_2d).norm() - radius).powi(2))
            .sum::<f64>()
            / projected.len() as f64)
            .sqrt();

        let center = plane.centroid + plane.u * center_2d.x + plane.v * center_2d.y;
        tracing::debug!(?center, radius, rms, "Circle fit");
        Ok(CircleFit {
            center,
            normal: plane.normal,
            radius,
            rms,
        })
    }
}

/// Best-fit plane with an orthonormal in-plane basis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneFit {
    /// Mean of the points
    pub centroid: Point3<f64>,
    /// Plane normal
    pub normal: Unit<Vector3<f64>>,
    /// First in-plane axis (direction of largest spread)
    pub u: Vector3<f64>,
    /// Second in-plane axis, `normal × u`
    pub v: Vector3<f64>,
}

/// Least-squares plane through `points`.
pub fn fit_plane(points: &[Point3<f64>]) -> AppResult<PlaneFit> {
    if points.is_empty() {
        return Err(SpimError::CalibrationInsufficientData {
            required: MIN_CALIBRATION_POINTS,
            available: 0,
        });
    }
    let n = points.len() as f64;
    let centroid = Point3::from(points.iter().map(|p| p.coords).sum::<Vector3<f64>>() / n);
    let scatter = points.iter().fold(Matrix3::zeros(), |acc, p| {
        let d = p - centroid;
        acc + d * d.transpose()
    });

    let eigen = SymmetricEigen::new(scatter);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
    let (smallest, middle, largest) = (order[0], order[1], order[2]);

    let spread = eigen.eigenvalues[largest];
    if spread <= f64::EPSILON || eigen.eigenvalues[middle] <= spread * 1e-12 {
        return Err(SpimError::DegenerateFit(
            "calibration points are coincident or collinear".to_string(),
        ));
    }

    let normal = Unit::new_normalize(eigen.eigenvectors.column(smallest).into_owned());
    let u = eigen.eigenvectors.column(largest).normalize();
    let v = normal.cross(&u);
    Ok(PlaneFit {
        centroid,
        normal,
        u,
        v,
    })
}

/// Kåsa fit: least squares on `x² + y² + Dx + Ey + F = 0`.
fn kasa_circle(points: &[Vector2<f64>]) -> AppResult<(Vector2<f64>, f64)> {
    let mut normal = Matrix3::zeros();
    let mut rhs = Vector3::zeros();
    for q in points {
        let row = Vector3::new(q.x, q.y, 1.0);
        normal += row * row.transpose();
        rhs -= row * q.norm_squared();
    }

    let solution = normal
        .lu()
        .solve(&rhs)
        .ok_or_else(|| SpimError::DegenerateFit("circle system is singular".to_string()))?;
    let center = Vector2::new(-solution.x / 2.0, -solution.y / 2.0);
    let radius_sq = center.norm_squared() - solution.z;
    if !(radius_sq.is_finite() && radius_sq > 0.0) {
        return Err(SpimError::DegenerateFit(format!(
            "circle fit produced invalid radius² {radius_sq}"
        )));
    }
    Ok((center, radius_sq.sqrt()))
}
