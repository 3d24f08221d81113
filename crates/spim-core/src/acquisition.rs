//! Cross-axis acquisition geometry.
//!
//! An [`AcquisitionRow`] binds an [`AxisRangeSpec`] to each participating
//! logical axis. The combined XY role is never stored: descriptors given for
//! [`LogicalAxis::Xy`] are split into X and Y and recombined for display.

use crate::axis::{AxisMap, LogicalAxis};
use crate::error::SpimError;
use crate::limits::MAX_SCHEDULE_POINTS;
use crate::range::AxisRangeSpec;
use nalgebra::Vector3;

/// Visiting order used by [`AcquisitionRow::schedule`], outermost first.
const SCHEDULE_ORDER: [LogicalAxis; 9] = [
    LogicalAxis::Theta,
    LogicalAxis::X,
    LogicalAxis::Y,
    LogicalAxis::Laser1,
    LogicalAxis::Laser2,
    LogicalAxis::Camera1,
    LogicalAxis::Camera2,
    LogicalAxis::Synchronizer,
    LogicalAxis::Z,
];

/// Scan ranges for every axis taking part in one acquisition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionRow {
    ranges: AxisMap<AxisRangeSpec>,
}

impl AcquisitionRow {
    /// Empty row (depth 1).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from parallel lists of axes and descriptors.
    pub fn from_descriptors(axes: &[LogicalAxis], descriptors: &[&str]) -> Result<Self, SpimError> {
        if axes.len() != descriptors.len() {
            return Err(SpimError::parse(
                descriptors.join(" "),
                format!(
                    "{} axes but {} descriptors",
                    axes.len(),
                    descriptors.len()
                ),
            ));
        }
        let mut row = Self::new();
        for (&axis, descriptor) in axes.iter().zip(descriptors) {
            row.set_value_set(axis, Some(descriptor))?;
        }
        Ok(row)
    }

    /// Set or clear the range of `axis` from a descriptor.
    ///
    /// For [`LogicalAxis::Xy`] the descriptor is `"<x>, <y>"`; clearing XY
    /// clears both X and Y. The row is unchanged when parsing fails.
    pub fn set_value_set(&mut self, axis: LogicalAxis, descriptor: Option<&str>) -> Result<(), SpimError> {
        let Some(descriptor) = descriptor else {
            self.clear(axis);
            return Ok(());
        };

        if axis == LogicalAxis::Xy {
            let Some((x, y)) = descriptor.split_once(',') else {
                return Err(SpimError::parse(descriptor, "XY descriptor needs \"<x>, <y>\""));
            };
            let x = AxisRangeSpec::parse(x)?;
            let y = AxisRangeSpec::parse(y)?;
            self.ranges.insert(LogicalAxis::X, x);
            self.ranges.insert(LogicalAxis::Y, y);
        } else {
            self.ranges.insert(axis, AxisRangeSpec::parse(descriptor)?);
        }
        Ok(())
    }

    /// Set the range of `axis` directly. XY sets both X and Y.
    pub fn insert_range(&mut self, axis: LogicalAxis, range: AxisRangeSpec) {
        if axis == LogicalAxis::Xy {
            self.ranges.insert(LogicalAxis::X, range);
            self.ranges.insert(LogicalAxis::Y, range);
        } else {
            self.ranges.insert(axis, range);
        }
    }

    /// Remove the range of `axis`. XY removes X and Y.
    pub fn clear(&mut self, axis: LogicalAxis) {
        if axis == LogicalAxis::Xy {
            self.ranges.remove(LogicalAxis::X);
            self.ranges.remove(LogicalAxis::Y);
        } else {
            self.ranges.remove(axis);
        }
    }

    /// Stored range of `axis`. Always `None` for XY.
    pub fn value_set(&self, axis: LogicalAxis) -> Option<&AxisRangeSpec> {
        self.ranges.get(axis)
    }

    /// Descriptor text for `axis`; XY renders as `"<x>, <y>"`.
    pub fn describe(&self, axis: LogicalAxis) -> Option<String> {
        if axis == LogicalAxis::Xy {
            let x = self.ranges.get(LogicalAxis::X)?;
            let y = self.ranges.get(LogicalAxis::Y)?;
            return Some(format!("{x}, {y}"));
        }
        self.ranges.get(axis).map(ToString::to_string)
    }

    /// Axes with a range, in role order.
    pub fn axes(&self) -> impl Iterator<Item = LogicalAxis> + '_ {
        self.ranges.keys()
    }

    /// Number of positions visited: the product of all step counts.
    ///
    /// A continuous sweep happens within a single position and counts 1.
    /// Saturates at `usize::MAX`.
    pub fn depth(&self) -> usize {
        self.ranges.values().fold(1usize, |depth, range| {
            let steps = if range.is_continuous() {
                1
            } else {
                usize::try_from(range.step_count().max(0)).unwrap_or(usize::MAX)
            };
            depth.saturating_mul(steps)
        })
    }

    /// Shift the X, Y and Z ranges by `offset`. Theta is never translated.
    pub fn translate(&mut self, offset: &Vector3<f64>) {
        let shifts = [
            (LogicalAxis::X, offset.x),
            (LogicalAxis::Y, offset.y),
            (LogicalAxis::Z, offset.z),
        ];
        for (axis, delta) in shifts {
            if let Some(range) = self.ranges.get_mut(axis) {
                range.translate(delta);
            }
        }
    }

    /// Start position of X.
    pub fn x(&self) -> Option<f64> {
        self.start_of(LogicalAxis::X)
    }

    /// Start position of Y.
    pub fn y(&self) -> Option<f64> {
        self.start_of(LogicalAxis::Y)
    }

    /// Start position of Theta.
    pub fn theta(&self) -> Option<f64> {
        self.start_of(LogicalAxis::Theta)
    }

    /// Start of the Z range.
    pub fn z_start(&self) -> Option<f64> {
        self.start_of(LogicalAxis::Z)
    }

    /// End of the Z range.
    pub fn z_end(&self) -> Option<f64> {
        self.ranges.get(LogicalAxis::Z).map(AxisRangeSpec::end)
    }

    /// Z step size (-1 for a continuous Z sweep).
    pub fn z_step(&self) -> Option<f64> {
        self.ranges.get(LogicalAxis::Z).map(AxisRangeSpec::step_size)
    }

    /// Z sweep speed (0 for a stepped Z range).
    pub fn z_speed(&self) -> Option<f64> {
        self.ranges.get(LogicalAxis::Z).map(AxisRangeSpec::speed)
    }

    /// Whether Z sweeps continuously.
    pub fn z_continuous(&self) -> bool {
        self.ranges
            .get(LogicalAxis::Z)
            .is_some_and(AxisRangeSpec::is_continuous)
    }

    fn start_of(&self, axis: LogicalAxis) -> Option<f64> {
        self.ranges.get(axis).map(AxisRangeSpec::start)
    }

    /// Expand the row into the ordered list of positions to visit.
    ///
    /// Theta is the outermost loop and Z the innermost, so every view gets a
    /// full Z stack. A continuous axis contributes only its start position.
    ///
    /// # Errors
    /// `PlanTooLarge` when [`depth`](Self::depth) exceeds
    /// [`MAX_SCHEDULE_POINTS`].
    pub fn schedule(&self) -> Result<Vec<AxisMap<f64>>, SpimError> {
        let depth = self.depth();
        if depth > MAX_SCHEDULE_POINTS {
            return Err(SpimError::PlanTooLarge {
                depth,
                limit: MAX_SCHEDULE_POINTS,
            });
        }

        let mut points = vec![AxisMap::new()];
        for axis in SCHEDULE_ORDER {
            let Some(range) = self.ranges.get(axis) else {
                continue;
            };
            let positions = if range.is_continuous() {
                vec![range.start()]
            } else {
                range.positions()
            };
            points = points
                .iter()
                .flat_map(|point| {
                    positions.iter().map(move |&value| {
                        let mut next = point.clone();
                        next.insert(axis, value);
                        next
                    })
                })
                .collect();
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(LogicalAxis, &str)]) -> AcquisitionRow {
        let (axes, descriptors): (Vec<_>, Vec<_>) = pairs.iter().copied().unzip();
        AcquisitionRow::from_descriptors(&axes, &descriptors).unwrap()
    }

    #[test]
    fn depth_is_product_of_step_counts() {
        let row = row(&[
            (LogicalAxis::X, "0:1:2"),
            (LogicalAxis::Y, "5"),
            (LogicalAxis::Z, "0:10:40"),
            (LogicalAxis::Theta, "0:90:90"),
        ]);
        assert_eq!(row.depth(), 30);
        assert_eq!(row.schedule().unwrap().len(), 30);
        assert_eq!(AcquisitionRow::new().depth(), 1);
    }

    #[test]
    fn continuous_axis_counts_once() {
        let row = row(&[(LogicalAxis::Theta, "0:45:90"), (LogicalAxis::Z, "0-100@25")]);
        assert!(row.z_continuous());
        assert_eq!(row.z_speed(), Some(25.0));
        assert_eq!(row.z_step(), Some(-1.0));
        assert_eq!(row.depth(), 3);
    }

    #[test]
    fn xy_is_split_and_recomposed() {
        let mut row = AcquisitionRow::new();
        row.set_value_set(LogicalAxis::Xy, Some("1:1:3, 7")).unwrap();
        assert_eq!(row.x(), Some(1.0));
        assert_eq!(row.y(), Some(7.0));
        assert!(row.value_set(LogicalAxis::Xy).is_none());
        assert_eq!(
            row.describe(LogicalAxis::Xy).as_deref(),
            Some("1.000:1.000:3.000, 7")
        );
        assert_eq!(row.axes().collect::<Vec<_>>(), vec![LogicalAxis::X, LogicalAxis::Y]);

        row.set_value_set(LogicalAxis::Xy, None).unwrap();
        assert!(row.x().is_none());
        assert!(row.y().is_none());
    }

    #[test]
    fn failed_parse_leaves_row_untouched() {
        let mut row = row(&[(LogicalAxis::X, "4")]);
        let before = row.clone();
        assert!(row.set_value_set(LogicalAxis::Xy, Some("1, bogus")).is_err());
        assert!(row.set_value_set(LogicalAxis::Xy, Some("1")).is_err());
        assert!(row.set_value_set(LogicalAxis::Z, Some("1:2")).is_err());
        assert_eq!(row, before);
    }

    #[test]
    fn mismatched_descriptor_lists_are_rejected() {
        let err = AcquisitionRow::from_descriptors(&[LogicalAxis::X], &["1", "2"]).unwrap_err();
        assert!(matches!(err, SpimError::Parse { .. }));
    }

    #[test]
    fn translate_skips_theta() {
        let mut row = row(&[
            (LogicalAxis::X, "10"),
            (LogicalAxis::Z, "0:5:20"),
            (LogicalAxis::Theta, "30"),
        ]);
        row.translate(&Vector3::new(1.0, 2.0, -5.0));
        assert_eq!(row.x(), Some(11.0));
        assert_eq!(row.y(), None);
        assert_eq!(row.z_start(), Some(-5.0));
        assert_eq!(row.z_end(), Some(15.0));
        assert_eq!(row.theta(), Some(30.0));
    }

    #[test]
    fn oversized_plan_saturates_and_refuses_to_expand() {
        let huge = AxisRangeSpec::stepped(0.0, 1e-7, 1e6);
        let mut row = AcquisitionRow::new();
        row.insert_range(LogicalAxis::Xy, huge);
        assert_eq!(row.depth(), usize::MAX);
        assert!(matches!(
            row.schedule(),
            Err(SpimError::PlanTooLarge { depth: usize::MAX, .. })
        ));

        let mut row = AcquisitionRow::new();
        row.set_value_set(LogicalAxis::X, Some("0:1:9999")).unwrap();
        row.set_value_set(LogicalAxis::Y, Some("0:1:9999")).unwrap();
        assert_eq!(row.depth(), 100_000_000);
        assert!(row.schedule().is_err());
    }

    #[test]
    fn schedule_nests_z_innermost() {
        let row = row(&[(LogicalAxis::Theta, "0:180:180"), (LogicalAxis::Z, "0:1:2")]);
        let points: Vec<(f64, f64)> = row
            .schedule()
            .unwrap()
            .iter()
            .map(|p| (p.get(LogicalAxis::Theta).copied().unwrap(), p.get(LogicalAxis::Z).copied().unwrap()))
            .collect();
        assert_eq!(
            points,
            vec![(0.0, 0.0), (0.0, 1.0), (0.0, 2.0), (180.0, 0.0), (180.0, 1.0), (180.0, 2.0)]
        );
    }
}
