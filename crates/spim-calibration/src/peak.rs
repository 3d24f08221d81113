//! Sub-pixel bead localisation.
//!
//! [`GaussianPeakFitter`] fits a symmetric 2D Gaussian on a constant
//! background,
//!
//! ```text
//! f(x, y) = A · exp(-((x - x0)² + (y - y0)²) / 2σ²) + b
//! ```
//!
//! with the `levenberg_marquardt` solver, seeded from the border median
//! (background) and the intensity moments of the brightest pixels (centre,
//! width). Pixel `(col, row)` is sampled at coordinate `(col, row)`.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{storage::Owned, DVector, Dyn, OMatrix, SVector, U5};
use spim_core::data::Frame;
use std::f64::consts::PI;

type Params = SVector<f64, 5>;

const AMPLITUDE: usize = 0;
const X0: usize = 1;
const Y0: usize = 2;
const SIGMA: usize = 3;
const BACKGROUND: usize = 4;

/// Result of fitting one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakFit {
    /// Centre column in frame pixels
    pub xc: f64,
    /// Centre row in frame pixels
    pub yc: f64,
    /// Peak height above background
    pub amplitude: f64,
    /// Gaussian width in pixels
    pub sigma: f64,
    /// Integrated intensity above background, `A·2πσ²`
    pub intensity: f64,
    /// Background level
    pub background: f64,
}

impl PeakFit {
    /// A fit that found nothing above `background`.
    pub fn empty(width: u32, height: u32, background: f64) -> Self {
        Self {
            xc: f64::from(width) / 2.0,
            yc: f64::from(height) / 2.0,
            amplitude: 0.0,
            sigma: 0.0,
            intensity: 0.0,
            background,
        }
    }

    /// Intensity-to-background ratio; 0 when the background is not positive.
    pub fn intensity_ratio(&self) -> f64 {
        if self.background > 0.0 {
            self.intensity / self.background
        } else {
            0.0
        }
    }

    /// Whether the centre lies within a `width` × `height` frame.
    pub fn is_inside(&self, width: u32, height: u32) -> bool {
        self.xc >= 0.0 && self.yc >= 0.0 && self.xc < f64::from(width) && self.yc < f64::from(height)
    }
}

/// Localises a single bright spot in a frame.
pub trait PeakFitter: Send + Sync {
    /// Fit the spot in `frame`. Never fails; a frame without a spot yields
    /// zero intensity.
    fn fit(&self, frame: &Frame) -> PeakFit;
}

/// Levenberg-Marquardt Gaussian fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianPeakFitter {
    /// Solver patience; evaluations are capped at `patience * 6`
    pub patience: usize,
    /// Relative cost and step tolerance
    pub tolerance: f64,
    /// Fraction of the peak a pixel must reach to seed the moments
    pub seed_fraction: f64,
}

impl Default for GaussianPeakFitter {
    fn default() -> Self {
        Self {
            patience: 100,
            tolerance: 1e-10,
            seed_fraction: 0.2,
        }
    }
}

impl PeakFitter for GaussianPeakFitter {
    fn fit(&self, frame: &Frame) -> PeakFit {
        let (width, height) = (frame.width, frame.height);
        let pixels = frame.pixels.as_f64();
        if width < 3 || height < 3 || pixels.len() != frame.pixel_count() {
            return PeakFit::empty(width, height, 0.0);
        }

        let background = border_median(&pixels, width as usize, height as usize);
        let Some(seed) = self.seed(&pixels, width as usize, background) else {
            tracing::trace!(background, "No peak above background");
            return PeakFit::empty(width, height, background);
        };

        let problem = GaussianSpot {
            pixels: &pixels,
            width: width as usize,
            params: seed,
        };
        let (problem, report) = LevenbergMarquardt::new()
            .with_ftol(self.tolerance)
            .with_xtol(self.tolerance)
            .with_patience(self.patience.max(1))
            .minimize(problem);
        let params = problem.params;
        tracing::trace!(
            termination = ?report.termination,
            evaluations = report.number_of_evaluations,
            cost = report.objective_function,
            "Gaussian fit finished"
        );

        let sigma = params[SIGMA].abs();
        let plausible = params.iter().all(|p| p.is_finite())
            && params[AMPLITUDE] > 0.0
            && sigma > 0.0
            && sigma < f64::from(width.max(height));
        if !plausible {
            tracing::debug!(?params, termination = ?report.termination, "Gaussian fit diverged");
            return PeakFit::empty(width, height, background);
        }

        PeakFit {
            xc: params[X0],
            yc: params[Y0],
            amplitude: params[AMPLITUDE],
            sigma,
            intensity: params[AMPLITUDE] * 2.0 * PI * sigma * sigma,
            background: params[BACKGROUND],
        }
    }
}

impl GaussianPeakFitter {
    fn seed(&self, pixels: &[f64], width: usize, background: f64) -> Option<Params> {
        let peak = pixels
            .iter()
            .map(|v| v - background)
            .fold(f64::NEG_INFINITY, f64::max);
        if peak.is_nan() || peak <= 1e-9 * background.abs().max(1.0) {
            return None;
        }

        let threshold = peak * self.seed_fraction;
        let (mut total, mut sx, mut sy) = (0.0, 0.0, 0.0);
        for (i, value) in pixels.iter().enumerate() {
            let signal = value - background;
            if signal >= threshold {
                let (x, y) = ((i % width) as f64, (i / width) as f64);
                total += signal;
                sx += signal * x;
                sy += signal * y;
            }
        }
        let (cx, cy) = (sx / total, sy / total);

        // Flux / peak = 2πσ² for a Gaussian.
        let flux: f64 = pixels.iter().map(|v| (v - background).max(0.0)).sum();
        let sigma = (flux / (2.0 * PI * peak)).sqrt().clamp(0.5, width as f64);

        Some(Params::new(peak, cx, cy, sigma, background))
    }
}

/// Gaussian-on-background model over every pixel of a frame.
struct GaussianSpot<'a> {
    pixels: &'a [f64],
    width: usize,
    params: Params,
}

impl GaussianSpot<'_> {
    /// Offset of pixel `i` from the centre, its squared distance and the
    /// unscaled Gaussian value there.
    fn sample(&self, i: usize) -> (f64, f64, f64, f64) {
        let dx = (i % self.width) as f64 - self.params[X0];
        let dy = (i / self.width) as f64 - self.params[Y0];
        let d2 = dx * dx + dy * dy;
        let two_sigma_sq = (2.0 * self.params[SIGMA] * self.params[SIGMA]).max(1e-12);
        (dx, dy, d2, (-d2 / two_sigma_sq).exp())
    }
}

impl LeastSquaresProblem<f64, Dyn, U5> for GaussianSpot<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, U5>;
    type ParameterStorage = Owned<f64, U5>;

    fn set_params(&mut self, x: &Params) {
        self.params.copy_from(x);
    }

    fn params(&self) -> Params {
        self.params
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let (a, b) = (self.params[AMPLITUDE], self.params[BACKGROUND]);
        Some(DVector::from_iterator(
            self.pixels.len(),
            self.pixels.iter().enumerate().map(|(i, value)| {
                let (_, _, _, e) = self.sample(i);
                a * e + b - value
            }),
        ))
    }

    fn jacobian(&self) -> Option<OMatrix<f64, Dyn, U5>> {
        let (a, s) = (self.params[AMPLITUDE], self.params[SIGMA]);
        let s2 = (s * s).max(1e-12);
        let mut jacobian = OMatrix::<f64, Dyn, U5>::zeros(self.pixels.len());
        for i in 0..self.pixels.len() {
            let (dx, dy, d2, e) = self.sample(i);
            let row = Params::new(e, a * e * dx / s2, a * e * dy / s2, a * e * d2 / (s2 * s), 1.0);
            jacobian.set_row(i, &row.transpose());
        }
        Some(jacobian)
    }
}

fn border_median(pixels: &[f64], width: usize, height: usize) -> f64 {
    let mut border: Vec<f64> = Vec::with_capacity(2 * (width + height));
    for col in 0..width {
        border.push(pixels[col]);
        border.push(pixels[(height - 1) * width + col]);
    }
    for row in 1..height - 1 {
        border.push(pixels[row * width]);
        border.push(pixels[row * width + width - 1]);
    }
    border.sort_by(f64::total_cmp);
    let mid = border.len() / 2;
    if border.len() % 2 == 0 {
        (border[mid - 1] + border[mid]) / 2.0
    } else {
        border[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn gaussian(width: u32, height: u32, xc: f64, yc: f64, amplitude: f64, sigma: f64, bg: f64) -> Frame {
        let mut pixels = Vec::new();
        for row in 0..height {
            for col in 0..width {
                let (dx, dy) = (f64::from(col) - xc, f64::from(row) - yc);
                pixels.push(bg + amplitude * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp());
            }
        }
        Frame::from_f64(width, height, pixels)
    }

    #[test]
    fn recovers_sub_pixel_centre() {
        let frame = gaussian(40, 32, 17.3, 12.8, 500.0, 2.2, 80.0);
        let fit = GaussianPeakFitter::default().fit(&frame);

        assert_relative_eq!(fit.xc, 17.3, epsilon = 1e-4);
        assert_relative_eq!(fit.yc, 12.8, epsilon = 1e-4);
        assert_relative_eq!(fit.sigma, 2.2, epsilon = 1e-4);
        assert_relative_eq!(fit.background, 80.0, epsilon = 1e-3);
        assert_relative_eq!(fit.intensity, 500.0 * 2.0 * PI * 2.2 * 2.2, max_relative = 1e-4);
        assert!(fit.is_inside(40, 32));
    }

    #[test]
    fn off_centre_seed_still_converges() {
        let frame = gaussian(48, 48, 6.5, 40.25, 300.0, 1.5, 10.0);
        let fit = GaussianPeakFitter::default().fit(&frame);
        assert_relative_eq!(fit.xc, 6.5, epsilon = 1e-3);
        assert_relative_eq!(fit.yc, 40.25, epsilon = 1e-3);
    }

    #[test]
    fn analytic_jacobian_matches_finite_differences() {
        let frame = gaussian(12, 10, 5.4, 4.7, 200.0, 1.8, 30.0);
        let pixels = frame.pixels.as_f64();
        let params = Params::new(180.0, 5.0, 5.0, 2.0, 25.0);
        let spot = GaussianSpot {
            pixels: &pixels,
            width: 12,
            params,
        };
        let jacobian = spot.jacobian().unwrap();

        let h = 1e-6;
        for j in 0..5 {
            let mut shifted = spot.params;
            shifted[j] += h;
            let forward = GaussianSpot { params: shifted, ..spot }.residuals().unwrap();
            shifted[j] -= 2.0 * h;
            let backward = GaussianSpot { params: shifted, ..spot }.residuals().unwrap();
            let numeric = (forward - backward) / (2.0 * h);
            assert_relative_eq!(jacobian.column(j).into_owned(), numeric, epsilon = 1e-4);
        }
    }

    #[test]
    fn flat_frame_has_no_intensity() {
        let frame = Frame::from_f64(16, 16, vec![100.0; 256]);
        let fit = GaussianPeakFitter::default().fit(&frame);
        assert_eq!(fit.intensity, 0.0);
        assert_eq!(fit.intensity_ratio(), 0.0);
        assert_eq!(fit.background, 100.0);
    }

    #[test]
    fn faint_peak_has_low_ratio() {
        let frame = gaussian(32, 32, 16.0, 16.0, 0.01, 2.0, 100.0);
        let fit = GaussianPeakFitter::default().fit(&frame);
        assert!(fit.intensity_ratio() < 0.05, "{}", fit.intensity_ratio());
    }

    #[test]
    fn tiny_frames_are_rejected() {
        let frame = Frame::from_f64(2, 2, vec![1.0, 5.0, 1.0, 1.0]);
        assert_eq!(GaussianPeakFitter::default().fit(&frame).intensity, 0.0);
    }

    #[test]
    fn integer_frames_are_fitted() {
        let source = gaussian(24, 24, 11.0, 12.0, 4000.0, 2.0, 200.0);
        let pixels = source
            .pixels
            .as_f64()
            .iter()
            .map(|v| v.round() as u16)
            .collect();
        let fit = GaussianPeakFitter::default().fit(&Frame::from_u16(24, 24, pixels));
        assert_relative_eq!(fit.xc, 11.0, epsilon = 1e-2);
        assert_relative_eq!(fit.yc, 12.0, epsilon = 1e-2);
    }
}
