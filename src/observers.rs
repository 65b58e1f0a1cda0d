// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Linear observers. Each observer reduces an image to a scalar discriminant
//! by correlating it with a template:
//!
//! discriminant = sum over pixels of template[p] * image[p]
//!
//! The templates are constructed in closed form from the declared first and
//! second order statistics of the background, noise, and target. They are
//! rebuilt on every call; nothing is cached.

use std::fmt;
use std::time::Instant;

use log::debug;
use nalgebra::DMatrix;
use ndarray::Array2;
use thiserror::Error;

use crate::image_model::{disk_mask, Image};

/// Per-pixel weighting defining a linear observer.
pub type Template = Array2<f64>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ObserverError {
    /// The covariance used for whitening is zero, negative, or not finite, or
    /// its pseudo-inverse produced unusable values.
    #[error("{observer} observer is numerically unstable: {reason}")]
    NumericalInstability { observer: &'static str, reason: String },

    #[error("Template shape {template:?} does not match image shape {image:?}")]
    ShapeMismatch { template: (usize, usize), image: (usize, usize) },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// First and second order statistics assumed for every pixel. These are
/// declared by the caller rather than measured from the images, so they can
/// deliberately differ from the distribution the images were drawn from.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TaskStatistics {
    pub background_mean: f64,
    pub background_variance: f64,
    pub noise_mean: f64,
    pub noise_variance: f64,
    pub target_mean: f64,
    pub target_variance: f64,
}

impl Default for TaskStatistics {
    fn default() -> Self {
        TaskStatistics{background_mean: 0.0,
                       background_variance: 1.0,
                       noise_mean: 0.0,
                       noise_variance: 0.01,
                       target_mean: -1.5,
                       target_variance: 0.0}
    }
}

impl TaskStatistics {
    pub fn mean_signal_absent(&self) -> f64 {
        self.background_mean + self.noise_mean
    }

    pub fn mean_signal_present(&self) -> f64 {
        self.mean_signal_absent() + self.target_mean
    }

    pub fn variance_signal_absent(&self) -> f64 {
        self.background_variance + self.noise_variance
    }

    pub fn variance_signal_present(&self) -> f64 {
        self.variance_signal_absent() + self.target_variance
    }
}

/// Prior probabilities of the signal-absent (H0) and signal-present (H1)
/// hypotheses. Only the Hotelling observer uses these.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ClassPrior {
    pub probability_h0: f64,
    pub probability_h1: f64,
}

impl Default for ClassPrior {
    fn default() -> Self {
        ClassPrior{probability_h0: 0.5, probability_h1: 0.5}
    }
}

impl ClassPrior {
    /// Prior with the given probability of signal presence.
    pub fn with_signal_probability(probability_h1: f64) -> Self {
        ClassPrior{probability_h0: 1.0 - probability_h1, probability_h1}
    }

    pub fn is_normalized(&self) -> bool {
        self.probability_h0 >= 0.0 && self.probability_h1 >= 0.0 &&
            (self.probability_h0 + self.probability_h1 - 1.0).abs() <= 1e-9
    }
}

// Covariances at or below this are treated as singular.
const MIN_COVARIANCE: f64 = f64::EPSILON;

// Relative tolerance on the Penrose identity C * P * C == C.
const PENROSE_TOLERANCE: f64 = 1e-9;

/// Moore-Penrose pseudo-inverse of the (height, width) matrix whose entries
/// all equal `value`. That matrix is the rank one outer product
/// value * 1_h * 1_w^T, so its pseudo-inverse is the (width, height) matrix
/// with all entries 1 / (value * height * width).
pub fn constant_pseudo_inverse(height: usize, width: usize, value: f64) -> DMatrix<f64> {
    DMatrix::from_element(width, height, 1.0 / (value * (height * width) as f64))
}

// Largest deviation from C * P * C == C, relative to the largest entry of C.
fn penrose_error(matrix: &DMatrix<f64>, pinv: &DMatrix<f64>) -> f64 {
    let scale = matrix.amax();
    if scale == 0.0 {
        return 0.0;
    }
    (matrix * pinv * matrix - matrix).amax() / scale
}

/// How a uniform covariance is inverted when whitening a template.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum CovarianceModel {
    /// The covariance is materialized as a full constant-valued matrix with
    /// the image's (height, width) shape. Its Moore-Penrose pseudo-inverse
    /// (width, height) is matrix multiplied with the (height, width) mean
    /// difference, giving a (width, width) template. For a constant c and a
    /// uniform difference d this works out to d / (c * width) everywhere.
    /// Only square images can be correlated with the result.
    #[default]
    MatrixPinv,

    /// The covariance is treated as the per-pixel scalar it is, and the
    /// template is the mean difference divided by it.
    Scalar,
}

impl CovarianceModel {
    /// Returns the whitened template "covariance^-1 * mean_difference" under
    /// this model. `observer` names the caller for error reporting.
    pub fn whiten(&self, observer: &'static str, covariance: f64,
                  mean_difference: &Array2<f64>) -> Result<Template, ObserverError> {
        if !covariance.is_finite() || covariance <= MIN_COVARIANCE {
            return Err(ObserverError::NumericalInstability{
                observer,
                reason: format!("covariance {} cannot be inverted", covariance)});
        }
        let template = match self {
            CovarianceModel::Scalar => mean_difference.mapv(|d| d / covariance),
            CovarianceModel::MatrixPinv => {
                let pinv_start = Instant::now();
                let (height, width) = mean_difference.dim();
                let covariance_matrix = DMatrix::from_element(height, width, covariance);
                let covariance_pinv = constant_pseudo_inverse(height, width, covariance);
                let error = penrose_error(&covariance_matrix, &covariance_pinv);
                if !(error <= PENROSE_TOLERANCE) {
                    return Err(ObserverError::NumericalInstability{
                        observer,
                        reason: format!("pseudo-inverse of {}x{} covariance {} is off by {}",
                                        height, width, covariance, error)});
                }
                let difference = DMatrix::from_fn(
                    height, width, |row, col| mean_difference[[row, col]]);
                let product = covariance_pinv * difference;
                debug!("{}x{} pseudo-inverse for {} in {:?}",
                       height, width, observer, pinv_start.elapsed());
                Array2::from_shape_fn((product.nrows(), product.ncols()),
                                      |(row, col)| product[(row, col)])
            },
        };
        if template.iter().any(|w| !w.is_finite()) {
            return Err(ObserverError::NumericalInstability{
                observer,
                reason: format!("non-finite template weights for covariance {}",
                                covariance)});
        }
        Ok(template)
    }
}

/// Correlates `template` with `image`.
pub fn apply_template(template: &Template, image: &Image)
                      -> Result<f64, ObserverError> {
    if template.dim() != image.dim() {
        return Err(ObserverError::ShapeMismatch{template: template.dim(),
                                                image: image.dim()});
    }
    Ok(inner_product(template, image))
}

fn inner_product(template: &Template, image: &Image) -> f64 {
    debug_assert_eq!(template.dim(), image.dim());
    template.iter().zip(image.iter()).map(|(t, p)| t * p).sum()
}

/// Uniform template; ignores where the target is.
pub fn roi_template(shape: (usize, usize), target_mean: f64) -> Template {
    Array2::from_elem(shape, target_mean)
}

/// `target_mean` within the disk at `position` (row, col), zero outside.
pub fn roi_ske_template(shape: (usize, usize), target_mean: f64,
                        position: (f64, f64), radius: f64) -> Template {
    disk_mask(shape, position, radius)
        .mapv(|inside| if inside { target_mean } else { 0.0 })
}

/// Difference of the signal-present and signal-absent mean images. With
/// spatially flat statistics this is uniform `target_mean`, the same as
/// [roi_template()].
pub fn npw_template(shape: (usize, usize), statistics: &TaskStatistics) -> Template {
    let mean_signal_absent = Array2::from_elem(shape, statistics.mean_signal_absent());
    let mean_signal_present = Array2::from_elem(shape, statistics.mean_signal_present());
    mean_signal_present - mean_signal_absent
}

pub fn pw_template(shape: (usize, usize), statistics: &TaskStatistics,
                   covariance_model: CovarianceModel) -> Result<Template, ObserverError> {
    covariance_model.whiten(ObserverKind::Prewhitening.name(),
                            statistics.variance_signal_absent(),
                            &npw_template(shape, statistics))
}

/// Whitens by the prior-weighted blend of the H0 and H1 covariances.
pub fn hotelling_template(shape: (usize, usize), statistics: &TaskStatistics,
                          prior: &ClassPrior, covariance_model: CovarianceModel)
                          -> Result<Template, ObserverError> {
    let unconditional_covariance =
        prior.probability_h1 * statistics.variance_signal_present() +
        prior.probability_h0 * statistics.variance_signal_absent();
    covariance_model.whiten(ObserverKind::Hotelling.name(),
                            unconditional_covariance,
                            &npw_template(shape, statistics))
}

/// Region-of-interest observer. Equivalent to `target_mean` times the sum of
/// all pixels.
pub fn roi_discriminant(image: &Image, target_mean: f64) -> f64 {
    inner_product(&roi_template(image.dim(), target_mean), image)
}

/// Region-of-interest observer for the signal-known-exactly task: only the
/// pixels of the known target disk contribute.
pub fn roi_ske_discriminant(image: &Image, target_mean: f64,
                            position: (f64, f64), radius: f64) -> f64 {
    inner_product(&roi_ske_template(image.dim(), target_mean, position, radius),
                  image)
}

/// Non-prewhitening observer.
pub fn npw_discriminant(image: &Image, statistics: &TaskStatistics) -> f64 {
    inner_product(&npw_template(image.dim(), statistics), image)
}

/// Prewhitening observer. Under [CovarianceModel::MatrixPinv] the image must
/// be square.
pub fn pw_discriminant(image: &Image, statistics: &TaskStatistics,
                       covariance_model: CovarianceModel) -> Result<f64, ObserverError> {
    apply_template(&pw_template(image.dim(), statistics, covariance_model)?, image)
}

/// Hotelling observer. Under [CovarianceModel::MatrixPinv] the image must be
/// square.
pub fn hotelling_discriminant(image: &Image, statistics: &TaskStatistics,
                              prior: &ClassPrior, covariance_model: CovarianceModel)
                              -> Result<f64, ObserverError> {
    apply_template(
        &hotelling_template(image.dim(), statistics, prior, covariance_model)?,
        image)
}

/// What the observer is told about the target.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Task {
    /// Only the target's statistics are known.
    SignalKnownStatistically,
    /// The target's position and extent are known too.
    SignalKnownExactly,
}

/// Everything an observer may need besides the image itself.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ObserverContext {
    pub statistics: TaskStatistics,
    pub prior: ClassPrior,
    pub covariance_model: CovarianceModel,
}

/// The observers, each with its one canonical parameter set.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ObserverKind {
    Roi,
    RoiSke { position: (f64, f64), radius: f64 },
    NonPrewhitening,
    Prewhitening,
    Hotelling,
}

impl ObserverKind {
    /// All five observers; the SKE observer looks for the disk at
    /// `position` (row, col) with `radius`.
    pub fn all(position: (f64, f64), radius: f64) -> Vec<ObserverKind> {
        vec![ObserverKind::Roi,
             ObserverKind::RoiSke{position, radius},
             ObserverKind::NonPrewhitening,
             ObserverKind::Prewhitening,
             ObserverKind::Hotelling]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ObserverKind::Roi => "ROI",
            ObserverKind::RoiSke{..} => "ROI-SKE",
            ObserverKind::NonPrewhitening => "NPW",
            ObserverKind::Prewhitening => "PW",
            ObserverKind::Hotelling => "Hotelling",
        }
    }

    pub fn task(&self) -> Task {
        match self {
            ObserverKind::RoiSke{..} => Task::SignalKnownExactly,
            _ => Task::SignalKnownStatistically,
        }
    }

    pub fn template(&self, shape: (usize, usize), context: &ObserverContext)
                    -> Result<Template, ObserverError> {
        let statistics = &context.statistics;
        match *self {
            ObserverKind::Roi => Ok(roi_template(shape, statistics.target_mean)),
            ObserverKind::RoiSke{position, radius} =>
                Ok(roi_ske_template(shape, statistics.target_mean, position, radius)),
            ObserverKind::NonPrewhitening => Ok(npw_template(shape, statistics)),
            ObserverKind::Prewhitening =>
                pw_template(shape, statistics, context.covariance_model),
            ObserverKind::Hotelling =>
                hotelling_template(shape, statistics, &context.prior,
                                   context.covariance_model),
        }
    }

    pub fn discriminant(&self, image: &Image, context: &ObserverContext)
                        -> Result<f64, ObserverError> {
        apply_template(&self.template(image.dim(), context)?, image)
    }
}

impl fmt::Display for ObserverKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use crate::image_model::{generate_image, TargetSpec};
    use super::*;

    fn test_image(seed: u64) -> Image {
        generate_image((64, 64), Some(&TargetSpec::default()), 0.1,
                       &mut StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_apply_template() {
        let template = array![[1.0, 2.0], [3.0, 4.0]];
        let image = array![[0.5, -1.0], [2.0, 0.0]];
        assert_eq!(apply_template(&template, &image), Ok(4.5));

        let wrong_shape = array![[1.0, 2.0, 3.0]];
        assert_eq!(apply_template(&wrong_shape, &image),
                   Err(ObserverError::ShapeMismatch{template: (1, 3), image: (2, 2)}));
    }

    #[test]
    fn test_roi_is_scaled_pixel_sum() {
        let image = test_image(1);
        assert_abs_diff_eq!(roi_discriminant(&image, -1.5), -1.5 * image.sum(),
                            epsilon = 1e-8);
    }

    #[test]
    fn test_roi_linear_in_target_mean() {
        let image = test_image(2);
        let single = roi_discriminant(&image, -1.5);
        let double = roi_discriminant(&image, -3.0);
        assert_abs_diff_eq!(double, 2.0 * single, epsilon = 1e-8);
    }

    #[test]
    fn test_roi_ske_only_sees_disk() {
        let image = test_image(3);
        let mask = disk_mask((64, 64), (32.0, 32.0), 8.0);
        let disk_sum: f64 = image.iter().zip(mask.iter())
            .filter(|(_, &inside)| inside).map(|(p, _)| *p).sum();
        assert_abs_diff_eq!(
            roi_ske_discriminant(&image, -1.5, (32.0, 32.0), 8.0),
            -1.5 * disk_sum, epsilon = 1e-8);

        // Zero-valued image outside the disk has no influence.
        let mut outside_only = Array2::<f64>::zeros((64, 64));
        outside_only[[0, 0]] = 100.0;
        assert_eq!(roi_ske_discriminant(&outside_only, -1.5, (32.0, 32.0), 8.0), 0.0);
    }

    #[test]
    fn test_npw_matches_roi() {
        let image = test_image(4);
        let statistics = TaskStatistics::default();
        assert_eq!(npw_discriminant(&image, &statistics),
                   roi_discriminant(&image, statistics.target_mean));

        // Non-zero means cancel in the difference.
        let offset = TaskStatistics{background_mean: 3.0, noise_mean: 0.25,
                                    ..statistics};
        assert_abs_diff_eq!(npw_discriminant(&image, &offset),
                            roi_discriminant(&image, statistics.target_mean),
                            epsilon = 1e-8);
    }

    #[test]
    fn test_matrix_pinv_closed_form() {
        let statistics = TaskStatistics::default();
        let template = pw_template((64, 64), &statistics,
                                   CovarianceModel::MatrixPinv).unwrap();
        assert_eq!(template.dim(), (64, 64));
        let expected = -1.5 / (1.01 * 64.0);
        for &w in template.iter() {
            assert_abs_diff_eq!(w, expected, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_constant_pseudo_inverse() {
        for (height, width) in [(16, 16), (64, 64), (32, 48), (48, 32)] {
            let matrix = DMatrix::from_element(height, width, 1.01);
            let pinv = constant_pseudo_inverse(height, width, 1.01);
            assert_eq!(pinv.shape(), (width, height));
            let expected = 1.0 / (1.01 * (height * width) as f64);
            for &p in pinv.iter() {
                assert_abs_diff_eq!(p, expected, epsilon = 1e-15);
            }
            // The four Penrose conditions.
            assert!(penrose_error(&matrix, &pinv) < 1e-12);
            assert!((&pinv * &matrix * &pinv - &pinv).amax() < 1e-15);
            let cp = &matrix * &pinv;
            let pc = &pinv * &matrix;
            assert!((&cp - cp.transpose()).amax() < 1e-12);
            assert!((&pc - pc.transpose()).amax() < 1e-12);
        }
    }

    #[test]
    fn test_matrix_pinv_closed_form_by_size() {
        let statistics = TaskStatistics::default();
        for size in [16, 32, 64, 128] {
            let template = pw_template((size, size), &statistics,
                                       CovarianceModel::MatrixPinv).unwrap();
            let expected = -1.5 / (1.01 * size as f64);
            for &w in template.iter() {
                assert_abs_diff_eq!(w, expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_penrose_error_detects_wrong_inverse() {
        let matrix = DMatrix::from_element(64, 64, 1.01);
        // Four times too large, as an inaccurate decomposition might give.
        let wrong = DMatrix::from_element(64, 64, 4.0 / (1.01 * 4096.0));
        assert!(penrose_error(&matrix, &wrong) > 1.0);
    }

    #[test]
    fn test_scalar_covariance_model() {
        let statistics = TaskStatistics::default();
        let template = pw_template((16, 24), &statistics,
                                   CovarianceModel::Scalar).unwrap();
        assert_eq!(template.dim(), (16, 24));
        for &w in template.iter() {
            assert_abs_diff_eq!(w, -1.5 / 1.01, epsilon = 1e-12);
        }
        // The two models differ by the width factor on square images.
        let image = test_image(5);
        let scalar = pw_discriminant(&image, &statistics, CovarianceModel::Scalar).unwrap();
        let matrix = pw_discriminant(&image, &statistics,
                                     CovarianceModel::MatrixPinv).unwrap();
        assert_abs_diff_eq!(matrix * 64.0, scalar, epsilon = 1e-6);
    }

    #[test]
    fn test_matrix_pinv_non_square_shape_mismatch() {
        let image = Array2::<f64>::zeros((16, 24));
        let statistics = TaskStatistics::default();
        assert_eq!(pw_discriminant(&image, &statistics, CovarianceModel::MatrixPinv),
                   Err(ObserverError::ShapeMismatch{template: (24, 24),
                                                    image: (16, 24)}));
        assert!(pw_discriminant(&image, &statistics, CovarianceModel::Scalar).is_ok());
    }

    #[test]
    fn test_zero_covariance_is_unstable() {
        let image = test_image(6);
        let statistics = TaskStatistics{background_variance: 0.0,
                                        noise_variance: 0.0,
                                        ..TaskStatistics::default()};
        for model in [CovarianceModel::MatrixPinv, CovarianceModel::Scalar] {
            match pw_discriminant(&image, &statistics, model) {
                Err(ObserverError::NumericalInstability{observer, ..}) =>
                    assert_eq!(observer, "PW"),
                other => panic!("unexpected {:?}", other),
            }
            match hotelling_discriminant(&image, &statistics,
                                         &ClassPrior::default(), model) {
                Err(ObserverError::NumericalInstability{observer, ..}) =>
                    assert_eq!(observer, "Hotelling"),
                other => panic!("unexpected {:?}", other),
            }
        }
        let nan_statistics = TaskStatistics{noise_variance: f64::NAN,
                                            ..TaskStatistics::default()};
        assert!(matches!(
            pw_discriminant(&image, &nan_statistics, CovarianceModel::Scalar),
            Err(ObserverError::NumericalInstability{..})));
    }

    #[test]
    fn test_hotelling_reduces_to_pw() {
        let image = test_image(7);
        let statistics = TaskStatistics{target_variance: 0.0,
                                        ..TaskStatistics::default()};
        let prior = ClassPrior{probability_h0: 0.5, probability_h1: 0.5};
        for model in [CovarianceModel::MatrixPinv, CovarianceModel::Scalar] {
            assert_abs_diff_eq!(
                hotelling_discriminant(&image, &statistics, &prior, model).unwrap(),
                pw_discriminant(&image, &statistics, model).unwrap(),
                epsilon = 1e-12);
        }
    }

    #[test]
    fn test_hotelling_blends_covariance() {
        let image = test_image(8);
        let statistics = TaskStatistics{target_variance: 1.0,
                                        ..TaskStatistics::default()};
        let prior = ClassPrior::with_signal_probability(0.25);
        // 0.25 * 2.01 + 0.75 * 1.01 = 1.26.
        let expected = npw_discriminant(&image, &statistics) / 1.26;
        assert_abs_diff_eq!(
            hotelling_discriminant(&image, &statistics, &prior,
                                   CovarianceModel::Scalar).unwrap(),
            expected, epsilon = 1e-8);
    }

    #[test]
    fn test_observer_kind_dispatch() {
        let image = test_image(9);
        let context = ObserverContext::default();
        let statistics = &context.statistics;
        let observers = ObserverKind::all((32.0, 32.0), 8.0);
        let names: Vec<&str> = observers.iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["ROI", "ROI-SKE", "NPW", "PW", "Hotelling"]);

        assert_eq!(observers[0].discriminant(&image, &context).unwrap(),
                   roi_discriminant(&image, statistics.target_mean));
        assert_eq!(observers[1].discriminant(&image, &context).unwrap(),
                   roi_ske_discriminant(&image, statistics.target_mean,
                                        (32.0, 32.0), 8.0));
        assert_eq!(observers[1].task(), Task::SignalKnownExactly);
        assert_eq!(observers[2].discriminant(&image, &context).unwrap(),
                   npw_discriminant(&image, statistics));
        assert_eq!(observers[3].discriminant(&image, &context).unwrap(),
                   pw_discriminant(&image, statistics,
                                   context.covariance_model).unwrap());
        assert_eq!(observers[4].discriminant(&image, &context).unwrap(),
                   hotelling_discriminant(&image, statistics, &context.prior,
                                          context.covariance_model).unwrap());
        assert_eq!(observers[4].task(), Task::SignalKnownStatistically);
        assert_eq!(format!("{}", observers[3]), "PW");
    }

    #[test]
    fn test_class_prior() {
        assert!(ClassPrior::default().is_normalized());
        assert!(ClassPrior::with_signal_probability(0.3).is_normalized());
        assert!(!ClassPrior{probability_h0: 0.6, probability_h1: 0.6}.is_normalized());
        assert!(!ClassPrior{probability_h0: 1.5, probability_h1: -0.5}.is_normalized());
    }
}  // mod tests.
