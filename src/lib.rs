// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Evaluates classical linear "ideal observers" on a signal detection task:
//! deciding whether a noisy image contains a weak disk-shaped target.
//!
//! Features:
//!
//! * A parametric two-class image generator ([image_model::generate_image()]):
//!   unit-variance Gaussian background, optional constant-amplitude disk,
//!   additive Gaussian noise.
//! * Five linear observers ([observers]): Region-of-Interest, ROI for the
//!   signal-known-exactly task, Non-Prewhitening, Prewhitening, and Hotelling.
//!   Each one correlates the image with a template built in closed form from
//!   declared first and second order statistics.
//! * A Monte-Carlo harness ([evaluation::evaluate_roc_point()]) estimating the
//!   true and false positive rates of each observer at a decision threshold,
//!   plus threshold sweeps, detectability index, and area under the ROC curve.
//!
//! # Observer statistics
//!
//! The statistics handed to the observers (background/noise/target means and
//! variances, class priors) are declared by the caller and are never measured
//! from the generated images. The generator's background always has unit
//! variance, while observers may be told otherwise; this allows studying
//! observers operating under mis-specified statistics.
//!
//! # Covariance inversion
//!
//! The prewhitening and Hotelling observers invert a spatially uniform
//! covariance. By default ([observers::CovarianceModel::MatrixPinv]) the
//! covariance is materialized as a constant-valued matrix of the image's shape
//! and pseudo-inverted, and the template is the matrix product of that
//! pseudo-inverse with the mean difference image. This reproduces established
//! reference results but only admits square images, and scales the template
//! by 1/width relative to the per-pixel division performed by
//! [observers::CovarianceModel::Scalar]. Degenerate covariances are reported as
//! [observers::ObserverError::NumericalInstability] rather than yielding NaN.
//!
//! # Parallelism
//!
//! Trials are evaluated in parallel with rayon. Each trial draws from its own
//! RNG seeded from a base seed and the trial index, so seeded evaluations are
//! reproducible regardless of thread scheduling.

pub mod evaluation;
pub mod image_funcs;
pub mod image_model;
pub mod observers;
pub mod stats_funcs;
