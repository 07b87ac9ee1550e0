use serde::{Deserialize, Serialize};

/// Which stages run for every observation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Window average, then OneEuro + SLERP using `chained_min_cutoff`.
    #[default]
    Chained,
    /// OneEuro + SLERP alone using `min_cutoff`.
    Adaptive,
    /// Window average alone; rotation passes through.
    WindowOnly,
}

/// Tuning of the per-marker filter chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// Ring buffer capacity of the window average (frames).
    pub window_size: usize,
    /// OneEuro minimal cutoff (Hz) when running standalone.
    pub min_cutoff: f64,
    /// OneEuro minimal cutoff (Hz) when running after the window average.
    pub chained_min_cutoff: f64,
    /// Speed coefficient: cutoff grows by `beta` per m/s.
    pub beta: f64,
    /// Cutoff (Hz) of the velocity low-pass.
    pub d_cutoff: f64,
    /// Fraction of the way from the previous to the raw rotation, in `(0, 1)`.
    pub rotation_blend: f64,
    pub mode: FilterMode,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            window_size: 5,
            min_cutoff: 1.0,
            chained_min_cutoff: 3.0,
            beta: 0.5,
            d_cutoff: 1.0,
            rotation_blend: 0.3,
            mode: FilterMode::Chained,
        }
    }
}

/// Invalid filter configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FilterConfigError {
    #[error("window_size must be >= 1")]
    ZeroWindow,
    #[error("{name} must be finite and > 0 (got {value})")]
    InvalidCutoff { name: &'static str, value: f64 },
    #[error("beta must be finite and >= 0 (got {0})")]
    InvalidBeta(f64),
    #[error("rotation_blend must lie in (0, 1) (got {0})")]
    InvalidRotationBlend(f64),
}

impl FilterParams {
    /// Check every field; cutoffs feed a division in the smoothing factor.
    pub fn validate(&self) -> Result<(), FilterConfigError> {
        if self.window_size == 0 {
            return Err(FilterConfigError::ZeroWindow);
        }
        for (name, value) in [
            ("min_cutoff", self.min_cutoff),
            ("chained_min_cutoff", self.chained_min_cutoff),
            ("d_cutoff", self.d_cutoff),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(FilterConfigError::InvalidCutoff { name, value });
            }
        }
        if !self.beta.is_finite() || self.beta < 0.0 {
            return Err(FilterConfigError::InvalidBeta(self.beta));
        }
        if !(self.rotation_blend > 0.0 && self.rotation_blend < 1.0) {
            return Err(FilterConfigError::InvalidRotationBlend(self.rotation_blend));
        }
        Ok(())
    }

    /// Minimal cutoff of the low-pass stage for the configured mode.
    pub fn effective_min_cutoff(&self) -> f64 {
        match self.mode {
            FilterMode::Chained => self.chained_min_cutoff,
            FilterMode::Adaptive | FilterMode::WindowOnly => self.min_cutoff,
        }
    }
}
