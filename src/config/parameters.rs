//! Physical parameters of the membrane free energy.
//!
//! Units are reduced: lengths in μm, energies in units of the bending
//! modulus scale used by the caller. Every section loads from JSON with
//! `serde`, and missing sections fall back to their defaults.
//!
//! References:
//! - Zhu C, Lee CT, Rangamani P. "Mem3DG: Modeling membrane mechanochemical
//!   dynamics in 3D using discrete differential geometry", Biophys Rep 2022
//! - Helfrich W. Z Naturforsch C, 1973

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConfigError, SimulationError};

/// Top-level parameters container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub bending: BendingParameters,
    pub tension: TensionParameters,
    pub osmotic: OsmoticParameters,
    pub adsorption: AdsorptionParameters,
    pub aggregation: AggregationParameters,
    pub dirichlet: DirichletParameters,
    pub dpd: DpdParameters,
    pub external: ExternalParameters,
    pub protein: ProteinParameters,
    pub boundary: BoundaryParameters,
    pub point: PointParameters,
    pub variation: VariationParameters,
    pub regularizer: RegularizerParameters,
}

impl Parameters {
    /// Load parameters from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let params = serde_json::from_str(&contents)?;
        Ok(params)
    }

    /// Load parameters, or use defaults if the file is missing or invalid
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(params) => {
                log::info!("Loaded membrane parameters from {:?}", path.as_ref());
                params
            }
            Err(SimulationError::Io(_)) => {
                log::info!("Membrane parameters file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                log::warn!("Failed to read membrane parameters: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Reject parameter combinations that cannot produce a valid run
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("bending.kb", self.bending.kb)?;
        non_negative("tension.ksg", self.tension.ksg)?;
        non_negative("osmotic.kv", self.osmotic.kv)?;
        non_negative("dirichlet.eta", self.dirichlet.eta)?;
        non_negative("dpd.gamma", self.dpd.gamma)?;
        non_negative("dpd.temperature", self.dpd.temperature)?;
        non_negative("protein.mobility", self.protein.mobility)?;
        non_negative("protein.interior_penalty", self.protein.interior_penalty)?;
        non_negative("regularizer.kst", self.regularizer.kst)?;
        non_negative("regularizer.ksl", self.regularizer.ksl)?;
        non_negative("regularizer.kse", self.regularizer.kse)?;

        if let Some(area) = self.tension.target_area {
            positive("tension.target_area", area)?;
        }
        if let Some(volume) = self.osmotic.reference_volume {
            positive("osmotic.reference_volume", volume)?;
        }
        match self.osmotic.policy {
            OsmoticPolicy::PreferredVolume => positive("osmotic.vt", self.osmotic.vt)?,
            OsmoticPolicy::IdealGas => {
                positive("osmotic.n", self.osmotic.n)?;
                positive("osmotic.c_am", self.osmotic.c_am)?;
            }
            OsmoticPolicy::ConstantPressure => {}
        }

        if self.external.kf != 0.0 {
            positive("external.decay_time", self.external.decay_time)?;
            positive("external.standard_deviation", self.external.standard_deviation)?;
        }

        match self.protein.initial {
            ProteinDistribution::Uniform(phi) => open_unit("protein.initial", phi)?,
            ProteinDistribution::Disk {
                radius,
                inside,
                outside,
                sharpness,
            } => {
                positive("protein.initial.radius", radius)?;
                open_unit("protein.initial.inside", inside)?;
                open_unit("protein.initial.outside", outside)?;
                positive("protein.initial.sharpness", sharpness)?;
            }
        }

        Ok(())
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            requirement: "finite and non-negative",
            value,
        })
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            requirement: "finite and positive",
            value,
        })
    }
}

fn open_unit(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            requirement: "in the open interval (0, 1)",
            value,
        })
    }
}

/// How bending modulus and spontaneous curvature depend on protein density
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BendingRelation {
    /// H0 = H0c·φ, Kb = Kb + Kbc·φ
    Linear,
    /// H0 = H0c·φ²/(1+φ²), Kb = Kb + Kbc·φ²/(1+φ²)
    Hill,
}

impl BendingRelation {
    /// Occupancy profile f(φ) and its derivative f'(φ)
    #[inline]
    pub fn profile(self, phi: f64) -> (f64, f64) {
        match self {
            BendingRelation::Linear => (phi, 1.0),
            BendingRelation::Hill => {
                let phi2 = phi * phi;
                let denom = 1.0 + phi2;
                (phi2 / denom, 2.0 * phi / (denom * denom))
            }
        }
    }
}

/// Helfrich bending
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BendingParameters {
    /// Bare bending modulus
    pub kb: f64,
    /// Bending modulus contributed by full protein coverage
    pub kbc: f64,
    /// Spontaneous curvature at full protein coverage (1/μm)
    pub h0c: f64,
    pub relation: BendingRelation,
}

impl Default for BendingParameters {
    fn default() -> Self {
        Self {
            // ~20 kT in reduced units
            kb: 8.22e-5,
            kbc: 0.0,
            h0c: 0.0,
            relation: BendingRelation::Linear,
        }
    }
}

/// Surface tension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensionParameters {
    /// Area stretching modulus, or the constant tension
    pub ksg: f64,
    /// Preferred total area; `None` uses the initial area
    pub target_area: Option<f64>,
    /// Use `ksg` directly as the surface tension
    pub is_constant: bool,
    /// Augmented Lagrangian multiplier, updated between steps
    pub lambda_sg: f64,
}

impl Default for TensionParameters {
    fn default() -> Self {
        Self {
            ksg: 1e-2,
            target_area: None,
            is_constant: false,
            lambda_sg: 0.0,
        }
    }
}

/// Osmotic pressure policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsmoticPolicy {
    /// P = Kv
    ConstantPressure,
    /// P = −(Kv(V−V̄)/V̄ + λV), V̄ = reference volume · Vt
    PreferredVolume,
    /// P = Kv(n/V − c_am)
    IdealGas,
}

/// Osmotic pressure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsmoticParameters {
    pub policy: OsmoticPolicy,
    /// Pressure modulus, or the constant pressure
    pub kv: f64,
    /// Reference volume; `None` uses the initial volume
    pub reference_volume: Option<f64>,
    /// Reduced target volume
    pub vt: f64,
    /// Ambient concentration
    pub c_am: f64,
    /// Enclosed amount of osmolyte
    pub n: f64,
    /// Augmented Lagrangian multiplier, updated between steps
    pub lambda_v: f64,
}

impl Default for OsmoticParameters {
    fn default() -> Self {
        Self {
            policy: OsmoticPolicy::PreferredVolume,
            kv: 1e-2,
            reference_volume: None,
            vt: 1.0,
            c_am: 1.0,
            n: 1.0,
            lambda_v: 0.0,
        }
    }
}

/// Protein adsorption energy per unit area
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdsorptionParameters {
    pub epsilon: f64,
}

/// Protein aggregation energy per unit area
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregationParameters {
    pub chi: f64,
}

/// Line tension of protein domain boundaries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirichletParameters {
    pub eta: f64,
}

/// Dissipative particle dynamics thermostat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DpdParameters {
    /// Dissipation coefficient
    pub gamma: f64,
    /// Thermal energy kBT
    pub temperature: f64,
}

/// Decaying anchor force localized around the tracked point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalParameters {
    /// Force magnitude
    pub kf: f64,
    /// Exponential decay time τ
    pub decay_time: f64,
    /// Width of the Gaussian profile in geodesic distance
    pub standard_deviation: f64,
}

impl Default for ExternalParameters {
    fn default() -> Self {
        Self {
            kf: 0.0,
            decay_time: 500.0,
            standard_deviation: 0.02,
        }
    }
}

/// Initial protein density profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProteinDistribution {
    Uniform(f64),
    /// tanh step in geodesic distance from the tracked point
    Disk {
        radius: f64,
        inside: f64,
        outside: f64,
        sharpness: f64,
    },
}

/// Which vertices hold their protein density fixed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProteinBoundaryCondition {
    None,
    /// Boundary vertices keep their density
    Pin,
}

/// Protein density field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProteinParameters {
    /// Mobility Bc relating chemical potential to density velocity
    pub mobility: f64,
    /// Interior penalty λφ keeping φ inside (0, 1)
    pub interior_penalty: f64,
    pub initial: ProteinDistribution,
    pub boundary: ProteinBoundaryCondition,
}

impl Default for ProteinParameters {
    fn default() -> Self {
        Self {
            mobility: 1.0,
            interior_penalty: 1e-6,
            initial: ProteinDistribution::Uniform(0.1),
            boundary: ProteinBoundaryCondition::None,
        }
    }
}

/// Shape boundary condition for open meshes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeBoundaryCondition {
    None,
    /// Boundary vertices slide in-plane only
    Roller,
    /// Boundary vertices are fixed
    Pin,
    /// Boundary vertices and their neighbors are fixed
    Fixed,
}

impl ShapeBoundaryCondition {
    /// Component-wise force mask on a constrained vertex
    pub fn mask(self) -> [f64; 3] {
        match self {
            ShapeBoundaryCondition::None => [1.0, 1.0, 1.0],
            ShapeBoundaryCondition::Roller => [1.0, 1.0, 0.0],
            ShapeBoundaryCondition::Pin | ShapeBoundaryCondition::Fixed => [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryParameters {
    pub shape: ShapeBoundaryCondition,
}

impl Default for BoundaryParameters {
    fn default() -> Self {
        Self {
            shape: ShapeBoundaryCondition::None,
        }
    }
}

/// Tracked point used as the origin of geodesic distances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointParameters {
    pub position: [f64; 3],
    /// Compare only x and y when locating the vertex
    pub planar: bool,
    /// Re-locate the vertex nearest `position` on every geodesic refresh
    pub is_floating: bool,
}

impl Default for PointParameters {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 1.0],
            planar: false,
            is_floating: false,
        }
    }
}

/// Which degrees of freedom evolve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariationParameters {
    pub shape: bool,
    pub protein: bool,
    /// Geodesic radius around the tracked point outside of which nothing
    /// moves; non-positive disables the mask
    pub geodesic_mask: f64,
}

impl Default for VariationParameters {
    fn default() -> Self {
        Self {
            shape: true,
            protein: false,
            geodesic_mask: -1.0,
        }
    }
}

/// Mesh quality regularization moduli
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegularizerParameters {
    /// Conformal (cross-ratio) stiffness
    pub kst: f64,
    /// Face area stiffness
    pub ksl: f64,
    /// Edge length stiffness
    pub kse: f64,
}

impl RegularizerParameters {
    pub fn is_active(&self) -> bool {
        self.kst != 0.0 || self.ksl != 0.0 || self.kse != 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(Parameters::default().validate().is_ok());
    }

    #[test]
    fn test_load_reports_file_errors() {
        let dir = std::env::temp_dir().join("membrane_parameters_load");
        std::fs::create_dir_all(&dir).unwrap();

        let missing = dir.join("missing.json");
        assert!(matches!(Parameters::load(&missing), Err(SimulationError::Io(_))));

        let broken = dir.join("broken.json");
        std::fs::write(&broken, "{ \"bending\": ").unwrap();
        assert!(matches!(
            Parameters::load(&broken),
            Err(SimulationError::Serialization(_))
        ));
        assert_eq!(Parameters::load_or_default(&broken).bending.kb, BendingParameters::default().kb);

        let mut saved = Parameters::default();
        saved.bending.kb = 2.5;
        let full = dir.join("full.json");
        std::fs::write(&full, serde_json::to_string(&saved).unwrap()).unwrap();
        assert_eq!(Parameters::load(&full).unwrap().bending.kb, 2.5);

        // Missing sections take their defaults
        let empty = dir.join("empty.json");
        std::fs::write(&empty, "{}").unwrap();
        let params = Parameters::load(&empty).unwrap();
        assert_eq!(params.tension.ksg, TensionParameters::default().ksg);
    }

    #[test]
    fn test_rejects_negative_modulus() {
        let mut params = Parameters::default();
        params.bending.kb = -1.0;
        assert!(matches!(
            params.validate(),
            Err(ConfigError::OutOfRange { name: "bending.kb", .. })
        ));
    }

    #[test]
    fn test_rejects_density_outside_unit_interval() {
        let mut params = Parameters::default();
        params.protein.initial = ProteinDistribution::Uniform(1.0);
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_hill_profile_derivative() {
        let h = 1e-6;
        for &phi in &[0.1, 0.5, 0.9] {
            let (_, d) = BendingRelation::Hill.profile(phi);
            let numeric = (BendingRelation::Hill.profile(phi + h).0
                - BendingRelation::Hill.profile(phi - h).0)
                / (2.0 * h);
            assert!((d - numeric).abs() < 1e-8);
        }
    }

    #[test]
    fn test_serialization() {
        let mut params = Parameters::default();
        params.osmotic.policy = OsmoticPolicy::IdealGas;
        params.bending.relation = BendingRelation::Hill;
        let json = serde_json::to_string_pretty(&params).unwrap();
        let parsed: Parameters = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.osmotic.policy, OsmoticPolicy::IdealGas);
        assert_eq!(parsed.bending.relation, BendingRelation::Hill);
        assert!((parsed.bending.kb - params.bending.kb).abs() < 1e-15);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: Parameters = serde_json::from_str(r#"{"dirichlet": {"eta": 0.5}}"#).unwrap();
        assert_eq!(parsed.dirichlet.eta, 0.5);
        assert_eq!(parsed.osmotic.policy, OsmoticPolicy::PreferredVolume);
    }
}
