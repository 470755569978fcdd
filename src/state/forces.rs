//! Force and chemical potential buffers, decomposed by mechanism.

use glam::DVec3;

/// The three parts of the bending force
#[derive(Debug, Clone, Default)]
pub struct BendingComponents {
    /// Σ Kb(H−H0) · Schläfli vectors
    pub schlafli: Vec<DVec3>,
    /// Σ Kb(H0²−H²) · area gradient
    pub area: Vec<DVec3>,
    /// Σ Kb(H−H0) · Gaussian curvature vector
    pub gauss: Vec<DVec3>,
}

/// Chemical potential terms driving protein density
#[derive(Debug, Clone, Default)]
pub struct ChemicalPotential {
    pub adsorption: Vec<f64>,
    pub aggregation: Vec<f64>,
    pub bending: Vec<f64>,
    pub diffusion: Vec<f64>,
    pub interior_penalty: Vec<f64>,
    pub total: Vec<f64>,
}

/// Signed components of each force along the vertex normal
#[derive(Debug, Clone, Default)]
pub struct NormalProjections {
    pub bending: Vec<f64>,
    pub capillary: Vec<f64>,
    pub osmotic: Vec<f64>,
    pub line_tension: Vec<f64>,
    pub adsorption: Vec<f64>,
    pub aggregation: Vec<f64>,
    pub external: Vec<f64>,
    pub mechanical: Vec<f64>,
}

/// Masked per-vertex forces of one configuration
#[derive(Debug, Clone, Default)]
pub struct Forces {
    pub bending: Vec<DVec3>,
    pub bending_components: BendingComponents,
    pub capillary: Vec<DVec3>,
    pub osmotic: Vec<DVec3>,
    pub line_tension: Vec<DVec3>,
    pub adsorption: Vec<DVec3>,
    pub aggregation: Vec<DVec3>,
    pub external: Vec<DVec3>,
    pub damping: Vec<DVec3>,
    pub stochastic: Vec<DVec3>,
    /// Sum of the conservative and external forces
    pub mechanical: Vec<DVec3>,
    pub regularization: Vec<DVec3>,
    pub chemical_potential: ChemicalPotential,
    pub projections: NormalProjections,
    /// Surface tension γ used for the capillary force
    pub surface_tension: f64,
    /// Osmotic pressure P used for the osmotic force
    pub osmotic_pressure: f64,
}

impl Forces {
    pub fn new(n_vertices: usize) -> Self {
        let vectors = || vec![DVec3::ZERO; n_vertices];
        let scalars = || vec![0.0; n_vertices];
        Self {
            bending: vectors(),
            bending_components: BendingComponents {
                schlafli: vectors(),
                area: vectors(),
                gauss: vectors(),
            },
            capillary: vectors(),
            osmotic: vectors(),
            line_tension: vectors(),
            adsorption: vectors(),
            aggregation: vectors(),
            external: vectors(),
            damping: vectors(),
            stochastic: vectors(),
            mechanical: vectors(),
            regularization: vectors(),
            chemical_potential: ChemicalPotential {
                adsorption: scalars(),
                aggregation: scalars(),
                bending: scalars(),
                diffusion: scalars(),
                interior_penalty: scalars(),
                total: scalars(),
            },
            projections: NormalProjections {
                bending: scalars(),
                capillary: scalars(),
                osmotic: scalars(),
                line_tension: scalars(),
                adsorption: scalars(),
                aggregation: scalars(),
                external: scalars(),
                mechanical: scalars(),
            },
            surface_tension: 0.0,
            osmotic_pressure: 0.0,
        }
    }

    pub fn n_vertices(&self) -> usize {
        self.mechanical.len()
    }

    /// Named vector fields, for diagnostics
    pub fn vector_fields(&self) -> [(&'static str, &[DVec3]); 11] {
        [
            ("bending force", &self.bending),
            ("capillary force", &self.capillary),
            ("osmotic force", &self.osmotic),
            ("line tension force", &self.line_tension),
            ("adsorption force", &self.adsorption),
            ("aggregation force", &self.aggregation),
            ("external force", &self.external),
            ("damping force", &self.damping),
            ("stochastic force", &self.stochastic),
            ("mechanical force", &self.mechanical),
            ("regularization force", &self.regularization),
        ]
    }

    /// Named chemical potential fields, for diagnostics
    pub fn scalar_fields(&self) -> [(&'static str, &[f64]); 6] {
        let mu = &self.chemical_potential;
        [
            ("adsorption potential", &mu.adsorption),
            ("aggregation potential", &mu.aggregation),
            ("bending potential", &mu.bending),
            ("diffusion potential", &mu.diffusion),
            ("interior penalty potential", &mu.interior_penalty),
            ("chemical potential", &mu.total),
        ]
    }

    /// Mechanical force plus the thermostat forces
    pub fn total_mechanical(&self) -> Vec<DVec3> {
        self.mechanical
            .iter()
            .zip(&self.damping)
            .zip(&self.stochastic)
            .map(|((f, d), s)| *f + *d + *s)
            .collect()
    }
}
