//! Energy decomposition of one configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Energy {
    pub bending: f64,
    pub surface: f64,
    pub pressure: f64,
    pub adsorption: f64,
    pub aggregation: f64,
    pub dirichlet: f64,
    pub interior_penalty: f64,
    pub kinetic: f64,
    /// Sum of the potential terms
    pub potential: f64,
    /// Work done by external forces so far
    pub external_work: f64,
    /// potential + kinetic − external work
    pub total: f64,
}

impl Energy {
    /// Potential terms by name
    pub fn components(&self) -> [(&'static str, f64); 7] {
        [
            ("bending", self.bending),
            ("surface", self.surface),
            ("pressure", self.pressure),
            ("adsorption", self.adsorption),
            ("aggregation", self.aggregation),
            ("dirichlet", self.dirichlet),
            ("interior penalty", self.interior_penalty),
        ]
    }

    /// Names of the potential terms that grew relative to `reference`
    pub fn increased_since(&self, reference: &Energy) -> Vec<&'static str> {
        self.components()
            .iter()
            .zip(reference.components().iter())
            .filter(|((_, now), (_, before))| now > before)
            .map(|((name, _), _)| *name)
            .collect()
    }

    pub fn sum_potential(&mut self) {
        self.potential = self.components().iter().map(|(_, e)| e).sum();
        self.total = self.potential + self.kinetic - self.external_work;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_accounts_for_work() {
        let mut energy = Energy {
            bending: 1.0,
            surface: 2.0,
            kinetic: 0.5,
            external_work: 0.25,
            ..Default::default()
        };
        energy.sum_potential();
        assert_eq!(energy.potential, 3.0);
        assert_eq!(energy.total, 3.25);
    }

    #[test]
    fn test_increased_components() {
        let before = Energy {
            bending: 1.0,
            surface: 1.0,
            ..Default::default()
        };
        let after = Energy {
            bending: 2.0,
            surface: 0.5,
            ..Default::default()
        };
        assert_eq!(after.increased_since(&before), vec!["bending"]);
    }
}
