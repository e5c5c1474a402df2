use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement<T> {
    pub value: T,
    pub unit: String,
}

/// The closed set of dissolved species tracked by every environment.
///
/// Anything outside this set lives in the environment's `extra` map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compound {
    Glucose,
    Oxygen,
    Antibiotics,
    Toxins,
    Waste,
    GrowthFactors,
}

impl Compound {
    pub const ALL: [Compound; 6] = [
        Compound::Glucose,
        Compound::Oxygen,
        Compound::Antibiotics,
        Compound::Toxins,
        Compound::Waste,
        Compound::GrowthFactors,
    ];

    pub fn index(self) -> usize {
        match self {
            Compound::Glucose => 0,
            Compound::Oxygen => 1,
            Compound::Antibiotics => 2,
            Compound::Toxins => 3,
            Compound::Waste => 4,
            Compound::GrowthFactors => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Compound::Glucose => "glucose",
            Compound::Oxygen => "oxygen",
            Compound::Antibiotics => "antibiotics",
            Compound::Toxins => "toxins",
            Compound::Waste => "waste",
            Compound::GrowthFactors => "growth_factors",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Compound::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// Inlet gas composition, in percent of the total flow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GasMix {
    pub o2: f64,
    pub co2: f64,
    pub n2: f64,
}

impl Default for GasMix {
    fn default() -> Self {
        Self {
            o2: 21.0,
            co2: 5.0,
            n2: 74.0,
        }
    }
}

impl GasMix {
    pub fn total(&self) -> f64 {
        self.o2 + self.co2 + self.n2
    }

    /// Rescales the mix so it sums to exactly 100 percent.
    ///
    /// Returns `None` when any fraction is negative or not finite, or when the
    /// original sum lies outside `100 ± tolerance`.
    pub fn normalized(&self, tolerance: f64) -> Option<GasMix> {
        let parts = [self.o2, self.co2, self.n2];
        if parts.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return None;
        }
        let total = self.total();
        if (total - 100.0).abs() > tolerance || total <= 0.0 {
            return None;
        }
        let scale = 100.0 / total;
        let o2 = self.o2 * scale;
        let co2 = self.co2 * scale;
        // N2 absorbs the rounding so the stored sum is exact.
        Some(GasMix {
            o2,
            co2,
            n2: (100.0 - o2 - co2).max(0.0),
        })
    }

    /// Sets the CO2 fraction and rebalances N2 so the total stays at 100.
    ///
    /// When CO2 plus O2 would exceed 100, O2 gives way; CO2 above 100 is clamped and
    /// the remainder zeroed.
    pub fn with_co2(&self, co2: f64) -> GasMix {
        let co2 = co2.clamp(0.0, 100.0);
        let o2 = self.o2.clamp(0.0, 100.0 - co2);
        GasMix {
            o2,
            co2,
            n2: (100.0 - co2 - o2).max(0.0),
        }
    }
}

/// Reference description of a growth medium, resolved by name from the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediumProfile {
    pub medium_id: String,
    pub medium_name: String,
    /// Glucose in mg/L.
    pub glucose: Measurement<f64>,
    /// Osmolality in mOsm/kg.
    pub osmolality: Measurement<f64>,
    /// Bicarbonate buffer in mM. Sets the pH reached at a given headspace CO2.
    pub bicarbonate: Measurement<f64>,
    #[serde(default)]
    pub growth_factors: f64,
}
