//! Plate-style spatial environment: one 2-D field per compound, coupled by diffusion.

use super::{clamp_slot, kinetics, scoring, Chemistry, Flux, GrowthOptimum, Physical, Reading};
use crate::error::CultureError;
use culturelab_schemas::environment::Compound;
use kinetics::DiffusionCoefficients;
use std::collections::BTreeMap;

/// A row-major scalar field over the plate.
///
/// The outermost ring of cells is a ghost border that mirrors its interior neighbour,
/// which gives zero flux across the plate edge. Plate quantities such as the mean are
/// taken over the interior only.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    width: usize,
    height: usize,
    values: Vec<f64>,
}

impl Field {
    pub fn filled(width: usize, height: usize, value: f64) -> Self {
        Self {
            width,
            height,
            values: vec![value; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn index(&self, x: usize, y: usize) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y * self.width + x)
    }

    /// Value at `(x, y)`, or `None` outside the field.
    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        self.index(x, y).map(|i| self.values[i])
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Mean over the interior cells.
    pub fn mean(&self) -> f64 {
        let (w, h) = (self.width, self.height);
        if w < 3 || h < 3 {
            return 0.0;
        }
        let sum: f64 = (1..h - 1)
            .map(|y| self.values[y * w + 1..y * w + w - 1].iter().sum::<f64>())
            .sum();
        sum / ((w - 2) * (h - 2)) as f64
    }

    fn clamp_non_negative(&mut self) -> usize {
        self.values.iter_mut().map(clamp_slot).sum()
    }

    /// One explicit step of the 5-point Laplacian with zero-flux borders.
    ///
    /// Interior cells take `weight * (sum of 4 neighbours - 4 * self)`. Each border row
    /// and column is overwritten by its adjacent interior row or column both before the
    /// stencil and after it, so no mass crosses the edge.
    fn diffuse(&mut self, weight: f64) {
        let (w, h) = (self.width, self.height);
        self.mirror_borders();
        let old = self.values.clone();
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let i = y * w + x;
                let laplacian = old[i - 1] + old[i + 1] + old[i - w] + old[i + w] - 4.0 * old[i];
                self.values[i] = old[i] + weight * laplacian;
            }
        }
        self.mirror_borders();
    }

    fn mirror_borders(&mut self) {
        let (w, h) = (self.width, self.height);
        for x in 0..w {
            self.values[x] = self.values[w + x];
            self.values[(h - 1) * w + x] = self.values[(h - 2) * w + x];
        }
        for y in 0..h {
            self.values[y * w] = self.values[y * w + 1];
            self.values[y * w + w - 1] = self.values[y * w + w - 2];
        }
    }
}

/// An agar-plate environment.
///
/// Temperature, pH and headspace gas are plate-wide; compounds vary per cell.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateGrid {
    pub(crate) physical: Physical,
    width: usize,
    height: usize,
    fields: Vec<Field>,
    pub(crate) extra: BTreeMap<String, f64>,
    diffusion: DiffusionCoefficients,
}

impl PlateGrid {
    pub fn new(chemistry: &Chemistry, width: usize, height: usize) -> Result<Self, CultureError> {
        if width < 3 || height < 3 {
            return Err(CultureError::InvalidGrid { width, height });
        }
        let physical = Physical::from_chemistry(chemistry)?;
        let fields = Compound::ALL
            .iter()
            .map(|c| Field::filled(width, height, chemistry.concentrations.get(*c).max(0.0)))
            .collect();
        Ok(Self {
            physical,
            width,
            height,
            fields,
            extra: chemistry.concentrations.extra.clone(),
            diffusion: DiffusionCoefficients::default(),
        })
    }

    pub fn with_diffusion(mut self, diffusion: DiffusionCoefficients) -> Self {
        self.diffusion = diffusion;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn field(&self, compound: Compound) -> &Field {
        &self.fields[compound.index()]
    }

    fn field_mut(&mut self, compound: Compound) -> &mut Field {
        &mut self.fields[compound.index()]
    }

    pub(crate) fn update(&mut self, dt_h: f64) -> usize {
        let saturation = kinetics::oxygen_saturation(self.physical.inlet_o2);
        let kla = kinetics::oxygen_transfer_rate(self.physical.aeration_lpm, self.physical.stirring_rpm);
        for compound in Compound::ALL {
            let decay = kinetics::decay_rate(compound);
            let field = self.field_mut(compound);
            match (compound, decay) {
                (_, Some(rate)) => {
                    let factor = kinetics::relaxation_factor(rate, dt_h);
                    field.values.iter_mut().for_each(|v| *v -= *v * factor);
                }
                (Compound::Oxygen, None) => {
                    let factor = kinetics::relaxation_factor(kla, dt_h);
                    field.values.iter_mut().for_each(|v| *v += (saturation - *v) * factor);
                }
                _ => {}
            }
        }

        let mut clamped = 0;
        for compound in Compound::ALL {
            let (steps, weight) = kinetics::diffusion_substeps(self.diffusion.get(compound), dt_h);
            let field = self.field_mut(compound);
            for _ in 0..steps {
                field.diffuse(weight);
            }
            clamped += field.clamp_non_negative();
        }

        let waste = self.field(Compound::Waste).mean();
        self.physical.relax(waste, dt_h);
        clamped
    }

    /// Population uptake is spread evenly over the plate.
    pub(crate) fn apply_flux(&mut self, flux: &Flux) -> usize {
        let deltas = [
            (Compound::Glucose, -flux.glucose),
            (Compound::Oxygen, -flux.oxygen),
            (Compound::Waste, flux.waste),
        ];
        let mut clamped = 0;
        for (compound, delta) in deltas {
            let field = self.field_mut(compound);
            field.values.iter_mut().for_each(|v| *v += delta);
            clamped += field.clamp_non_negative();
        }
        clamped
    }

    pub(crate) fn add_uniform(&mut self, compound: Compound, delta: f64) {
        let field = self.field_mut(compound);
        field.values.iter_mut().for_each(|v| *v += delta);
        field.clamp_non_negative();
    }

    /// Places `amount_mg` in a single cell, as from a disc or a spot.
    ///
    /// A border coordinate lands on the nearest interior cell, since the border only
    /// mirrors its neighbour.
    pub(crate) fn dose_at(
        &mut self,
        compound: Compound,
        amount_mg: f64,
        x: usize,
        y: usize,
    ) -> Result<f64, CultureError> {
        if x >= self.width || y >= self.height {
            return Err(CultureError::OutOfGrid { x, y });
        }
        // One interior cell holds 1/((w-2)*(h-2)) of the plate volume.
        let cells = ((self.width - 2) * (self.height - 2)) as f64;
        let delta = self.physical.mass_to_concentration(amount_mg)? * cells;
        let x = x.clamp(1, self.width - 2);
        let y = y.clamp(1, self.height - 2);
        let width = self.width;
        let field = self.field_mut(compound);
        let slot = &mut field.values[y * width + x];
        *slot = (*slot + delta).max(0.0);
        field.mirror_borders();
        Ok(delta)
    }

    pub(crate) fn dilute(&mut self, factor: f64) {
        for compound in Compound::ALL {
            if compound != Compound::Oxygen {
                self.field_mut(compound).values.iter_mut().for_each(|v| *v *= factor);
            }
        }
        self.extra.values_mut().for_each(|v| *v *= factor);
    }

    /// Conditions at one cell.
    ///
    /// # Errors
    ///
    /// Returns `CultureError::OutOfGrid` when `(x, y)` lies outside the plate.
    pub fn reading_at(&self, x: usize, y: usize) -> Result<Reading, CultureError> {
        let at = |compound: Compound| {
            self.field(compound)
                .get(x, y)
                .ok_or(CultureError::OutOfGrid { x, y })
        };
        Ok(Reading {
            temperature: self.physical.temperature,
            ph: self.physical.ph,
            oxygen: at(Compound::Oxygen)?,
            glucose: at(Compound::Glucose)?,
            antibiotics: at(Compound::Antibiotics)?,
            toxins: at(Compound::Toxins)?,
            waste: at(Compound::Waste)?,
            growth_factors: at(Compound::GrowthFactors)?,
        })
    }

    pub fn mean_reading(&self) -> Reading {
        Reading {
            temperature: self.physical.temperature,
            ph: self.physical.ph,
            oxygen: self.field(Compound::Oxygen).mean(),
            glucose: self.field(Compound::Glucose).mean(),
            antibiotics: self.field(Compound::Antibiotics).mean(),
            toxins: self.field(Compound::Toxins).mean(),
            waste: self.field(Compound::Waste).mean(),
            growth_factors: self.field(Compound::GrowthFactors).mean(),
        }
    }

    pub fn stress_at(
        &self,
        x: usize,
        y: usize,
        optimum: &GrowthOptimum,
    ) -> Result<f64, CultureError> {
        Ok(scoring::stress(&self.reading_at(x, y)?, optimum))
    }

    pub fn growth_potential_at(
        &self,
        x: usize,
        y: usize,
        optimum: &GrowthOptimum,
    ) -> Result<f64, CultureError> {
        Ok(scoring::growth_potential(&self.reading_at(x, y)?, optimum))
    }

    /// Stress of every cell, row-major, for plate displays.
    pub fn stress_map(&self, optimum: &GrowthOptimum) -> Field {
        self.score_map(|reading| scoring::stress(reading, optimum))
    }

    /// Growth potential of every cell, row-major, for plate displays.
    pub fn growth_potential_map(&self, optimum: &GrowthOptimum) -> Field {
        self.score_map(|reading| scoring::growth_potential(reading, optimum))
    }

    fn score_map(&self, score: impl Fn(&Reading) -> f64) -> Field {
        let mut map = Field::filled(self.width, self.height, 0.0);
        for y in 0..self.height {
            for x in 0..self.width {
                if let Ok(reading) = self.reading_at(x, y) {
                    map.values[y * self.width + x] = score(&reading);
                }
            }
        }
        map
    }
}
