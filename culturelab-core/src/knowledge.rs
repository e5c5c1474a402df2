use crate::error::CultureError;
use culturelab_schemas::{
    environment::MediumProfile,
    file_formats::{MediumFile, SpeciesFile},
    species::SpeciesProfile,
};
use std::{collections::HashMap, fs, path::Path, sync::Arc};

/// Reference data: species profiles and media, keyed by id.
///
/// Profiles are handed out as shared `Arc`s so populations can hold them for their
/// whole lifetime without the knowledge base being able to change them underneath.
#[derive(Debug, Default, Clone)]
pub struct KnowledgeBase {
    species: HashMap<String, Arc<SpeciesProfile>>,
    media: HashMap<String, MediumProfile>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `species/*.yaml` and `media/*.yaml` under `base_path`.
    pub fn load(base_path: &str) -> Result<Self, CultureError> {
        tracing::info!(path = base_path, "loading knowledge base");

        let species = load_yaml_files_into_map(
            Path::new(base_path).join("species"),
            |file: SpeciesFile| file.species,
            |item: &SpeciesProfile| item.species_id.clone(),
        )?;
        let media = load_yaml_files_into_map(
            Path::new(base_path).join("media"),
            |file: MediumFile| file.media,
            |item: &MediumProfile| item.medium_id.clone(),
        )?;

        for profile in species.values() {
            validate_species(profile)?;
        }

        tracing::info!(
            species = species.len(),
            media = media.len(),
            "knowledge base loaded"
        );
        Ok(Self {
            species: species.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
            media,
        })
    }

    pub fn insert_species(&mut self, profile: SpeciesProfile) -> Result<(), CultureError> {
        validate_species(&profile)?;
        self.species
            .insert(profile.species_id.clone(), Arc::new(profile));
        Ok(())
    }

    pub fn insert_medium(&mut self, medium: MediumProfile) {
        self.media.insert(medium.medium_id.clone(), medium);
    }

    /// Finds a species by id, or failing that by case-insensitive name.
    pub fn resolve(&self, id_or_name: &str) -> Result<Arc<SpeciesProfile>, CultureError> {
        let key = id_or_name.trim();
        self.species
            .get(key)
            .or_else(|| {
                self.species
                    .values()
                    .find(|p| {
                        p.species_id.eq_ignore_ascii_case(key)
                            || p.species_name.eq_ignore_ascii_case(key)
                    })
            })
            .cloned()
            .ok_or_else(|| CultureError::SpeciesNotFound(key.to_string()))
    }

    pub fn resolve_medium(&self, id_or_name: &str) -> Result<&MediumProfile, CultureError> {
        let key = id_or_name.trim();
        self.media
            .get(key)
            .or_else(|| {
                self.media
                    .values()
                    .find(|m| {
                        m.medium_id.eq_ignore_ascii_case(key)
                            || m.medium_name.eq_ignore_ascii_case(key)
                    })
            })
            .ok_or_else(|| CultureError::MediumNotFound(key.to_string()))
    }

    pub fn species_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.species.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// Rejects profiles the growth model cannot run: a non-positive doubling time or
/// capacity, negative rates, inverted tolerance ranges, or thresholds outside `[0, 1]`.
pub fn validate_species(profile: &SpeciesProfile) -> Result<(), CultureError> {
    let invalid = |reason: String| CultureError::InvalidSpecies {
        id: profile.species_id.clone(),
        reason,
    };
    let positive = [
        ("doubling_time_h", profile.doubling_time_h),
        ("max_density", profile.max_density),
    ];
    for (name, value) in positive {
        if !(value > 0.0) || !value.is_finite() {
            return Err(invalid(format!("{} must be positive, got {}", name, value)));
        }
    }
    let rates = [
        ("glucose_consumption_rate", profile.glucose_consumption_rate),
        ("oxygen_consumption_rate", profile.oxygen_consumption_rate),
        ("waste_production_rate", profile.waste_production_rate),
    ];
    for (name, value) in rates {
        if !(value >= 0.0) || !value.is_finite() {
            return Err(invalid(format!("{} must be non-negative, got {}", name, value)));
        }
    }
    let fractions = [
        ("viability_threshold", profile.viability_threshold),
        ("apoptosis_threshold", profile.apoptosis_threshold),
    ];
    for (name, value) in fractions {
        if !(0.0..=1.0).contains(&value) {
            return Err(invalid(format!("{} must lie in [0, 1], got {}", name, value)));
        }
    }
    let ranges = [
        ("temperature_range", profile.temperature_range, profile.optimal_temperature),
        ("ph_range", profile.ph_range, profile.optimal_ph),
    ];
    for (name, range, optimum) in ranges {
        if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
            return Err(invalid(format!("{} [{}, {}] is not a range", name, range.min, range.max)));
        }
        if !optimum.is_finite() {
            return Err(invalid(format!("optimum for {} is not a number", name)));
        }
    }
    Ok(())
}

/// Generic helper to load all YAML files in a directory into a HashMap.
fn load_yaml_files_into_map<P, F, E, T, K>(
    dir_path: P,
    extract_vec: E,
    get_key: K,
) -> Result<HashMap<String, T>, CultureError>
where
    P: AsRef<Path>,
    F: for<'de> serde::Deserialize<'de>, // The file wrapper struct (e.g., SpeciesFile)
    E: Fn(F) -> Vec<T>,                  // A closure to extract the Vec<T> from the wrapper
    K: Fn(&T) -> String,                 // A closure to get the key for the map from an item T
{
    let dir = dir_path.as_ref();
    let display = dir.display().to_string();
    let mut map = HashMap::new();
    for entry in fs::read_dir(dir).map_err(|e| CultureError::FileIO(display.clone(), e))? {
        let entry = entry.map_err(|e| CultureError::FileIO(display.clone(), e))?;
        let path = entry.path();
        if path.is_file() && path.extension().map_or(false, |s| s == "yaml" || s == "yml") {
            let path_str = path.display().to_string();
            let content =
                fs::read_to_string(&path).map_err(|e| CultureError::FileIO(path_str.clone(), e))?;
            let file_wrapper: F = serde_yaml::from_str(&content)
                .map_err(|e| CultureError::YamlParsing(path_str.clone(), e))?;

            for item in extract_vec(file_wrapper) {
                map.insert(get_key(&item), item);
            }
        }
    }
    Ok(map)
}
