use thiserror::Error;

#[derive(Debug, Error)]
pub enum CultureError {
    #[error("Species '{0}' not found in the knowledge base")]
    SpeciesNotFound(String),

    #[error("Species '{id}' has an invalid profile: {reason}")]
    InvalidSpecies { id: String, reason: String },

    #[error("Medium '{0}' not found in the knowledge base")]
    MediumNotFound(String),

    #[error("Inlet gas fractions must sum to 100% (±{tolerance}), got {total:.3}%")]
    InvalidGasMix { total: f64, tolerance: f64 },

    #[error("Volume must be positive, got {0}")]
    InvalidVolume(f64),

    #[error("Plate grid must be at least 3x3, got {width}x{height}")]
    InvalidGrid { width: usize, height: usize },

    #[error("Grid cell ({x}, {y}) lies outside the plate")]
    OutOfGrid { x: usize, y: usize },

    #[error("Invalid value for setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("Unknown runtime parameter '{0}'")]
    UnknownParameter(String),

    #[error("Experiment start blocked: {}", .0.join("; "))]
    StartBlocked(Vec<String>),

    #[error("Numeric fault during tick: {0}")]
    RuntimeComputation(String),

    #[error("I/O error for file '{0}': {1}")]
    FileIO(String, #[source] std::io::Error),

    #[error("Failed to parse YAML from '{0}': {1}")]
    YamlParsing(String, #[source] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Failed to process CSV file '{0}': {1}")]
    CsvError(String, #[source] csv::Error),
}

/// A reason a PI loop skipped its evaluation for one tick.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControllerFault {
    #[error("setpoint is not a number")]
    InvalidSetpoint,

    #[error("measurement unavailable")]
    MissingMeasurement,
}
