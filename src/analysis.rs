use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("failed to launch analyzer `{command}`: {source}")]
    Launch {
        command: String,
        source: std::io::Error,
    },
    #[error("analyzer exited with {status} for {path}: {stderr}")]
    Failed {
        status: String,
        path: String,
        stderr: String,
    },
    #[error("analyzer produced unparseable output for {path}: {source}")]
    BadOutput {
        path: String,
        source: serde_json::Error,
    },
}

/// The four-feature fingerprint of a track.
///
/// Produced by the external analyzer; treated as an opaque payload except
/// for the companion metric functions below.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub tempo: f64,
    pub amplitude: f64,
    pub frequency: f64,
    pub attack: f64,
}

/// Feature extraction collaborator.
///
/// Implemented by `CommandAnalyzer` in production and by a scripted fake in
/// tests, so the ingest pipeline and sync driver never depend on a real
/// decoder being installed.
pub trait Analyzer {
    fn analyze(&self, path: &Path) -> Result<FeatureVector, AnalysisError>;
}

/// Runs an external analyzer executable and parses its JSON output.
///
/// The command is invoked as `<command> <absolute path>` and must print a
/// single JSON object with `tempo`, `amplitude`, `frequency` and `attack`
/// fields on stdout.
pub struct CommandAnalyzer {
    command: String,
}

impl CommandAnalyzer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Analyzer for CommandAnalyzer {
    fn analyze(&self, path: &Path) -> Result<FeatureVector, AnalysisError> {
        let output = Command::new(&self.command)
            .arg(path)
            .output()
            .map_err(|source| AnalysisError::Launch {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(AnalysisError::Failed {
                status: output.status.to_string(),
                path: path.display().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_features(&output.stdout).map_err(|source| AnalysisError::BadOutput {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Parse the analyzer's stdout into a feature vector.
pub fn parse_features(stdout: &[u8]) -> Result<FeatureVector, serde_json::Error> {
    serde_json::from_slice(stdout)
}

/// Euclidean distance between two feature vectors (lower = more similar).
pub fn distance(a: &FeatureVector, b: &FeatureVector) -> f64 {
    ((a.tempo - b.tempo).powi(2)
        + (a.amplitude - b.amplitude).powi(2)
        + (a.frequency - b.frequency).powi(2)
        + (a.attack - b.attack).powi(2))
    .sqrt()
}

/// Cosine similarity between two feature vectors (1 = identical direction).
pub fn cosine_similarity(a: &FeatureVector, b: &FeatureVector) -> f64 {
    let dot = a.tempo * b.tempo
        + a.amplitude * b.amplitude
        + a.frequency * b.frequency
        + a.attack * b.attack;
    let norm_a =
        (a.tempo.powi(2) + a.amplitude.powi(2) + a.frequency.powi(2) + a.attack.powi(2)).sqrt();
    let norm_b =
        (b.tempo.powi(2) + b.amplitude.powi(2) + b.frequency.powi(2) + b.attack.powi(2)).sqrt();

    let denom = norm_a * norm_b;
    if denom < 1e-10 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(tempo: f64, amplitude: f64, frequency: f64, attack: f64) -> FeatureVector {
        FeatureVector {
            tempo,
            amplitude,
            frequency,
            attack,
        }
    }

    #[test]
    fn test_distance_identical() {
        let a = v(120.0, 0.5, 440.0, 0.1);
        assert!(distance(&a, &a).abs() < 1e-10);
    }

    #[test]
    fn test_distance_unit_axes() {
        let a = v(1.0, 0.0, 0.0, 0.0);
        let b = v(0.0, 1.0, 0.0, 0.0);
        assert!((distance(&a, &b) - 2.0_f64.sqrt()).abs() < 1e-10);
    }

    #[test]
    fn test_cosine_identical() {
        let a = v(1.0, 2.0, 3.0, 4.0);
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = v(1.0, 0.0, 0.0, 0.0);
        let b = v(0.0, 1.0, 0.0, 0.0);
        assert!(cosine_similarity(&a, &b).abs() < 1e-10);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = v(1.0, 2.0, 3.0, 4.0);
        let b = v(-1.0, -2.0, -3.0, -4.0);
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_cosine_zero_vector() {
        let a = v(0.0, 0.0, 0.0, 0.0);
        let b = v(1.0, 2.0, 3.0, 4.0);
        assert!(cosine_similarity(&a, &b).abs() < 1e-10);
    }

    #[test]
    fn test_parse_features() {
        let out = br#"{"tempo": 120.5, "amplitude": 0.8, "frequency": 440.0, "attack": 0.02}"#;
        let fv = parse_features(out).unwrap();
        assert!((fv.tempo - 120.5).abs() < 1e-10);
        assert!((fv.attack - 0.02).abs() < 1e-10);
    }

    #[test]
    fn test_parse_features_rejects_garbage() {
        assert!(parse_features(b"not json").is_err());
        assert!(parse_features(br#"{"tempo": 1.0}"#).is_err());
    }
}
