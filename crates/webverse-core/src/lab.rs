use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";

/// Lab difficulty tier. Unknown labels are kept verbatim and sort after the known tiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Master,
    Other(String),
}

impl Difficulty {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "easy" => Difficulty::Easy,
            "medium" => Difficulty::Medium,
            "hard" => Difficulty::Hard,
            "master" => Difficulty::Master,
            _ => Difficulty::Other(raw.trim().to_string()),
        }
    }

    pub fn sort_rank(&self) -> u8 {
        match self {
            Difficulty::Easy => 0,
            Difficulty::Medium => 1,
            Difficulty::Hard => 2,
            Difficulty::Master => 3,
            Difficulty::Other(_) => u8::MAX,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Master => "master",
            Difficulty::Other(raw) => raw,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Difficulty {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Connection info shown to the player. `base_url` is the only field the launcher reads;
/// anything else in the descriptor is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entrypoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposeProject {
    pub dir: PathBuf,
    pub compose_file: String,
}

impl ComposeProject {
    pub fn new(dir: impl Into<PathBuf>, compose_file: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            compose_file: compose_file.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lab {
    pub id: String,
    pub name: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub path: PathBuf,
    pub compose_file: String,
    pub entrypoint: Entrypoint,
    /// Lowercase hex SHA-256 of the flag, empty when the lab has none configured.
    pub flag_sha256: String,
}

impl Lab {
    pub fn base_url(&self) -> Option<&str> {
        self.entrypoint
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn has_flag(&self) -> bool {
        !self.flag_sha256.trim().is_empty()
    }

    pub fn compose_project(&self) -> ComposeProject {
        ComposeProject::new(self.path.clone(), self.compose_file.clone())
    }

    /// Lowercased haystack used by the browse filter.
    pub fn search_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.name, self.id, self.difficulty, self.description
        )
        .to_lowercase()
    }
}
