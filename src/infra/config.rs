use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub url: String,
    pub token: String,
}

/// A tag offered as its own input in the add and edit forms.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagField {
    #[serde(alias = "tagName")]
    pub name: String,
    #[serde(alias = "tagValueExample")]
    pub example: String,
    #[serde(alias = "charLimit")]
    pub char_limit: usize,
    pub width: u16,
    pub position: u32,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagColor {
    #[serde(alias = "tagName")]
    pub tag_name: String,
    #[serde(alias = "tagValue")]
    pub tag_value: String,
    pub color: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableColors {
    pub header: String,
    pub even: String,
    pub odd: String,
}

impl Default for TableColors {
    fn default() -> Self {
        Self {
            header: "#EEEEEE".to_string(),
            even: "#808080".to_string(),
            odd: "#EEEEEE".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorsConfig {
    pub tags: Vec<TagColor>,
    pub table: TableColors,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth: AuthConfig,
    pub tags: Vec<TagField>,
    pub colors: ColorsConfig,
    pub request_timeout_secs: u64,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
            tags: Vec::new(),
            colors: ColorsConfig::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            log_file: None,
        }
    }
}

impl Config {
    /// Tag fields in form order.
    pub fn tag_fields(&self) -> Vec<TagField> {
        let mut fields = self.tags.clone();
        fields.sort_by_key(|field| field.position);
        fields
    }
}

#[derive(Debug, Error)]
pub enum ResolveConfigPathError {
    #[error("home directory not found")]
    HomeDirNotFound,
}

#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to read config {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("config {path} has no auth url or token")]
    MissingAuth { path: String },
}

#[derive(Debug, Error)]
pub enum SaveConfigError {
    #[error("failed to encode config: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write config: {0}")]
    Write(#[from] io::Error),
}

pub fn resolve_config_path() -> Result<PathBuf, ResolveConfigPathError> {
    if let Some(override_path) = std::env::var_os("TRAGGO_CONSOLE_CONFIG") {
        return Ok(PathBuf::from(override_path));
    }

    let Some(home) = dirs::home_dir() else {
        return Err(ResolveConfigPathError::HomeDirNotFound);
    };
    Ok(home.join(".config").join("traggo_cli").join("config.json"))
}

pub fn load_config(path: &Path) -> Result<Config, LoadConfigError> {
    let display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| LoadConfigError::Read {
        path: display.clone(),
        source,
    })?;
    let config = parse_config(&raw, &display)?;

    if config.auth.url.trim().is_empty() || config.auth.token.trim().is_empty() {
        return Err(LoadConfigError::MissingAuth { path: display });
    }
    Ok(config)
}

/// Like [`load_config`] but a missing file or missing auth is not an error.
/// Used when the auth section is about to be written.
pub fn read_config_or_default(path: &Path) -> Result<Config, LoadConfigError> {
    let display = path.display().to_string();
    match fs::read_to_string(path) {
        Ok(raw) => parse_config(&raw, &display),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
        Err(source) => Err(LoadConfigError::Read {
            path: display,
            source,
        }),
    }
}

fn parse_config(raw: &str, display: &str) -> Result<Config, LoadConfigError> {
    serde_json::from_str(raw).map_err(|source| LoadConfigError::Parse {
        path: display.to_string(),
        source,
    })
}

pub fn save_config(path: &Path, config: &Config) -> Result<(), SaveConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("json.tmp");
    let text = serde_json::to_string_pretty(config)?;
    fs::write(&tmp, text)?;
    fs::rename(tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Config {
        Config {
            auth: AuthConfig {
                url: "https://traggo.example/graphql".to_string(),
                token: "abc".to_string(),
            },
            tags: vec![
                TagField {
                    name: "type".to_string(),
                    example: "dev".to_string(),
                    char_limit: 10,
                    width: 10,
                    position: 1,
                },
                TagField {
                    name: "ticket".to_string(),
                    example: "AA-1234".to_string(),
                    char_limit: 20,
                    width: 20,
                    position: 0,
                },
            ],
            ..Config::default()
        }
    }

    #[test]
    fn save_then_load_keeps_every_field() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");

        save_config(&path, &sample()).expect("save");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, sample());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"auth":{"url":"http://x","token":"t"}}"#).expect("write");

        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(loaded.colors.table.even, "#808080");
        assert!(loaded.tags.is_empty());
        assert_eq!(loaded.log_file, None);
    }

    #[test]
    fn accepts_camel_case_color_rules() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r##"{"auth":{"url":"http://x","token":"t"},"colors":{"tags":[{"tagName":"type","tagValue":"meeting","color":"#FF06B7"}]}}"##,
        )
        .expect("write");

        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded.colors.tags[0].tag_name, "type");
        assert_eq!(loaded.colors.tags[0].tag_value, "meeting");
    }

    #[test]
    fn missing_file_and_missing_auth_are_errors() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        assert!(matches!(load_config(&path), Err(LoadConfigError::Read { .. })));

        fs::write(&path, "{}").expect("write");
        assert!(matches!(
            load_config(&path),
            Err(LoadConfigError::MissingAuth { .. })
        ));
    }

    #[test]
    fn tag_fields_are_sorted_by_position() {
        let names: Vec<String> = sample()
            .tag_fields()
            .into_iter()
            .map(|field| field.name)
            .collect();
        assert_eq!(names, vec!["ticket", "type"]);
    }

    #[test]
    fn read_or_default_keeps_existing_sections() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        assert_eq!(read_config_or_default(&path).expect("missing"), Config::default());

        let mut config = sample();
        config.auth = AuthConfig::default();
        save_config(&path, &config).expect("save");
        let loaded = read_config_or_default(&path).expect("read");
        assert_eq!(loaded.tags, config.tags);
    }
}
