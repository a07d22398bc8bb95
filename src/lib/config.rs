use crate::error::{Error, Result};
use chrono::Local;
use log::{warn, LevelFilter};
use serde::Deserialize;
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// A canned query with the coordinates a good answer should be near.
#[derive(Deserialize, Debug, Clone)]
pub struct TestSet {
    pub name: String,
    pub text: String,
    #[serde(default)]
    pub latitude: Vec<f64>,
    #[serde(default)]
    pub longitude: Vec<f64>,
}

fn default_tempdir() -> String {
    env::var("TEMPDIR")
        .ok()
        .filter(|dir| !dir.is_empty())
        .unwrap_or_else(|| "/tmp".to_string())
}

fn default_mapname() -> String {
    "sweden".to_string()
}

fn default_loglevel() -> String {
    "info".to_string()
}

fn default_duplicate_proximity() -> i32 {
    250
}

fn default_max_results() -> usize {
    20
}

/// Runtime configuration, read from a JSON file. Path values support
/// `${mapname}`, `${tempdir}`, `${timestamp}` and `${ENV_VAR}`
/// substitution plus a leading `~/`.
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_tempdir")]
    pub tempdir: String,
    #[serde(default = "default_mapname")]
    pub mapname: String,
    #[serde(default)]
    pub osmpbffilename: Option<String>,
    pub stopwordfilename: String,
    #[serde(default)]
    pub logfile: Option<String>,
    #[serde(default = "default_loglevel")]
    pub loglevel: String,
    #[serde(default = "default_duplicate_proximity")]
    pub duplicate_proximity: i32,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub testsets: Vec<TestSet>,
}

fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = env::var("HOME") {
            return format!("{}/{}", home, rest);
        }
    }
    path.to_string()
}

fn substitute_vars(input: &str, replacements: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(len) => {
                let key = &rest[start + 2..start + 2 + len];
                match replacements.iter().find(|(name, _)| *name == key) {
                    Some((_, value)) => output.push_str(value),
                    None => match env::var(key) {
                        Ok(value) => output.push_str(&value),
                        Err(_) => warn!("no substitution for ${{{}}}", key),
                    },
                }
                rest = &rest[start + 2 + len + 1..];
            }
            None => {
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);
    output
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let file = File::open(path.as_ref())?;
        let mut config: Config = serde_json::from_reader(BufReader::new(file))?;
        config.expand();
        Ok(config)
    }

    /// Resolve variables and `~/` in all path values.
    fn expand(&mut self) {
        self.tempdir = expand_home(&self.tempdir);
        let timestamp = format!(
            "{}-{}",
            Local::now().format("%Y%m%d-%H%M%S"),
            std::process::id()
        );
        let replacements: [(&str, &str); 3] = [
            ("mapname", &self.mapname),
            ("tempdir", &self.tempdir),
            ("timestamp", &timestamp),
        ];
        let expand_field = |value: &str| expand_home(&substitute_vars(value, &replacements));
        self.osmpbffilename = self.osmpbffilename.take().map(|path| expand_field(&path));
        self.stopwordfilename = expand_field(&self.stopwordfilename);
        self.logfile = self.logfile.take().map(|path| expand_field(&path));
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        PathBuf::from(&self.tempdir)
    }

    pub fn log_level(&self) -> Result<LevelFilter> {
        match self.loglevel.as_str() {
            "debug" => Ok(LevelFilter::Debug),
            "info" => Ok(LevelFilter::Info),
            "warn" => Ok(LevelFilter::Warn),
            "error" => Ok(LevelFilter::Error),
            other => Err(Error::Config(format!("unknown log level '{}'", other))),
        }
    }

    /// Initialize the global logger according to `loglevel` and `logfile`.
    pub fn init_logging(&self) -> Result<()> {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(self.log_level()?);
        if let Some(logfile) = &self.logfile {
            let file = File::create(logfile)?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        builder
            .try_init()
            .map_err(|e| Error::Config(format!("cannot initialize logging: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Config {
        let mut config: Config = serde_json::from_str(json).expect("config parses");
        config.expand();
        config
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let config = parse(r#"{ "stopwordfilename": "stopwords.txt" }"#);
        assert_eq!(config.mapname, "sweden");
        assert_eq!(config.duplicate_proximity, 250);
        assert_eq!(config.max_results, 20);
        assert!(config.testsets.is_empty());
        assert!(config.logfile.is_none());
    }

    #[test]
    fn variables_are_substituted_in_paths() {
        let config = parse(
            r#"{
                "tempdir": "/var/cache/geocoder",
                "mapname": "sweden-scania",
                "stopwordfilename": "${tempdir}/${mapname}-stopwords.txt"
            }"#,
        );
        assert_eq!(
            config.stopwordfilename,
            "/var/cache/geocoder/sweden-scania-stopwords.txt"
        );
    }

    #[test]
    fn environment_variables_are_substituted() {
        env::set_var("OSM_TEXT2COORD_TEST_DIR", "/data/osm");
        let config = parse(
            r#"{ "stopwordfilename": "${OSM_TEXT2COORD_TEST_DIR}/stopwords.txt" }"#,
        );
        assert_eq!(config.stopwordfilename, "/data/osm/stopwords.txt");
    }

    #[test]
    fn tilde_expands_to_home() {
        env::set_var("HOME", "/home/tester");
        let config = parse(r#"{ "stopwordfilename": "~/stopwords.txt" }"#);
        assert_eq!(config.stopwordfilename, "/home/tester/stopwords.txt");
    }

    #[test]
    fn unknown_log_levels_are_rejected() {
        let config = parse(r#"{ "stopwordfilename": "s.txt", "loglevel": "chatty" }"#);
        assert!(config.log_level().is_err());
        let config = parse(r#"{ "stopwordfilename": "s.txt", "loglevel": "warn" }"#);
        assert_eq!(config.log_level().unwrap(), LevelFilter::Warn);
    }

    #[test]
    fn testsets_deserialize() {
        let config = parse(
            r#"{
                "stopwordfilename": "s.txt",
                "testsets": [
                    { "name": "E4", "text": "E4 nära Jönköping",
                      "latitude": [57.78], "longitude": [14.16] }
                ]
            }"#,
        );
        assert_eq!(config.testsets.len(), 1);
        assert_eq!(config.testsets[0].latitude, vec![57.78]);
    }
}
