use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::{Deserialize, Deserializer};
use structopt::StructOpt;

use crate::error::{Error, Result};
use crate::samplesheet::Layout;

pub const DEFAULT_SPREADSHEET_URL: &str = "https://docs.google.com/spreadsheets/d/e/2PACX-1vSoiTDfPrIDbMNMqt_0QYY-rLXXofBRaP38nuwcNbvTpwniaYadKLIiRuCwISPT60F4rWSNoY6pO82R/";
pub const DEFAULT_DATA_DIRECTORY: &str = "../Cichlid_database/data";

/// Imports cichlid sample metadata from iRODS exports and spreadsheets into the tracking database.
#[derive(StructOpt, Debug)]
pub struct Opt {
    /// Replace differing fields in place instead of keeping the previous version
    #[structopt(short, long)]
    pub overwrite: bool,

    /// Log every decision and statement
    #[structopt(short, long)]
    pub verbose: bool,

    /// JSON file with the database connection details
    #[structopt(short, long, default_value = "Cichlid_Population_db.json", parse(from_os_str))]
    pub config: PathBuf,

    /// iRODS metadata export (JSON)
    #[structopt(short, long, parse(from_os_str))]
    pub json: Option<PathBuf>,

    /// 'sequenced', 'samples', 'input', 'mlw', 'images', a sheet URL or a file
    #[structopt(short, long)]
    pub spreadsheet: Option<String>,

    /// Column layout of the spreadsheet, if it can't be told from its location
    #[structopt(long)]
    pub layout: Option<Layout>,

    /// DB connection URI, takes precedence over the config file
    #[structopt(long, env = "DATABASE_URL")]
    pub connstr: Option<String>,

    /// Don't look species up in the NCBI taxonomy
    #[structopt(long)]
    pub offline: bool,

    /// Import everything, then roll back
    #[structopt(long)]
    pub dry_run: bool,

    /// Write the log to this file instead of stderr
    #[structopt(long, parse(from_os_str))]
    pub log_file: Option<PathBuf>,
}

fn port<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<u16>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }
    match Option::<Port>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Port::Number(p)) => Ok(Some(p)),
        Some(Port::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port {:?}", s))),
    }
}

fn default_data_directory() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIRECTORY)
}

fn default_spreadsheet_url() -> String {
    String::from(DEFAULT_SPREADSHEET_URL)
}

/// Contents of the JSON config file.
#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(rename = "vpUser", default)]
    pub user: Option<String>,
    #[serde(rename = "vpPassword", default)]
    pub password: Option<String>,
    #[serde(rename = "vpHost", default)]
    pub host: Option<String>,
    #[serde(rename = "vpPort", default, deserialize_with = "port")]
    pub port: Option<u16>,
    #[serde(rename = "vpInstance", default)]
    pub instance: Option<String>,
    /// Where dated log files go when no `--log-file` is given
    #[serde(rename = "resultFileDir", default)]
    pub result_dir: Option<PathBuf>,
    /// Location of the mlw dump and the image list
    #[serde(rename = "dataDirectory", default = "default_data_directory")]
    pub data_directory: PathBuf,
    /// Published Google sheet the named tabs belong to
    #[serde(rename = "spreadsheetUrl", default = "default_spreadsheet_url")]
    pub spreadsheet_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            user: None,
            password: None,
            host: None,
            port: None,
            instance: None,
            result_dir: None,
            data_directory: default_data_directory(),
            spreadsheet_url: default_spreadsheet_url(),
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads the config file. A missing file is fine when the connection
    /// string comes from elsewhere.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        if !required && !path.exists() {
            return Ok(Settings::default());
        }
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn database_url(&self) -> Result<String> {
        let missing = |key: &str| Error::Config(format!("{} is not set", key));
        let user = self.user.as_deref().ok_or_else(|| missing("vpUser"))?;
        let host = self.host.as_deref().ok_or_else(|| missing("vpHost"))?;
        let instance = self.instance.as_deref().ok_or_else(|| missing("vpInstance"))?;
        let invalid = |key: &str| Error::Config(format!("{} doesn't fit in a connection URL", key));

        let mut url = Url::parse("mysql://localhost").map_err(|_| Error::InvalidUrl(String::from("mysql://localhost")))?;
        url.set_host(Some(host)).map_err(|_| invalid("vpHost"))?;
        url.set_username(user).map_err(|_| invalid("vpUser"))?;
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password)).map_err(|_| invalid("vpPassword"))?;
        }
        url.set_port(self.port).map_err(|_| invalid("vpPort"))?;
        url.set_path(&format!("/{}", instance));
        Ok(url.to_string())
    }
}
