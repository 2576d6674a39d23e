use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::wsse::Credentials;
use crate::{Result, RosterError};

pub const CACHE_FILE: &str = "roster-cache.json";
pub const ASSETS_FOLDER: &str = "assets";
pub const IMAGE_EXTENSION: &str = "png";
pub const PLACEHOLDER_SENTINEL: &str = "default.png";
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

pub const DIRECTORY_BASE: &str = "http://www.cs.princeton.edu/people/";
pub const DIRECTORY_CATEGORIES: [&str; 6] = [
    "faculty",
    "research",
    "researchinstructors",
    "restech",
    "admins",
    "grad",
];

pub const REMOTE_API_BASE: &str =
    "https://tigerbook.herokuapp.com/api/v1/undergraduates/";
pub const REMOTE_IMAGE_BASE: &str = "https://tigerbook.herokuapp.com/images/";

/// Everything a run needs to know about where state lives and which
/// endpoints to talk to.
#[derive(Clone, Debug)]
pub struct Config {
    pub cache_file: PathBuf,
    pub assets_dir: PathBuf,
    pub image_extension: String,
    pub placeholder: String,
    pub timeout: Duration,
    pub directory_base: Url,
    pub directory_categories: Vec<String>,
    pub api_base: Url,
    pub image_base: Url,
    pub credentials: Credentials,
}

impl Config {
    pub fn new() -> Result<Self> {
        Ok(Self {
            cache_file: PathBuf::from(CACHE_FILE),
            assets_dir: PathBuf::from(ASSETS_FOLDER),
            image_extension: IMAGE_EXTENSION.to_owned(),
            placeholder: PLACEHOLDER_SENTINEL.to_owned(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            directory_base: Url::parse(DIRECTORY_BASE)?,
            directory_categories: DIRECTORY_CATEGORIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            api_base: Url::parse(REMOTE_API_BASE)?,
            image_base: Url::parse(REMOTE_IMAGE_BASE)?,
            credentials: Credentials::default(),
        })
    }
}

/// `Url::join` drops the last path segment unless the base ends in `/`.
pub fn as_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// `base` with `segment` appended as exactly one path segment. Slashes and
/// percent signs inside `segment` are escaped; `.` and `..` are refused
/// since they would address `base` or its parent.
pub fn child_url(base: &Url, segment: &str) -> Result<Url> {
    if matches!(segment, "" | "." | "..") {
        return Err(RosterError::Parse(format!(
            "{:?} is not a path segment",
            segment
        )));
    }
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| RosterError::Parse(format!("{} cannot be a base", base)))?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}
