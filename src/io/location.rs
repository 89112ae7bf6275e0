use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where a manifest, tile set or volume lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A local file or directory
    Local(PathBuf),

    /// An S3 object or prefix. `prefix` has no leading or trailing `/`.
    S3 { bucket: String, prefix: String },
}

impl Location {
    /// Parse `s3://bucket/prefix`, `file:///path` or a plain path.
    pub fn parse(value: &str) -> Result<Self, String> {
        if let Some(rest) = value.strip_prefix("s3://") {
            let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
            if bucket.is_empty() {
                return Err(format!("'{}' has no bucket name", value));
            }
            return Ok(Location::S3 {
                bucket: bucket.to_string(),
                prefix: prefix.trim_matches('/').to_string(),
            });
        }

        let path = value.strip_prefix("file://").unwrap_or(value);
        if path.is_empty() {
            return Err("empty path".to_string());
        }
        Ok(Location::Local(PathBuf::from(path)))
    }

    /// Split a file location into its parent directory and file name.
    ///
    /// Returns `None` when the location has no file component
    /// (`s3://bucket`, `/`).
    pub fn split_file(&self) -> Option<(Location, String)> {
        match self {
            Location::Local(path) => {
                let name = path.file_name()?.to_string_lossy().into_owned();
                let parent = match path.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                    _ => PathBuf::from("."),
                };
                Some((Location::Local(parent), name))
            }
            Location::S3 { bucket, prefix } => {
                if prefix.is_empty() {
                    return None;
                }
                let (dir, name) = prefix.rsplit_once('/').unwrap_or(("", prefix));
                Some((
                    Location::S3 {
                        bucket: bucket.clone(),
                        prefix: dir.to_string(),
                    },
                    name.to_string(),
                ))
            }
        }
    }
}

impl FromStr for Location {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::parse(s)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::S3 { bucket, prefix } if prefix.is_empty() => write!(f, "s3://{}/", bucket),
            Location::S3 { bucket, prefix } => write!(f, "s3://{}/{}/", bucket, prefix),
        }
    }
}
