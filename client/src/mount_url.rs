//! URL resolution for the `jdfc` CLI (spec §6): parses an explicit
//! `jdfs://host[:port]/path?opt=val` argument, or — when the URL is
//! omitted — walks up from the mountpoint looking for a `__jdfs_root__`
//! magic file and splices the mountpoint-relative suffix onto the URL
//! it names.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_PORT: u16 = jdfs_proto::ops::DEFAULT_PORT;
const MAGIC_ROOT_FILE: &str = "__jdfs_root__";

#[derive(Debug)]
pub enum ResolveError {
    /// No `__jdfs_root__` found between the mountpoint and the filesystem root.
    NotFound,
    Io(std::io::Error),
    Parse(url::ParseError),
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::NotFound => write!(f, "no {MAGIC_ROOT_FILE} found above the mountpoint"),
            ResolveError::Io(e) => write!(f, "{e}"),
            ResolveError::Parse(e) => write!(f, "{e}"),
        }
    }
}

/// A fully resolved mount target: where to connect, which server-side
/// subtree to export, and the options that came along for the ride.
pub struct MountTarget {
    pub host: String,
    pub port: u16,
    pub jdfs_path: String,
    pub read_only: bool,
    pub extra_options: Vec<(String, String)>,
}

/// Resolves `explicit_url` if given, otherwise searches upward from
/// `mountpoint`. `explicit_url` and the magic file's content are parsed
/// identically.
pub fn resolve(explicit_url: Option<&str>, mountpoint: &Path) -> Result<MountTarget, ResolveError> {
    let url = match explicit_url {
        Some(u) => Url::parse(u).map_err(ResolveError::Parse)?,
        None => find_magic_root(mountpoint)?,
    };
    Ok(into_target(url))
}

fn into_target(url: Url) -> MountTarget {
    let host = url.host_str().unwrap_or("localhost").to_string();
    let port = url.port().unwrap_or(DEFAULT_PORT);
    let mut read_only = false;
    let mut extra_options: Vec<(String, String)> = Vec::new();
    for (key, value) in url.query_pairs() {
        if key == "ro" {
            read_only = true;
        } else {
            let key = key.into_owned();
            let value = value.into_owned();
            match extra_options.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => extra_options.push((key, value)),
            }
        }
    }
    MountTarget {
        host,
        port,
        jdfs_path: url.path().trim_start_matches('/').to_string(),
        read_only,
        extra_options,
    }
}

/// Walks `dir` and its ancestors (starting at `dir` itself) looking for
/// `__jdfs_root__`, accumulating the path components crossed so they can
/// be appended to whatever URL path the file names.
fn find_magic_root(mountpoint: &Path) -> Result<Url, ResolveError> {
    let mut dir = mountpoint.canonicalize().map_err(ResolveError::Io)?;
    let mut suffix: Vec<OsString> = Vec::new();
    loop {
        let candidate = dir.join(MAGIC_ROOT_FILE);
        if candidate.is_file() {
            let content = std::fs::read_to_string(&candidate).map_err(ResolveError::Io)?;
            let mut url = Url::parse(content.trim()).map_err(ResolveError::Parse)?;
            if !suffix.is_empty() {
                let mut path = url.path().trim_end_matches('/').to_string();
                for component in suffix.iter().rev() {
                    path.push('/');
                    path.push_str(&component.to_string_lossy());
                }
                url.set_path(&path);
            }
            return Ok(url);
        }
        if let Some(name) = dir.file_name() {
            suffix.push(name.to_os_string());
        }
        match dir.parent() {
            Some(parent) => dir = parent.to_path_buf(),
            None => return Err(ResolveError::NotFound),
        }
    }
}

/// Translates the URL's passthrough query parameters into FUSE mount
/// options, with `ro` handled separately and `extra_options` already
/// deduplicated (last value wins per key, first-seen position kept).
pub fn to_mount_options(target: &MountTarget) -> Vec<fuser::MountOption> {
    use fuser::MountOption;
    let mut options = vec![MountOption::FSName(format!("jdfs:{}", target.host))];
    options.push(if target.read_only { MountOption::RO } else { MountOption::RW });
    for (key, value) in &target.extra_options {
        options.push(match key.as_str() {
            "allow_other" => MountOption::AllowOther,
            "allow_root" => MountOption::AllowRoot,
            "auto_unmount" => MountOption::AutoUnmount,
            "default_permissions" => MountOption::DefaultPermissions,
            "dev" => MountOption::Dev,
            "nodev" => MountOption::NoDev,
            "suid" => MountOption::Suid,
            "nosuid" => MountOption::NoSuid,
            "exec" => MountOption::Exec,
            "noexec" => MountOption::NoExec,
            "atime" => MountOption::Atime,
            "noatime" => MountOption::NoAtime,
            "dirsync" => MountOption::DirSync,
            "sync" => MountOption::Sync,
            "async" => MountOption::Async,
            "subtype" => MountOption::Subtype(value.clone()),
            _ if value.is_empty() => MountOption::CUSTOM(key.clone()),
            _ => MountOption::CUSTOM(format!("{key}={value}")),
        });
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_url_overrides_port_and_query() {
        let target = resolve(Some("jdfs://example.com:2222/exports/home?ro&allow_other"), Path::new("/tmp")).unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 2222);
        assert_eq!(target.jdfs_path, "exports/home");
        assert!(target.read_only);
        assert_eq!(target.extra_options, vec![("allow_other".to_string(), String::new())]);
    }

    #[test]
    fn missing_port_falls_back_to_the_default() {
        let target = resolve(Some("jdfs://example.com/"), Path::new("/tmp")).unwrap();
        assert_eq!(target.port, DEFAULT_PORT);
    }

    #[test]
    fn magic_root_file_is_found_above_a_nested_mountpoint() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MAGIC_ROOT_FILE), "jdfs://example.com/exports\n").unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        let target = resolve(None, &nested).unwrap();
        assert_eq!(target.jdfs_path, "exports/a/b");
    }

    #[test]
    fn no_magic_root_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve(None, dir.path()).unwrap_err();
        assert!(matches!(err, ResolveError::NotFound));
    }

    #[test]
    fn duplicate_query_keys_keep_only_the_last_value() {
        let target = resolve(Some("jdfs://example.com/exports?subtype=one&subtype=two"), Path::new("/tmp")).unwrap();
        assert_eq!(target.extra_options, vec![("subtype".to_string(), "two".to_string())]);
    }

    #[test]
    fn to_mount_options_carries_fsname_and_access_mode() {
        let target = resolve(Some("jdfs://example.com/exports?allow_other"), Path::new("/tmp")).unwrap();
        let options = to_mount_options(&target);
        assert!(options.iter().any(|o| matches!(o, fuser::MountOption::FSName(name) if name == "jdfs:example.com")));
        assert!(options.contains(&fuser::MountOption::RW));
        assert!(options.contains(&fuser::MountOption::AllowOther));
    }
}
