//! `version.h` generation from a make fragment and git metadata.
//!
//! Firmware builds include the generated header to embed version and build
//! identity. The input is a `version.mk` fragment with `VERSION_MAJOR`,
//! `VERSION_MINOR`, `VERSION_PATCH` and optional `VERSION_BUILD` /
//! `VERSION_SUFFIX` assignments.

use std::fs;
use std::path::Path;
use std::process::Command;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Version numbers read from a make fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSpec {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch version.
    pub patch: u32,
    /// Build number; `None` means derive it from git.
    pub build: Option<u32>,
    /// Optional suffix appended as `_<suffix>`.
    pub suffix: String,
}

impl VersionSpec {
    /// Parse `KEY = value` / `KEY := value` assignments.
    ///
    /// Unknown keys and malformed numbers are ignored.
    pub fn parse(content: &str) -> Self {
        let mut spec = Self::default();

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("");
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().trim_end_matches([':', '?', '+']).trim();
            let value = value.trim();

            match key {
                "VERSION_MAJOR" => spec.major = leading_number(value).unwrap_or(spec.major),
                "VERSION_MINOR" => spec.minor = leading_number(value).unwrap_or(spec.minor),
                "VERSION_PATCH" => spec.patch = leading_number(value).unwrap_or(spec.patch),
                "VERSION_BUILD" => spec.build = leading_number(value).or(spec.build),
                "VERSION_SUFFIX" => {
                    if let Some(token) = value.split_whitespace().next() {
                        spec.suffix = token.to_string();
                    }
                }
                _ => {}
            }
        }

        spec
    }

    /// Load a make fragment. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "version file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(Error::version_header(
                "read",
                format!("{}: {}", path.display(), e),
            )),
        }
    }
}

fn leading_number(value: &str) -> Option<u32> {
    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Source control identity of the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitInfo {
    /// Short commit hash, or `unknown`.
    pub commit: String,
    /// Branch name, or `unknown`.
    pub branch: String,
    /// Whether the tree has unstaged changes (`git diff --quiet` exit 1).
    pub dirty: bool,
}

impl Default for GitInfo {
    fn default() -> Self {
        Self {
            commit: "unknown".to_string(),
            branch: "unknown".to_string(),
            dirty: false,
        }
    }
}

impl GitInfo {
    /// Query git in `dir`. Failures fall back to defaults.
    pub fn discover(dir: &Path) -> Self {
        let defaults = Self::default();
        let dirty = Command::new("git")
            .args(["diff", "--quiet"])
            .current_dir(dir)
            .output()
            .map(|output| output.status.code() == Some(1))
            .unwrap_or(false);

        Self {
            commit: git_output(dir, &["rev-parse", "--short", "HEAD"]).unwrap_or(defaults.commit),
            branch: git_output(dir, &["rev-parse", "--abbrev-ref", "HEAD"])
                .unwrap_or(defaults.branch),
            dirty,
        }
    }

    /// Number of commits reachable from HEAD, or 0.
    pub fn commit_count(dir: &Path) -> u32 {
        git_output(dir, &["rev-list", "--count", "HEAD"])
            .and_then(|count| count.parse().ok())
            .unwrap_or(0)
    }

    /// Commit with a `-dirty` marker when applicable.
    pub fn describe(&self) -> String {
        if self.dirty {
            format!("{}-dirty", self.commit)
        } else {
            self.commit.clone()
        }
    }
}

fn git_output(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).current_dir(dir).output().ok()?;
    if !output.status.success() {
        debug!(?args, "git command failed");
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Overrides for [`generate`].
#[derive(Debug, Clone, Default)]
pub struct HeaderOptions {
    /// Build number taking priority over the make fragment and git.
    pub build: Option<u32>,
    /// WakeCore version string; defaults to the main version string.
    pub wakecore_version: Option<String>,
    /// FSBL version string; defaults to the main version string.
    pub fsbl_version: Option<String>,
}

/// Resolved contents of a version header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionHeader {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch version.
    pub patch: u32,
    /// Build number.
    pub build: u32,
    /// Version suffix, possibly empty.
    pub suffix: String,
    /// WakeCore version string.
    pub wakecore_version: String,
    /// FSBL version string.
    pub fsbl_version: String,
    /// Build date, `YYYY-MM-DD`.
    pub build_date: String,
    /// Build time, `HH:MM:SS`.
    pub build_time: String,
    /// Git identity.
    pub git: GitInfo,
}

impl VersionHeader {
    /// Resolve a header from its inputs.
    ///
    /// Build number precedence: override, then the make fragment, then git.
    pub fn resolve(
        spec: &VersionSpec,
        options: &HeaderOptions,
        git: GitInfo,
        commit_count: impl FnOnce() -> u32,
        now: chrono::NaiveDateTime,
    ) -> Self {
        let build = options.build.or(spec.build).unwrap_or_else(commit_count);
        let mut header = Self {
            major: spec.major,
            minor: spec.minor,
            patch: spec.patch,
            build,
            suffix: spec.suffix.clone(),
            wakecore_version: String::new(),
            fsbl_version: String::new(),
            build_date: now.format("%Y-%m-%d").to_string(),
            build_time: now.format("%H:%M:%S").to_string(),
            git,
        };
        let version = header.version_string();
        header.wakecore_version = options.wakecore_version.clone().unwrap_or_else(|| version.clone());
        header.fsbl_version = options.fsbl_version.clone().unwrap_or(version);
        header
    }

    /// `MAJOR.MINOR.PATCH.BUILD[_SUFFIX]`.
    pub fn version_string(&self) -> String {
        let base = format!("{}.{}.{}.{}", self.major, self.minor, self.patch, self.build);
        if self.suffix.is_empty() {
            base
        } else {
            format!("{}_{}", base, self.suffix)
        }
    }

    /// Packed version `0xMMmmPPBB`, each component truncated to 8 bits.
    pub fn version_u32(&self) -> u32 {
        ((self.major & 0xFF) << 24)
            | ((self.minor & 0xFF) << 16)
            | ((self.patch & 0xFF) << 8)
            | (self.build & 0xFF)
    }

    /// Render the C header text.
    pub fn render(&self) -> String {
        let Self {
            major,
            minor,
            patch,
            build,
            build_date,
            build_time,
            ..
        } = self;
        let version_string = self.version_string();
        let build_low = build & 0xFF;
        let git_commit = self.git.describe();
        let git_branch = &self.git.branch;
        let wakecore = &self.wakecore_version;
        let fsbl = &self.fsbl_version;

        format!(
            r#"/**
 * @file version.h
 * @brief Auto-generated version information (DO NOT EDIT)
 * @generated {build_date} {build_time}
 */

#ifndef VERSION_H
#define VERSION_H

/* ==================== Main Version (APP) ==================== */
#define FW_VERSION_MAJOR    {major}
#define FW_VERSION_MINOR    {minor}
#define FW_VERSION_PATCH    {patch}
#define FW_VERSION_BUILD    {build}

/* Version string: "MAJOR.MINOR.PATCH.BUILD[_SUFFIX]" */
#define FW_VERSION_STRING   "{version_string}"

/* Packed version for numeric comparison: 0xMMmmPPBB */
#define FW_VERSION_U32      (({major}U << 24) | ({minor}U << 16) | ({patch}U << 8) | {build_low}U)

/* ==================== Component Versions ==================== */
/* Note: These are generated from version.mk component settings */
/* WakeCore Version (may differ from APP version) */
#define WAKECORE_VERSION_STRING   "{wakecore}"
#define FSBL_VERSION_STRING   "{fsbl}"

/* ==================== Build Information ==================== */
#define FW_BUILD_DATE       "{build_date}"
#define FW_BUILD_TIME       "{build_time}"
#define FW_GIT_COMMIT       "{git_commit}"
#define FW_GIT_BRANCH       "{git_branch}"

/* ==================== Version Macros ==================== */
/* Compare two version numbers */
#define FW_VERSION_MAKE(major, minor, patch, build) \
    (((major) << 24) | ((minor) << 16) | ((patch) << 8) | (build))

#define FW_VERSION_AT_LEAST(major, minor, patch) \
    (FW_VERSION_U32 >= FW_VERSION_MAKE(major, minor, patch, 0))

#endif /* VERSION_H */
"#
        )
    }
}

/// Read `input`, query git in the current directory and write the header to `output`.
pub fn generate(input: &Path, output: &Path, options: &HeaderOptions) -> Result<VersionHeader> {
    let spec = VersionSpec::load(input)?;
    let repo_dir = Path::new(".");
    let header = VersionHeader::resolve(
        &spec,
        options,
        GitInfo::discover(repo_dir),
        || GitInfo::commit_count(repo_dir),
        chrono::Local::now().naive_local(),
    );

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            Error::version_header("create directory", format!("{}: {}", parent.display(), e))
        })?;
    }
    fs::write(output, header.render())
        .map_err(|e| Error::version_header("write", format!("{}: {}", output.display(), e)))?;

    info!(
        version = %header.version_string(),
        path = %output.display(),
        git = %header.git.describe(),
        "version header generated"
    );
    Ok(header)
}
