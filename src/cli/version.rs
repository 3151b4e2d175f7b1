//! Version header command.

use std::path::PathBuf;

use clap::Args;
use n6pack::version_header::{generate, HeaderOptions};
use n6pack::PackConfig;

/// Generate a C version header.
///
/// Reads VERSION_MAJOR/MINOR/PATCH (and optionally VERSION_BUILD and
/// VERSION_SUFFIX) from the input make fragment. Without a build number the
/// git commit count is used.
///
/// Examples:
///   n6pack version-header
///   n6pack version-header -i version.mk -o Inc/version.h -b 42
#[derive(Args, Debug)]
pub struct VersionHeaderCmd {
    /// Input make fragment (default: version.mk)
    #[arg(short = 'i', long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Output header (default: Custom/Common/Inc/version.h)
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Override the build number
    #[arg(short = 'b', long, value_name = "N")]
    pub build: Option<u32>,

    /// WakeCore version string
    #[arg(long, value_name = "VERSION")]
    pub wakecore_version: Option<String>,

    /// FSBL version string
    #[arg(long, value_name = "VERSION")]
    pub fsbl_version: Option<String>,
}

impl VersionHeaderCmd {
    pub fn run(self, config: &PackConfig) -> n6pack::Result<()> {
        let input = config.version_input(self.input);
        let output = config.version_output(self.output);
        let options = HeaderOptions {
            build: self.build,
            wakecore_version: self.wakecore_version,
            fsbl_version: self.fsbl_version,
        };

        let header = generate(&input, &output, &options)?;

        println!("Version header generated: {}", header.version_string());
        println!("  Output: {}", output.display());
        println!("  Git: {} ({})", header.git.describe(), header.git.branch);
        Ok(())
    }
}
