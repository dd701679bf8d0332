use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "a3d")]
#[command(version)]
#[command(about = "Inspect and extract .a3d/.a3z 3D capture containers", long_about = None)]
#[command(after_help = "Examples:\n  \
  a3d capture.a3d -i                        show manifest summary\n  \
  a3d capture.a3d -l                        list entries\n  \
  a3d capture.a3d scene_0.ply -d out        extract one entry into out/\n  \
  a3d -p capture.a3d manifest.json | jq .   print the manifest\n  \
  a3d -l https://example.com/capture.a3z    list entries of a remote container")]
pub struct Cli {
    /// Container path or HTTP URL
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Entries to extract (default: all)
    #[arg(value_name = "ENTRIES")]
    pub files: Vec<String>,

    /// List entries (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely / more log output
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Show manifest and content summary
    #[arg(short = 'i')]
    pub info: bool,

    /// Extract entries to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract entries into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude entries that follow
    #[arg(short = 'x', value_name = "ENTRY", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Fail instead of downloading the whole container when Range access fails
    #[arg(long)]
    pub no_fallback: bool,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        crate::open::is_http_url(&self.file)
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Default tracing filter for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        if self.is_very_quiet() {
            "off"
        } else if self.quiet > 0 {
            "error"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }
}
