use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "abflow developers",
    version,
    about = "abflow CLI - Run resumable three-stage antibody design campaigns and manage HLT structures and Quiver archives.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel file parsing.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run (or resume) a backbone, sequence and prediction design campaign.
    Run(RunArgs),
    /// Inspect and create HLT-annotated structure files.
    Hlt(HltArgs),
    /// Work with Quiver archives of designs.
    Qv(QvArgs),
    /// Manage the directory holding model checkpoints.
    Weights(WeightsArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Path to the pipeline configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Run directory holding the run state and the per-stage archives.
    #[arg(short, long, required = true, value_name = "DIR")]
    pub output: PathBuf,

    /// Override the target structure (target-only HLT file).
    #[arg(short, long, value_name = "PATH")]
    pub target: Option<PathBuf>,

    /// Override the antibody framework (HLT file with annotated loops).
    #[arg(short, long, value_name = "PATH")]
    pub framework: Option<PathBuf>,

    /// Override the number of designs in the batch.
    #[arg(short, long, value_name = "INT")]
    pub num_designs: Option<usize>,

    /// Override the base seed every per-item seed is derived from.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Continue the run found in the run directory.
    #[arg(long)]
    pub resume: bool,

    /// Keep each item's scratch directory after its stage call.
    #[arg(long)]
    pub keep_scratch: bool,

    /// Write the final designs as loose HLT files into this directory.
    #[arg(long, value_name = "DIR")]
    pub export_dir: Option<PathBuf>,

    /// Overwrite existing files when exporting.
    #[arg(long, requires = "export_dir")]
    pub force: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S backbone.diffusion-steps=50
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `hlt` subcommand.
#[derive(Args, Debug)]
pub struct HltArgs {
    #[command(subcommand)]
    pub command: HltCommands,
}

#[derive(Subcommand, Debug)]
pub enum HltCommands {
    /// Decode HLT files and print their chains and loops.
    Check {
        #[arg(required = true, value_name = "PATH")]
        files: Vec<PathBuf>,
    },
    /// Convert a Chothia-numbered PDB file into HLT format.
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Chothia-numbered input PDB file.
    #[arg(value_name = "PATH")]
    pub input: PathBuf,

    /// Output HLT file.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Chain id of the heavy chain in the input.
    #[arg(short = 'H', long, required = true, value_name = "ID")]
    pub heavy: char,

    /// Chain id of the light chain in the input (omit for single-domain antibodies).
    #[arg(short = 'L', long, value_name = "ID")]
    pub light: Option<char>,

    /// Comma-separated chain ids of the target chains, e.g. "A,B".
    #[arg(short = 'T', long, value_name = "IDS", value_delimiter = ',')]
    pub target: Vec<char>,

    /// Keep the whole Fab instead of cropping the variable domains.
    #[arg(long)]
    pub whole_fab: bool,

    /// Last Chothia residue kept on the heavy chain.
    #[arg(long, value_name = "INT", allow_hyphen_values = true)]
    pub hcrop: Option<isize>,

    /// Last Chothia residue kept on the light chain.
    #[arg(long, value_name = "INT", allow_hyphen_values = true)]
    pub lcrop: Option<isize>,

    /// Per-chain target crops, e.g. "A:5-90,B:10-200".
    #[arg(long, value_name = "CROPS")]
    pub target_crop: Option<String>,
}

/// Arguments for the `qv` subcommand.
#[derive(Args, Debug)]
pub struct QvArgs {
    #[command(subcommand)]
    pub command: QvCommands,
}

#[derive(Subcommand, Debug)]
pub enum QvCommands {
    /// List all tags in an archive.
    Ls {
        #[arg(value_name = "QV")]
        archive: PathBuf,
    },
    /// Extract every entry as a PDB file.
    Extract {
        #[arg(value_name = "QV")]
        archive: PathBuf,
        /// Output directory (default: current directory).
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
        /// Prefix for output file names.
        #[arg(long, default_value = "")]
        prefix: String,
        /// Overwrite existing files.
        #[arg(long)]
        force: bool,
    },
    /// Extract the named entries as PDB files. Tags are read from stdin when none are given.
    ExtractSpecific {
        #[arg(value_name = "QV")]
        archive: PathBuf,
        tags: Vec<String>,
        /// Output directory (default: current directory).
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
        /// Overwrite existing files.
        #[arg(long)]
        force: bool,
    },
    /// Write the named entries as a new archive. Tags are read from stdin when none are given.
    Slice {
        #[arg(value_name = "QV")]
        archive: PathBuf,
        tags: Vec<String>,
        /// Output archive (default: stdout).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Split an archive into files of at most N entries.
    Split {
        #[arg(value_name = "QV")]
        archive: PathBuf,
        #[arg(value_name = "N")]
        chunk_size: usize,
        /// Output directory (default: current directory).
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
        /// Prefix for output files.
        #[arg(long, default_value = "split")]
        prefix: String,
    },
    /// Give every entry a new tag, in archive order. New tags are read from stdin when none
    /// are given.
    Rename {
        #[arg(value_name = "QV")]
        archive: PathBuf,
        new_tags: Vec<String>,
        /// Output archive (default: stdout).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Write the score lines as a tab-separated table.
    Scorefile {
        #[arg(value_name = "QV")]
        archive: PathBuf,
        /// Output file (default: stdout).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Build an archive from loose PDB/HLT files, tagged by file stem.
    FromPdbs {
        #[arg(required = true, value_name = "PATH")]
        files: Vec<PathBuf>,
        /// Output archive (default: stdout).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Concatenate archives whose tags do not overlap.
    Concat {
        #[arg(required = true, value_name = "QV")]
        archives: Vec<PathBuf>,
        /// Output archive (default: stdout).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

/// Arguments for the `weights` subcommand.
#[derive(Args, Debug)]
pub struct WeightsArgs {
    #[command(subcommand)]
    pub command: WeightsCommands,
}

#[derive(Subcommand, Debug)]
pub enum WeightsCommands {
    /// Show the absolute path to the weights directory.
    Path,
    /// Set a custom path for the weights directory.
    SetPath {
        /// The directory holding the model checkpoints.
        #[arg(required = true)]
        path: PathBuf,
    },
    /// Reset the weights path to its default, OS-specific location.
    ResetPath,
    /// List the known checkpoints and whether they are present.
    List,
}
