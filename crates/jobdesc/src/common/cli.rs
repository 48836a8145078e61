use std::path::PathBuf;

use clap::Parser;
use clap_complete::Shell;

use crate::client::commands::descriptor::ShowOpts;
use crate::client::commands::jobfile::{ImportOpts, InitOpts};
use crate::client::commands::local::LocalOpts;
use crate::client::commands::render::{RenderOpts, SubmitOpts};
use crate::client::commands::run::RunOpts;
use crate::client::output::outputs::Outputs;
use crate::common::env::{JOBDESC_DEBUG, JOBDESC_FILE, JOBDESC_OUTPUT_MODE};

#[derive(clap::ValueEnum, Clone)]
pub enum ColorPolicy {
    /// Use colors if the stdout is detected to be a terminal.
    Auto,
    /// Always use colors.
    Always,
    /// Never use colors.
    Never,
}

// Common CLI options
#[derive(Parser)]
pub struct CommonOpts {
    /// Path to the job file [default: jobdesc.toml]
    #[arg(
        long,
        value_hint = clap::ValueHint::FilePath,
        global = true,
        env = JOBDESC_FILE,
        help_heading("GLOBAL OPTIONS")
    )]
    pub job_file: Option<PathBuf>,

    /// Sets console color policy
    #[arg(
        long,
        default_value_t = ColorPolicy::Auto,
        value_enum,
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub colors: ColorPolicy,

    /// Sets output formatting
    #[arg(
        long,
        env = JOBDESC_OUTPUT_MODE,
        default_value_t = Outputs::CLI,
        value_enum,
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub output_mode: Outputs,

    /// Enables more detailed log output
    #[arg(
        long,
        env = JOBDESC_DEBUG,
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub debug: bool,
}

// Root CLI options
#[derive(Parser)]
#[command(
    author,
    about,
    version(crate::JOBDESC_VERSION),
    disable_help_subcommand(true),
    help_expected(true)
)]
pub struct RootOptions {
    #[clap(flatten)]
    pub common: CommonOpts,

    #[clap(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Parser)]
pub enum SubCommand {
    /// Print the batch script of the job
    Render(RenderOpts),
    /// Submit the job into Slurm or PBS
    Submit(SubmitOpts),
    /// Run a single task instance of the job
    ///
    /// This is what the generated batch scripts execute. It prints the array job id,
    /// the array task id and the hostname, then runs the command and exits with its
    /// exit code.
    Run(RunOpts),
    /// Run all task instances of the job on this machine
    Local(LocalOpts),
    /// Display the job described by the job file
    Show(ShowOpts),
    /// Create a job file from a batch script with `#SBATCH` directives
    Import(ImportOpts),
    /// Create a new job file
    Init(InitOpts),
    /// Generate shell completion script
    GenerateCompletion(GenerateCompletionOpts),
}

#[derive(Parser)]
pub struct GenerateCompletionOpts {
    /// Shell flavour for which the completion script should be generated
    #[arg(value_enum)]
    pub shell: Shell,
}
