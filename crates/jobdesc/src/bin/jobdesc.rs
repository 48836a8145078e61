use std::io;
use std::io::IsTerminal;

use clap::{CommandFactory, FromArgMatches};
use clap_complete::generate;
use cli_table::ColorChoice;

use jobdesc::client::commands::descriptor::command_show;
use jobdesc::client::commands::jobfile::{command_import, command_init};
use jobdesc::client::commands::local::command_local;
use jobdesc::client::commands::render::{command_render, command_submit};
use jobdesc::client::commands::run::command_run;
use jobdesc::client::default_job_file_path;
use jobdesc::client::globalsettings::GlobalSettings;
use jobdesc::client::output::cli::CliOutput;
use jobdesc::client::output::json::JsonOutput;
use jobdesc::client::output::outputs::{Output, Outputs};
use jobdesc::client::output::quiet::Quiet;
use jobdesc::common::cli::{ColorPolicy, CommonOpts, GenerateCompletionOpts, RootOptions, SubCommand};
use jobdesc::common::setup::setup_logging;

#[cfg(feature = "jemalloc")]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

fn make_global_settings(opts: CommonOpts) -> GlobalSettings {
    let job_file = opts.job_file.unwrap_or_else(default_job_file_path);

    let color_policy = match opts.colors {
        ColorPolicy::Always => ColorChoice::AlwaysAnsi,
        ColorPolicy::Auto => {
            if io::stdout().is_terminal() {
                ColorChoice::Auto
            } else {
                ColorChoice::Never
            }
        }
        ColorPolicy::Never => ColorChoice::Never,
    };

    // Create Printer
    let printer: Box<dyn Output> = match opts.output_mode {
        Outputs::CLI => {
            // Set colored public for CLI
            match color_policy {
                ColorChoice::Always | ColorChoice::AlwaysAnsi => {
                    colored::control::set_override(true)
                }
                ColorChoice::Never => colored::control::set_override(false),
                _ => {}
            }

            Box::new(CliOutput::new(color_policy))
        }
        Outputs::JSON => Box::<JsonOutput>::default(),
        Outputs::Quiet => Box::<Quiet>::default(),
    };

    GlobalSettings::new(job_file, printer)
}

fn generate_completion(opts: GenerateCompletionOpts) -> anyhow::Result<()> {
    let generator = opts.shell;

    let mut app = RootOptions::command();
    eprintln!("Generating completion file for {generator}...");
    generate(generator, &mut app, "jobdesc".to_string(), &mut io::stdout());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> jobdesc::Result<()> {
    let matches = RootOptions::command().get_matches();
    let top_opts = match RootOptions::from_arg_matches(&matches) {
        Ok(opts) => opts,
        Err(error) => error.exit(),
    };

    setup_logging(top_opts.common.debug);

    let gsettings = make_global_settings(top_opts.common);

    let result = match top_opts.subcmd {
        SubCommand::Render(opts) => command_render(&gsettings, opts),
        SubCommand::Submit(opts) => command_submit(&gsettings, opts).await,
        SubCommand::Run(opts) => match command_run(opts).await {
            Ok(code) => std::process::exit(code),
            Err(e) => Err(e),
        },
        SubCommand::Local(opts) => match command_local(&gsettings, opts).await {
            Ok(true) => Ok(()),
            Ok(false) => std::process::exit(1),
            Err(e) => Err(e),
        },
        SubCommand::Show(opts) => command_show(&gsettings, opts),
        SubCommand::Import(opts) => command_import(&gsettings, opts),
        SubCommand::Init(opts) => command_init(&gsettings, opts),
        SubCommand::GenerateCompletion(opts) => generate_completion(opts),
    };

    if let Err(e) = result {
        gsettings.printer().print_error(e);
        std::process::exit(1);
    }

    Ok(())
}
