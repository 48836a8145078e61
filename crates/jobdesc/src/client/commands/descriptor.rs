use clap::Parser;

use crate::client::commands::duration_doc;
use crate::client::globalsettings::GlobalSettings;
use crate::client::utils::ThrottledArrayArg;
use crate::common::utils::time::ExtendedArgDuration;
use crate::descriptor::JobDescriptor;
use crate::descriptor::jobfile::{DescriptorOverrides, JobDef, RunEnvironment};

/// Values that take precedence over the job file
#[derive(Parser)]
pub struct DescriptorOpts {
    /// Name of the job
    #[arg(long)]
    pub name: Option<String>,

    /// Array indices, optionally with a concurrency limit (e.g. `0-9%2`)
    #[arg(long, value_name = "ARRAY")]
    pub array: Option<ThrottledArrayArg>,

    #[arg(long, value_name = "TIME", help = duration_doc!("Wall-clock limit of every instance"))]
    pub time_limit: Option<ExtendedArgDuration>,

    /// Benchmark passed to the training program
    #[arg(long)]
    pub benchmark: Option<String>,

    /// Environment tag passed to the training program
    #[arg(long, value_enum)]
    pub environment: Option<RunEnvironment>,
}

impl DescriptorOpts {
    fn into_overrides(self) -> DescriptorOverrides {
        let (array, max_concurrent) = match self.array.map(|array| array.unpack()) {
            Some((array, limit)) => (Some(array), limit),
            None => (None, None),
        };
        DescriptorOverrides {
            name: self.name,
            array,
            max_concurrent,
            time_limit: self.time_limit.map(|t| t.unpack()),
            benchmark: self.benchmark,
            environment: self.environment,
        }
    }
}

/// Loads the job file and builds a validated descriptor.
pub fn load_descriptor(
    gsettings: &GlobalSettings,
    opts: DescriptorOpts,
) -> anyhow::Result<JobDescriptor> {
    let path = gsettings.job_file();
    log::debug!("Loading job file {}", path.display());
    let mut jdef = JobDef::load(path)?;
    jdef.apply_overrides(opts.into_overrides())?;
    Ok(jdef.into_descriptor()?)
}

#[derive(Parser)]
pub struct ShowOpts {
    #[clap(flatten)]
    pub descriptor: DescriptorOpts,
}

pub fn command_show(gsettings: &GlobalSettings, opts: ShowOpts) -> anyhow::Result<()> {
    let descriptor = load_descriptor(gsettings, opts.descriptor)?;
    gsettings.printer().print_descriptor(&descriptor);
    Ok(())
}
