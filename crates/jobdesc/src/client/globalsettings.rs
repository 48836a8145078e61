use std::path::{Path, PathBuf};

use crate::client::output::outputs::Output;

pub struct GlobalSettings {
    job_file: PathBuf,
    printer: Box<dyn Output>,
}

impl GlobalSettings {
    pub fn new(job_file: PathBuf, printer: Box<dyn Output>) -> Self {
        GlobalSettings { job_file, printer }
    }

    /// Job file used by commands that need a descriptor
    pub fn job_file(&self) -> &Path {
        &self.job_file
    }

    pub fn printer(&self) -> &dyn Output {
        self.printer.as_ref()
    }
}
