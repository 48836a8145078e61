macro_rules! create_jobdesc_env {
    ($name: literal) => {
        concat!("JOBDESC_", $name)
    };
}

/// Variables exported to every task instance
pub const JOBDESC_ARRAY_JOB_ID: &str = create_jobdesc_env!("ARRAY_JOB_ID");
pub const JOBDESC_ARRAY_TASK_ID: &str = create_jobdesc_env!("ARRAY_TASK_ID");
pub const JOBDESC_JOB_NAME: &str = create_jobdesc_env!("JOB_NAME");

/// Global CLI settings
pub const JOBDESC_FILE: &str = create_jobdesc_env!("FILE");
pub const JOBDESC_OUTPUT_MODE: &str = create_jobdesc_env!("OUTPUT_MODE");
pub const JOBDESC_DEBUG: &str = create_jobdesc_env!("DEBUG");

/// Slurm
pub const SLURM_ARRAY_JOB_ID: &str = "SLURM_ARRAY_JOB_ID";
pub const SLURM_ARRAY_TASK_ID: &str = "SLURM_ARRAY_TASK_ID";
pub const SLURM_JOB_ID: &str = "SLURM_JOB_ID";
pub const SLURM_JOBID: &str = "SLURM_JOBID";
pub const SLURM_JOB_NAME: &str = "SLURM_JOB_NAME";

/// PBS
pub const PBS_ENVIRONMENT: &str = "PBS_ENVIRONMENT";
pub const PBS_ARRAY_ID: &str = "PBS_ARRAY_ID";
pub const PBS_ARRAY_INDEX: &str = "PBS_ARRAY_INDEX";
pub const PBS_JOBID: &str = "PBS_JOBID";
