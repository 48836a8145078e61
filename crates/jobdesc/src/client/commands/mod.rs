pub mod descriptor;
pub mod jobfile;
pub mod local;
pub mod render;
pub mod run;

/// Helper macro for generating CLI help for a `Duration` (or `Option<Duration>`) value
/// that can be specified either using the HMS or humantime formats.
macro_rules! duration_doc {
    ($text:expr) => {
        concat!(
            $text,
            "\n\n",
            r#"You can use either the `HH:MM:SS` format or a "humantime" format.
For example:
- 01:00:00 => 1 hour
- 15:59:00 => 15 hours, 59 minutes
- 1h => 1 hour
- 15h 59m => 15 hours, 59 minutes"#
        )
    };
}

pub(crate) use duration_doc;
