use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Install the global subscriber. Logs go to stderr so stdout stays JSON;
/// with `log`, they are copied to that file too.
pub(crate) fn init(log: Option<PathBuf>) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter);

    match log {
        Some(path) => {
            let file = Arc::new(File::create(path)?);
            builder
                .with_ansi(false)
                .with_writer(io::stderr.and(file))
                .init();
        }
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}
