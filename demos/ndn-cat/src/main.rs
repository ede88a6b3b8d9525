//! ndn-cat: copy NDN content to stdout.
//!
//! Names are resolved against a local directory, standing in for a real
//! network fetch: `/video/seg1` is read from `<root>/video/seg1` and pushed
//! into the stream in chunks.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug ndn-cat --root ./content ndn:/video/seg1 > seg1.ts
//! ```

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use bufpipe::Producer;
use bufpipe_ndn::{NameResolver, NdnConfig, NdnStream, push_error};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ndn-cat")]
#[command(about = "Print NDN content resolved from a local directory")]
struct Args {
    /// Directory that names are resolved against
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Bytes pushed per chunk by the fetch worker
    #[arg(long, default_value_t = 4096)]
    chunk_size: usize,

    /// Maximum bytes buffered between fetch and output (0 = unbounded)
    #[arg(long, default_value_t = 0)]
    limit: usize,

    /// Content to fetch, e.g. "ndn:/video/seg1"
    uri: String,
}

/// Resolves names to files under a root directory.
struct DirectoryResolver {
    root: PathBuf,
    chunk_size: usize,
}

impl DirectoryResolver {
    fn path_for(&self, name: &str) -> io::Result<PathBuf> {
        let relative = Path::new(name.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid name: {}", name),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl NameResolver for DirectoryResolver {
    fn resolve(&self, name: &str, sink: &Producer<u8>) -> io::Result<()> {
        let path = self.path_for(name)?;
        tracing::debug!(path = %path.display(), "resolving from file");

        let mut file = File::open(&path)?;
        let mut chunk = vec![0u8; self.chunk_size.max(1)];
        loop {
            let n = file.read(&mut chunk)?;
            if n == 0 {
                return Ok(());
            }
            sink.push(&chunk[..n]).map_err(push_error)?;
        }
    }
}

fn run(args: Args) -> io::Result<u64> {
    let resolver = DirectoryResolver {
        root: args.root,
        chunk_size: args.chunk_size,
    };
    let config = NdnConfig {
        limit: args.limit,
        ..NdnConfig::default()
    };

    let mut stream = NdnStream::open_with_config(&args.uri, Arc::new(resolver), config)?;
    tracing::info!(name = stream.name(), "stream opened");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let copied = io::copy(&mut stream, &mut out)?;
    out.flush()?;

    stream.close()?;
    Ok(copied)
}

fn main() -> ExitCode {
    // Logs go to stderr so stdout carries only content.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(bytes) => {
            tracing::info!(bytes, "done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "ndn-cat failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_for_rejects_escapes() {
        let resolver = DirectoryResolver {
            root: PathBuf::from("/srv/content"),
            chunk_size: 16,
        };
        assert_eq!(
            resolver.path_for("/video/seg1").unwrap(),
            PathBuf::from("/srv/content/video/seg1")
        );
        assert!(resolver.path_for("/../etc/passwd").is_err());
        assert!(resolver.path_for("/video/./seg1").is_ok());
    }
}
