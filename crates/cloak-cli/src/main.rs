//! cloak: encrypted overlay storage CLI
//!
//! Commands:
//!   ls [path]                - list a directory (plaintext view)
//!   stat <path>              - show object metadata
//!   cat <path> [--offset --length] - read a file or byte range
//!   put <local> [dir]        - encrypt and upload a local file
//!   mkdir / mv / cp / rename / rm - structural operations
//!
//! The config file holds the remote endpoint and cipher settings; the
//! password and salt are rewritten in obfuscated form on first use.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::info;

use cloak_core::{CloakConfig, Object};
use cloak_crypto::obscure::{is_obscured, obscure};
use cloak_crypto::Cipher;
use cloak_overlay::Overlay;
use cloak_remote::OpendalRemote;

#[derive(Parser, Debug)]
#[command(
    name = "cloak",
    version,
    about = "Encrypted overlay over remote object storage",
    long_about = "cloak: transparently encrypts file contents and names on their way \
                  to an S3-compatible remote, and decrypts them on the way back"
)]
struct Cli {
    /// Path to the cloak.toml configuration file
    #[arg(long, short = 'c', env = "CLOAK_CONFIG", default_value = "cloak.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Show metadata for a path
    Stat { path: String },

    /// Read a file (optionally a byte range) to stdout or a local file
    Cat {
        path: String,
        /// Plaintext byte offset to start at
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Number of bytes to read (default: to end)
        #[arg(long)]
        length: Option<u64>,
        /// Write to this local file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Encrypt and upload a local file
    Put {
        local: PathBuf,
        /// Destination directory
        #[arg(default_value = "/")]
        dir: String,
    },

    /// Create a directory
    Mkdir { path: String },

    /// Move a file or directory into another directory
    Mv { src: String, dst_dir: String },

    /// Copy a file or directory into another directory
    Cp { src: String, dst_dir: String },

    /// Rename a file or directory in place
    Rename { path: String, new_name: String },

    /// Remove a file or directory tree
    Rm { path: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    init_tracing(&config.log_level);

    if config.cipher.password.is_empty() {
        config.cipher.password = rpassword::prompt_password("overlay password: ")
            .context("reading password from terminal")?;
    }
    ensure_obscured(&mut config, &cli.config)?;

    let overlay = build_overlay(&config)?;

    match cli.command {
        Commands::Ls { path } => {
            let mut listing = overlay.list(&path).await?;
            listing.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
            for object in &listing {
                print_entry(object);
            }
        }
        Commands::Stat { path } => {
            let object = overlay.get(&path).await?;
            println!("path:     {}", object.path);
            println!("name:     {}", object.name);
            println!("type:     {}", if object.is_dir { "directory" } else { "file" });
            println!("size:     {}", object.size);
            if let Some(modified) = object.modified {
                println!("modified: {modified}");
            }
        }
        Commands::Cat {
            path,
            offset,
            length,
            output,
        } => {
            let reader = overlay.open(&path).await?;
            let mut stream = reader.read_range(offset, length).await?;
            match output {
                Some(local) => {
                    let mut file = tokio::fs::File::create(&local)
                        .await
                        .with_context(|| format!("creating {}", local.display()))?;
                    tokio::io::copy(&mut stream, &mut file).await?;
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    tokio::io::copy(&mut stream, &mut stdout).await?;
                }
            }
        }
        Commands::Put { local, dir } => {
            let name = local
                .file_name()
                .and_then(|n| n.to_str())
                .context("local path has no usable file name")?
                .to_string();
            let file = tokio::fs::File::open(&local)
                .await
                .with_context(|| format!("opening {}", local.display()))?;
            let size = file.metadata().await?.len();

            let bar = ProgressBar::new(size);
            bar.set_style(
                ProgressStyle::with_template(
                    "{bar:40} {bytes}/{total_bytes} ({bytes_per_sec})",
                )
                .expect("static template"),
            );
            let reader = ProgressReader {
                inner: file,
                bar: bar.clone(),
            };

            overlay.put(&dir, &name, size, reader).await?;
            bar.finish();
            info!(name = %name, size, "uploaded");
        }
        Commands::Mkdir { path } => {
            let (parent, name) = cloak_core::split_path(&path);
            overlay.make_dir(parent, name).await?;
        }
        Commands::Mv { src, dst_dir } => {
            let object = overlay.get(&src).await?;
            overlay.move_to(&src, object.is_dir, &dst_dir).await?;
        }
        Commands::Cp { src, dst_dir } => {
            let object = overlay.get(&src).await?;
            overlay.copy_to(&src, object.is_dir, &dst_dir).await?;
        }
        Commands::Rename { path, new_name } => {
            let object = overlay.get(&path).await?;
            overlay.rename(&path, object.is_dir, &new_name).await?;
        }
        Commands::Rm { path } => {
            let object = overlay.get(&path).await?;
            overlay.remove(&path, object.is_dir).await?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<CloakConfig> {
    Ok(CloakConfig::load(path)?)
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Rewrite the config with obfuscated credentials if either is still in
/// the clear.
fn ensure_obscured(config: &mut CloakConfig, path: &Path) -> Result<()> {
    if is_obscured(&config.cipher.password) && is_obscured(&config.cipher.salt) {
        return Ok(());
    }
    config.cipher.password =
        obscure(&config.cipher.password).context("obfuscating password")?;
    config.cipher.salt = obscure(&config.cipher.salt).context("obfuscating salt")?;

    let rendered = toml::to_string_pretty(&*config).context("serializing config")?;
    std::fs::write(path, rendered)
        .with_context(|| format!("rewriting config {}", path.display()))?;
    info!(config = %path.display(), "credentials obfuscated at rest");
    Ok(())
}

fn build_overlay(config: &CloakConfig) -> Result<Overlay> {
    if config.remote.bucket.is_empty() {
        bail!("remote storage is not configured (set [remote] in the config file)");
    }
    let cipher = Cipher::new(&config.cipher, &config.kdf).context("building cipher")?;
    let remote = OpendalRemote::new(&config.remote).context("connecting remote backend")?;
    Ok(Overlay::new(
        Arc::new(cipher),
        Arc::new(remote),
        config.remote.root.clone(),
    ))
}

fn print_entry(object: &Object) {
    let kind = if object.is_dir { "d" } else { "-" };
    let modified = object
        .modified
        .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    println!("{kind} {:>12}  {:<16}  {}", object.size, modified, object.name);
}

/// Counts bytes as the encrypt pipeline pulls them, driving the upload bar.
struct ProgressReader<R> {
    inner: R,
    bar: ProgressBar,
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let result = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = result {
            this.bar.inc((buf.filled().len() - before) as u64);
        }
        result
    }
}
