//! CbcVault CLI - Command line interface for password-based encryption.
//!
//! Encrypts and decrypts text and files with AES-256-CBC and a truncated
//! HMAC-SHA384 tag, and signs or verifies files with HMAC-SHA256.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cbcvault_common::Secret;
use cbcvault_crypto::signature::{sign_file, verify_signed_file};
use cbcvault_crypto::{
    AuthenticatedCipher, EncryptionMetadata, EngineConfig, FileCipher, FrameMode, NoProgress,
    Outcome, ProgressListener,
};

/// Environment variable holding a tracing filter directive.
const LOG_ENV: &str = "CBCVAULT_LOG";

#[derive(Parser)]
#[command(name = "cbcvault")]
#[command(about = "CbcVault - Password-based authenticated encryption")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON engine configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt text and print it as base64.
    EncryptText {
        /// Text to encrypt.
        text: String,

        /// Keep IV, salt and tag out of the output and print them as JSON.
        #[arg(long)]
        detached: bool,
    },

    /// Decrypt base64 text.
    DecryptText {
        /// Base64 container.
        data: String,

        /// Metadata JSON for a detached container.
        #[arg(short, long)]
        meta: Option<PathBuf>,
    },

    /// Encrypt a file.
    EncryptFile {
        /// File to encrypt.
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (default: encrypt in place).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write IV, salt and tag to `<output>.meta.json` instead of the file.
        #[arg(long)]
        detached: bool,

        /// Delete the input after a successful encryption.
        #[arg(long)]
        delete_source: bool,

        /// Show progress on stderr.
        #[arg(long)]
        progress: bool,
    },

    /// Decrypt a file.
    DecryptFile {
        /// File to decrypt.
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (default: decrypt in place).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Read IV, salt and tag from `<input>.meta.json`.
        #[arg(long)]
        detached: bool,

        /// Metadata JSON path, overriding the sidecar location.
        #[arg(short, long)]
        meta: Option<PathBuf>,

        /// Delete the input after a successful decryption.
        #[arg(long)]
        delete_source: bool,

        /// Show progress on stderr.
        #[arg(long)]
        progress: bool,
    },

    /// Prepend an HMAC-SHA256 signature to a file.
    SignFile {
        /// File to sign in place.
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Verify the signature at the start of a signed file.
    VerifyFile {
        /// Signed file.
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::EncryptText { text, detached } => cmd_encrypt_text(config, &text, detached),

        Commands::DecryptText { data, meta } => cmd_decrypt_text(config, &data, meta.as_deref()),

        Commands::EncryptFile {
            input,
            output,
            detached,
            delete_source,
            progress,
        } => cmd_encrypt_file(
            config,
            &input,
            output.as_deref(),
            detached,
            delete_source,
            progress,
        ),

        Commands::DecryptFile {
            input,
            output,
            detached,
            meta,
            delete_source,
            progress,
        } => {
            let meta = match (meta, detached) {
                (Some(path), _) => Some(path),
                (None, true) => Some(sidecar_path(&input)),
                (None, false) => None,
            };
            cmd_decrypt_file(
                config,
                &input,
                output.as_deref(),
                meta.as_deref(),
                delete_source,
                progress,
            )
        }

        Commands::SignFile { input } => cmd_sign_file(config, &input),

        Commands::VerifyFile { input } => cmd_verify_file(&input),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading configuration");
            EngineConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Path of the detached metadata file for `path`.
fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".meta.json");
    PathBuf::from(name)
}

/// Prompt for password securely.
fn prompt_secret(prompt: &str) -> Result<Secret> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Secret::from(password))
}

/// Prompt twice for a new password.
fn prompt_new_secret() -> Result<Secret> {
    let password = prompt_secret("Enter password: ")?;
    let confirm = prompt_secret("Confirm password: ")?;

    if password.as_bytes() != confirm.as_bytes() {
        bail!("Passwords do not match");
    }
    Ok(password)
}

/// Turn an engine outcome into an error carrying its message.
fn finish<T>(outcome: Outcome<T>) -> Result<T> {
    match outcome.into_result() {
        Ok(payload) => Ok(payload),
        Err((kind, message)) => bail!("{} ({})", message, kind),
    }
}

fn read_metadata(path: &Path) -> Result<EncryptionMetadata> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read metadata {}", path.display()))?;
    EncryptionMetadata::from_json(&json).context("Invalid metadata")
}

fn write_metadata(path: &Path, metadata: &EncryptionMetadata) -> Result<()> {
    fs::write(path, metadata.to_json()?)
        .with_context(|| format!("Failed to write metadata {}", path.display()))
}

/// Progress printer for stderr.
struct ConsoleProgress;

impl ProgressListener for ConsoleProgress {
    fn on_progress(&self, percent: u8, message: &str) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r{:>3}% {:<40}", percent, message);
        if percent == 100 {
            let _ = writeln!(stderr);
        }
    }
}

fn listener(show: bool) -> &'static dyn ProgressListener {
    if show {
        &ConsoleProgress
    } else {
        &NoProgress
    }
}

fn mode(detached: bool) -> FrameMode {
    if detached {
        FrameMode::Detached
    } else {
        FrameMode::Embedded
    }
}

/// Encrypt text.
fn cmd_encrypt_text(config: EngineConfig, text: &str, detached: bool) -> Result<()> {
    let secret = prompt_new_secret()?;
    let engine = AuthenticatedCipher::new(config)?;

    let sealed = finish(engine.encrypt(text.as_bytes(), &secret, mode(detached)))?;

    println!("{}", sealed.to_base64());
    if detached {
        println!("{}", sealed.metadata.to_json()?);
    }
    Ok(())
}

/// Decrypt base64 text.
fn cmd_decrypt_text(config: EngineConfig, data: &str, meta: Option<&Path>) -> Result<()> {
    let metadata = meta.map(read_metadata).transpose()?;
    let container = STANDARD
        .decode(data.trim())
        .context("Input is not valid base64")?;

    let secret = prompt_secret("Enter password: ")?;
    let engine = AuthenticatedCipher::new(config)?;

    let opened = finish(engine.decrypt(&container, &secret, metadata.as_ref()))?;
    match opened.text() {
        Some(text) => println!("{}", text),
        None => bail!("Decrypted data is not valid UTF-8"),
    }
    Ok(())
}

/// Encrypt a file.
fn cmd_encrypt_file(
    config: EngineConfig,
    input: &Path,
    output: Option<&Path>,
    detached: bool,
    delete_source: bool,
    progress: bool,
) -> Result<()> {
    info!("Encrypting {}", input.display());

    let secret = prompt_new_secret()?;
    let engine = FileCipher::new(config)?;

    let report = finish(engine.encrypt_file(
        input,
        output,
        &secret,
        mode(detached),
        delete_source,
        listener(progress),
    ))?;

    if detached {
        let meta = sidecar_path(&report.destination);
        write_metadata(&meta, &report.metadata)?;
        println!("Metadata written to {}", meta.display());
    }

    println!(
        "File encrypted successfully: {} ({} bytes)",
        report.destination.display(),
        report.bytes_written
    );
    Ok(())
}

/// Decrypt a file.
fn cmd_decrypt_file(
    config: EngineConfig,
    input: &Path,
    output: Option<&Path>,
    meta: Option<&Path>,
    delete_source: bool,
    progress: bool,
) -> Result<()> {
    info!("Decrypting {}", input.display());

    let metadata = meta.map(read_metadata).transpose()?;
    let secret = prompt_secret("Enter password: ")?;
    let engine = FileCipher::new(config)?;

    let report = finish(engine.decrypt_file(
        input,
        output,
        &secret,
        metadata.as_ref(),
        delete_source,
        listener(progress),
    ))?;

    println!(
        "File decrypted successfully: {} ({} bytes)",
        report.destination.display(),
        report.bytes_written
    );
    Ok(())
}

/// Sign a file in place.
fn cmd_sign_file(config: EngineConfig, input: &Path) -> Result<()> {
    let key = prompt_secret("Enter signing key: ")?;
    let signature = sign_file(input, key.as_bytes(), config.chunk_size, &NoProgress)
        .context("Failed to sign file")?;

    println!("File signed: {}", input.display());
    println!("  Signature: {}", STANDARD.encode(signature));
    Ok(())
}

/// Verify a signed file.
fn cmd_verify_file(input: &Path) -> Result<()> {
    let key = prompt_secret("Enter signing key: ")?;
    if !verify_signed_file(input, key.as_bytes()).context("Failed to verify file")? {
        bail!("Signature does not match: {}", input.display());
    }

    println!("Signature valid: {}", input.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/tmp/report.pdf")),
            PathBuf::from("/tmp/report.pdf.meta.json")
        );
    }

    #[test]
    fn test_parse_encrypt_file() {
        let cli = Cli::try_parse_from([
            "cbcvault",
            "encrypt-file",
            "--input",
            "a.txt",
            "--output",
            "a.enc",
            "--detached",
        ])
        .unwrap();

        match cli.command {
            Commands::EncryptFile {
                input,
                output,
                detached,
                delete_source,
                ..
            } => {
                assert_eq!(input, PathBuf::from("a.txt"));
                assert_eq!(output, Some(PathBuf::from("a.enc")));
                assert!(detached);
                assert!(!delete_source);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_parse_global_flags_after_command() {
        let cli =
            Cli::try_parse_from(["cbcvault", "verify-file", "-i", "doc.bin", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_metadata_sidecar_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = AuthenticatedCipher::new(EngineConfig::new().with_kdf_iterations(1_000)).unwrap();
        let sealed = finish(engine.encrypt(b"sidecar", &Secret::from("pw"), FrameMode::Detached))
            .unwrap();

        let path = sidecar_path(&dir.path().join("data.enc"));
        write_metadata(&path, &sealed.metadata).unwrap();
        assert_eq!(read_metadata(&path).unwrap(), sealed.metadata);
    }

    #[test]
    fn test_finish_reports_kind() {
        let engine = AuthenticatedCipher::new(EngineConfig::new().with_kdf_iterations(1_000)).unwrap();
        let err = finish(engine.decrypt(&[0u8; 10], &Secret::from("pw"), None)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Incorrect data length, data tampered with. (tampered-data)"
        );
    }
}
