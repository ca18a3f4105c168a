//! keyward: key management and envelope encryption CLI
//!
//! Symmetric key:
//!   key init                       - create the key file if needed, report its version
//!   key rotate                     - request key rotation (currently deferred)
//!   encrypt <in> <out>             - AES-256-GCM encrypt a file with the store's key
//!   decrypt <in> <out> [--legacy]  - decrypt a file produced by `encrypt`
//!
//! Asymmetric keys:
//!   keypair generate --private <p> --public <p>
//!   keypair check --public <p> --private <p>
//!   seal --public <p> <in> <out>   - hybrid encrypt for a recipient
//!   open --private <p> <in> <out>  - hybrid decrypt

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};

use keyward_core::config::KeywardConfig;
use keyward_crypto::codec;
use keyward_keystore::{KeyStore, RotationOutcome};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "keyward",
    version,
    about = "Key management and envelope encryption",
    long_about = "keyward: manage a symmetric data key and RSA keypairs, encrypt and decrypt files"
)]
struct Cli {
    /// Path to keyward.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "KEYWARD_CONFIG",
        default_value = "keyward.toml"
    )]
    config: PathBuf,

    /// Symmetric key file (overrides config keystore.key_file)
    #[arg(long, env = "KEYWARD_KEY_FILE")]
    key_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(long, env = "KEYWARD_LOG")]
    log: Option<String>,

    /// Log format; overrides config
    #[arg(long, env = "KEYWARD_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Symmetric key lifecycle
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Encrypt a file with the symmetric key
    Encrypt {
        input: PathBuf,
        output: PathBuf,
    },

    /// Decrypt a file with the symmetric key
    Decrypt {
        input: PathBuf,
        output: PathBuf,
        /// Input is a version-less nonce||ciphertext||tag envelope
        #[arg(long)]
        legacy: bool,
    },

    /// RSA keypair management
    Keypair {
        #[command(subcommand)]
        action: KeypairAction,
    },

    /// Encrypt a file for the holder of a private key
    Seal {
        /// Recipient public key (SPKI PEM or DER)
        #[arg(long)]
        public: PathBuf,
        input: PathBuf,
        output: PathBuf,
    },

    /// Decrypt a file produced by `seal`
    Open {
        /// Private key (PKCS#1 PEM or DER)
        #[arg(long)]
        private: PathBuf,
        input: PathBuf,
        output: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum KeyAction {
    /// Create the key file if it does not exist and report the key version
    Init,
    /// Request rotation of the symmetric key
    Rotate,
}

#[derive(Subcommand, Debug)]
enum KeypairAction {
    /// Generate a new RSA keypair; refuses to overwrite existing files
    Generate {
        #[arg(long)]
        private: PathBuf,
        #[arg(long)]
        public: PathBuf,
        /// Modulus size (overrides config asymmetric.modulus_bits)
        #[arg(long)]
        bits: Option<usize>,
        /// Write DER instead of PEM
        #[arg(long)]
        der: bool,
    },
    /// Check that a public key belongs to a private key (exit 1 on mismatch)
    Check {
        #[arg(long)]
        public: PathBuf,
        #[arg(long)]
        private: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = keyward_core::load_config(&cli.config)?;
    if let Some(key_file) = &cli.key_file {
        config.keystore.key_file = key_file.clone();
    }

    let level = cli.log.as_deref().unwrap_or(&config.logging.level);
    let format = match &cli.log_format {
        Some(format) => format.clone(),
        None if config.logging.format == "json" => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(level, &format);

    match cli.command {
        Commands::Key { action } => match action {
            KeyAction::Init => cmd_key_init(&config),
            KeyAction::Rotate => cmd_key_rotate(&config),
        },
        Commands::Encrypt { input, output } => cmd_encrypt(&config, &input, &output),
        Commands::Decrypt {
            input,
            output,
            legacy,
        } => cmd_decrypt(&config, &input, &output, legacy),
        Commands::Keypair { action } => match action {
            KeypairAction::Generate {
                private,
                public,
                bits,
                der,
            } => cmd_keypair_generate(&config, &private, &public, bits, der),
            KeypairAction::Check { public, private } => {
                if !cmd_keypair_check(&public, &private)? {
                    std::process::exit(1);
                }
                Ok(())
            }
        },
        Commands::Seal {
            public,
            input,
            output,
        } => cmd_seal(&public, &input, &output),
        Commands::Open {
            private,
            input,
            output,
        } => cmd_open(&private, &input, &output),
        Commands::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(&config, &cli.config),
        },
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so stdout stays clean for command output
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── File helpers ──────────────────────────────────────────────────────────────

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

/// Create `path` exclusively; an existing file is an error, never overwritten.
fn write_new_file(path: &Path, contents: &[u8], secret: bool) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if secret {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = secret;

    let mut file = options
        .open(path)
        .with_context(|| format!("creating {} (refusing to overwrite)", path.display()))?;
    file.write_all(contents)
        .and_then(|_| file.sync_all())
        .with_context(|| format!("writing {}", path.display()))
}

// ── `keyward key` ─────────────────────────────────────────────────────────────

fn cmd_key_init(config: &KeywardConfig) -> Result<()> {
    let mut store = KeyStore::from_config(&config.keystore);
    let key = store
        .ensure_key()
        .with_context(|| format!("initializing key file {}", store.path().display()))?;

    println!("key file:    {}", store.path().display());
    println!("key version: {}", key.version());
    Ok(())
}

fn cmd_key_rotate(config: &KeywardConfig) -> Result<()> {
    let mut store = KeyStore::from_config(&config.keystore);
    match store.rotate_key()? {
        RotationOutcome::Deferred { current_version } => {
            let version = current_version
                .map(|v| v.to_string())
                .unwrap_or_else(|| "none".into());
            println!("rotation not yet supported; key unchanged (current version: {version})");
        }
        other => println!("rotation: {other:?}"),
    }
    Ok(())
}

// ── `keyward encrypt` / `keyward decrypt` ─────────────────────────────────────

fn cmd_encrypt(config: &KeywardConfig, input: &Path, output: &Path) -> Result<()> {
    let mut store = KeyStore::from_config(&config.keystore);
    let key = store.ensure_key().context("loading symmetric key")?;

    let plaintext = read_file(input)?;
    let envelope = keyward_crypto::encrypt(&key, &plaintext).context("encrypting")?;
    write_file(output, &envelope)?;

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        bytes = plaintext.len(),
        key_version = key.version(),
        "encrypted file"
    );
    Ok(())
}

fn cmd_decrypt(config: &KeywardConfig, input: &Path, output: &Path, legacy: bool) -> Result<()> {
    let mut store = KeyStore::from_config(&config.keystore);
    let key = store.ensure_key().context("loading symmetric key")?;

    let envelope = read_file(input)?;
    let plaintext = if legacy {
        keyward_crypto::decrypt_legacy(&key, &envelope)
    } else {
        keyward_crypto::decrypt(&key, &envelope)
    }
    .with_context(|| format!("decrypting {}", input.display()))?;
    write_file(output, &plaintext)?;

    tracing::info!(input = %input.display(), output = %output.display(), "decrypted file");
    Ok(())
}

// ── `keyward keypair` ─────────────────────────────────────────────────────────

fn cmd_keypair_generate(
    config: &KeywardConfig,
    private_path: &Path,
    public_path: &Path,
    bits: Option<usize>,
    der: bool,
) -> Result<()> {
    let bits = bits.unwrap_or(config.asymmetric.modulus_bits);
    let pem = config.asymmetric.pem && !der;

    for path in [private_path, public_path] {
        anyhow::ensure!(
            !path.exists(),
            "{} already exists (refusing to overwrite)",
            path.display()
        );
    }

    let (private, public) =
        keyward_crypto::generate_key_pair_with_bits(bits).context("generating RSA keypair")?;

    let public_bytes = if pem {
        codec::encode_public_key_pem(&public)?.into_bytes()
    } else {
        codec::encode_public_key_der(&public)?
    };

    if pem {
        let encoded = codec::encode_private_key_pem(&private)?;
        write_key_pair(private_path, encoded.as_bytes(), public_path, &public_bytes)?;
    } else {
        let encoded = codec::encode_private_key_der(&private)?;
        write_key_pair(private_path, &encoded, public_path, &public_bytes)?;
    }

    println!("private key: {}", private_path.display());
    println!("public key:  {}", public_path.display());
    Ok(())
}

/// Write both halves of a keypair, or neither.
fn write_key_pair(
    private_path: &Path,
    private_bytes: &[u8],
    public_path: &Path,
    public_bytes: &[u8],
) -> Result<()> {
    write_new_file(private_path, private_bytes, true)?;
    if let Err(e) = write_new_file(public_path, public_bytes, false) {
        if let Err(rm) = std::fs::remove_file(private_path) {
            tracing::warn!("failed to remove {}: {rm}", private_path.display());
        }
        return Err(e);
    }
    Ok(())
}

fn load_public_key(path: &Path) -> Result<keyward_crypto::PublicKey> {
    codec::decode_public_key_auto(&read_file(path)?)
        .with_context(|| format!("parsing public key {}", path.display()))
}

fn load_private_key(path: &Path) -> Result<keyward_crypto::PrivateKey> {
    let bytes = read_file(path)?;
    codec::decode_private_key_auto(&bytes)
        .with_context(|| format!("parsing private key {}", path.display()))
}

fn cmd_keypair_check(public_path: &Path, private_path: &Path) -> Result<bool> {
    let public = load_public_key(public_path)?;
    let private = load_private_key(private_path)?;

    let matched = keyward_crypto::confirm_key_pair_match(&public, &private);
    if matched {
        println!(
            "match: {} belongs to {}",
            public_path.display(),
            private_path.display()
        );
    } else {
        println!(
            "mismatch: {} does not belong to {}",
            public_path.display(),
            private_path.display()
        );
    }
    Ok(matched)
}

// ── `keyward seal` / `keyward open` ───────────────────────────────────────────

fn cmd_seal(public_path: &Path, input: &Path, output: &Path) -> Result<()> {
    let public = load_public_key(public_path)?;
    let sealed = keyward_crypto::seal(&public, &read_file(input)?).context("sealing")?;
    write_file(output, &sealed)
}

fn cmd_open(private_path: &Path, input: &Path, output: &Path) -> Result<()> {
    let private = load_private_key(private_path)?;
    let plaintext = keyward_crypto::open(&private, &read_file(input)?)
        .with_context(|| format!("opening {}", input.display()))?;
    write_file(output, &plaintext)
}

// ── `keyward config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &KeywardConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
