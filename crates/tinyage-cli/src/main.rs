//! tinyage: age v1 file encryption CLI
//!
//! Commands:
//!   keygen                    - generate an X25519 identity
//!   encrypt -r <key>... [in]  - encrypt to recipients and/or a passphrase
//!   decrypt [-i <file>] [in]  - decrypt with discovered identities or a passphrase
//!   inspect [in]              - list the recipient stanzas of a file
//!   config show               - display current configuration

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Cursor, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use tinyage_core::config::expand_tilde;
use tinyage_core::{AgeError, TinyageConfig};
use tinyage_crypto::armor::{self, ArmoredWriter};
use tinyage_crypto::stream::ENCRYPTED_CHUNK_SIZE;
use tinyage_crypto::{
    Decryptor, Encryptor, Identity, Recipient, RecipientStanza, ScryptIdentity, ScryptRecipient,
    PAYLOAD_NONCE_SIZE, TAG_SIZE,
};
use tinyage_keys::age::GeneratedKey;
use tinyage_keys::{Aliases, DiscoveryChain, IdentitySource, KeyFile, KeyResolver, RecipientResolver};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "tinyage",
    version,
    about = "Encrypt and decrypt age v1 files",
    long_about = "tinyage: encrypt files to X25519, SSH and passphrase recipients in the age v1 format"
)]
struct Cli {
    /// Path to tinyage.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "TINYAGE_CONFIG",
        default_value = "~/.config/tinyage/config.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new identity (secret key) and print its recipient
    Keygen {
        /// Write the key file here instead of standard output (must not exist)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Encrypt standard input or a file
    ///
    /// RECIPIENTS may be aliases (from the alias file), files with one key per
    /// line, age1… recipients or quoted SSH public key lines.
    Encrypt {
        /// Recipient (repeatable)
        #[arg(long = "recipient", short = 'r')]
        recipients: Vec<String>,
        /// Recipients file with one key per line (repeatable)
        #[arg(long = "recipients-file", short = 'R')]
        recipient_files: Vec<PathBuf>,
        #[command(flatten)]
        passphrase: PassphraseArgs,
        /// Emit ASCII-armored output
        #[arg(long, short = 'a')]
        armor: bool,
        /// Output file (default: standard output)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Input file (default: standard input)
        input: Option<PathBuf>,
    },

    /// Decrypt standard input or a file (armor is detected automatically)
    Decrypt {
        /// Identity file (repeatable; replaces identity discovery)
        #[arg(long = "identity", short = 'i')]
        identities: Vec<PathBuf>,
        #[command(flatten)]
        passphrase: PassphraseArgs,
        /// Output file (default: standard output)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Input file (default: standard input)
        input: Option<PathBuf>,
    },

    /// Show the header of an encrypted file without decrypting it
    Inspect {
        /// Input file (default: standard input)
        input: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

/// Non-interactive passphrase sources.
#[derive(Args, Debug, Default)]
struct PassphraseArgs {
    /// Read the passphrase from the first line of FILE
    #[arg(long, value_name = "FILE", conflicts_with = "passphrase_env")]
    passphrase_file: Option<PathBuf>,
    /// Read the passphrase from environment variable VAR
    #[arg(long, value_name = "VAR")]
    passphrase_env: Option<String>,
}

impl PassphraseArgs {
    fn read(&self) -> Result<Option<SecretString>> {
        let raw = if let Some(path) = &self.passphrase_file {
            let content = Zeroizing::new(
                std::fs::read_to_string(path)
                    .with_context(|| format!("reading passphrase file: {}", path.display()))?,
            );
            Zeroizing::new(content.lines().next().unwrap_or_default().to_owned())
        } else if let Some(var) = &self.passphrase_env {
            Zeroizing::new(
                std::env::var(var)
                    .with_context(|| format!("passphrase variable {var} is not set"))?,
            )
        } else {
            return Ok(None);
        };
        if raw.is_empty() {
            bail!("passphrase is empty");
        }
        Ok(Some(SecretString::from(raw.as_str().to_owned())))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = load_config(&config_path)?;
    init_logging(&config.logging.level, &config.logging.format);

    match cli.command {
        Commands::Keygen { output } => cmd_keygen(output.as_deref()),
        Commands::Encrypt {
            recipients,
            recipient_files,
            passphrase,
            armor,
            output,
            input,
        } => cmd_encrypt(
            &config,
            &recipients,
            &recipient_files,
            &passphrase,
            armor,
            input.as_deref(),
            output.as_deref(),
        ),
        Commands::Decrypt {
            identities,
            passphrase,
            output,
            input,
        } => cmd_decrypt(
            &config,
            &identities,
            &passphrase,
            input.as_deref(),
            output.as_deref(),
        ),
        Commands::Inspect { input } => cmd_inspect(input.as_deref()),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<TinyageConfig> {
    TinyageConfig::load(path).with_context(|| format!("loading config: {}", path.display()))
}

/// Logs go to stderr; stdout carries ciphertext or plaintext.
fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

// ── I/O helpers ───────────────────────────────────────────────────────────────

fn is_stdio(path: Option<&Path>) -> bool {
    path.map_or(true, |p| p == Path::new("-"))
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>> {
    match path.filter(|p| !is_stdio(Some(*p))) {
        None => Ok(Box::new(io::stdin().lock())),
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("opening input: {}", path.display()))?;
            Ok(Box::new(file))
        }
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path.filter(|p| !is_stdio(Some(*p))) {
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating output: {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
    }
}

/// Wrap the input in a binary reader, stripping ASCII armor when present.
fn binary_input(input: Box<dyn Read>) -> Result<Box<dyn BufRead>> {
    let mut reader = BufReader::new(input);
    let armored = armor::is_armored(reader.fill_buf().context("reading input")?);
    if !armored {
        return Ok(Box::new(reader));
    }
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .context("reading armored input")?;
    tracing::debug!("input is ASCII armored");
    Ok(Box::new(Cursor::new(armor::dearmor(&text)?)))
}

// ── `tinyage keygen` ──────────────────────────────────────────────────────────

fn cmd_keygen(output: Option<&Path>) -> Result<()> {
    let key = GeneratedKey::generate()?;
    let contents = key.to_key_file()?;

    match output {
        Some(path) if !is_stdio(Some(path)) => {
            let path = expand_tilde(path);
            write_private_file(&path, contents.as_bytes())?;
            eprintln!("Public key: {}", key.public);
        }
        _ => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(contents.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Create `path` readable by the owner only. Existing files are never replaced.
fn write_private_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory: {}", parent.display()))?;
    }
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("creating key file: {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("writing key file: {}", path.display()))?;
    Ok(())
}

// ── `tinyage encrypt` ─────────────────────────────────────────────────────────

fn collect_recipients(
    config: &TinyageConfig,
    args: &[String],
    files: &[PathBuf],
    passphrase: &PassphraseArgs,
) -> Result<Vec<Recipient>> {
    let aliases = match &config.keys.aliases_file {
        Some(path) => Aliases::load(&expand_tilde(path))?,
        None => Aliases::default(),
    };
    let resolver = KeyResolver::new(aliases);

    let mut recipients = Vec::new();
    for arg in args {
        let found = resolver.resolve(arg)?;
        if found.is_empty() {
            bail!("{arg:?} is not an alias, a key file or a recipient key");
        }
        recipients.extend(found);
    }
    for path in files {
        if !path.is_file() {
            bail!("recipients file not found: {}", path.display());
        }
        let found = resolver.resolve(&path.to_string_lossy())?;
        if found.is_empty() {
            bail!("no recipients in {}", path.display());
        }
        recipients.extend(found);
    }

    if let Some(secret) = passphrase.read()? {
        recipients.push(
            ScryptRecipient::new(secret)
                .with_log_cost(config.scrypt.log_cost)
                .into(),
        );
    }

    if recipients.is_empty() {
        bail!("at least one recipient or a passphrase is required");
    }
    Ok(recipients)
}

fn encrypt_stream<W: Write>(encryptor: Encryptor, input: &mut dyn Read, output: W) -> Result<W> {
    let mut writer = encryptor.wrap_output(output)?;
    io::copy(input, &mut writer)
        .map_err(AgeError::from_io)
        .context("encrypting input")?;
    Ok(writer.finish().map_err(AgeError::from_io)?)
}

fn cmd_encrypt(
    config: &TinyageConfig,
    recipient_args: &[String],
    recipient_files: &[PathBuf],
    passphrase: &PassphraseArgs,
    armored: bool,
    input: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let recipients = collect_recipients(config, recipient_args, recipient_files, passphrase)?;
    if !armored && is_stdio(output) && io::stdout().is_terminal() {
        bail!("refusing to write binary ciphertext to a terminal; use -o FILE or --armor");
    }

    tracing::info!(recipients = recipients.len(), armored, "encrypting");
    let encryptor = Encryptor::new(recipients)?;
    let mut reader = open_input(input)?;
    let sink = open_output(output)?;

    let mut sink = if armored {
        encrypt_stream(encryptor, &mut reader, ArmoredWriter::new(sink))?
            .finish()
            .context("finishing armor")?
    } else {
        encrypt_stream(encryptor, &mut reader, sink)?
    };
    sink.flush().context("flushing output")?;
    Ok(())
}

// ── `tinyage decrypt` ─────────────────────────────────────────────────────────

fn collect_identities(
    config: &TinyageConfig,
    files: &[PathBuf],
    passphrase: &PassphraseArgs,
    passphrase_only: bool,
) -> Result<Vec<Identity>> {
    let mut identities = Vec::new();

    let secret = passphrase.read()?;
    if passphrase_only && secret.is_none() {
        bail!("file is encrypted to a passphrase; pass --passphrase-file or --passphrase-env");
    }

    if !files.is_empty() {
        for path in files {
            identities.extend(KeyFile(path.clone()).load()?);
        }
    } else if !passphrase_only {
        match DiscoveryChain::from_env(&config.keys).load() {
            Ok(found) => identities.extend(found),
            // A passphrase alone may still unlock the file.
            Err(e) if secret.is_some() => tracing::debug!("identity discovery: {e:#}"),
            Err(e) => return Err(e),
        }
    }

    if let Some(secret) = secret {
        identities.push(ScryptIdentity::new(secret).into());
    }
    Ok(identities)
}

fn cmd_decrypt(
    config: &TinyageConfig,
    identity_files: &[PathBuf],
    passphrase: &PassphraseArgs,
    input: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let decryptor = Decryptor::new(binary_input(open_input(input)?)?)?;
    let identities = collect_identities(
        config,
        identity_files,
        passphrase,
        decryptor.is_passphrase_only(),
    )?;
    tracing::debug!(
        stanzas = decryptor.stanzas().len(),
        identities = identities.len(),
        "unlocking"
    );

    let mut plaintext = decryptor.decrypt(&identities)?;

    // The output is only created once the header has been authenticated.
    let mut sink = open_output(output)?;
    let copied = io::copy(&mut plaintext, &mut sink)
        .map_err(AgeError::from_io)
        .and_then(|_| sink.flush().map_err(AgeError::from_io));
    if let Err(e) = copied {
        drop(sink);
        if let Some(path) = output.filter(|p| !is_stdio(Some(*p))) {
            discard_partial_output(path);
        }
        return Err(e).context("decrypting payload");
    }
    Ok(())
}

/// Remove a partially written plaintext file after a payload failure.
fn discard_partial_output(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "could not remove partial output"
        );
    }
}

// ── `tinyage inspect` ─────────────────────────────────────────────────────────

/// Plaintext length implied by a payload length (nonce included).
fn plaintext_len(payload_len: u64) -> Option<u64> {
    let sealed = payload_len.checked_sub(PAYLOAD_NONCE_SIZE as u64)?;
    let chunk = ENCRYPTED_CHUNK_SIZE as u64;
    let chunks = sealed.div_ceil(chunk).max(1);
    sealed.checked_sub(chunks * TAG_SIZE as u64)
}

fn describe(stanza: &RecipientStanza) -> String {
    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
    match stanza {
        RecipientStanza::X25519(_) => "X25519".into(),
        RecipientStanza::Scrypt(s) => format!("scrypt (work factor 2^{})", s.log_cost),
        RecipientStanza::SshRsa(s) => format!("ssh-rsa (key tag {})", hex(&s.fingerprint)),
        RecipientStanza::SshEd25519(s) => {
            format!("ssh-ed25519 (key tag {})", hex(&s.fingerprint))
        }
        RecipientStanza::Unknown(s) => format!("{} (unsupported, {} args)", s.tag, s.args.len()),
    }
}

fn cmd_inspect(input: Option<&Path>) -> Result<()> {
    let mut raw = Vec::new();
    open_input(input)?
        .read_to_end(&mut raw)
        .context("reading input")?;

    let armored = armor::is_armored(&raw);
    let bytes = if armored {
        let text = String::from_utf8(raw).context("armored input is not UTF-8")?;
        armor::dearmor(&text)?
    } else {
        raw
    };

    let decryptor = Decryptor::new(&bytes[..])?;
    let header_len = decryptor.header().encoded_len();
    let payload_len = (bytes.len() - header_len) as u64;

    println!("Version:   age-encryption.org/v1");
    println!("Armored:   {}", if armored { "yes" } else { "no" });
    println!("Header:    {header_len} bytes");
    println!("Recipients:");
    for (index, stanza) in decryptor.stanzas().iter().enumerate() {
        println!("  [{index}] {}", describe(stanza));
    }
    if decryptor.is_passphrase_only() {
        println!("Passphrase-only: yes");
    }
    match plaintext_len(payload_len) {
        Some(len) => println!("Payload:   {payload_len} bytes ({len} bytes of plaintext)"),
        None => println!("Payload:   {payload_len} bytes (truncated)"),
    }
    Ok(())
}

// ── `tinyage config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &TinyageConfig, config_path: &Path) -> Result<()> {
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
