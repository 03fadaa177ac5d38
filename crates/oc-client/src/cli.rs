//! CLI command definitions and argument parsing

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use oc_crypto::{open_with_keypair, pem, seal, Keypair, SigningPublicKey};
use tracing::debug;

use crate::datafile::read_route;
use crate::onion::{build_onion, Hop};
use crate::upload::{format_elapsed, UploadOptions, Uploader};

/// Onion Courier - layered anonymous message delivery over Tor
#[derive(Parser, Debug)]
#[command(name = "oc")]
#[command(version, about = "Onion Courier - layered anonymous message delivery over Tor")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a relay keypair (private.pem / public.pem)
    Keygen(KeygenArgs),
    /// Seal stdin to a relay's public key, armored output on stdout
    Seal(SealArgs),
    /// Open an armored envelope from stdin with a private key
    Open(OpenArgs),
    /// Upload a file, either as-is to one server or layered along a route
    Send(SendArgs),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Keygen(args) => args.execute(),
            Commands::Seal(args) => args.execute(),
            Commands::Open(args) => args.execute(),
            Commands::Send(args) => args.execute().await,
        }
    }
}

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Directory to write the key files into
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,

    /// File name prefix, e.g. `relay1` gives relay1_private.pem
    #[arg(short, long)]
    pub name: Option<String>,

    /// Overwrite existing key files
    #[arg(long)]
    pub force: bool,
}

impl KeygenArgs {
    pub fn execute(self) -> Result<()> {
        let (private, public) = self.write_keys()?;
        println!("Key pair successfully generated.");
        println!("  private: {}", private.display());
        println!("  public:  {}", public.display());
        Ok(())
    }

    /// Generate and persist a keypair, returning `(private, public)` paths.
    pub fn write_keys(&self) -> Result<(PathBuf, PathBuf)> {
        let (private_name, public_name) = match &self.name {
            Some(prefix) => (
                format!("{prefix}_private.pem"),
                format!("{prefix}_public.pem"),
            ),
            None => ("private.pem".to_string(), "public.pem".to_string()),
        };
        let private = self.out_dir.join(private_name);
        let public = self.out_dir.join(public_name);

        if !self.force {
            for path in [&private, &public] {
                if path.exists() {
                    bail!("{} already exists (use --force to overwrite)", path.display());
                }
            }
        }

        let keypair = Keypair::generate();
        pem::save_keypair(&private, &keypair)
            .with_context(|| format!("Error saving {}", private.display()))?;
        pem::save_public_key(&public, &keypair.public())
            .with_context(|| format!("Error saving {}", public.display()))?;
        Ok((private, public))
    }
}

#[derive(Args, Debug)]
pub struct SealArgs {
    /// Recipient's public key file
    pub public_key: PathBuf,
}

impl SealArgs {
    pub fn execute(self) -> Result<()> {
        let public = pem::load_public_key(&self.public_key)
            .with_context(|| format!("Error loading public key {}", self.public_key.display()))?;
        let input = read_stdin()?;
        let armored = seal_text(&public, &input)?;
        std::io::stdout().write_all(armored.as_bytes())?;
        Ok(())
    }
}

/// Seal `input` to `public` and armor it.
pub fn seal_text(public: &SigningPublicKey, input: &[u8]) -> Result<String> {
    let exchange = public
        .to_exchange_public()
        .context("Public key is not a valid Ed25519 point")?;
    let envelope = seal(&exchange, input).context("Error encrypting")?;
    Ok(envelope.to_armored())
}

#[derive(Args, Debug)]
pub struct OpenArgs {
    /// Private key file
    pub private_key: PathBuf,
}

impl OpenArgs {
    pub fn execute(self) -> Result<()> {
        let keypair = pem::load_keypair(&self.private_key)
            .with_context(|| format!("Error loading private key {}", self.private_key.display()))?;
        let input = read_stdin()?;
        let plaintext = open_text(&keypair, &input)?;
        std::io::stdout().write_all(&plaintext)?;
        Ok(())
    }
}

/// Open an armored envelope.
pub fn open_text(keypair: &Keypair, input: &[u8]) -> Result<Vec<u8>> {
    open_with_keypair(keypair, input).context("Error decrypting")
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// File to upload
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,

    /// Optional display name, sent as X-Username
    #[arg(short = 'u', long = "username", env = "OC_USERNAME")]
    pub username: Option<String>,

    /// Route file: one `address password [public_key.pem]` per line
    #[arg(short = 'd', long = "data-file", conflicts_with_all = ["address", "password"])]
    pub data_file: Option<PathBuf>,

    /// Do not print the server response
    #[arg(long = "hide-response")]
    pub hide_response: bool,

    /// SOCKS5 proxy for outgoing connections
    #[arg(long, env = "OC_PROXY", default_value = oc_relay::forwarder::DEFAULT_PROXY_URL)]
    pub proxy: String,

    /// Connect directly instead of through the proxy
    #[arg(long)]
    pub no_proxy: bool,

    /// Server address (host:port or .onion), without a route file
    #[arg(required_unless_present = "data_file")]
    pub address: Option<String>,

    /// Server password, without a route file
    #[arg(required_unless_present = "data_file")]
    pub password: Option<String>,
}

impl SendArgs {
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            proxy_url: if self.no_proxy || self.proxy.is_empty() {
                None
            } else {
                Some(self.proxy.clone())
            },
            display_name: self.username.clone(),
        }
    }

    /// Resolve what to upload and where: `(address, password, file_name, payload)`.
    pub fn prepare(&self) -> Result<(String, String, String, Vec<u8>)> {
        let file_name = file_name_of(&self.file);

        match (&self.data_file, &self.address, &self.password) {
            (Some(route_path), _, _) => {
                let entries = read_route(route_path)
                    .with_context(|| format!("Error reading data file {}", route_path.display()))?;
                let route = entries
                    .iter()
                    .map(Hop::from_entry)
                    .collect::<Result<Vec<_>, _>>()?;
                let message = std::fs::read_to_string(&self.file)
                    .with_context(|| format!("Error reading {}", self.file.display()))?;
                debug!(hops = route.len(), "Building onion");
                let onion = build_onion(&route, &message)?;
                Ok((onion.entry_address, onion.entry_password, file_name, onion.payload))
            }
            (None, Some(address), Some(password)) => {
                let payload = std::fs::read(&self.file)
                    .with_context(|| format!("Error reading {}", self.file.display()))?;
                Ok((address.clone(), password.clone(), file_name, payload))
            }
            _ => bail!("either a data file or <address> <password> is required"),
        }
    }

    pub async fn execute(self) -> Result<()> {
        let (address, password, file_name, payload) = self.prepare()?;
        let uploader = Uploader::new(&self.upload_options())?;

        let delivery = uploader
            .send(&address, &password, &file_name, payload)
            .await
            .context("Error uploading file")?;

        println!(
            "\nFile sent successfully. Total time: {}\n",
            format_elapsed(delivery.elapsed)
        );
        if !self.hide_response {
            println!("Onion Courier Response: {}", delivery.response);
        }
        Ok(())
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "message.txt".to_string())
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut input = Vec::new();
    std::io::stdin()
        .read_to_end(&mut input)
        .context("Error reading stdin")?;
    Ok(input)
}
