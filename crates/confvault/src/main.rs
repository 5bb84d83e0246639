//! confvault - Configuration manager backed by a KV secret store
//!
//! Commands:
//! - get <KEY>: Print a string value
//! - put <KEY> [VALUE]: Store a string value (prompts if no value)
//! - delete <KEY>: Delete a key
//! - list <PREFIX>: List keys under a prefix
//! - exists <KEY>: Check whether a key exists
//! - get-data <KEY>: Print a structured secret as YAML or JSON
//! - put-data <KEY> <FILE>: Store a YAML or JSON map
//! - list-data <PREFIX>: Print the raw listing response
//! - metadata <KEY>: Show version metadata (v2 mounts)
//! - mount <KEY>: Show which mount and engine version own a key

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use confvault::{ClientConfig, KvClient, KvVersion};

#[derive(Parser)]
#[command(name = "confvault")]
#[command(about = "Configuration manager backed by a KV secret store (v1 and v2 engines)")]
#[command(version)]
#[command(after_help = r#"CONFIGURATION:
    ~/.config/confvault/config.yaml, overridden by VAULT_ADDR, VAULT_TOKEN,
    VAULT_CACERT, VAULT_CLIENT_CERT, VAULT_CLIENT_KEY and CONFVAULT_KV_VERSION,
    overridden by command-line flags.

KEYS:
    Keys are logical paths including the mount, e.g. secret/orgs/acme.
    The engine version of the mount is detected on every call."#)]
struct Cli {
    /// Config file to load instead of the default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Secret store address
    #[arg(long, global = true)]
    address: Option<String>,

    /// Auth token
    #[arg(long, global = true)]
    token: Option<String>,

    /// Force a KV engine version (1 or 2) instead of detecting it
    #[arg(long, global = true)]
    kv_version: Option<KvVersion>,

    /// Log requests and mount detection to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the string value of a key
    Get {
        /// Don't print trailing newline (useful for piping)
        #[arg(short = 'n')]
        no_newline: bool,
        /// Key path
        key: String,
    },

    /// Store a string value (prompts securely if value not provided)
    Put {
        /// Key path
        key: String,
        /// Value (omit for hidden prompt)
        value: Option<String>,
    },

    /// Delete a key (succeeds if it does not exist)
    Delete {
        /// Key path
        key: String,
    },

    /// List keys directly under a prefix
    List {
        /// Directory path
        prefix: String,
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Print true or false; exits 1 when the key does not exist
    Exists {
        /// Key path
        key: String,
    },

    /// Print a structured secret
    GetData {
        /// Key path
        key: String,
        /// Version to read (v2 mounts, 0 = latest)
        #[arg(long, default_value_t = 0)]
        version: i64,
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Yaml)]
        format: Format,
    },

    /// Store a structured secret from a YAML or JSON file
    PutData {
        /// Key path
        key: String,
        /// Map file, or - for stdin
        file: PathBuf,
        /// Only write if this is the current version (0 = key must not exist)
        #[arg(long, allow_negative_numbers = true, default_value_t = -1)]
        cas: i64,
    },

    /// Print the raw listing response for a prefix
    ListData {
        /// Directory path
        prefix: String,
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Yaml)]
        format: Format,
    },

    /// Show version metadata of a key (v2 mounts)
    Metadata {
        /// Key path
        key: String,
        /// Version to inspect (0 = latest)
        #[arg(long, default_value_t = 0)]
        version: i64,
    },

    /// Show the mount and engine version owning a key
    Mount {
        /// Key path
        key: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Yaml,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let client = KvClient::new(&config).context("Failed to create secret store client")?;

    match cli.command {
        Commands::Get { no_newline, key } => cmd_get(&client, &key, no_newline),
        Commands::Put { key, value } => cmd_put(&client, &key, value),
        Commands::Delete { key } => cmd_delete(&client, &key),
        Commands::List { prefix, json } => cmd_list(&client, &prefix, json),
        Commands::Exists { key } => cmd_exists(&client, &key),
        Commands::GetData {
            key,
            version,
            format,
        } => cmd_get_data(&client, &key, version, format),
        Commands::PutData { key, file, cas } => cmd_put_data(&client, &key, &file, cas),
        Commands::ListData { prefix, format } => cmd_list_data(&client, &prefix, format),
        Commands::Metadata { key, version } => cmd_metadata(&client, &key, version),
        Commands::Mount { key } => cmd_mount(&client, &key),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "confvault=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// File, then environment, then flags
fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let path = cli.config.clone().unwrap_or_else(ClientConfig::config_path);
    let mut config = ClientConfig::load_from(&path)?;
    config.apply_env(|name| std::env::var(name).ok())?;

    if let Some(address) = &cli.address {
        config.address = Some(address.clone());
    }
    if let Some(token) = &cli.token {
        config.token = Some(token.clone());
    }
    if let Some(version) = cli.kv_version {
        config.kv_version = Some(version);
    }

    if config.address.is_none() {
        bail!(
            "No secret store address. Set VAULT_ADDR, pass --address, or add it to {}",
            path.display()
        );
    }

    Ok(config)
}

/// Print a string value
fn cmd_get(client: &KvClient, key: &str, no_newline: bool) -> Result<()> {
    let value = client.get(key)?;

    if no_newline {
        print!("{}", value);
    } else {
        println!("{}", value);
    }

    Ok(())
}

/// Store a string value
fn cmd_put(client: &KvClient, key: &str, value: Option<String>) -> Result<()> {
    let value = match value {
        Some(v) => v,
        None => {
            let input = rpassword::prompt_password("Enter value: ")
                .context("Failed to read value")?;

            if input.is_empty() {
                bail!("Empty value not allowed");
            }

            input
        }
    };

    client.put(key, &value)?;

    println!("success: Stored: {}", key);

    Ok(())
}

/// Delete a key
fn cmd_delete(client: &KvClient, key: &str) -> Result<()> {
    client.delete(key)?;
    println!("success: Deleted: {}", key);
    Ok(())
}

/// List keys under a prefix
fn cmd_list(client: &KvClient, prefix: &str, json: bool) -> Result<()> {
    let keys = client.list(prefix)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&keys)?);
        return Ok(());
    }

    if keys.is_empty() {
        println!("No keys found under: {}", prefix);
        return Ok(());
    }

    for key in &keys {
        println!("  {}", key);
    }

    Ok(())
}

/// Report whether a key exists
fn cmd_exists(client: &KvClient, key: &str) -> Result<()> {
    let exists = client.exists(key)?;
    println!("{}", exists);

    if !exists {
        std::process::exit(1);
    }

    Ok(())
}

/// Print a structured secret
fn cmd_get_data(client: &KvClient, key: &str, version: i64, format: Format) -> Result<()> {
    let data = client.get_data(key, version)?;
    print!("{}", render(&data, format)?);
    Ok(())
}

/// Store a structured secret read from a file
fn cmd_put_data(client: &KvClient, key: &str, file: &Path, cas: i64) -> Result<()> {
    let content = if file == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?
    };

    let data = parse_map(&content)?;
    client.put_data(key, data, cas)?;

    println!("success: Stored: {}", key);

    Ok(())
}

/// Print a raw listing response
fn cmd_list_data(client: &KvClient, prefix: &str, format: Format) -> Result<()> {
    let listing = client.list_data(prefix)?;
    print!("{}", render(&listing, format)?);
    Ok(())
}

/// Show version metadata
fn cmd_metadata(client: &KvClient, key: &str, version: i64) -> Result<()> {
    match client.get_metadata(key, version)? {
        Some(meta) => {
            println!("version:  {}", meta.version);
            println!("created:  {}", meta.created_time.to_rfc3339());
            if let Some(deleted) = meta.deletion_time {
                println!("deleted:  {}", deleted.to_rfc3339());
            }
            if meta.destroyed {
                println!("destroyed: true");
            }
        }
        None => println!("No version metadata: {} is on a v1 mount", key),
    }
    Ok(())
}

/// Show mount and engine version
fn cmd_mount(client: &KvClient, key: &str) -> Result<()> {
    let mount = client.mount_info(key)?;
    let path = if mount.path.is_empty() {
        "(none)"
    } else {
        mount.path.as_str()
    };

    println!("mount:   {}", path);
    println!("version: {}", mount.version);
    Ok(())
}

/// Parse a JSON or YAML document into a map
fn parse_map(content: &str) -> Result<Map<String, Value>> {
    let value: Value = match serde_json::from_str(content) {
        Ok(value) => value,
        Err(_) => serde_yaml::from_str(content).context("Input is neither JSON nor YAML")?,
    };

    match value {
        Value::Object(map) => Ok(map),
        other => bail!("Expected a map at the top level, got: {}", other),
    }
}

fn render<T: Serialize>(value: &T, format: Format) -> Result<String> {
    let text = match format {
        Format::Yaml => serde_yaml::to_string(value)?,
        Format::Json => format!("{}\n", serde_json::to_string_pretty(value)?),
    };
    Ok(text)
}
