// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    apt_repository::{
        config::RepositoryConfig,
        error::RepositoryError,
        repository::AptRepository,
        signing::{verify_cleartext, verify_detached_signature},
        signing_key::generate_armored_signing_key,
    },
    clap::{Arg, ArgMatches, Command},
    log::{info, warn, LevelFilter},
    std::{ffi::OsStr, io::Write, path::Path},
    thiserror::Error,
};

const CONFIG_ABOUT: &str = "\
Repository Configuration

Every command operates on a repository described by a YAML file given with
`--config`. Without one, defaults are used and no packages are persisted.

The YAML file consists of a single document with the following keys, all
optional:

origin (string)
   Value of the `Origin` field in `Release` files. Default `DebianRepo`.

label (string)
   Value of the `Label` field in `Release` files. Default `DebianRepo`.

suite (string)
   Value of the `Suite` field in `Release` files and name of the
   `dists/<suite>` directory. Default `stable`.

codename (string)
   Value of the `Codename` field in `Release` files. Default `stable`.

architectures (list[string])
   Architectures indexed by the repository. Default `[amd64]`.

components (list[string])
   Components advertised by `Release` files. Only `[main]` is supported,
   which is also the default.

index_compressions (list[string])
   Compressed `Packages` variants to publish. Values are `gzip` and `xz`.
   Default `[]`.

package_store (string)
   Directory persisting uploaded `.deb` files. Packages in it are loaded
   before every command runs.

signing_key_path (string)
   Path to an ASCII armored or binary PGP secret keyring used to sign
   `Release` files.

signing_key_passphrase_env (string)
   Name of the environment variable holding the passphrase of the secret
   keyring. `generate-key` encrypts new keys with it when set. Default
   `APT_REPO_SIGNING_KEY_PASSPHRASE`.
";

const PUBLISH_ABOUT: &str = "\
Write the repository as a static directory tree.

The following files are written under the destination directory:

pool/main/<package>_<version>_<arch>.deb
   Every package in the repository.

dists/<suite>/main/binary-<arch>/Packages[.gz|.xz]
   Package indices for every configured architecture.

dists/<suite>/Release
dists/<suite>/InRelease
dists/<suite>/Release.gpg
   The distribution manifest and its signatures. The signed files are only
   written if a signing key is configured.

public.asc
   The public key clients need to trust the repository.

The tree can be served by any static HTTP server.
";

#[derive(Debug, Error)]
pub enum AptRepoError {
    #[error("argument parsing error: {0:?}")]
    Clap(#[from] clap::Error),

    #[error("{0:?}")]
    Repository(#[from] RepositoryError),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0:?}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("invalid sub-command: {0}")]
    InvalidSubCommand(String),

    #[error("no package_store configured; uploaded packages would not be persisted")]
    NoPackageStore,

    #[error("refusing to overwrite existing file: {0}")]
    FileExists(String),
}

pub type Result<T> = std::result::Result<T, AptRepoError>;

fn path_arg(name: &'static str) -> Arg<'static> {
    Arg::new(name).takes_value(true).allow_invalid_utf8(true)
}

pub async fn run_cli() -> Result<()> {
    let app = Command::new("APT Repository Tool")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .about("Build, sign and publish APT repositories")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        )
        .arg(
            path_arg("config")
                .long("config")
                .global(true)
                .help("Path to a YAML file defining the repository"),
        );

    let app = app.subcommand(
        Command::new("add")
            .about("Add .deb files to the repository's package store")
            .arg(
                path_arg("path")
                    .required(true)
                    .multiple_values(true)
                    .help("Path to .deb file to add"),
            ),
    );

    let app = app.subcommand(
        Command::new("packages")
            .about("Print the Packages index for an architecture")
            .arg(
                Arg::new("arch")
                    .long("arch")
                    .takes_value(true)
                    .help("Architecture to index. Defaults to the first configured architecture"),
            ),
    );

    let app = app.subcommand(Command::new("release").about("Print the Release file"));

    let app = app.subcommand(
        Command::new("inrelease").about("Print the InRelease file (cleartext signed Release)"),
    );

    let app = app.subcommand(
        Command::new("release-gpg")
            .about("Print the Release.gpg file (detached signature over Release)"),
    );

    let app = app.subcommand(
        Command::new("export-key").about("Print the public key of the configured signing key"),
    );

    let app = app.subcommand(
        Command::new("publish")
            .about("Write the repository as a static directory tree")
            .long_about(PUBLISH_ABOUT)
            .arg(
                path_arg("dest_dir")
                    .required(true)
                    .help("Directory to write the repository to"),
            ),
    );

    let app = app.subcommand(
        Command::new("generate-key")
            .about("Generate a PGP key pair for signing repositories")
            .arg(
                Arg::new("user_id")
                    .long("user-id")
                    .takes_value(true)
                    .required(true)
                    .help("User ID of the key, like `Name <email>`"),
            )
            .arg(
                path_arg("private_key_path")
                    .required(true)
                    .help("Path to write the ASCII armored private key to"),
            )
            .arg(
                path_arg("public_key_path")
                    .required(true)
                    .help("Path to write the ASCII armored public key to"),
            ),
    );

    let app = app.subcommand(
        Command::new("verify")
            .about("Verify a signed repository file")
            .arg(
                path_arg("public_key")
                    .long("public-key")
                    .required(true)
                    .help("Path to ASCII armored or binary public keys"),
            )
            .arg(
                path_arg("signature")
                    .long("signature")
                    .help("Path to a detached signature (Release.gpg) over the file"),
            )
            .arg(
                path_arg("path")
                    .required(true)
                    .help("Path to a cleartext signed file (InRelease), or the signed file when --signature is given"),
            ),
    );

    let mut app =
        app.subcommand(Command::new("config-docs").about("Print documentation about the configuration file"));

    let matches = app.clone().get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();

    match matches.subcommand() {
        Some(("add", args)) => command_add(args).await,
        Some(("config-docs", _)) => {
            println!("{}", CONFIG_ABOUT);
            Ok(())
        }
        Some(("export-key", args)) => command_export_key(args).await,
        Some(("generate-key", args)) => command_generate_key(args),
        Some(("inrelease", args)) => command_inrelease(args).await,
        Some(("packages", args)) => command_packages(args).await,
        Some(("publish", args)) => command_publish(args).await,
        Some(("release", args)) => command_release(args).await,
        Some(("release-gpg", args)) => command_release_gpg(args).await,
        Some(("verify", args)) => command_verify(args),
        Some((command, _)) => Err(AptRepoError::InvalidSubCommand(command.to_string())),
        None => {
            app.print_help()?;
            Ok(())
        }
    }
}

/// Resolve the repository configuration from an optional YAML file.
fn load_config(path: Option<&OsStr>) -> Result<RepositoryConfig> {
    let config = if let Some(path) = path {
        let f = std::fs::File::open(path)?;
        serde_yaml::from_reader(f)?
    } else {
        RepositoryConfig::default()
    };

    config.validate()?;

    Ok(config)
}

/// Open the repository described by the `--config` argument and load its stored packages.
async fn open_repository(args: &ArgMatches) -> Result<AptRepository> {
    let config = load_config(args.value_of_os("config"))?;

    let repo = AptRepository::from_config(config)?;
    repo.load_from_store().await?;

    Ok(repo)
}

fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(data)?;
    stdout.flush()?;

    Ok(())
}

async fn command_add(args: &ArgMatches) -> Result<()> {
    let repo = open_repository(args).await?;

    if repo.config().package_store.is_none() {
        return Err(AptRepoError::NoPackageStore);
    }

    let paths = args
        .values_of_os("path")
        .map(|values| values.collect::<Vec<_>>())
        .unwrap_or_default();

    for path in paths {
        let content = std::fs::read(path)?;
        let filename = repo.add_package(content).await?;

        println!("{}", filename);
    }

    Ok(())
}

async fn command_packages(args: &ArgMatches) -> Result<()> {
    let repo = open_repository(args).await?;

    let arch = if let Some(arch) = args.value_of("arch") {
        arch.to_string()
    } else {
        repo.config()
            .architectures
            .first()
            .cloned()
            .unwrap_or_default()
    };

    if !repo.config().architectures.contains(&arch) {
        warn!("architecture {} is not configured for this repository", arch);
    }

    write_stdout(repo.build_packages_index(&arch).as_bytes())
}

async fn command_release(args: &ArgMatches) -> Result<()> {
    let repo = open_repository(args).await?;

    write_stdout(repo.build_release()?.as_bytes())
}

async fn command_inrelease(args: &ArgMatches) -> Result<()> {
    let repo = open_repository(args).await?;

    write_stdout(repo.clear_sign_release()?.as_bytes())
}

async fn command_release_gpg(args: &ArgMatches) -> Result<()> {
    let repo = open_repository(args).await?;

    write_stdout(&repo.detached_sign_release()?)
}

async fn command_export_key(args: &ArgMatches) -> Result<()> {
    let repo = open_repository(args).await?;

    write_stdout(&repo.export_public_key()?)
}

async fn command_publish(args: &ArgMatches) -> Result<()> {
    let repo = open_repository(args).await?;

    let dest_dir = Path::new(
        args.value_of_os("dest_dir")
            .expect("dest_dir argument is required"),
    );

    repo.publish_to_directory(dest_dir).await?;

    info!("published repository to {}", dest_dir.display());

    Ok(())
}

fn command_generate_key(args: &ArgMatches) -> Result<()> {
    let user_id = args.value_of("user_id").expect("user_id argument is required");
    let private_path = Path::new(
        args.value_of_os("private_key_path")
            .expect("private_key_path argument is required"),
    );
    let public_path = Path::new(
        args.value_of_os("public_key_path")
            .expect("public_key_path argument is required"),
    );

    for path in [private_path, public_path] {
        if path.exists() {
            return Err(AptRepoError::FileExists(format!("{}", path.display())));
        }
    }

    let config = load_config(args.value_of_os("config"))?;
    let passphrase = config.signing_key_passphrase();

    info!("generating signing key for {}", user_id);
    let (private, public) =
        generate_armored_signing_key(user_id, &passphrase).map_err(RepositoryError::from)?;

    std::fs::write(private_path, private)?;
    std::fs::write(public_path, public)?;

    if passphrase.is_empty() {
        warn!(
            "wrote unencrypted private key to {}; set {} to encrypt it",
            private_path.display(),
            config.signing_key_passphrase_env
        );
    } else {
        info!(
            "wrote private key encrypted with ${} to {}",
            config.signing_key_passphrase_env,
            private_path.display()
        );
    }
    info!("wrote public key to {}", public_path.display());

    Ok(())
}

fn command_verify(args: &ArgMatches) -> Result<()> {
    let public_keys = std::fs::read(
        args.value_of_os("public_key")
            .expect("public_key argument is required"),
    )?;
    let data = std::fs::read(args.value_of_os("path").expect("path argument is required"))?;

    if let Some(signature_path) = args.value_of_os("signature") {
        let signature = std::fs::read(signature_path)?;

        verify_detached_signature(&data, &signature, &public_keys)?;
        info!("detached signature verified");
    } else {
        let document = String::from_utf8_lossy(&data);

        let text = verify_cleartext(&document, &public_keys)?;
        info!("cleartext signature verified");

        write_stdout(text.as_bytes())?;
    }

    Ok(())
}
