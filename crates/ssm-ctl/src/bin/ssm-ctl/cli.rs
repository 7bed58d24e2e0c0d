//! ssm-ctl cli interface

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; ssm-ctl ... }
    #[arg(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    /// Parameter store file
    #[arg(long, env = "SSM_CTL_STORE", default_value = "ssm-store.yaml", global(true))]
    pub store: PathBuf,

    /// Keyring file holding the encryption keys
    #[arg(
        long,
        env = "SSM_CTL_KEYRING",
        default_value = "ssm-keyring.yaml",
        global(true)
    )]
    pub keyring: PathBuf,

    /// Region used for $(Region) and key ids
    #[arg(long, env = "AWS_REGION", global(true))]
    pub region: Option<String>,

    /// Account used for $(Account) and key ids
    #[arg(long, env = "SSM_CTL_ACCOUNT", global(true))]
    pub account: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse the process arguments, exiting with 1 on usage errors
    ///
    /// `--help` and `--version` still exit with 0.
    pub fn parse_args() -> Self {
        match Self::try_parse() {
            Ok(cli) => cli,
            Err(e) => {
                let _ = e.print();
                std::process::exit(exit_code(&e))
            }
        }
    }
}

fn exit_code(e: &clap::Error) -> i32 {
    match e.use_stderr() {
        true => 1,
        false => 0,
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Put the parameters of the given files into the store
    Push(PushCommand),

    /// Show which parameters a push would add, overwrite or remove
    Diff(FilesCommand),

    /// Delete the parameters of the given files and everything else below their base paths
    Delete(FilesCommand),

    /// Write the parameters below one or more paths as a parameter file
    Download(DownloadCommand),

    /// Encrypt values into a parameter file
    ///
    /// ssm-ctl encrypt FILE KEY_ID NAME VALUE [NAME VALUE]...
    ///
    /// ssm-ctl encrypt --prompt [--echo] FILE KEY_ID NAME [NAME]...
    Encrypt(EncryptCommand),

    /// Print the plaintext of every EncryptedValue in a parameter file
    Decrypt(DecryptCommand),

    /// Print all versions of a parameter
    History(HistoryCommand),

    /// Add a new key to the keyring
    Keygen(KeygenCommand),
}

#[derive(Parser, Debug)]
pub struct PushCommand {
    #[clap(flatten)]
    pub files: FilesCommand,

    /// Allow overwrites for parameters that do not set Overwrite
    #[arg(long)]
    pub overwrite: bool,

    /// Remove parameters below the base paths that are not in the files
    #[arg(long)]
    pub delete: bool,

    /// Print the parameters instead of putting them
    #[arg(long)]
    pub dry_run: bool,

    /// Print the difference to the store
    #[arg(long)]
    pub diff: bool,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct FilesCommand {
    /// Parameter files, later files replace parameters of earlier ones
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[clap(flatten)]
    pub input: InputArgs,
}

#[derive(Args, Debug)]
pub struct InputArgs {
    /// Value of an input
    #[arg(long = "input", num_args = 2, value_names = ["NAME", "VALUE"])]
    pub inputs: Vec<String>,

    /// Already encrypted value of a SecureString input
    #[arg(long = "secure-input", num_args = 2, value_names = ["NAME", "CIPHERTEXT"])]
    pub secure_inputs: Vec<String>,

    /// Ask for inputs without a value (default)
    #[arg(long, conflicts_with = "no_prompt")]
    pub prompt: bool,

    /// Fail on inputs without a value
    #[arg(long)]
    pub no_prompt: bool,

    /// Show typed input, including secrets
    #[arg(long, conflicts_with = "no_echo")]
    pub echo: bool,

    /// Hide typed input, including plain values
    #[arg(long)]
    pub no_echo: bool,
}

impl InputArgs {
    pub fn prompt(&self) -> bool {
        !self.no_prompt
    }

    /// `None` keeps the per-type default
    pub fn echo(&self) -> Option<bool> {
        match (self.echo, self.no_echo) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }

    /// `(name, value, secure)` for every given input
    pub fn values(&self) -> impl Iterator<Item = (&str, &str, bool)> {
        let plain = self
            .inputs
            .chunks(2)
            .map(|pair| (pair[0].as_str(), pair[1].as_str(), false));
        let secure = self
            .secure_inputs
            .chunks(2)
            .map(|pair| (pair[0].as_str(), pair[1].as_str(), true));
        plain.chain(secure)
    }
}

#[derive(Parser, Debug)]
pub struct DownloadCommand {
    /// Paths to download, recursively
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Encrypt every secret with this key instead of its own
    #[arg(long)]
    pub reencrypt_key_id: Option<String>,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct EncryptCommand {
    /// Parameter file to update, created when missing
    pub file: PathBuf,

    pub key_id: String,

    /// NAME VALUE pairs, or only NAMEs with --prompt
    #[arg(required = true)]
    pub args: Vec<String>,

    /// Ask for the value of each name
    #[arg(long)]
    pub prompt: bool,

    /// Show typed values
    #[arg(long, requires = "prompt")]
    pub echo: bool,
}

#[derive(Parser, Debug)]
pub struct DecryptCommand {
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct HistoryCommand {
    pub name: String,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct KeygenCommand {
    pub key_id: String,
}

#[derive(Args, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,

    /// Write into a file instead of stdout
    #[arg(short = 'o', long = "output")]
    pub file: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("ssm-ctl").chain(args.iter().copied()))
    }

    #[test]
    fn usage_errors_exit_with_1() {
        assert_eq!(exit_code(&parse(&["bogus"]).unwrap_err()), 1);
        assert_eq!(exit_code(&parse(&["diff"]).unwrap_err()), 1);
        assert_eq!(exit_code(&parse(&["push", "a.yaml", "--input", "Stage"]).unwrap_err()), 1);
    }

    #[test]
    fn help_and_version_exit_with_0() {
        assert_eq!(exit_code(&parse(&["--help"]).unwrap_err()), 0);
        assert_eq!(exit_code(&parse(&["diff", "--help"]).unwrap_err()), 0);
        assert_eq!(exit_code(&parse(&["--version"]).unwrap_err()), 0);
    }

    #[test]
    fn input_flags() {
        let cli = parse(&[
            "push",
            "a.yaml",
            "--input",
            "Stage",
            "dev",
            "--secure-input",
            "Token",
            "CIPHER",
            "--no-prompt",
        ])
        .unwrap();
        let Command::Push(push) = cli.command else {
            panic!("expected push")
        };
        assert!(!push.files.input.prompt());
        assert_eq!(
            push.files.input.values().collect::<Vec<_>>(),
            vec![("Stage", "dev", false), ("Token", "CIPHER", true)]
        );
    }
}
