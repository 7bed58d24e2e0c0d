mod cli;

use ssm_ctl::crypto::{format_key_id, Encryptor, Keyring};
use ssm_ctl::diff::{diff_paths, flush};
use ssm_ctl::documents::ParameterDocuments;
use ssm_ctl::environment::{Environment, StaticEnvironment};
use ssm_ctl::input::{Inputs, Prompter, ResolveOptions, TerminalPrompter};
use ssm_ctl::parameter::VarMode;
use ssm_ctl::parameter_file::{compile, ParameterSet};
use ssm_ctl::store::{MemoryStore, PushOptions, Reencrypt, SsmClient};
use ssm_ctl::value::Value;
use ssm_ctl::var_string::ResolutionContext;
use std::io::Write;
use std::rc::Rc;

fn main() {
    let cli = cli::Cli::parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("SSM_CTL_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = Session::new(&cli).and_then(|session| match &cli.command {
        cli::Command::Push(push_cli) => session.push(push_cli),
        cli::Command::Diff(diff_cli) => session.diff(diff_cli),
        cli::Command::Delete(delete_cli) => session.delete(delete_cli),
        cli::Command::Download(download_cli) => session.download(download_cli),
        cli::Command::Encrypt(encrypt_cli) => session.encrypt(encrypt_cli),
        cli::Command::Decrypt(decrypt_cli) => session.decrypt(decrypt_cli),
        cli::Command::History(history_cli) => session.history(history_cli),
        cli::Command::Keygen(keygen_cli) => session.keygen(keygen_cli),
    });

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

/// Collaborators shared by all commands
struct Session {
    keyring: Rc<Keyring>,
    environment: Rc<StaticEnvironment>,
    store_path: std::path::PathBuf,
    keyring_path: std::path::PathBuf,
}

impl Session {
    fn new(cli: &cli::Cli) -> anyhow::Result<Self> {
        Ok(Session {
            keyring: Rc::new(Keyring::load(&cli.keyring)?),
            environment: Rc::new(StaticEnvironment::new(
                cli.region.clone(),
                cli.account.clone(),
            )),
            store_path: cli.store.clone(),
            keyring_path: cli.keyring.clone(),
        })
    }

    fn crypto(&self) -> Rc<dyn Encryptor> {
        self.keyring.clone()
    }

    fn client(&self) -> anyhow::Result<SsmClient<MemoryStore>> {
        let store = MemoryStore::load(&self.store_path, self.crypto())?;
        Ok(SsmClient::new(store, self.crypto()))
    }

    /// Load, merge and resolve the parameter files
    fn load(
        &self,
        files: &cli::FilesCommand,
        mode: VarMode,
    ) -> anyhow::Result<(ParameterSet, ResolutionContext)> {
        let mut documents = ParameterDocuments::default();
        for file_path in &files.files {
            documents.load_file(file_path)?;
        }
        anyhow::ensure!(documents.source_count() > 0, "No files loaded");

        let mut context = ResolutionContext::new(self.crypto());
        let mut parameters = ParameterSet::load(&documents, Inputs::default(), mode, &mut context)?;
        for (name, value, secure) in files.input.values() {
            parameters.inputs.set_value(name, value, secure)?;
        }

        let options = ResolveOptions {
            prompt: files.input.prompt(),
            echo: files.input.echo(),
        };
        let environment: Rc<dyn Environment> = self.environment.clone();
        parameters.resolve_inputs(&mut context, options, &mut TerminalPrompter, environment)?;

        Ok((parameters, context))
    }

    pub fn push(&self, cli: &cli::PushCommand) -> anyhow::Result<()> {
        let (parameters, context) = self.load(&cli.files, VarMode::All)?;
        let names = parameters.names(&context)?;
        let base_paths = parameters.base_paths(&context)?;
        let mut client = self.client()?;

        let diff = match cli.diff {
            true => Some(diff_paths(&client, &base_paths, &names)?),
            false => None,
        };

        if cli.dry_run {
            let document = compile(parameters.parameters.values(), None, true, &context)?;
            println!("*** PARAMETERS TO PUSH ***");
            output(&cli.output, &document)?;
            if let Some(diff) = diff {
                print!("\n{diff}");
            }
            return Ok(());
        }

        if let Some(diff) = diff {
            print!("{diff}");
        }

        if cli.delete {
            tracing::info!("processing removed parameters");
            flush(&mut client, &base_paths, &names)?;
        }

        let options = PushOptions {
            overwrite: cli.overwrite,
        };
        let result = client.put_batch(parameters.parameters.values(), &context, options);
        // parameters put before a failure are kept
        client.store().save()?;
        result?;
        Ok(())
    }

    pub fn diff(&self, cli: &cli::FilesCommand) -> anyhow::Result<()> {
        let (parameters, context) = self.load(cli, VarMode::Reduced)?;
        let names = parameters.names(&context)?;
        let base_paths = parameters.base_paths(&context)?;

        let diff = diff_paths(&self.client()?, &base_paths, &names)?;
        print!("{diff}");
        Ok(())
    }

    pub fn delete(&self, cli: &cli::FilesCommand) -> anyhow::Result<()> {
        let (parameters, context) = self.load(cli, VarMode::Reduced)?;
        let names = parameters.names(&context)?;
        let base_paths = parameters.base_paths(&context)?;
        let mut client = self.client()?;

        flush(&mut client, &base_paths, &names)?;

        tracing::info!("deleting parameters");
        let names: Vec<String> = names.into_iter().collect();
        client.delete(&names)?;
        client.store().save()?;
        Ok(())
    }

    pub fn download(&self, cli: &cli::DownloadCommand) -> anyhow::Result<()> {
        let reencrypt = match &cli.reencrypt_key_id {
            Some(key_id) => Reencrypt::Key(key_id.clone()),
            None => Reencrypt::OwnKey,
        };
        let client = self.client()?.with_reencrypt(reencrypt);

        let mut parameters = vec![];
        for path in &cli.paths {
            parameters.extend(client.get_path_full(path)?);
        }

        let base_path = match cli.paths.as_slice() {
            [path] => Some(path.trim_end_matches('/')),
            _ => None,
        };
        let context = ResolutionContext::new(self.crypto());
        let document = compile(&parameters, base_path, false, &context)?;
        output(&cli.output, &document)
    }

    pub fn encrypt(&self, cli: &cli::EncryptCommand) -> anyhow::Result<()> {
        let key_id = format_key_id(&cli.key_id, self.environment.as_ref())?;

        let values: Vec<(String, String)> = if cli.prompt {
            let mut prompter = TerminalPrompter;
            cli.args
                .iter()
                .map(|name| -> anyhow::Result<(String, String)> {
                    let value = prompter.prompt(&format!("{name}: "), cli.echo)?;
                    Ok((name.clone(), value))
                })
                .collect::<anyhow::Result<_>>()?
        } else {
            anyhow::ensure!(
                cli.args.len() % 2 == 0,
                "Provide a value for every name"
            );
            cli.args
                .chunks(2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect()
        };

        let mut document = match cli.file.exists() {
            true => match serde_yaml::from_str(&std::fs::read_to_string(&cli.file)?)? {
                serde_yaml::Value::Null => serde_yaml::Mapping::new(),
                serde_yaml::Value::Mapping(document) => document,
                _ => anyhow::bail!("{} is not a mapping", cli.file.display()),
            },
            false => serde_yaml::Mapping::new(),
        };

        for (name, plaintext) in values {
            let ciphertext = self.keyring.encrypt(&plaintext, &key_id)?;
            let entry = document
                .entry(name.into())
                .or_insert_with(|| serde_yaml::Mapping::new().into());
            if !entry.is_mapping() {
                *entry = serde_yaml::Mapping::new().into();
            }
            if let serde_yaml::Value::Mapping(fields) = entry {
                fields.insert("EncryptedValue".into(), ciphertext.into());
                fields.insert("KeyId".into(), key_id.clone().into());
            }
        }

        std::fs::write(&cli.file, serde_yaml::to_string(&document)?)?;
        Ok(())
    }

    pub fn decrypt(&self, cli: &cli::DecryptCommand) -> anyhow::Result<()> {
        let document: serde_yaml::Mapping =
            serde_yaml::from_str(&std::fs::read_to_string(&cli.file)?)?;

        for (name, data) in &document {
            let Some(ciphertext) = data.get("EncryptedValue").and_then(|value| value.as_str())
            else {
                continue;
            };
            let key_id = data.get("KeyId").and_then(|value| value.as_str());
            let plaintext = self.keyring.decrypt(ciphertext, key_id)?;
            let name = ssm_ctl::documents::scalar_to_string(name).unwrap_or_default();
            println!("{name}: {plaintext}");
        }
        Ok(())
    }

    pub fn history(&self, cli: &cli::HistoryCommand) -> anyhow::Result<()> {
        let client = self.client()?;
        let context = ResolutionContext::new(self.crypto());

        let mut versions = vec![];
        for parameter in client.get_history(&cli.name)? {
            let mut version = Value::object();
            version.insert_some("Version", parameter.metadata.version.map(|v| v.to_string()));
            version.insert("Type", parameter.kind().as_str());
            let encrypted = parameter.is_encrypted();
            version.insert_some(
                if encrypted { "EncryptedValue" } else { "Value" },
                parameter.value(&context, !encrypted)?,
            );
            version.insert_some("KeyId", parameter.key_id(&context)?);
            version.insert_some(
                "LastModifiedDate",
                parameter
                    .metadata
                    .last_modified_date
                    .map(|date| date.to_rfc3339()),
            );
            version.insert_some(
                "LastModifiedUser",
                parameter.metadata.last_modified_user.clone(),
            );
            versions.push(version);
        }

        output(&cli.output, &Value::Array(versions))
    }

    pub fn keygen(&self, cli: &cli::KeygenCommand) -> anyhow::Result<()> {
        let mut keyring = Keyring::load(&self.keyring_path)?;
        keyring.generate(&cli.key_id)?;
        keyring.save()?;
        Ok(())
    }
}

fn output(output: &cli::OutputArgs, value: &Value) -> anyhow::Result<()> {
    let writer: Box<dyn std::io::Write> = match &output.file {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(std::io::stdout()),
    };

    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(writer, value)?,
        cli::OutputFormat::Json => {
            let mut writer = writer;
            serde_json::to_writer_pretty(&mut writer, value)?;
            writeln!(writer)?;
        }
    };

    Ok(())
}
