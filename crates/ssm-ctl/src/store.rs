//! parameter store access
//!
//! [ParameterStore] mirrors the service api: one call per page or batch. [SsmClient] builds the operations
//! the commands need on top of it (batching, pagination, reencryption of secrets, collective error reporting).
//! [MemoryStore] implements the service against a yaml file.
use crate::crypto::Encryptor;
use crate::error::{Error, Result};
use crate::parameter::{Parameter, ParameterType, VarMode};
use crate::var_string::ResolutionContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Upper bound of names per get, put or delete batch
pub const BATCH_SIZE: usize = 10;

/// A parameter version as reported by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoredParameter {
    pub name: String,
    #[serde(rename = "Type")]
    pub kind: ParameterType,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_user: Option<String>,
}

/// Arguments of a single put
#[derive(Debug, Clone, PartialEq)]
pub struct PutRequest {
    pub name: String,
    pub kind: ParameterType,
    /// plaintext, the store encrypts SecureStrings itself
    pub value: String,
    pub key_id: Option<String>,
    pub allowed_pattern: Option<String>,
    pub description: Option<String>,
    pub overwrite: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GetParametersOutput {
    pub parameters: Vec<StoredParameter>,
    pub invalid_parameters: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteParametersOutput {
    pub deleted_parameters: Vec<String>,
    pub invalid_parameters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterFilter {
    Type(ParameterType),
    KeyId(String),
}

impl ParameterFilter {
    fn matches(&self, parameter: &StoredParameter) -> bool {
        match self {
            ParameterFilter::Type(kind) => parameter.kind == *kind,
            ParameterFilter::KeyId(key_id) => parameter.key_id.as_deref() == Some(key_id),
        }
    }
}

/// Remote parameter store service
pub trait ParameterStore {
    /// At most [BATCH_SIZE] names; unknown names are reported, not failed
    fn get_parameters(&self, names: &[String], with_decryption: bool)
        -> Result<GetParametersOutput>;

    fn get_parameters_by_path(
        &self,
        path: &str,
        recursive: bool,
        filters: &[ParameterFilter],
        with_decryption: bool,
        next_token: Option<&str>,
    ) -> Result<Page<StoredParameter>>;

    /// Fails with [Error::ParameterNotFound] for unknown names
    fn get_parameter_history(
        &self,
        name: &str,
        with_decryption: bool,
        next_token: Option<&str>,
    ) -> Result<Page<StoredParameter>>;

    /// Returns the new version
    fn put_parameter(&mut self, request: &PutRequest) -> Result<u64>;

    /// At most [BATCH_SIZE] names
    fn delete_parameters(&mut self, names: &[String]) -> Result<DeleteParametersOutput>;
}

/// How secrets read from the store are encrypted for the client
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Reencrypt {
    /// keep the value as delivered without decryption
    Disabled,
    /// encrypt with the key the parameter is stored with
    #[default]
    OwnKey,
    /// encrypt every secret with this key
    Key(String),
}

impl Reencrypt {
    fn key_id<'a>(&'a self, own_key_id: Option<&'a str>) -> Option<&'a str> {
        match self {
            Reencrypt::Disabled => None,
            Reencrypt::OwnKey => own_key_id,
            Reencrypt::Key(key_id) => Some(key_id),
        }
    }

    fn with_decryption(&self) -> bool {
        *self != Reencrypt::Disabled
    }
}

/// Options of a push
#[derive(Debug, Clone, Copy, Default)]
pub struct PushOptions {
    /// applies to parameters without an explicit `Overwrite`
    pub overwrite: bool,
}

pub struct SsmClient<S> {
    store: S,
    crypto: Rc<dyn Encryptor>,
    reencrypt: Reencrypt,
}

impl<S: ParameterStore> SsmClient<S> {
    pub fn new(store: S, crypto: Rc<dyn Encryptor>) -> Self {
        Self {
            store,
            crypto,
            reencrypt: Reencrypt::default(),
        }
    }

    pub fn with_reencrypt(mut self, reencrypt: Reencrypt) -> Self {
        self.reencrypt = reencrypt;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Turn a stored version into a [Parameter], encrypting secrets for the client
    fn load(&self, stored: StoredParameter) -> Result<Parameter> {
        let mut fields = serde_yaml::to_value(&stored)?;
        if stored.kind == ParameterType::SecureString {
            if let Some(key_id) = self.reencrypt.key_id(stored.key_id.as_deref()) {
                tracing::debug!(parameter = %stored.name, key_id, "reencrypting secret");
                let ciphertext = self.crypto.encrypt(&stored.value, key_id)?;
                if let serde_yaml::Value::Mapping(fields) = &mut fields {
                    fields.remove("Value");
                    fields.insert("EncryptedValue".into(), ciphertext.into());
                }
            }
        }

        let serde_yaml::Value::Mapping(fields) = fields else {
            return Err(Error::Store(format!("unexpected data for {}", stored.name)));
        };
        Parameter::load(
            &fields,
            VarMode::Off,
            None,
            true,
            &mut ResolutionContext::default(),
        )
    }

    /// Current version of each name
    ///
    /// Unknown names are collected and reported together.
    pub fn get(&self, names: &[String]) -> Result<Vec<Parameter>> {
        let mut invalid = vec![];
        let mut parameters = vec![];

        for batch in names.chunks(BATCH_SIZE) {
            let output = self
                .store
                .get_parameters(batch, self.reencrypt.with_decryption())?;
            invalid.extend(output.invalid_parameters);
            for stored in output.parameters {
                parameters.push(self.load(stored)?);
            }
        }

        if !invalid.is_empty() {
            return Err(Error::InvalidParameters(invalid));
        }
        Ok(parameters)
    }

    /// All versions of `name`, newest first
    pub fn get_history(&self, name: &str) -> Result<Vec<Parameter>> {
        let mut versions = vec![];
        let mut next_token: Option<String> = None;
        loop {
            let page = self.store.get_parameter_history(
                name,
                self.reencrypt.with_decryption(),
                next_token.as_deref(),
            )?;
            versions.extend(page.items);
            next_token = page.next_token;
            if next_token.is_none() {
                break;
            }
        }

        versions.sort_by(|a, b| b.version.cmp(&a.version));
        versions.into_iter().map(|stored| self.load(stored)).collect()
    }

    /// Latest version of each name read through its history, which carries every field
    ///
    /// Unknown names are collected and reported together, any other failure is returned as is.
    pub fn get_latest(&self, names: &[String]) -> Result<Vec<Parameter>> {
        let mut invalid = vec![];
        let mut parameters = vec![];

        for name in names {
            let versions = match self.get_history(name) {
                Ok(versions) => versions,
                Err(Error::ParameterNotFound(_)) => vec![],
                Err(e) => return Err(e),
            };
            match versions.into_iter().next() {
                Some(latest) => parameters.push(latest),
                None => {
                    tracing::debug!(parameter = %name, "parameter has no versions");
                    invalid.push(name.clone());
                }
            }
        }

        if !invalid.is_empty() {
            return Err(Error::InvalidParameters(invalid));
        }
        Ok(parameters)
    }

    fn stored_by_path(
        &self,
        path: &str,
        recursive: bool,
        filters: &[ParameterFilter],
        with_decryption: bool,
    ) -> Result<Vec<StoredParameter>> {
        let mut parameters = vec![];
        let mut next_token: Option<String> = None;
        loop {
            let page = self.store.get_parameters_by_path(
                path,
                recursive,
                filters,
                with_decryption,
                next_token.as_deref(),
            )?;
            parameters.extend(page.items);
            next_token = page.next_token;
            if next_token.is_none() {
                break;
            }
        }
        Ok(parameters)
    }

    pub fn get_by_path(
        &self,
        path: &str,
        recursive: bool,
        filters: &[ParameterFilter],
    ) -> Result<Vec<Parameter>> {
        self.stored_by_path(path, recursive, filters, self.reencrypt.with_decryption())?
            .into_iter()
            .map(|stored| self.load(stored))
            .collect()
    }

    /// Every name below `path`, recursively
    pub fn names_by_path(&self, path: &str) -> Result<Vec<String>> {
        Ok(self
            .stored_by_path(path, true, &[], false)?
            .into_iter()
            .map(|stored| stored.name)
            .collect())
    }

    /// Every parameter below `path` with all of its fields
    pub fn get_path_full(&self, path: &str) -> Result<Vec<Parameter>> {
        self.get_latest(&self.names_by_path(path)?)
    }

    /// Put every enabled parameter
    ///
    /// All values are materialized before the first put. Failed puts do not stop the batch, their names are
    /// reported together afterwards.
    pub fn put_batch<'a>(
        &mut self,
        parameters: impl IntoIterator<Item = &'a Parameter>,
        context: &ResolutionContext,
        options: PushOptions,
    ) -> Result<Vec<u64>> {
        let mut requests = vec![];
        for parameter in parameters {
            if parameter.is_disabled(context)? {
                continue;
            }

            let name = parameter.name(context)?;
            let value = parameter
                .value(context, true)?
                .ok_or_else(|| Error::schema(format!("Value missing for parameter {name}")))?;
            requests.push(PutRequest {
                name,
                kind: parameter.kind(),
                value,
                key_id: parameter.key_id(context)?,
                allowed_pattern: parameter.allowed_pattern(context)?,
                description: parameter.description().map(str::to_string),
                overwrite: parameter.overwrite(options.overwrite),
            });
        }

        tracing::info!(count = requests.len(), "putting parameters");
        let mut versions = vec![];
        let mut failed = vec![];
        for batch in requests.chunks(BATCH_SIZE) {
            for request in batch {
                match self.store.put_parameter(request) {
                    Ok(version) => {
                        tracing::debug!(parameter = %request.name, version, "parameter put");
                        versions.push(version);
                    }
                    Err(e) => {
                        tracing::error!(parameter = %request.name, error = %e, "put failed");
                        failed.push(request.name.clone());
                    }
                }
            }
        }

        if !failed.is_empty() {
            return Err(Error::PutFailed(failed));
        }
        Ok(versions)
    }

    /// Delete `names` in batches, returning the names that were deleted
    pub fn delete(&mut self, names: &[String]) -> Result<Vec<String>> {
        let mut deleted = vec![];
        for batch in names.chunks(BATCH_SIZE) {
            let output = self.store.delete_parameters(batch)?;
            if !output.invalid_parameters.is_empty() {
                tracing::warn!(
                    parameters = %output.invalid_parameters.join(", "),
                    "parameters to delete did not exist"
                );
            }
            deleted.extend(output.deleted_parameters);
        }
        Ok(deleted)
    }

    /// Delete every parameter below `path`
    pub fn delete_path(&mut self, path: &str) -> Result<Vec<String>> {
        let names = self.names_by_path(path)?;
        self.delete(&names)
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for SsmClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsmClient")
            .field("store", &self.store)
            .field("reencrypt", &self.reencrypt)
            .finish()
    }
}

/// [ParameterStore] held in memory and optionally persisted to a yaml file
///
/// SecureString values are kept encrypted with the configured [Encryptor].
pub struct MemoryStore {
    /// versions of each name, oldest first
    parameters: BTreeMap<String, Vec<StoredParameter>>,
    crypto: Rc<dyn Encryptor>,
    path: Option<PathBuf>,
    user: String,
    page_size: usize,
}

impl MemoryStore {
    pub fn new(crypto: Rc<dyn Encryptor>) -> Self {
        Self {
            parameters: Default::default(),
            crypto,
            path: None,
            user: std::env::var("USER").unwrap_or_else(|_| "ssm-ctl".to_string()),
            page_size: BATCH_SIZE,
        }
    }

    /// Load the store file; a missing file is an empty store
    pub fn load(path: &Path, crypto: Rc<dyn Encryptor>) -> Result<Self> {
        let mut store = Self::new(crypto);
        store.path = Some(path.to_path_buf());

        if !path.exists() {
            tracing::debug!(path=%path.display(), "store file does not exist");
            return Ok(store);
        }

        tracing::info!(path=%path.display(), "loading store");
        let contents = std::fs::read_to_string(path)?;
        store.parameters = serde_yaml::from_str::<Option<_>>(&contents)?.unwrap_or_default();
        Ok(store)
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        std::fs::write(path, serde_yaml::to_string(&self.parameters)?)?;
        tracing::info!(path=%path.display(), "store saved");
        Ok(())
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn output(&self, stored: &StoredParameter, with_decryption: bool) -> Result<StoredParameter> {
        let mut stored = stored.clone();
        if stored.kind == ParameterType::SecureString && with_decryption {
            stored.value = self
                .crypto
                .decrypt(&stored.value, stored.key_id.as_deref())?;
        }
        Ok(stored)
    }

    fn page<'a>(
        &self,
        items: impl Iterator<Item = &'a StoredParameter>,
        with_decryption: bool,
        next_token: Option<&str>,
    ) -> Result<Page<StoredParameter>> {
        let start = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| Error::Store(format!("invalid next token {token}")))?,
            None => 0,
        };

        let mut items = items.skip(start).peekable();
        let page = items
            .by_ref()
            .take(self.page_size)
            .map(|stored| self.output(stored, with_decryption))
            .collect::<Result<Vec<_>>>()?;
        let next_token = items
            .peek()
            .is_some()
            .then(|| (start + self.page_size).to_string());

        Ok(Page {
            items: page,
            next_token,
        })
    }

    fn latest(&self, name: &str) -> Option<&StoredParameter> {
        self.parameters.get(name).and_then(|versions| versions.last())
    }
}

impl ParameterStore for MemoryStore {
    fn get_parameters(
        &self,
        names: &[String],
        with_decryption: bool,
    ) -> Result<GetParametersOutput> {
        if names.len() > BATCH_SIZE {
            return Err(Error::Store(format!(
                "at most {BATCH_SIZE} names per request, got {}",
                names.len()
            )));
        }

        let mut output = GetParametersOutput::default();
        for name in names {
            match self.latest(name) {
                Some(stored) => output
                    .parameters
                    .push(self.output(stored, with_decryption)?),
                None => output.invalid_parameters.push(name.clone()),
            }
        }
        Ok(output)
    }

    fn get_parameters_by_path(
        &self,
        path: &str,
        recursive: bool,
        filters: &[ParameterFilter],
        with_decryption: bool,
        next_token: Option<&str>,
    ) -> Result<Page<StoredParameter>> {
        let path = path.trim_end_matches('/');
        let matching = self.parameters.iter().filter_map(|(name, versions)| {
            let rest = name.strip_prefix(path)?.strip_prefix('/')?;
            if !recursive && rest.contains('/') {
                return None;
            }
            let latest = versions.last()?;
            filters
                .iter()
                .all(|filter| filter.matches(latest))
                .then_some(latest)
        });

        self.page(matching, with_decryption, next_token)
    }

    fn get_parameter_history(
        &self,
        name: &str,
        with_decryption: bool,
        next_token: Option<&str>,
    ) -> Result<Page<StoredParameter>> {
        let versions = self
            .parameters
            .get(name)
            .ok_or_else(|| Error::ParameterNotFound(name.to_string()))?;
        self.page(versions.iter(), with_decryption, next_token)
    }

    fn put_parameter(&mut self, request: &PutRequest) -> Result<u64> {
        if !request.name.starts_with('/') {
            return Err(Error::Store(format!(
                "parameter name {} must be absolute",
                request.name
            )));
        }

        if let Some(pattern) = &request.allowed_pattern {
            let regex = regex::Regex::new(pattern)
                .map_err(|e| Error::Store(format!("invalid allowed pattern {pattern}: {e}")))?;
            if !regex.is_match(&request.value) {
                return Err(Error::Store(format!(
                    "value of {} does not match {pattern}",
                    request.name
                )));
            }
        }

        let value = match (request.kind, &request.key_id) {
            (ParameterType::SecureString, Some(key_id)) => {
                self.crypto.encrypt(&request.value, key_id)?
            }
            (ParameterType::SecureString, None) => {
                return Err(Error::Store(format!("{} requires a key id", request.name)))
            }
            _ => request.value.clone(),
        };

        let current = self.latest(&request.name).map(|stored| stored.version);
        if current.is_some() && !request.overwrite {
            return Err(Error::Store(format!(
                "parameter {} already exists",
                request.name
            )));
        }

        let version = current.unwrap_or(0) + 1;
        let stored = StoredParameter {
            name: request.name.clone(),
            kind: request.kind,
            value,
            key_id: request.key_id.clone(),
            allowed_pattern: request.allowed_pattern.clone(),
            description: request.description.clone(),
            version,
            last_modified_date: Some(Utc::now()),
            last_modified_user: Some(self.user.clone()),
        };
        self.parameters
            .entry(request.name.clone())
            .or_default()
            .push(stored);
        Ok(version)
    }

    fn delete_parameters(&mut self, names: &[String]) -> Result<DeleteParametersOutput> {
        if names.len() > BATCH_SIZE {
            return Err(Error::Store(format!(
                "at most {BATCH_SIZE} names per request, got {}",
                names.len()
            )));
        }

        let mut output = DeleteParametersOutput::default();
        for name in names {
            match self.parameters.remove(name) {
                Some(_) => output.deleted_parameters.push(name.clone()),
                None => output.invalid_parameters.push(name.clone()),
            }
        }
        Ok(output)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("names", &self.parameters.keys().collect::<Vec<_>>())
            .field("path", &self.path)
            .finish()
    }
}
