//! a single parameter as declared in a document or loaded from the store
//!
//! Every string field of a [Parameter] is a [VarString]; which of them may carry `$(Name)` references is
//! decided by the [VarMode] used while loading. The final value is computed lazily and cached.
use crate::documents::scalar_to_string;
use crate::error::{Error, Result};
use crate::var_string::{Binding, Cached, ResolutionContext, VarString};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterType {
    String,
    SecureString,
    StringList,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "String",
            ParameterType::SecureString => "SecureString",
            ParameterType::StringList => "StringList",
        }
    }
}

impl std::str::FromStr for ParameterType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "String" => Ok(ParameterType::String),
            "SecureString" => Ok(ParameterType::SecureString),
            "StringList" => Ok(ParameterType::StringList),
            other => Err(Error::schema(format!("Invalid type {other}"))),
        }
    }
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which fields may contain variable references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarMode {
    /// every string field
    #[default]
    All,
    /// only `Name` and `Disable`; enough to compute names for diff and delete
    Reduced,
    /// nothing, for data that is already resolved (loaded from the store)
    Off,
}

impl VarMode {
    fn templates_values(&self) -> bool {
        *self == VarMode::All
    }

    fn templates_names(&self) -> bool {
        *self != VarMode::Off
    }
}

#[derive(Debug)]
pub enum ParameterValue {
    Plain(VarString),
    List(Vec<VarString>),
    /// ciphertext produced by the encryption provider
    Encrypted(VarString),
    /// pointer to a single input whose value is the secret
    Input(VarString),
}

/// Read-only data reported by the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub version: Option<u64>,
    pub last_modified_date: Option<DateTime<Utc>>,
    pub last_modified_user: Option<String>,
}

#[derive(Debug)]
pub struct Parameter {
    name: VarString,
    kind: ParameterType,
    value: Option<ParameterValue>,
    key_id: Option<VarString>,
    allowed_pattern: Option<VarString>,
    description: Option<String>,
    overwrite: Option<bool>,
    disable: Option<VarString>,
    base_path: Option<Rc<VarString>>,
    pub metadata: Metadata,
    /// indexed by the `decrypt` flag of [Parameter::value]
    resolved: [Cached<Option<String>>; 2],
}

impl Parameter {
    /// Build a parameter from its fields (`Name`, `Type`, `Value`, ...)
    ///
    /// `allow_secure_value` permits a plaintext `Value` on a SecureString, which only makes sense for data
    /// read back from the store.
    pub fn load(
        fields: &Mapping,
        mode: VarMode,
        base_path: Option<Rc<VarString>>,
        allow_secure_value: bool,
        context: &mut ResolutionContext,
    ) -> Result<Self> {
        let text = |key: &str| fields.get(key).and_then(scalar_to_string);

        let name = text("Name").ok_or_else(|| Error::schema("Parameter without Name"))?;
        let var = |value: String, templated: bool, context: &mut ResolutionContext| {
            if templated {
                VarString::load(&value, context)
            } else {
                VarString::literal(value)
            }
        };

        let kind = match text("Type") {
            Some(kind) => kind
                .parse::<ParameterType>()
                .map_err(|e| Error::schema(format!("{e} for parameter {name}")))?,
            None if fields.contains_key("KeyId") => ParameterType::SecureString,
            None if matches!(fields.get("Value"), Some(Value::Sequence(_))) => {
                ParameterType::StringList
            }
            None => ParameterType::String,
        };

        let key_id = text("KeyId").map(|key_id| var(key_id, mode.templates_values(), context));
        match (kind, &key_id) {
            (ParameterType::SecureString, None) => {
                return Err(Error::schema(format!("SecureString {name} requires KeyId")))
            }
            (ParameterType::String | ParameterType::StringList, Some(_)) => {
                return Err(Error::schema(format!(
                    "KeyId is only allowed for SecureString, {name} is {kind}"
                )))
            }
            _ => {}
        }

        let value = if kind == ParameterType::SecureString {
            let sources: Vec<&str> = ["EncryptedValue", "Input", "Value"]
                .into_iter()
                .filter(|key| fields.contains_key(*key))
                .collect();
            if sources.len() > 1 {
                return Err(Error::schema(format!(
                    "Ambiguous value for SecureString {name}: {}",
                    sources.join(", ")
                )));
            }

            match sources.first().copied() {
                Some("EncryptedValue") => text("EncryptedValue")
                    .map(|value| ParameterValue::Encrypted(var(value, mode.templates_values(), context))),
                Some("Input") => {
                    let reference =
                        text("Input").ok_or_else(|| Error::schema(format!("Input of {name} must be a name")))?;
                    let reference = if mode.templates_values() {
                        VarString::single_reference(&reference, context)?
                    } else {
                        VarString::literal(reference)
                    };
                    Some(ParameterValue::Input(reference))
                }
                Some(_) if allow_secure_value => {
                    text("Value").map(|value| ParameterValue::Plain(VarString::literal(value)))
                }
                Some(_) => {
                    return Err(Error::schema(format!(
                        "Value cannot be used with SecureString {name}, use EncryptedValue or Input"
                    )))
                }
                None => None,
            }
        } else {
            if fields.contains_key("EncryptedValue") || fields.contains_key("Input") {
                return Err(Error::schema(format!(
                    "EncryptedValue and Input require SecureString, {name} is {kind}"
                )));
            }

            match fields.get("Value") {
                Some(Value::Sequence(items)) => Some(ParameterValue::List(
                    items
                        .iter()
                        .map(|item| {
                            scalar_to_string(item)
                                .map(|item| var(item, mode.templates_values(), context))
                                .ok_or_else(|| {
                                    Error::schema(format!("List items of {name} must be scalars"))
                                })
                        })
                        .collect::<Result<_>>()?,
                )),
                Some(value) => scalar_to_string(value)
                    .map(|value| ParameterValue::Plain(var(value, mode.templates_values(), context))),
                None => None,
            }
        };

        let disable = text("Disable")
            .or_else(|| text("Disabled"))
            .map(|disable| var(disable, mode.templates_names(), context));

        if value.is_none() && disable.is_none() {
            return Err(Error::schema(format!("Value missing for parameter {name}")));
        }

        let overwrite = text("Overwrite")
            .map(|overwrite| parse_bool(&overwrite))
            .transpose()?;

        let metadata = Metadata {
            version: fields.get("Version").and_then(Value::as_u64),
            last_modified_date: text("LastModifiedDate").and_then(|date| date.parse().ok()),
            last_modified_user: text("LastModifiedUser"),
        };

        Ok(Parameter {
            name: var(name, mode.templates_names(), context),
            kind,
            value,
            allowed_pattern: text("AllowedPattern")
                .map(|pattern| var(pattern, mode.templates_values(), context)),
            key_id,
            description: text("Description"),
            overwrite,
            disable,
            base_path,
            metadata,
            resolved: Default::default(),
        })
    }

    /// Identity used to merge parameters of several documents, before any variable is resolved
    pub fn key(&self) -> String {
        match &self.base_path {
            Some(base_path) if !self.name.source().starts_with('/') => {
                format!("{}/{}", base_path.source(), self.name.source())
            }
            _ => self.name.source().to_string(),
        }
    }

    /// Absolute name; relative names are placed under the base path
    pub fn name(&self, context: &ResolutionContext) -> Result<String> {
        let name = self.name.dump(context, true)?;
        match &self.base_path {
            Some(base_path) if !name.starts_with('/') => {
                Ok(format!("{}/{}", base_path.dump(context, true)?, name))
            }
            _ => Ok(name),
        }
    }

    pub fn kind(&self) -> ParameterType {
        self.kind
    }

    pub fn is_secure(&self) -> bool {
        self.kind == ParameterType::SecureString
    }

    /// Whether [Parameter::value] with `decrypt = false` yields ciphertext
    pub fn is_encrypted(&self) -> bool {
        matches!(
            self.value,
            Some(ParameterValue::Encrypted(_) | ParameterValue::Input(_))
        )
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn key_id(&self, context: &ResolutionContext) -> Result<Option<String>> {
        self.key_id
            .as_ref()
            .map(|key_id| key_id.dump(context, true))
            .transpose()
    }

    pub fn allowed_pattern(&self, context: &ResolutionContext) -> Result<Option<String>> {
        self.allowed_pattern
            .as_ref()
            .map(|pattern| pattern.dump(context, true))
            .transpose()
    }

    /// Explicit flag, or `default` when the parameter does not say
    pub fn overwrite(&self, default: bool) -> bool {
        self.overwrite.unwrap_or(default)
    }

    pub fn is_disabled(&self, context: &ResolutionContext) -> Result<bool> {
        match &self.disable {
            None => Ok(false),
            Some(disable) => parse_bool(&disable.dump(context, true)?),
        }
    }

    /// Final value
    ///
    /// Lists are joined with `,`. With `decrypt` secrets are returned as plaintext, otherwise encrypted ones
    /// are returned as ciphertext. A disabled parameter without a value yields `None`.
    pub fn value(&self, context: &ResolutionContext, decrypt: bool) -> Result<Option<String>> {
        self.resolved[decrypt as usize].get_or_try_resolve(self.name.source(), || {
            let Some(value) = &self.value else {
                if self.is_disabled(context)? {
                    return Ok(None);
                }
                return Err(Error::schema(format!(
                    "Value missing for parameter {}",
                    self.name(context)?
                )));
            };

            let value = match value {
                ParameterValue::Plain(value) => value.dump(context, decrypt)?,
                ParameterValue::List(items) => items
                    .iter()
                    .map(|item| item.dump(context, decrypt))
                    .collect::<Result<Vec<_>>>()?
                    .join(","),
                ParameterValue::Encrypted(ciphertext) => {
                    let ciphertext = ciphertext.dump(context, false)?;
                    if decrypt {
                        tracing::debug!(parameter = self.name.source(), "decrypting value");
                        let key_id = self.key_id(context)?;
                        context.crypto().decrypt(&ciphertext, key_id.as_deref())?
                    } else {
                        ciphertext
                    }
                }
                ParameterValue::Input(reference) => {
                    self.input_value(reference, context, decrypt)?
                }
            };
            Ok(Some(value))
        })
    }

    fn input_value(
        &self,
        reference: &VarString,
        context: &ResolutionContext,
        decrypt: bool,
    ) -> Result<String> {
        let name = reference.single_name().ok_or_else(|| {
            Error::schema(format!(
                "Input of {} is not a single reference",
                self.name.source()
            ))
        })?;
        let binding = context.binding(name)?;
        if decrypt {
            return binding.value(context, true);
        }

        let key_id = self
            .key_id(context)?
            .ok_or_else(|| Error::schema(format!("{} requires KeyId", self.name.source())))?;
        match binding {
            Binding::Input(input) => input.ciphertext(context.crypto(), &key_id),
            computed => context
                .crypto()
                .encrypt(&computed.value(context, true)?, &key_id),
        }
    }
}

/// Parse a boolean literal (`true` / `false`, case-insensitive)
pub fn parse_bool(text: &str) -> Result<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::schema(format!(
            "Invalid boolean {text:?}, expected true or false"
        ))),
    }
}

/// Absolute names of all enabled parameters
pub fn get_names<'a>(
    parameters: impl IntoIterator<Item = &'a Parameter>,
    context: &ResolutionContext,
) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for parameter in parameters {
        if parameter.is_disabled(context)? {
            continue;
        }
        names.insert(parameter.name(context)?);
    }
    Ok(names)
}
